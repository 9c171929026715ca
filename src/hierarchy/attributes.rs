//! Attribute schema operations.
//!
//! Attribute names are shared by position across every entity in the
//! hierarchy; values are per entity. Count changes and renames rewrite every
//! entity at once. Value edits touch one entity and are saved lazily.

use std::time::Instant;

use chrono::Utc;
use uuid::Uuid;

use super::Hierarchy;
use crate::error::{Error, Result};
use crate::models::*;

impl Hierarchy {
    /// Track `n` attributes, clamped to `[3, 8]`. Returns the count applied.
    ///
    /// Shrinking drops trailing attributes from every entity. Growing appends
    /// slots at the default value, named after the first entity that already
    /// has a name at that index, else `"Stat {index+1}"`.
    pub fn set_attribute_count(&mut self, n: usize) -> Result<usize> {
        let count = clamp_count(n);
        let current = self.attribute_count();
        if count == current {
            return Ok(count);
        }

        let before = self.checkpoint();
        let names: Vec<String> = (0..count)
            .map(|i| {
                self.attribute_names
                    .get(i)
                    .cloned()
                    .or_else(|| {
                        self.entities()
                            .find_map(|e| e.attributes.get(i).map(|a| a.name.clone()))
                    })
                    .unwrap_or_else(|| default_attribute_name(i))
            })
            .collect();

        let now = Utc::now();
        for entity in self.entities_mut() {
            entity.resize_attributes(count, &names);
            entity.updated_at = now;
        }
        self.attribute_names = names;

        let result = self.persist_all_entities();
        self.settle("set_attribute_count", before, result)?;
        self.clear_autosave();

        tracing::info!(from = current, to = count, requested = n, "Changed attribute count");
        Ok(count)
    }

    /// Rename the attribute at `index` on every entity, current and future.
    pub fn rename_attribute(&mut self, index: usize, new_name: &str) -> Result<()> {
        self.check_index(index)?;
        let name = new_name.trim();
        if name.is_empty() {
            return Err(Error::validation("attribute name must not be empty"));
        }

        let before = self.checkpoint();
        let now = Utc::now();
        for entity in self.entities_mut() {
            if entity.attributes.len() <= index {
                entity.set_value(index, DEFAULT_VALUE);
            }
            entity.attributes[index].name = name.to_string();
            entity.updated_at = now;
        }
        self.attribute_names[index] = name.to_string();

        let result = self.persist_all_entities();
        self.settle("rename_attribute", before, result)?;
        self.clear_autosave();

        tracing::info!(index, "Renamed attribute to {:?}", name);
        Ok(())
    }

    /// Set one entity's value at `index`, clamped to `[0, 10]`. Returns the
    /// stored value. The write is queued for autosave rather than sent now.
    pub fn set_attribute_value(&mut self, entity_id: Uuid, index: usize, value: f64) -> Result<f64> {
        self.check_index(index)?;
        let entity = self
            .entity_mut(entity_id)
            .ok_or_else(|| Error::entity_not_found(entity_id))?;

        let stored = entity.set_value(index, value);
        entity.updated_at = Utc::now();
        let snapshot = entity.clone();

        self.autosave.push(entity_id, snapshot, Instant::now());
        tracing::debug!(entity = %entity_id, index, value = stored, "Queued attribute edit");
        Ok(stored)
    }

    fn check_index(&self, index: usize) -> Result<()> {
        if index >= self.attribute_count() {
            return Err(Error::validation(format!(
                "attribute index {} out of range (tracking {})",
                index,
                self.attribute_count()
            )));
        }
        Ok(())
    }

    fn persist_all_entities(&self) -> anyhow::Result<()> {
        let batch: Vec<RankedEntity> = self.entities().cloned().collect();
        self.store.update_entities(&batch)
    }

    /// Whole-entity writes supersede any queued value edits.
    fn clear_autosave(&mut self) {
        self.autosave.take_all();
    }
}
