use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Relation, StoreSnapshot, TierStore};
use crate::models::*;

const GROUPS_FILE: &str = "groups.json";
const ENTITIES_FILE: &str = "entities.json";
const RELATIONS_FILE: &str = "relations.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct GroupRecord {
    owner_id: Uuid,
    id: Uuid,
    name: String,
    position: usize,
    created_at: chrono::DateTime<Utc>,
    updated_at: chrono::DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct EntityRecord {
    owner_id: Uuid,
    #[serde(flatten)]
    entity: RankedEntity,
}

/// Flattened local store.
///
/// Keeps three collections, each serialized to its own JSON file in `dir`:
/// groups, entities, and `(group, entity, position)` relations. Files are
/// written whole through a temporary file and rename. A missing file reads
/// as an empty collection.
pub struct LocalStore {
    dir: PathBuf,
    lock: Mutex<()>,
}

impl LocalStore {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create store directory {}", dir.display()))?;
        Ok(Self {
            dir,
            lock: Mutex::new(()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn load<T: DeserializeOwned>(&self, file: &str) -> Result<Vec<T>> {
        let path = self.dir.join(file);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let raw = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        if raw.trim().is_empty() {
            return Ok(Vec::new());
        }
        serde_json::from_str(&raw).with_context(|| format!("Failed to parse {}", path.display()))
    }

    fn save<T: Serialize>(&self, file: &str, items: &[T]) -> Result<()> {
        let path = self.dir.join(file);
        let tmp = self.dir.join(format!("{}.tmp", file));
        let raw = serde_json::to_string_pretty(items)?;
        std::fs::write(&tmp, raw).with_context(|| format!("Failed to write {}", tmp.display()))?;
        std::fs::rename(&tmp, &path)
            .with_context(|| format!("Failed to replace {}", path.display()))?;
        Ok(())
    }
}

impl TierStore for LocalStore {
    fn create_group(&self, owner_id: Uuid, input: CreateGroupInput) -> Result<Group> {
        let _guard = self.lock.lock().expect("store lock poisoned");
        let mut groups: Vec<GroupRecord> = self.load(GROUPS_FILE)?;
        let now = Utc::now();
        let record = GroupRecord {
            owner_id,
            id: Uuid::new_v4(),
            name: input.name,
            position: input.position,
            created_at: now,
            updated_at: now,
        };
        groups.push(record.clone());
        self.save(GROUPS_FILE, &groups)?;

        Ok(Group {
            id: record.id,
            name: record.name,
            position: record.position,
            items: Vec::new(),
            created_at: now,
            updated_at: now,
        })
    }

    fn create_entity(&self, owner_id: Uuid, input: CreateEntityInput) -> Result<RankedEntity> {
        let _guard = self.lock.lock().expect("store lock poisoned");
        let mut entities: Vec<EntityRecord> = self.load(ENTITIES_FILE)?;
        let now = Utc::now();
        let entity = RankedEntity {
            id: Uuid::new_v4(),
            name: input.name,
            attributes: input.attributes,
            position: input.position,
            created_at: now,
            updated_at: now,
        };
        entities.push(EntityRecord {
            owner_id,
            entity: entity.clone(),
        });
        self.save(ENTITIES_FILE, &entities)?;
        Ok(entity)
    }

    fn rename_group(&self, id: Uuid, name: &str) -> Result<()> {
        let _guard = self.lock.lock().expect("store lock poisoned");
        let mut groups: Vec<GroupRecord> = self.load(GROUPS_FILE)?;
        let group = groups
            .iter_mut()
            .find(|g| g.id == id)
            .ok_or_else(|| anyhow::anyhow!("Group {} not found", id))?;
        group.name = name.to_string();
        group.updated_at = Utc::now();
        self.save(GROUPS_FILE, &groups)
    }

    fn update_entity(&self, entity: &RankedEntity) -> Result<()> {
        let _guard = self.lock.lock().expect("store lock poisoned");
        let mut entities: Vec<EntityRecord> = self.load(ENTITIES_FILE)?;
        let record = entities
            .iter_mut()
            .find(|r| r.entity.id == entity.id)
            .ok_or_else(|| anyhow::anyhow!("Entity {} not found", entity.id))?;
        record.entity.name = entity.name.clone();
        record.entity.attributes = entity.attributes.clone();
        record.entity.updated_at = entity.updated_at;
        self.save(ENTITIES_FILE, &entities)
    }

    fn update_entities(&self, batch: &[RankedEntity]) -> Result<()> {
        let _guard = self.lock.lock().expect("store lock poisoned");
        let mut entities: Vec<EntityRecord> = self.load(ENTITIES_FILE)?;
        for entity in batch {
            let record = entities
                .iter_mut()
                .find(|r| r.entity.id == entity.id)
                .ok_or_else(|| anyhow::anyhow!("Entity {} not found", entity.id))?;
            record.entity.name = entity.name.clone();
            record.entity.attributes = entity.attributes.clone();
            record.entity.updated_at = entity.updated_at;
        }
        // One rewrite, so a missing entity leaves the file untouched.
        self.save(ENTITIES_FILE, &entities)
    }

    fn add_entity_to_group(
        &self,
        group_id: Uuid,
        entity_id: Uuid,
        position: usize,
    ) -> Result<()> {
        let _guard = self.lock.lock().expect("store lock poisoned");
        let mut relations: Vec<Relation> = self.load(RELATIONS_FILE)?;
        if relations.iter().any(|r| r.entity_id == entity_id) {
            anyhow::bail!("Entity {} already belongs to a group", entity_id);
        }
        relations.push(Relation {
            group_id,
            entity_id,
            position,
        });
        self.save(RELATIONS_FILE, &relations)?;

        let mut entities: Vec<EntityRecord> = self.load(ENTITIES_FILE)?;
        if let Some(record) = entities.iter_mut().find(|r| r.entity.id == entity_id) {
            record.entity.position = position;
        }
        self.save(ENTITIES_FILE, &entities)
    }

    fn remove_entity_from_group(&self, group_id: Uuid, entity_id: Uuid) -> Result<()> {
        let _guard = self.lock.lock().expect("store lock poisoned");
        let mut relations: Vec<Relation> = self.load(RELATIONS_FILE)?;
        relations.retain(|r| !(r.group_id == group_id && r.entity_id == entity_id));
        self.save(RELATIONS_FILE, &relations)
    }

    fn update_position(&self, kind: NodeKind, id: Uuid, position: usize) -> Result<()> {
        let _guard = self.lock.lock().expect("store lock poisoned");
        match kind {
            NodeKind::Group => {
                let mut groups: Vec<GroupRecord> = self.load(GROUPS_FILE)?;
                if let Some(group) = groups.iter_mut().find(|g| g.id == id) {
                    group.position = position;
                }
                self.save(GROUPS_FILE, &groups)
            }
            NodeKind::Entity => {
                let mut entities: Vec<EntityRecord> = self.load(ENTITIES_FILE)?;
                if let Some(record) = entities.iter_mut().find(|r| r.entity.id == id) {
                    record.entity.position = position;
                }
                self.save(ENTITIES_FILE, &entities)?;

                let mut relations: Vec<Relation> = self.load(RELATIONS_FILE)?;
                if let Some(relation) = relations.iter_mut().find(|r| r.entity_id == id) {
                    relation.position = position;
                    self.save(RELATIONS_FILE, &relations)?;
                }
                Ok(())
            }
        }
    }

    fn delete_group(&self, id: Uuid) -> Result<()> {
        let _guard = self.lock.lock().expect("store lock poisoned");
        let mut relations: Vec<Relation> = self.load(RELATIONS_FILE)?;
        relations.retain(|r| r.group_id != id);
        self.save(RELATIONS_FILE, &relations)?;

        let mut groups: Vec<GroupRecord> = self.load(GROUPS_FILE)?;
        groups.retain(|g| g.id != id);
        self.save(GROUPS_FILE, &groups)
    }

    fn delete_entity(&self, id: Uuid) -> Result<()> {
        let _guard = self.lock.lock().expect("store lock poisoned");
        let mut relations: Vec<Relation> = self.load(RELATIONS_FILE)?;
        relations.retain(|r| r.entity_id != id);
        self.save(RELATIONS_FILE, &relations)?;

        let mut entities: Vec<EntityRecord> = self.load(ENTITIES_FILE)?;
        entities.retain(|r| r.entity.id != id);
        self.save(ENTITIES_FILE, &entities)
    }

    fn fetch_all(&self, owner_id: Uuid) -> Result<StoreSnapshot> {
        let _guard = self.lock.lock().expect("store lock poisoned");
        let groups: Vec<Group> = self
            .load::<GroupRecord>(GROUPS_FILE)?
            .into_iter()
            .filter(|g| g.owner_id == owner_id)
            .map(|g| Group {
                id: g.id,
                name: g.name,
                position: g.position,
                items: Vec::new(),
                created_at: g.created_at,
                updated_at: g.updated_at,
            })
            .collect();
        let entities: Vec<RankedEntity> = self
            .load::<EntityRecord>(ENTITIES_FILE)?
            .into_iter()
            .filter(|r| r.owner_id == owner_id)
            .map(|r| r.entity)
            .collect();
        let relations: Vec<Relation> = self
            .load::<Relation>(RELATIONS_FILE)?
            .into_iter()
            .filter(|r| groups.iter().any(|g| g.id == r.group_id))
            .collect();

        Ok(StoreSnapshot {
            groups,
            entities,
            relations,
        })
    }
}
