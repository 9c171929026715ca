use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::attribute::{clamp_value, Attribute, DEFAULT_VALUE};

/// A rankable item with one value per tracked attribute.
///
/// The attribute list is kept at the hierarchy's global attribute count;
/// [`crate::hierarchy::Hierarchy`] is responsible for holding every entity to
/// the same length.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedEntity {
    pub id: Uuid,
    pub name: String,
    pub attributes: Vec<Attribute>,
    /// Sort key within the parent sequence (root or a group).
    pub position: usize,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RankedEntity {
    /// Value at `index`, or `None` when the slot does not exist.
    pub fn value(&self, index: usize) -> Option<f64> {
        self.attributes.get(index).map(|a| a.value)
    }

    /// Set the value at `index`, padding with placeholder slots when the
    /// entity is too short. Returns the stored (clamped) value.
    pub fn set_value(&mut self, index: usize, value: f64) -> f64 {
        while self.attributes.len() <= index {
            let slot = self.attributes.len();
            self.attributes.push(Attribute::placeholder(slot));
        }
        let clamped = clamp_value(value);
        self.attributes[index].value = clamped;
        clamped
    }

    /// Grow or shrink the attribute list to `count`, naming new slots from
    /// `names` (falling back to the placeholder name) with the default value.
    pub fn resize_attributes(&mut self, count: usize, names: &[String]) {
        if self.attributes.len() > count {
            self.attributes.truncate(count);
            return;
        }
        while self.attributes.len() < count {
            let slot = self.attributes.len();
            let attr = match names.get(slot) {
                Some(name) => Attribute::new(name.clone(), DEFAULT_VALUE),
                None => Attribute::placeholder(slot),
            };
            self.attributes.push(attr);
        }
    }
}

/// Input for creating a new ranked entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateEntityInput {
    pub name: String,
    pub attributes: Vec<Attribute>,
    pub position: usize,
}
