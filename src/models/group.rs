use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::entity::RankedEntity;

/// A named container of ranked entities.
///
/// An entity belongs to at most one group. Stores return groups with an
/// empty `items` list; membership comes back separately as
/// [`crate::store::Relation`] rows and is joined in by the hierarchy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Group {
    pub id: Uuid,
    pub name: String,
    /// Sort key within the root sequence.
    pub position: usize,
    #[serde(default)]
    pub items: Vec<RankedEntity>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for creating a new group.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateGroupInput {
    pub name: String,
    pub position: usize,
}
