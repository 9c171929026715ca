//! Persistence adapters for the hierarchy.
//!
//! [`TierStore`] is the boundary between the in-memory hierarchy and durable
//! storage. Two implementations ship:
//!
//! - [`SqliteStore`]: relational layout with a many-to-many join table
//!   between groups and tier lists.
//! - [`LocalStore`]: flattened layout of three independently serialized JSON
//!   collections (groups, entities, relations) in one directory.
//!
//! Stores assign ids and timestamps on create. They never enforce the
//! hierarchy's ordering rules; positions are written exactly as given.

mod local;
mod sqlite;

pub use local::LocalStore;
pub use sqlite::SqliteStore;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::*;

/// Membership of an entity in a group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relation {
    pub group_id: Uuid,
    pub entity_id: Uuid,
    pub position: usize,
}

/// Everything an owner has stored, flat and unordered.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreSnapshot {
    pub groups: Vec<Group>,
    pub entities: Vec<RankedEntity>,
    pub relations: Vec<Relation>,
}

pub trait TierStore: Send + Sync {
    fn create_group(&self, owner_id: Uuid, input: CreateGroupInput) -> Result<Group>;

    fn create_entity(&self, owner_id: Uuid, input: CreateEntityInput) -> Result<RankedEntity>;

    fn rename_group(&self, id: Uuid, name: &str) -> Result<()>;

    /// Persist an entity's name and attribute list.
    fn update_entity(&self, entity: &RankedEntity) -> Result<()>;

    /// Persist several entities at once. Either every entity is written or,
    /// on error, none is.
    fn update_entities(&self, entities: &[RankedEntity]) -> Result<()>;

    fn add_entity_to_group(&self, group_id: Uuid, entity_id: Uuid, position: usize)
        -> Result<()>;

    fn remove_entity_from_group(&self, group_id: Uuid, entity_id: Uuid) -> Result<()>;

    /// Write a new sort key. For entities this is the key within whatever
    /// sequence currently holds them.
    fn update_position(&self, kind: NodeKind, id: Uuid, position: usize) -> Result<()>;

    /// Delete a group and its membership rows. Member entities are untouched.
    fn delete_group(&self, id: Uuid) -> Result<()>;

    /// Delete an entity and any membership row referencing it.
    fn delete_entity(&self, id: Uuid) -> Result<()>;

    fn fetch_all(&self, owner_id: Uuid) -> Result<StoreSnapshot>;
}
