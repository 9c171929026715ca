use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::entity::RankedEntity;
use super::group::Group;

/// A member of the root sequence.
///
/// Serialized with an explicit `kind` discriminant:
/// `{"kind": "group", ...}` or `{"kind": "entity", ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Node {
    Group(Group),
    Entity(RankedEntity),
}

impl Node {
    pub fn id(&self) -> Uuid {
        match self {
            Self::Group(g) => g.id,
            Self::Entity(e) => e.id,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Group(g) => &g.name,
            Self::Entity(e) => &e.name,
        }
    }

    pub fn position(&self) -> usize {
        match self {
            Self::Group(g) => g.position,
            Self::Entity(e) => e.position,
        }
    }

    pub fn set_position(&mut self, position: usize) {
        match self {
            Self::Group(g) => g.position = position,
            Self::Entity(e) => e.position = position,
        }
    }

    pub fn kind(&self) -> NodeKind {
        match self {
            Self::Group(_) => NodeKind::Group,
            Self::Entity(_) => NodeKind::Entity,
        }
    }
}

/// Discriminant for [`Node`], used by storage calls that address either kind.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Group,
    Entity,
}

impl NodeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Group => "group",
            Self::Entity => "entity",
        }
    }
}

impl std::fmt::Display for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
