//! The in-memory hierarchy of groups and ranked entities.
//!
//! [`Hierarchy`] owns the tree for one owner and keeps it in step with an
//! injected [`TierStore`]. Mutations apply to the tree first, then go to the
//! store; if the store call fails the tree is restored to how it was before
//! the operation and [`Error::Transport`] is returned. Creations are the
//! exception: the store assigns ids, so nothing is inserted locally until it
//! answers.
//!
//! Attribute-value edits are deferred through an [`autosave`](crate::autosave)
//! queue and written by [`Hierarchy::flush_autosave`].

mod attributes;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::autosave::Debouncer;
use crate::error::{Error, Result};
use crate::models::*;
use crate::ranking::{self, ScoredEntity, SortWeight};
use crate::store::{StoreSnapshot, TierStore};

/// Default quiet period before a deferred attribute edit is written.
pub const DEFAULT_AUTOSAVE_WINDOW: Duration = Duration::from_millis(500);

/// What happens to a group's members when the group is deleted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeleteGroupMode {
    /// Members move back to the end of the root sequence, in group order.
    #[default]
    Detach,
    /// Members are deleted along with the group.
    Cascade,
}

/// Which entities a ranking covers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "group_id", rename_all = "snake_case")]
pub enum RankScope {
    /// Loose entities at the root.
    #[default]
    Root,
    /// One group's items.
    Group(Uuid),
    /// Every entity, flattened in hierarchy order.
    All,
}

/// Serializable view of the whole hierarchy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HierarchyView {
    pub owner_id: Uuid,
    pub attribute_count: usize,
    pub attribute_names: Vec<String>,
    pub root: Vec<Node>,
}

/// Tree state captured before a mutation so a failed store call can undo it.
struct Checkpoint {
    root: Vec<Node>,
    attribute_names: Vec<String>,
}

pub struct Hierarchy {
    store: Arc<dyn TierStore>,
    owner_id: Uuid,
    /// Shared attribute names; its length is the tracked attribute count.
    attribute_names: Vec<String>,
    root: Vec<Node>,
    autosave: Debouncer<Uuid, RankedEntity>,
}

impl Hierarchy {
    /// An empty hierarchy tracking `attribute_count` attributes (clamped).
    pub fn new(store: Arc<dyn TierStore>, owner_id: Uuid, attribute_count: usize) -> Self {
        let count = clamp_count(attribute_count);
        Self {
            store,
            owner_id,
            attribute_names: (0..count).map(default_attribute_name).collect(),
            root: Vec::new(),
            autosave: Debouncer::new(DEFAULT_AUTOSAVE_WINDOW),
        }
    }

    /// Build the hierarchy from everything `store` holds for `owner_id`.
    ///
    /// Siblings are ordered by their stored position and renumbered densely.
    /// The attribute count is the longest stored attribute list (clamped), or
    /// `default_count` when there are no entities; every entity is then padded
    /// or truncated to it.
    pub fn load(store: Arc<dyn TierStore>, owner_id: Uuid, default_count: usize) -> Result<Self> {
        let snapshot = store.fetch_all(owner_id).map_err(|e| {
            tracing::error!(owner = %owner_id, "Failed to load hierarchy: {:#}", e);
            Error::Transport(e)
        })?;

        let mut hierarchy = Self::new(store, owner_id, default_count);
        hierarchy.compose(snapshot, default_count);
        tracing::info!(
            owner = %owner_id,
            nodes = hierarchy.root.len(),
            attributes = hierarchy.attribute_count(),
            "Loaded hierarchy"
        );
        Ok(hierarchy)
    }

    pub fn with_autosave_window(mut self, window: Duration) -> Self {
        self.autosave = Debouncer::new(window);
        self
    }

    fn compose(&mut self, snapshot: StoreSnapshot, default_count: usize) {
        let StoreSnapshot {
            groups,
            entities,
            mut relations,
        } = snapshot;

        let mut groups: Vec<Group> = groups;
        let mut loose: Vec<Option<RankedEntity>> = entities.into_iter().map(Some).collect();

        relations.sort_by_key(|r| r.position);
        for relation in relations {
            let Some(group) = groups.iter_mut().find(|g| g.id == relation.group_id) else {
                continue;
            };
            let Some(slot) = loose
                .iter()
                .position(|e| e.as_ref().is_some_and(|e| e.id == relation.entity_id))
            else {
                continue;
            };
            if let Some(entity) = loose[slot].take() {
                group.items.push(entity);
            }
        }

        let mut root: Vec<Node> = groups.into_iter().map(Node::Group).collect();
        root.extend(loose.into_iter().flatten().map(Node::Entity));
        root.sort_by_key(|n| (n.position(), created_at(n)));

        let longest = root
            .iter()
            .flat_map(node_entities)
            .map(|e| e.attributes.len())
            .max();
        let count = clamp_count(longest.unwrap_or(default_count));

        let names: Vec<String> = (0..count)
            .map(|i| {
                root.iter()
                    .flat_map(node_entities)
                    .find_map(|e| e.attributes.get(i).map(|a| a.name.clone()))
                    .unwrap_or_else(|| default_attribute_name(i))
            })
            .collect();

        for node in root.iter_mut() {
            match node {
                Node::Group(group) => {
                    for entity in group.items.iter_mut() {
                        conform_entity(entity, &names);
                    }
                }
                Node::Entity(entity) => conform_entity(entity, &names),
            }
        }

        self.root = root;
        self.attribute_names = names;
        renumber(&mut self.root);
        for node in self.root.iter_mut() {
            if let Node::Group(group) = node {
                renumber_items(&mut group.items);
            }
        }
    }

    // ============================================================
    // Accessors
    // ============================================================

    pub fn owner_id(&self) -> Uuid {
        self.owner_id
    }

    pub fn root(&self) -> &[Node] {
        &self.root
    }

    pub fn attribute_count(&self) -> usize {
        self.attribute_names.len()
    }

    pub fn attribute_names(&self) -> &[String] {
        &self.attribute_names
    }

    pub fn group(&self, id: Uuid) -> Option<&Group> {
        self.root.iter().find_map(|n| match n {
            Node::Group(g) if g.id == id => Some(g),
            _ => None,
        })
    }

    pub fn entity(&self, id: Uuid) -> Option<&RankedEntity> {
        self.entities().find(|e| e.id == id)
    }

    /// Every entity, root and grouped, in hierarchy order.
    pub fn entities(&self) -> impl Iterator<Item = &RankedEntity> {
        self.root.iter().flat_map(node_entities)
    }

    /// Entities sitting directly at the root, in order.
    pub fn root_entities(&self) -> impl Iterator<Item = &RankedEntity> {
        self.root.iter().filter_map(|n| match n {
            Node::Entity(e) => Some(e),
            Node::Group(_) => None,
        })
    }

    /// The group holding `entity_id`: `Some(None)` at the root,
    /// `Some(Some(group_id))` inside a group, `None` if unknown.
    pub fn parent_of(&self, entity_id: Uuid) -> Option<Option<Uuid>> {
        self.locate(entity_id).map(|(parent, _)| parent)
    }

    pub fn view(&self) -> HierarchyView {
        HierarchyView {
            owner_id: self.owner_id,
            attribute_count: self.attribute_count(),
            attribute_names: self.attribute_names.clone(),
            root: self.root.clone(),
        }
    }

    /// Rank the entities in `scope` by `weights`. Never persisted.
    pub fn rank(&self, scope: RankScope, weights: &[SortWeight]) -> Result<Vec<ScoredEntity>> {
        let ranked = match scope {
            RankScope::Root => ranking::rank(self.root_entities(), weights),
            RankScope::All => ranking::rank(self.entities(), weights),
            RankScope::Group(id) => {
                let group = self.group(id).ok_or_else(|| Error::group_not_found(id))?;
                ranking::rank(&group.items, weights)
            }
        };
        Ok(ranked)
    }

    // ============================================================
    // Groups
    // ============================================================

    pub fn create_group(&mut self, name: &str) -> Result<Group> {
        let name = validate_name(name)?;
        let input = CreateGroupInput {
            name,
            position: self.root.len(),
        };
        let group = self
            .store
            .create_group(self.owner_id, input)
            .map_err(|e| transport("create_group", e))?;

        tracing::info!(group = %group.id, position = group.position, "Created group {:?}", group.name);
        self.root.push(Node::Group(group.clone()));
        Ok(group)
    }

    pub fn rename_group(&mut self, id: Uuid, name: &str) -> Result<Group> {
        let name = validate_name(name)?;
        let before = self.checkpoint();
        let group = self.group_mut(id).ok_or_else(|| Error::group_not_found(id))?;
        group.name = name.clone();
        group.updated_at = Utc::now();

        let result = self.store.rename_group(id, &name);
        self.settle("rename_group", before, result)?;
        self.group(id).cloned().ok_or_else(|| Error::group_not_found(id))
    }

    pub fn delete_group(&mut self, id: Uuid, mode: DeleteGroupMode) -> Result<()> {
        let idx = self.group_index(id).ok_or_else(|| Error::group_not_found(id))?;
        let before = self.checkpoint();

        let Node::Group(group) = self.root.remove(idx) else {
            return Err(Error::group_not_found(id));
        };
        let members: Vec<Uuid> = group.items.iter().map(|e| e.id).collect();
        if mode == DeleteGroupMode::Detach {
            self.root.extend(group.items.into_iter().map(Node::Entity));
        }
        let mut moved = renumber(&mut self.root);
        if mode == DeleteGroupMode::Detach {
            // Stored keys of former members are group-relative.
            for node in self.root.iter().filter(|n| members.contains(&n.id())) {
                if !moved.iter().any(|(_, id, _)| *id == node.id()) {
                    moved.push((node.kind(), node.id(), node.position()));
                }
            }
        }

        let result = (|| -> anyhow::Result<()> {
            if mode == DeleteGroupMode::Cascade {
                for member in &members {
                    self.store.delete_entity(*member)?;
                }
            }
            self.store.delete_group(id)?;
            self.persist_positions(&moved)
        })();
        self.settle("delete_group", before, result)?;

        if mode == DeleteGroupMode::Cascade {
            for member in &members {
                self.autosave.cancel(member);
            }
        }
        tracing::info!(group = %id, members = members.len(), ?mode, "Deleted group");
        Ok(())
    }

    // ============================================================
    // Ranked entities
    // ============================================================

    /// Create an entity with the current attribute set at default values,
    /// appended to `target_group` or to the root.
    pub fn create_ranked_entity(
        &mut self,
        name: &str,
        target_group: Option<Uuid>,
    ) -> Result<RankedEntity> {
        let name = validate_name(name)?;
        let position = match target_group {
            Some(gid) => self
                .group(gid)
                .map(|g| g.items.len())
                .ok_or_else(|| Error::group_not_found(gid))?,
            None => self.root.len(),
        };

        let input = CreateEntityInput {
            name,
            attributes: self.default_attributes(),
            position,
        };
        let entity = self
            .store
            .create_entity(self.owner_id, input)
            .map_err(|e| transport("create_ranked_entity", e))?;

        if let Some(gid) = target_group {
            if let Err(e) = self.store.add_entity_to_group(gid, entity.id, position) {
                if let Err(cleanup) = self.store.delete_entity(entity.id) {
                    tracing::warn!(entity = %entity.id, "Failed to remove orphaned entity: {:#}", cleanup);
                }
                return Err(transport("create_ranked_entity", e));
            }
        }

        match target_group.and_then(|gid| self.group_mut(gid)) {
            Some(group) => group.items.push(entity.clone()),
            None => self.root.push(Node::Entity(entity.clone())),
        }
        tracing::info!(entity = %entity.id, group = ?target_group, position, "Created entity {:?}", entity.name);
        Ok(entity)
    }

    pub fn rename_entity(&mut self, id: Uuid, name: &str) -> Result<RankedEntity> {
        let name = validate_name(name)?;
        let before = self.checkpoint();
        let entity = self.entity_mut(id).ok_or_else(|| Error::entity_not_found(id))?;
        entity.name = name;
        entity.updated_at = Utc::now();
        let entity = entity.clone();

        let result = self.store.update_entity(&entity);
        self.settle("rename_entity", before, result)?;
        self.autosave.cancel(&id);
        Ok(entity)
    }

    pub fn delete_ranked_entity(&mut self, id: Uuid) -> Result<()> {
        let (parent, idx) = self.locate(id).ok_or_else(|| Error::entity_not_found(id))?;
        let before = self.checkpoint();

        self.take_from(parent, idx)
            .ok_or_else(|| Error::entity_not_found(id))?;
        let moved = renumber_container(&mut self.root, parent);

        let result = (|| -> anyhow::Result<()> {
            self.store.delete_entity(id)?;
            self.persist_positions(&moved)
        })();
        self.settle("delete_ranked_entity", before, result)?;
        self.autosave.cancel(&id);
        tracing::info!(entity = %id, group = ?parent, "Deleted entity");
        Ok(())
    }

    /// Move an entity to the end of `target_group`, or of the root when
    /// `None`. Moving into the container it already occupies is a no-op.
    pub fn move_entity_to_group(
        &mut self,
        entity_id: Uuid,
        target_group: Option<Uuid>,
    ) -> Result<RankedEntity> {
        let (source, idx) = self
            .locate(entity_id)
            .ok_or_else(|| Error::entity_not_found(entity_id))?;
        if let Some(gid) = target_group {
            if self.group_index(gid).is_none() {
                return Err(Error::group_not_found(gid));
            }
        }
        if source == target_group {
            tracing::debug!(entity = %entity_id, "Entity already in target container");
            return self
                .entity(entity_id)
                .cloned()
                .ok_or_else(|| Error::entity_not_found(entity_id));
        }

        let before = self.checkpoint();
        let mut entity = self
            .take_from(source, idx)
            .ok_or_else(|| Error::entity_not_found(entity_id))?;
        let moved = renumber_container(&mut self.root, source);
        let position = self.append_to(target_group, &mut entity);

        let result = (|| -> anyhow::Result<()> {
            if let Some(src) = source {
                self.store.remove_entity_from_group(src, entity_id)?;
            }
            match target_group {
                Some(gid) => self.store.add_entity_to_group(gid, entity_id, position)?,
                None => self
                    .store
                    .update_position(NodeKind::Entity, entity_id, position)?,
            }
            self.persist_positions(&moved)
        })();
        self.settle("move_entity_to_group", before, result)?;

        tracing::debug!(entity = %entity_id, from = ?source, to = ?target_group, position, "Moved entity");
        Ok(entity)
    }

    // ============================================================
    // Ordering
    // ============================================================

    /// Reassign positions in a container (root when `None`) so that member
    /// `ordered_ids[i]` gets position `i`.
    ///
    /// `ordered_ids` must be a permutation of the container's current members;
    /// otherwise nothing changes and a validation error is returned.
    pub fn reorder(&mut self, container: Option<Uuid>, ordered_ids: &[Uuid]) -> Result<()> {
        let current: Vec<Uuid> = match container {
            None => self.root.iter().map(Node::id).collect(),
            Some(gid) => self
                .group(gid)
                .ok_or_else(|| Error::group_not_found(gid))?
                .items
                .iter()
                .map(|e| e.id)
                .collect(),
        };
        if let Err(e) = check_permutation(&current, ordered_ids) {
            tracing::warn!(container = ?container, "Rejected reorder: {}", e);
            return Err(e);
        }

        let before = self.checkpoint();
        let updates: Vec<(NodeKind, Uuid, usize)> = match container {
            None => {
                let mut old = std::mem::take(&mut self.root);
                for id in ordered_ids {
                    if let Some(i) = old.iter().position(|n| n.id() == *id) {
                        self.root.push(old.swap_remove(i));
                    }
                }
                renumber(&mut self.root);
                self.root
                    .iter()
                    .map(|n| (n.kind(), n.id(), n.position()))
                    .collect()
            }
            Some(gid) => {
                let group = self.group_mut(gid).ok_or_else(|| Error::group_not_found(gid))?;
                let mut old = std::mem::take(&mut group.items);
                for id in ordered_ids {
                    if let Some(i) = old.iter().position(|e| e.id == *id) {
                        group.items.push(old.swap_remove(i));
                    }
                }
                renumber_items(&mut group.items);
                group
                    .items
                    .iter()
                    .map(|e| (NodeKind::Entity, e.id, e.position))
                    .collect()
            }
        };

        let result = self.persist_positions(&updates);
        self.settle("reorder", before, result)?;
        tracing::debug!(container = ?container, members = ordered_ids.len(), "Reordered");
        Ok(())
    }

    // ============================================================
    // Autosave
    // ============================================================

    /// Number of entities with unsaved attribute edits.
    pub fn pending_saves(&self) -> usize {
        self.autosave.len()
    }

    /// Write every deferred edit that has been quiet for the autosave window.
    /// Returns how many entities were written.
    pub fn flush_autosave(&mut self, now: Instant) -> Result<usize> {
        let due = self.autosave.take_due(now);
        self.write_deferred(due, now)
    }

    /// Write every deferred edit immediately.
    pub fn flush_all(&mut self) -> Result<usize> {
        let all = self.autosave.take_all();
        self.write_deferred(all, Instant::now())
    }

    fn write_deferred(&mut self, entries: Vec<(Uuid, RankedEntity)>, now: Instant) -> Result<usize> {
        let mut written = 0;
        let mut first_error = None;
        for (id, entity) in entries {
            match self.store.update_entity(&entity) {
                Ok(()) => written += 1,
                Err(e) => {
                    tracing::error!(entity = %id, "Autosave failed, will retry: {:#}", e);
                    self.autosave.push(id, entity, now);
                    first_error.get_or_insert(e);
                }
            }
        }
        if written > 0 {
            tracing::debug!(written, "Flushed autosave");
        }
        match first_error {
            Some(e) => Err(Error::Transport(e)),
            None => Ok(written),
        }
    }

    // ============================================================
    // Internals
    // ============================================================

    fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            root: self.root.clone(),
            attribute_names: self.attribute_names.clone(),
        }
    }

    /// Keep the mutation if the store accepted it, otherwise roll back.
    fn settle<T>(
        &mut self,
        operation: &str,
        before: Checkpoint,
        result: anyhow::Result<T>,
    ) -> Result<T> {
        match result {
            Ok(value) => Ok(value),
            Err(e) => {
                self.root = before.root;
                self.attribute_names = before.attribute_names;
                Err(transport(operation, e))
            }
        }
    }

    fn persist_positions(&self, updates: &[(NodeKind, Uuid, usize)]) -> anyhow::Result<()> {
        for (kind, id, position) in updates {
            self.store.update_position(*kind, *id, *position)?;
        }
        Ok(())
    }

    fn default_attributes(&self) -> Vec<Attribute> {
        self.attribute_names
            .iter()
            .map(|name| Attribute::new(name.clone(), DEFAULT_VALUE))
            .collect()
    }

    fn group_index(&self, id: Uuid) -> Option<usize> {
        self.root
            .iter()
            .position(|n| matches!(n, Node::Group(g) if g.id == id))
    }

    fn group_mut(&mut self, id: Uuid) -> Option<&mut Group> {
        self.root.iter_mut().find_map(|n| match n {
            Node::Group(g) if g.id == id => Some(g),
            _ => None,
        })
    }

    /// Parent group (None for root) and index within that container.
    fn locate(&self, entity_id: Uuid) -> Option<(Option<Uuid>, usize)> {
        for (i, node) in self.root.iter().enumerate() {
            match node {
                Node::Entity(e) if e.id == entity_id => return Some((None, i)),
                Node::Entity(_) => {}
                Node::Group(g) => {
                    if let Some(j) = g.items.iter().position(|e| e.id == entity_id) {
                        return Some((Some(g.id), j));
                    }
                }
            }
        }
        None
    }

    fn entity_mut(&mut self, id: Uuid) -> Option<&mut RankedEntity> {
        self.root.iter_mut().find_map(|node| match node {
            Node::Entity(e) if e.id == id => Some(e),
            Node::Entity(_) => None,
            Node::Group(g) => g.items.iter_mut().find(|e| e.id == id),
        })
    }

    fn entities_mut(&mut self) -> impl Iterator<Item = &mut RankedEntity> {
        self.root.iter_mut().flat_map(|node| match node {
            Node::Entity(e) => std::slice::from_mut(e).iter_mut(),
            Node::Group(g) => g.items.iter_mut(),
        })
    }

    /// Detach the entity at `idx` of `parent` without renumbering.
    fn take_from(&mut self, parent: Option<Uuid>, idx: usize) -> Option<RankedEntity> {
        match parent {
            None => {
                if !matches!(self.root.get(idx), Some(Node::Entity(_))) {
                    return None;
                }
                match self.root.remove(idx) {
                    Node::Entity(e) => Some(e),
                    Node::Group(_) => None,
                }
            }
            Some(gid) => self
                .group_mut(gid)
                .filter(|g| idx < g.items.len())
                .map(|g| g.items.remove(idx)),
        }
    }

    /// Append to the end of `target` (root when `None`), setting the
    /// entity's position. Returns that position.
    fn append_to(&mut self, target: Option<Uuid>, entity: &mut RankedEntity) -> usize {
        match target.and_then(|gid| self.group_mut(gid)) {
            Some(group) => {
                entity.position = group.items.len();
                group.items.push(entity.clone());
            }
            None => {
                entity.position = self.root.len();
                self.root.push(Node::Entity(entity.clone()));
            }
        }
        entity.position
    }
}

fn node_entities(node: &Node) -> impl Iterator<Item = &RankedEntity> {
    match node {
        Node::Entity(e) => std::slice::from_ref(e).iter(),
        Node::Group(g) => g.items.iter(),
    }
}

fn created_at(node: &Node) -> chrono::DateTime<Utc> {
    match node {
        Node::Group(g) => g.created_at,
        Node::Entity(e) => e.created_at,
    }
}

/// Resize to the shared name list and adopt its names.
fn conform_entity(entity: &mut RankedEntity, names: &[String]) {
    entity.resize_attributes(names.len(), names);
    for (attr, name) in entity.attributes.iter_mut().zip(names) {
        if attr.name != *name {
            attr.name = name.clone();
        }
        attr.value = clamp_value(attr.value);
    }
}

/// Dense renumbering of the root. Returns the nodes whose position changed.
fn renumber(root: &mut [Node]) -> Vec<(NodeKind, Uuid, usize)> {
    let mut changed = Vec::new();
    for (i, node) in root.iter_mut().enumerate() {
        if node.position() != i {
            node.set_position(i);
            changed.push((node.kind(), node.id(), i));
        }
    }
    changed
}

fn renumber_items(items: &mut [RankedEntity]) -> Vec<(NodeKind, Uuid, usize)> {
    let mut changed = Vec::new();
    for (i, entity) in items.iter_mut().enumerate() {
        if entity.position != i {
            entity.position = i;
            changed.push((NodeKind::Entity, entity.id, i));
        }
    }
    changed
}

fn renumber_container(root: &mut [Node], container: Option<Uuid>) -> Vec<(NodeKind, Uuid, usize)> {
    match container {
        None => renumber(root),
        Some(gid) => root
            .iter_mut()
            .find_map(|n| match n {
                Node::Group(g) if g.id == gid => Some(renumber_items(&mut g.items)),
                _ => None,
            })
            .unwrap_or_default(),
    }
}

fn check_permutation(current: &[Uuid], ordered: &[Uuid]) -> Result<()> {
    if current.len() != ordered.len() {
        return Err(Error::validation(format!(
            "expected {} ids, got {}",
            current.len(),
            ordered.len()
        )));
    }
    let mut seen = HashSet::with_capacity(ordered.len());
    for id in ordered {
        if !seen.insert(*id) {
            return Err(Error::validation(format!("duplicate id {}", id)));
        }
        if !current.contains(id) {
            return Err(Error::validation(format!("{} is not a member of this container", id)));
        }
    }
    Ok(())
}

fn validate_name(name: &str) -> Result<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(Error::validation("name must not be empty"));
    }
    Ok(trimmed.to_string())
}

fn transport(operation: &str, e: anyhow::Error) -> Error {
    tracing::error!(operation, "Storage call failed: {:#}", e);
    Error::Transport(e)
}
