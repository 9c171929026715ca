use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use polytier::hierarchy::{DeleteGroupMode, Hierarchy, RankScope};
use polytier::models::*;
use polytier::ranking::SortWeight;
use polytier::store::{SqliteStore, StoreSnapshot, TierStore};
use polytier::Error;
use speculate2::speculate;
use uuid::Uuid;

/// In-memory SQLite store that can be told to fail every call.
struct FlakyStore {
    inner: SqliteStore,
    failing: AtomicBool,
}

impl FlakyStore {
    fn new() -> Self {
        let inner = SqliteStore::open_memory().expect("Failed to create in-memory database");
        inner.migrate().expect("Failed to run migrations");
        Self {
            inner,
            failing: AtomicBool::new(false),
        }
    }

    fn fail(&self, on: bool) {
        self.failing.store(on, Ordering::SeqCst);
    }

    fn check(&self) -> anyhow::Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            anyhow::bail!("connection reset");
        }
        Ok(())
    }
}

impl TierStore for FlakyStore {
    fn create_group(&self, owner_id: Uuid, input: CreateGroupInput) -> anyhow::Result<Group> {
        self.check()?;
        self.inner.create_group(owner_id, input)
    }

    fn create_entity(
        &self,
        owner_id: Uuid,
        input: CreateEntityInput,
    ) -> anyhow::Result<RankedEntity> {
        self.check()?;
        self.inner.create_entity(owner_id, input)
    }

    fn rename_group(&self, id: Uuid, name: &str) -> anyhow::Result<()> {
        self.check()?;
        self.inner.rename_group(id, name)
    }

    fn update_entity(&self, entity: &RankedEntity) -> anyhow::Result<()> {
        self.check()?;
        self.inner.update_entity(entity)
    }

    fn update_entities(&self, entities: &[RankedEntity]) -> anyhow::Result<()> {
        self.check()?;
        self.inner.update_entities(entities)
    }

    fn add_entity_to_group(
        &self,
        group_id: Uuid,
        entity_id: Uuid,
        position: usize,
    ) -> anyhow::Result<()> {
        self.check()?;
        self.inner.add_entity_to_group(group_id, entity_id, position)
    }

    fn remove_entity_from_group(&self, group_id: Uuid, entity_id: Uuid) -> anyhow::Result<()> {
        self.check()?;
        self.inner.remove_entity_from_group(group_id, entity_id)
    }

    fn update_position(&self, kind: NodeKind, id: Uuid, position: usize) -> anyhow::Result<()> {
        self.check()?;
        self.inner.update_position(kind, id, position)
    }

    fn delete_group(&self, id: Uuid) -> anyhow::Result<()> {
        self.check()?;
        self.inner.delete_group(id)
    }

    fn delete_entity(&self, id: Uuid) -> anyhow::Result<()> {
        self.check()?;
        self.inner.delete_entity(id)
    }

    fn fetch_all(&self, owner_id: Uuid) -> anyhow::Result<StoreSnapshot> {
        self.check()?;
        self.inner.fetch_all(owner_id)
    }
}

fn reload(store: &Arc<FlakyStore>, owner: Uuid) -> Hierarchy {
    Hierarchy::load(store.clone(), owner, 5).expect("Failed to reload hierarchy")
}

fn root_ids(hierarchy: &Hierarchy) -> Vec<Uuid> {
    hierarchy.root().iter().map(Node::id).collect()
}

fn root_positions(hierarchy: &Hierarchy) -> Vec<usize> {
    hierarchy.root().iter().map(Node::position).collect()
}

fn item_ids(hierarchy: &Hierarchy, group_id: Uuid) -> Vec<Uuid> {
    hierarchy
        .group(group_id)
        .expect("group missing")
        .items
        .iter()
        .map(|e| e.id)
        .collect()
}

fn item_positions(hierarchy: &Hierarchy, group_id: Uuid) -> Vec<usize> {
    hierarchy
        .group(group_id)
        .expect("group missing")
        .items
        .iter()
        .map(|e| e.position)
        .collect()
}

fn values(entity: &RankedEntity) -> Vec<f64> {
    entity.attributes.iter().map(|a| a.value).collect()
}

speculate! {
    before {
        let store = Arc::new(FlakyStore::new());
        let owner = Uuid::new_v4();
        let mut hierarchy = Hierarchy::new(store.clone(), owner, 5);
    }

    describe "attribute count" {
        it "starts with default-named attributes" {
            assert_eq!(hierarchy.attribute_count(), 5);
            assert_eq!(hierarchy.attribute_names()[0], "Stat 1");
            assert_eq!(hierarchy.attribute_names()[4], "Stat 5");
        }

        it "clamps requested counts into 3..=8" {
            assert_eq!(hierarchy.set_attribute_count(12).unwrap(), 8);
            assert_eq!(hierarchy.attribute_count(), 8);

            assert_eq!(hierarchy.set_attribute_count(1).unwrap(), 3);
            assert_eq!(hierarchy.attribute_count(), 3);

            assert_eq!(Hierarchy::new(store.clone(), owner, 0).attribute_count(), 3);
        }

        it "truncates every entity when shrinking" {
            let group = hierarchy.create_group("Mages").unwrap();
            let loose = hierarchy.create_ranked_entity("Arthur", None).unwrap();
            let grouped = hierarchy.create_ranked_entity("Merlin", Some(group.id)).unwrap();
            hierarchy.set_attribute_value(loose.id, 1, 8.0).unwrap();
            hierarchy.set_attribute_value(grouped.id, 4, 9.0).unwrap();

            hierarchy.set_attribute_count(3).unwrap();

            for entity in hierarchy.entities() {
                assert_eq!(entity.attributes.len(), 3);
            }
            assert_eq!(values(hierarchy.entity(loose.id).unwrap()), vec![5.0, 8.0, 5.0]);
            assert_eq!(hierarchy.pending_saves(), 0);

            let reloaded = reload(&store, owner);
            assert_eq!(reloaded.attribute_count(), 3);
            assert_eq!(values(reloaded.entity(loose.id).unwrap()), vec![5.0, 8.0, 5.0]);
        }

        it "appends default-valued slots when growing" {
            let entity = hierarchy.create_ranked_entity("Arthur", None).unwrap();

            hierarchy.set_attribute_count(7).unwrap();

            let entity = hierarchy.entity(entity.id).unwrap();
            assert_eq!(entity.attributes.len(), 7);
            assert_eq!(entity.attributes[5].name, "Stat 6");
            assert_eq!(entity.attributes[6].value, 5.0);
            assert_eq!(hierarchy.attribute_names().len(), 7);
        }

        it "keeps stored values when a write partway through the batch fails" {
            let a = hierarchy.create_ranked_entity("Arthur", None).unwrap();
            let b = hierarchy.create_ranked_entity("Gawain", None).unwrap();
            hierarchy.set_attribute_value(a.id, 4, 9.0).unwrap();
            hierarchy.flush_all().unwrap();
            store.inner.delete_entity(b.id).unwrap();

            let err = hierarchy.set_attribute_count(3).unwrap_err();

            assert!(matches!(err, Error::Transport(_)));
            assert_eq!(hierarchy.entity(a.id).unwrap().value(4), Some(9.0));
            let reloaded = reload(&store, owner);
            assert_eq!(reloaded.attribute_count(), 5);
            assert_eq!(reloaded.entity(a.id).unwrap().value(4), Some(9.0));
        }

        it "leaves everything in place when the store rejects the change" {
            let entity = hierarchy.create_ranked_entity("Arthur", None).unwrap();
            store.fail(true);

            let err = hierarchy.set_attribute_count(3).unwrap_err();

            assert!(matches!(err, Error::Transport(_)));
            assert_eq!(hierarchy.attribute_count(), 5);
            assert_eq!(hierarchy.entity(entity.id).unwrap().attributes.len(), 5);
        }
    }

    describe "rename_attribute" {
        it "renames the slot on every entity and on new ones" {
            let group = hierarchy.create_group("Knights").unwrap();
            let a = hierarchy.create_ranked_entity("Arthur", None).unwrap();
            let b = hierarchy.create_ranked_entity("Lancelot", Some(group.id)).unwrap();

            hierarchy.rename_attribute(2, "Speed").unwrap();

            assert_eq!(hierarchy.entity(a.id).unwrap().attributes[2].name, "Speed");
            assert_eq!(hierarchy.entity(b.id).unwrap().attributes[2].name, "Speed");
            assert_eq!(hierarchy.attribute_names()[2], "Speed");

            let c = hierarchy.create_ranked_entity("Gawain", None).unwrap();
            assert_eq!(c.attributes[2].name, "Speed");

            let reloaded = reload(&store, owner);
            assert_eq!(reloaded.attribute_names()[2], "Speed");
        }

        it "rejects an index past the attribute count" {
            let err = hierarchy.rename_attribute(5, "Luck").unwrap_err();
            assert!(matches!(err, Error::Validation(_)));
        }

        it "rejects a blank name" {
            let err = hierarchy.rename_attribute(0, "   ").unwrap_err();
            assert!(matches!(err, Error::Validation(_)));
            assert_eq!(hierarchy.attribute_names()[0], "Stat 1");
        }
    }

    describe "set_attribute_value" {
        it "clamps values into [0, 10]" {
            let entity = hierarchy.create_ranked_entity("Arthur", None).unwrap();

            assert_eq!(hierarchy.set_attribute_value(entity.id, 0, 14.0).unwrap(), 10.0);
            assert_eq!(hierarchy.set_attribute_value(entity.id, 1, -3.0).unwrap(), 0.0);
            assert_eq!(hierarchy.set_attribute_value(entity.id, 2, 6.5).unwrap(), 6.5);
            assert_eq!(values(hierarchy.entity(entity.id).unwrap()), vec![10.0, 0.0, 6.5, 5.0, 5.0]);
        }

        it "rejects an index past the attribute count" {
            let entity = hierarchy.create_ranked_entity("Arthur", None).unwrap();
            let err = hierarchy.set_attribute_value(entity.id, 5, 1.0).unwrap_err();
            assert!(matches!(err, Error::Validation(_)));
        }

        it "reports an unknown entity" {
            let err = hierarchy.set_attribute_value(Uuid::new_v4(), 0, 1.0).unwrap_err();
            assert!(matches!(err, Error::NotFound { kind: NodeKind::Entity, .. }));
        }

        it "defers the write until flushed" {
            let entity = hierarchy.create_ranked_entity("Arthur", None).unwrap();
            hierarchy.set_attribute_value(entity.id, 0, 7.0).unwrap();
            hierarchy.set_attribute_value(entity.id, 0, 8.0).unwrap();

            assert_eq!(hierarchy.pending_saves(), 1);
            assert_eq!(reload(&store, owner).entity(entity.id).unwrap().attributes[0].value, 5.0);

            assert_eq!(hierarchy.flush_all().unwrap(), 1);
            assert_eq!(hierarchy.pending_saves(), 0);
            assert_eq!(reload(&store, owner).entity(entity.id).unwrap().attributes[0].value, 8.0);
        }

        it "waits for the quiet window before autosaving" {
            let mut hierarchy = Hierarchy::new(store.clone(), owner, 5)
                .with_autosave_window(Duration::from_millis(500));
            let entity = hierarchy.create_ranked_entity("Arthur", None).unwrap();
            hierarchy.set_attribute_value(entity.id, 3, 2.0).unwrap();

            assert_eq!(hierarchy.flush_autosave(Instant::now()).unwrap(), 0);
            assert_eq!(hierarchy.pending_saves(), 1);

            let later = Instant::now() + Duration::from_secs(1);
            assert_eq!(hierarchy.flush_autosave(later).unwrap(), 1);
            assert_eq!(reload(&store, owner).entity(entity.id).unwrap().attributes[3].value, 2.0);
        }

        it "keeps failed autosaves queued for retry" {
            let entity = hierarchy.create_ranked_entity("Arthur", None).unwrap();
            hierarchy.set_attribute_value(entity.id, 0, 9.0).unwrap();
            store.fail(true);

            let err = hierarchy.flush_all().unwrap_err();
            assert!(matches!(err, Error::Transport(_)));
            assert_eq!(hierarchy.pending_saves(), 1);
            assert_eq!(hierarchy.entity(entity.id).unwrap().attributes[0].value, 9.0);

            store.fail(false);
            assert_eq!(hierarchy.flush_all().unwrap(), 1);
            assert_eq!(reload(&store, owner).entity(entity.id).unwrap().attributes[0].value, 9.0);
        }
    }

    describe "groups" {
        it "appends new groups to the root" {
            let loose = hierarchy.create_ranked_entity("Arthur", None).unwrap();
            let group = hierarchy.create_group("  Mages  ").unwrap();

            assert_eq!(group.name, "Mages");
            assert_eq!(group.position, 1);
            assert_eq!(root_ids(&hierarchy), vec![loose.id, group.id]);
        }

        it "rejects a blank name" {
            let err = hierarchy.create_group("").unwrap_err();
            assert!(matches!(err, Error::Validation(_)));
            assert!(hierarchy.root().is_empty());
        }

        it "renames a group" {
            let group = hierarchy.create_group("Mages").unwrap();
            let renamed = hierarchy.rename_group(group.id, "Wizards").unwrap();

            assert_eq!(renamed.name, "Wizards");
            assert_eq!(reload(&store, owner).group(group.id).unwrap().name, "Wizards");
        }

        it "detaches members to the end of the root by default" {
            let first = hierarchy.create_ranked_entity("Arthur", None).unwrap();
            let group = hierarchy.create_group("Mages").unwrap();
            let last = hierarchy.create_ranked_entity("Gawain", None).unwrap();
            let m1 = hierarchy.create_ranked_entity("Merlin", Some(group.id)).unwrap();
            let m2 = hierarchy.create_ranked_entity("Morgana", Some(group.id)).unwrap();

            hierarchy.delete_group(group.id, DeleteGroupMode::default()).unwrap();

            assert!(hierarchy.group(group.id).is_none());
            assert_eq!(root_ids(&hierarchy), vec![first.id, last.id, m1.id, m2.id]);
            assert_eq!(root_positions(&hierarchy), vec![0, 1, 2, 3]);

            let reloaded = reload(&store, owner);
            assert_eq!(root_ids(&reloaded), vec![first.id, last.id, m1.id, m2.id]);
        }

        it "deletes members too in cascade mode" {
            let group = hierarchy.create_group("Mages").unwrap();
            let member = hierarchy.create_ranked_entity("Merlin", Some(group.id)).unwrap();
            let loose = hierarchy.create_ranked_entity("Arthur", None).unwrap();
            hierarchy.set_attribute_value(member.id, 0, 1.0).unwrap();

            hierarchy.delete_group(group.id, DeleteGroupMode::Cascade).unwrap();

            assert!(hierarchy.entity(member.id).is_none());
            assert_eq!(root_ids(&hierarchy), vec![loose.id]);
            assert_eq!(root_positions(&hierarchy), vec![0]);
            assert_eq!(hierarchy.pending_saves(), 0);
            assert!(reload(&store, owner).entity(member.id).is_none());
        }

        it "keeps the detached order across a reload" {
            let group = hierarchy.create_group("Mages").unwrap();
            let d = hierarchy.create_ranked_entity("Dagonet", None).unwrap();
            let c = hierarchy.create_ranked_entity("Caradoc", None).unwrap();
            hierarchy.move_entity_to_group(c.id, Some(group.id)).unwrap();
            hierarchy.move_entity_to_group(d.id, Some(group.id)).unwrap();

            hierarchy.delete_group(group.id, DeleteGroupMode::Detach).unwrap();

            assert_eq!(root_ids(&hierarchy), vec![c.id, d.id]);
            assert_eq!(root_ids(&reload(&store, owner)), vec![c.id, d.id]);
        }

        it "reports an unknown group" {
            let err = hierarchy.delete_group(Uuid::new_v4(), DeleteGroupMode::Detach).unwrap_err();
            assert!(matches!(err, Error::NotFound { kind: NodeKind::Group, .. }));
        }

        it "restores the group name when the store fails" {
            let group = hierarchy.create_group("Mages").unwrap();
            store.fail(true);

            let err = hierarchy.rename_group(group.id, "Wizards").unwrap_err();

            assert!(matches!(err, Error::Transport(_)));
            assert_eq!(hierarchy.group(group.id).unwrap().name, "Mages");
        }

        it "adds nothing locally when creation fails" {
            store.fail(true);
            assert!(hierarchy.create_group("Mages").is_err());
            assert!(hierarchy.root().is_empty());
        }
    }

    describe "ranked entities" {
        it "creates entities with default values at the end of their container" {
            let group = hierarchy.create_group("Mages").unwrap();
            let a = hierarchy.create_ranked_entity("Merlin", Some(group.id)).unwrap();
            let b = hierarchy.create_ranked_entity("Morgana", Some(group.id)).unwrap();
            let loose = hierarchy.create_ranked_entity("Arthur", None).unwrap();

            assert_eq!(values(&a), vec![5.0; 5]);
            assert_eq!(a.position, 0);
            assert_eq!(b.position, 1);
            assert_eq!(loose.position, 1);
            assert_eq!(hierarchy.parent_of(a.id), Some(Some(group.id)));
            assert_eq!(hierarchy.parent_of(loose.id), Some(None));
        }

        it "rejects an unknown target group without creating anything" {
            let err = hierarchy.create_ranked_entity("Merlin", Some(Uuid::new_v4())).unwrap_err();

            assert!(matches!(err, Error::NotFound { kind: NodeKind::Group, .. }));
            assert_eq!(reload(&store, owner).entities().count(), 0);
        }

        it "renames an entity" {
            let entity = hierarchy.create_ranked_entity("Arthur", None).unwrap();
            hierarchy.rename_entity(entity.id, "King Arthur").unwrap();

            assert_eq!(hierarchy.entity(entity.id).unwrap().name, "King Arthur");
            assert_eq!(reload(&store, owner).entity(entity.id).unwrap().name, "King Arthur");
        }

        it "moves an entity between groups" {
            let g1 = hierarchy.create_group("Mages").unwrap();
            let g2 = hierarchy.create_group("Knights").unwrap();
            let a = hierarchy.create_ranked_entity("Merlin", Some(g1.id)).unwrap();
            let e = hierarchy.create_ranked_entity("Arthur", Some(g1.id)).unwrap();
            let b = hierarchy.create_ranked_entity("Morgana", Some(g1.id)).unwrap();
            let k = hierarchy.create_ranked_entity("Lancelot", Some(g2.id)).unwrap();

            let moved = hierarchy.move_entity_to_group(e.id, Some(g2.id)).unwrap();

            assert_eq!(moved.position, 1);
            assert_eq!(item_ids(&hierarchy, g1.id), vec![a.id, b.id]);
            assert_eq!(item_positions(&hierarchy, g1.id), vec![0, 1]);
            assert_eq!(item_ids(&hierarchy, g2.id), vec![k.id, e.id]);
            assert_eq!(item_positions(&hierarchy, g2.id), vec![0, 1]);
            assert_eq!(hierarchy.parent_of(e.id), Some(Some(g2.id)));

            let reloaded = reload(&store, owner);
            assert_eq!(item_ids(&reloaded, g1.id), vec![a.id, b.id]);
            assert_eq!(item_ids(&reloaded, g2.id), vec![k.id, e.id]);
        }

        it "moves an entity out to the root" {
            let group = hierarchy.create_group("Mages").unwrap();
            let e = hierarchy.create_ranked_entity("Merlin", Some(group.id)).unwrap();

            let moved = hierarchy.move_entity_to_group(e.id, None).unwrap();

            assert_eq!(moved.position, 1);
            assert_eq!(root_ids(&hierarchy), vec![group.id, e.id]);
            assert!(item_ids(&hierarchy, group.id).is_empty());
            assert_eq!(root_ids(&reload(&store, owner)), vec![group.id, e.id]);
        }

        it "treats a move into the current container as a no-op" {
            let group = hierarchy.create_group("Mages").unwrap();
            let a = hierarchy.create_ranked_entity("Merlin", Some(group.id)).unwrap();
            let b = hierarchy.create_ranked_entity("Morgana", Some(group.id)).unwrap();
            store.fail(true);

            let unchanged = hierarchy.move_entity_to_group(a.id, Some(group.id)).unwrap();

            assert_eq!(unchanged.position, 0);
            assert_eq!(item_ids(&hierarchy, group.id), vec![a.id, b.id]);
        }

        it "leaves the entity in its source group when the move fails" {
            let g1 = hierarchy.create_group("Mages").unwrap();
            let g2 = hierarchy.create_group("Knights").unwrap();
            let e = hierarchy.create_ranked_entity("Merlin", Some(g1.id)).unwrap();
            store.fail(true);

            let err = hierarchy.move_entity_to_group(e.id, Some(g2.id)).unwrap_err();

            assert!(matches!(err, Error::Transport(_)));
            assert_eq!(item_ids(&hierarchy, g1.id), vec![e.id]);
            assert!(item_ids(&hierarchy, g2.id).is_empty());
        }

        it "renumbers siblings after a delete" {
            let a = hierarchy.create_ranked_entity("Arthur", None).unwrap();
            let b = hierarchy.create_ranked_entity("Gawain", None).unwrap();
            let c = hierarchy.create_ranked_entity("Lancelot", None).unwrap();

            hierarchy.delete_ranked_entity(b.id).unwrap();

            assert_eq!(root_ids(&hierarchy), vec![a.id, c.id]);
            assert_eq!(root_positions(&hierarchy), vec![0, 1]);
            assert!(reload(&store, owner).entity(b.id).is_none());
        }
    }

    describe "reorder" {
        it "applies a permutation of the root" {
            let a = hierarchy.create_ranked_entity("Arthur", None).unwrap();
            let g = hierarchy.create_group("Mages").unwrap();
            let b = hierarchy.create_ranked_entity("Gawain", None).unwrap();

            hierarchy.reorder(None, &[b.id, a.id, g.id]).unwrap();

            assert_eq!(root_ids(&hierarchy), vec![b.id, a.id, g.id]);
            assert_eq!(root_positions(&hierarchy), vec![0, 1, 2]);
            assert_eq!(root_ids(&reload(&store, owner)), vec![b.id, a.id, g.id]);
        }

        it "applies a permutation of a group's items" {
            let g = hierarchy.create_group("Mages").unwrap();
            let a = hierarchy.create_ranked_entity("Merlin", Some(g.id)).unwrap();
            let b = hierarchy.create_ranked_entity("Morgana", Some(g.id)).unwrap();
            let c = hierarchy.create_ranked_entity("Nimue", Some(g.id)).unwrap();

            hierarchy.reorder(Some(g.id), &[c.id, a.id, b.id]).unwrap();

            assert_eq!(item_ids(&hierarchy, g.id), vec![c.id, a.id, b.id]);
            assert_eq!(item_positions(&hierarchy, g.id), vec![0, 1, 2]);
            assert_eq!(item_ids(&reload(&store, owner), g.id), vec![c.id, a.id, b.id]);
        }

        it "rejects anything that is not a permutation and changes nothing" {
            let a = hierarchy.create_ranked_entity("Arthur", None).unwrap();
            let b = hierarchy.create_ranked_entity("Gawain", None).unwrap();
            let before = root_ids(&hierarchy);

            for bad in [
                vec![a.id],
                vec![a.id, a.id],
                vec![a.id, Uuid::new_v4()],
                vec![a.id, b.id, Uuid::new_v4()],
            ] {
                let err = hierarchy.reorder(None, &bad).unwrap_err();
                assert!(matches!(err, Error::Validation(_)));
                assert_eq!(root_ids(&hierarchy), before);
                assert_eq!(root_positions(&hierarchy), vec![0, 1]);
            }
        }

        it "restores the old order when the store fails" {
            let a = hierarchy.create_ranked_entity("Arthur", None).unwrap();
            let b = hierarchy.create_ranked_entity("Gawain", None).unwrap();
            store.fail(true);

            assert!(hierarchy.reorder(None, &[b.id, a.id]).is_err());
            assert_eq!(root_ids(&hierarchy), vec![a.id, b.id]);
        }
    }

    describe "load" {
        it "rebuilds groups and loose entities in order" {
            let a = hierarchy.create_ranked_entity("Arthur", None).unwrap();
            let g = hierarchy.create_group("Mages").unwrap();
            let m = hierarchy.create_ranked_entity("Merlin", Some(g.id)).unwrap();

            let reloaded = reload(&store, owner);

            assert_eq!(reloaded.owner_id(), owner);
            assert_eq!(root_ids(&reloaded), vec![a.id, g.id]);
            assert_eq!(item_ids(&reloaded, g.id), vec![m.id]);
            assert_eq!(reloaded.root()[1].kind(), NodeKind::Group);
        }

        it "infers the attribute count from stored entities" {
            hierarchy.create_ranked_entity("Arthur", None).unwrap();
            hierarchy.set_attribute_count(7).unwrap();

            assert_eq!(reload(&store, owner).attribute_count(), 7);
        }

        it "falls back to the clamped default for an empty store" {
            let empty = Hierarchy::load(store.clone(), owner, 20).unwrap();
            assert_eq!(empty.attribute_count(), 8);
        }

        it "only sees the owner's own data" {
            hierarchy.create_ranked_entity("Arthur", None).unwrap();
            let other = reload(&store, Uuid::new_v4());
            assert!(other.root().is_empty());
        }

        it "reports a store failure" {
            store.fail(true);
            let result = Hierarchy::load(store.clone(), owner, 5);
            assert!(matches!(result, Err(Error::Transport(_))));
        }
    }

    describe "rank" {
        it "orders root entities by weighted score" {
            let a = hierarchy.create_ranked_entity("A", None).unwrap();
            let b = hierarchy.create_ranked_entity("B", None).unwrap();
            hierarchy.set_attribute_value(a.id, 0, 4.0).unwrap();
            hierarchy.set_attribute_value(a.id, 1, 4.0).unwrap();
            hierarchy.set_attribute_value(b.id, 0, 8.0).unwrap();
            hierarchy.set_attribute_value(b.id, 1, 2.0).unwrap();

            let weights = [SortWeight::new(0, 0.5), SortWeight::new(1, 0.5)];
            let ranked = hierarchy.rank(RankScope::Root, &weights).unwrap();

            assert_eq!(ranked[0].entity.id, b.id);
            assert_eq!(ranked[0].score, 5.0);
            assert_eq!(ranked[1].score, 4.0);
            assert_eq!(root_ids(&hierarchy), vec![a.id, b.id]);
        }

        it "ranks a single group or everything" {
            let g = hierarchy.create_group("Mages").unwrap();
            let m = hierarchy.create_ranked_entity("Merlin", Some(g.id)).unwrap();
            let a = hierarchy.create_ranked_entity("Arthur", None).unwrap();
            hierarchy.set_attribute_value(m.id, 0, 9.0).unwrap();

            let weights = [SortWeight::new(0, 1.0)];
            let group = hierarchy.rank(RankScope::Group(g.id), &weights).unwrap();
            assert_eq!(group.len(), 1);

            let all = hierarchy.rank(RankScope::All, &weights).unwrap();
            let ids: Vec<Uuid> = all.iter().map(|s| s.entity.id).collect();
            assert_eq!(ids, vec![m.id, a.id]);

            let root = hierarchy.rank(RankScope::Root, &weights).unwrap();
            assert_eq!(root.len(), 1);
            assert_eq!(root[0].entity.id, a.id);
        }

        it "reports an unknown group scope" {
            let err = hierarchy.rank(RankScope::Group(Uuid::new_v4()), &[]).unwrap_err();
            assert!(matches!(err, Error::NotFound { .. }));
        }
    }
}
