//! Tracks dependencies between changed objects in append mode so their
//! parents can be reprocessed (spec.md §4.6).
//!
//! Grounded on `original_source/src/dependency-manager.{hpp,cpp}`
//! (`dependency_manager_t`, `full_dependency_manager_t`): the base class is a
//! no-op used in import mode, where nothing depends on propagation; the full
//! implementation tracks changed ids per phase and turns them into pending
//! parent sets via the middle's dependency queries.

use geofabric_core::idlist::IdList;
use geofabric_core::middle::{Middle, MiddleError};
use geofabric_core::osm::ObjectId;

/// Propagates changed-object ids to their parents across phase barriers.
/// Generic over the concrete `Middle` so [`FullDependencyManager`] can call
/// its dependency queries directly, without an object-safety-hostile
/// associated type on the trait itself.
pub trait DependencyManager<M: Middle> {
    fn node_changed(&mut self, _id: ObjectId) {}
    fn way_changed(&mut self, _id: ObjectId) {}
    fn relation_changed(&mut self, _id: ObjectId) {}

    fn after_nodes(&mut self, _mid: &M) -> Result<(), MiddleError> {
        Ok(())
    }
    fn after_ways(&mut self, _mid: &M) -> Result<(), MiddleError> {
        Ok(())
    }
    fn after_relations(&mut self) {}

    /// Are there pending way or relation ids left to reprocess?
    fn has_pending(&self) -> bool {
        false
    }

    /// Takes the pending way ids, leaving the internal list empty.
    fn take_pending_way_ids(&mut self) -> IdList {
        IdList::new()
    }

    /// Takes the pending relation ids, leaving the internal list empty.
    fn take_pending_relation_ids(&mut self) -> IdList {
        IdList::new()
    }
}

/// The import-mode dependency manager: there is nothing to propagate, since
/// every object is seen for the first time.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopDependencyManager;

impl<M: Middle> DependencyManager<M> for NoopDependencyManager {}

/// The append-mode dependency manager (`full_dependency_manager_t`): tracks
/// changed nodes/ways/relations per phase and turns them into pending parent
/// sets via the middle's `get_node_parents`/`get_way_parents`.
#[derive(Debug, Default)]
pub struct FullDependencyManager {
    changed_nodes: IdList,
    changed_ways: IdList,
    changed_relations: IdList,
    ways_pending: IdList,
    rels_pending: IdList,
}

impl FullDependencyManager {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl<M: Middle> DependencyManager<M> for FullDependencyManager {
    fn node_changed(&mut self, id: ObjectId) {
        self.changed_nodes.push(id);
    }

    fn way_changed(&mut self, id: ObjectId) {
        self.changed_ways.push(id);
    }

    fn relation_changed(&mut self, id: ObjectId) {
        self.changed_relations.push(id);
    }

    fn after_nodes(&mut self, mid: &M) -> Result<(), MiddleError> {
        if self.changed_nodes.is_empty() {
            return Ok(());
        }
        self.changed_nodes.sort_unique();
        let (ways, rels) = mid.get_node_parents(&self.changed_nodes)?;
        self.ways_pending.merge_sorted(&ways);
        self.rels_pending.merge_sorted(&rels);
        self.changed_nodes.clear();
        Ok(())
    }

    fn after_ways(&mut self, mid: &M) -> Result<(), MiddleError> {
        if !self.changed_ways.is_empty() {
            self.changed_ways.sort_unique();
            if !self.ways_pending.is_empty() {
                // Already reprocessed inline by the ordinary way-phase
                // callback; no need to fetch their parents again.
                self.ways_pending.remove_ids_if_in(&self.changed_ways);
                self.changed_ways.merge_sorted(&self.ways_pending);
            }

            let rels = mid.get_way_parents(&self.changed_ways)?;
            self.rels_pending.merge_sorted(&rels);

            self.changed_ways.clear();
            return Ok(());
        }

        if !self.ways_pending.is_empty() {
            let rels = mid.get_way_parents(&self.ways_pending)?;
            self.rels_pending.merge_sorted(&rels);
        }
        Ok(())
    }

    fn after_relations(&mut self) {
        self.rels_pending.remove_ids_if_in(&self.changed_relations);
        self.changed_relations.clear();
    }

    fn has_pending(&self) -> bool {
        !self.ways_pending.is_empty() || !self.rels_pending.is_empty()
    }

    fn take_pending_way_ids(&mut self) -> IdList {
        std::mem::take(&mut self.ways_pending)
    }

    fn take_pending_relation_ids(&mut self) -> IdList {
        std::mem::take(&mut self.rels_pending)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geofabric_core::middle::{EntityBits, MiddleQuery, OutputRequirements};
    use geofabric_core::node_location::Location;
    use geofabric_core::osm::{Node, Relation, Way};
    use rstest::rstest;

    #[derive(Debug, Default)]
    struct StubQuery;

    impl MiddleQuery for StubQuery {
        fn get_node_location(&self, _id: ObjectId) -> Location {
            Location::invalid()
        }

        fn nodes_get_list(&self, _way_nodes: &[ObjectId]) -> Vec<(ObjectId, Location)> {
            Vec::new()
        }

        fn node_get(&self, _id: ObjectId) -> Option<Node> {
            None
        }

        fn way_get(&self, _id: ObjectId) -> Option<Way> {
            None
        }

        fn relation_get(&self, _id: ObjectId) -> Option<Relation> {
            None
        }

        fn rel_members_get(&self, _rel_id: ObjectId, _bits: EntityBits) -> Vec<(ObjectId, char)> {
            Vec::new()
        }
    }

    /// A middle stub whose `get_node_parents`/`get_way_parents` answers are
    /// fixed in advance, so [`FullDependencyManager`]'s set algebra can be
    /// exercised without a real backing store.
    #[derive(Debug, Default)]
    struct StubMiddle {
        node_parent_ways: Vec<ObjectId>,
        node_parent_rels: Vec<ObjectId>,
        way_parent_rels: Vec<ObjectId>,
    }

    impl Middle for StubMiddle {
        type Query = StubQuery;

        fn set_requirements(&mut self, _requirements: OutputRequirements) {}

        fn node(&mut self, _node: &Node) -> Result<(), MiddleError> {
            Ok(())
        }

        fn way(&mut self, _way: &Way) -> Result<(), MiddleError> {
            Ok(())
        }

        fn relation(&mut self, _relation: &Relation) -> Result<(), MiddleError> {
            Ok(())
        }

        fn after_nodes(&mut self) -> Result<(), MiddleError> {
            Ok(())
        }

        fn after_ways(&mut self) -> Result<(), MiddleError> {
            Ok(())
        }

        fn after_relations(&mut self) -> Result<(), MiddleError> {
            Ok(())
        }

        fn get_node_parents(&self, _changed_nodes: &IdList) -> Result<(IdList, IdList), MiddleError> {
            Ok((
                IdList::from(self.node_parent_ways.clone()),
                IdList::from(self.node_parent_rels.clone()),
            ))
        }

        fn get_way_parents(&self, _changed_ways: &IdList) -> Result<IdList, MiddleError> {
            Ok(IdList::from(self.way_parent_rels.clone()))
        }

        fn get_query_instance(&self) -> Self::Query {
            StubQuery
        }

        fn stop(&mut self, _drop_middle: bool) -> Result<(), MiddleError> {
            Ok(())
        }

        fn wait(&mut self) -> Result<(), MiddleError> {
            Ok(())
        }
    }

    #[rstest]
    fn noop_never_has_pending() {
        let mut noop = NoopDependencyManager;
        let mid = StubMiddle::default();
        DependencyManager::<StubMiddle>::node_changed(&mut noop, 1);
        DependencyManager::<StubMiddle>::after_nodes(&mut noop, &mid).expect("noop never fails");
        assert!(!DependencyManager::<StubMiddle>::has_pending(&noop));
    }

    #[rstest]
    fn after_nodes_populates_pending_from_parent_query() {
        let mut manager = FullDependencyManager::new();
        let mid = StubMiddle {
            node_parent_ways: vec![10, 20],
            node_parent_rels: vec![30],
            way_parent_rels: vec![],
        };
        manager.node_changed(1);
        manager.node_changed(2);
        manager.after_nodes(&mid).expect("query succeeds");

        assert!(manager.has_pending());
        assert_eq!(manager.take_pending_way_ids().as_slice(), &[10, 20]);
        assert_eq!(manager.take_pending_relation_ids().as_slice(), &[30]);
        assert!(!manager.has_pending());
    }

    #[rstest]
    fn after_ways_subtracts_changed_from_pending_before_requerying() {
        let mut manager = FullDependencyManager::new();
        manager.ways_pending = IdList::from(vec![5, 10]);
        manager.way_changed(10);
        manager.way_changed(15);

        let mid = StubMiddle {
            node_parent_ways: vec![],
            node_parent_rels: vec![],
            way_parent_rels: vec![99],
        };
        manager.after_ways(&mid).expect("query succeeds");

        assert_eq!(manager.take_pending_relation_ids().as_slice(), &[99]);
        assert!(manager.changed_ways.is_empty());
    }

    /// A way left pending from a node-phase propagation, but not itself
    /// changed this way-phase, must survive `after_ways` untouched so stage
    /// 1b still reprocesses it (`dependency-manager.cpp:42-66` retains
    /// `m_ways_pending_tracker` rather than clearing it here).
    #[rstest]
    fn after_ways_retains_ways_pending_not_in_changed_ways() {
        let mut manager = FullDependencyManager::new();
        manager.ways_pending = IdList::from(vec![5, 10]);
        manager.way_changed(10);

        let mid = StubMiddle {
            node_parent_ways: vec![],
            node_parent_rels: vec![],
            way_parent_rels: vec![],
        };
        manager.after_ways(&mid).expect("query succeeds");

        assert_eq!(manager.take_pending_way_ids().as_slice(), &[5]);
    }

    #[rstest]
    fn after_relations_subtracts_changed_from_pending() {
        let mut manager = FullDependencyManager::new();
        manager.rels_pending = IdList::from(vec![1, 2, 3]);
        manager.relation_changed(2);
        manager.after_relations();

        assert_eq!(manager.rels_pending.as_slice(), &[1, 3]);
        assert!(manager.changed_relations.is_empty());
    }
}
