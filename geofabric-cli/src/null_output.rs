//! [`NullOutput`]: a no-op [`Output`] implementation.
//!
//! Geometry assembly, tag transformation, and style-file evaluation are out
//! of scope for this workspace (spec.md §1 Non-goals) — no crate here
//! builds a real table-rendering or expire-tree backend. `NullOutput` exists
//! so the binary can still drive the full middle/dependency-propagation
//! pipeline end to end: it discards every callback and reports nothing
//! marked for reprocessing.

use std::marker::PhantomData;

use geofabric_core::idlist::IdList;
use geofabric_core::middle::MiddleQuery;
use geofabric_core::osm::{Node, ObjectId, Relation, Way};
use geofabric_engine::{OrchestratorError, Output};

/// An output backend that discards every callback.
///
/// Generic over the middle's query type so it can stand in as `O` for any
/// `Osmdata<M, D, O>`; `PhantomData<fn() -> Q>` carries that type parameter
/// without requiring `Q: Send + Sync`, since a null output never actually
/// holds one.
pub struct NullOutput<Q>(PhantomData<fn() -> Q>);

impl<Q> NullOutput<Q> {
    #[must_use]
    pub const fn new() -> Self {
        Self(PhantomData)
    }
}

impl<Q> Default for NullOutput<Q> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Q> Clone for NullOutput<Q> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<Q: MiddleQuery> Output for NullOutput<Q> {
    type Query = Q;

    fn start(&self) -> Result<(), OrchestratorError> {
        Ok(())
    }

    fn node_add(&self, _node: &Node) -> Result<(), OrchestratorError> {
        Ok(())
    }

    fn node_modify(&self, _node: &Node) -> Result<(), OrchestratorError> {
        Ok(())
    }

    fn node_delete(&self, _id: ObjectId) -> Result<(), OrchestratorError> {
        Ok(())
    }

    fn way_add(&self, _way: &Way) -> Result<(), OrchestratorError> {
        Ok(())
    }

    fn way_modify(&self, _way: &Way) -> Result<(), OrchestratorError> {
        Ok(())
    }

    fn way_delete(&self, _id: ObjectId) -> Result<(), OrchestratorError> {
        Ok(())
    }

    fn relation_add(&self, _relation: &Relation) -> Result<(), OrchestratorError> {
        Ok(())
    }

    fn relation_modify(&self, _relation: &Relation) -> Result<(), OrchestratorError> {
        Ok(())
    }

    fn relation_delete(&self, _id: ObjectId) -> Result<(), OrchestratorError> {
        Ok(())
    }

    fn select_relation_members(&self, _id: ObjectId) -> Result<(), OrchestratorError> {
        Ok(())
    }

    fn after_nodes(&self) -> Result<(), OrchestratorError> {
        Ok(())
    }

    fn after_ways(&self) -> Result<(), OrchestratorError> {
        Ok(())
    }

    fn after_relations(&self) -> Result<(), OrchestratorError> {
        Ok(())
    }

    fn sync(&self) -> Result<(), OrchestratorError> {
        Ok(())
    }

    fn pending_way(&self, _id: ObjectId) -> Result<(), OrchestratorError> {
        Ok(())
    }

    fn pending_relation(&self, _id: ObjectId) -> Result<(), OrchestratorError> {
        Ok(())
    }

    fn pending_relation_stage1c(&self, _id: ObjectId) -> Result<(), OrchestratorError> {
        Ok(())
    }

    fn get_marked_node_ids(&self) -> IdList {
        IdList::new()
    }

    fn get_marked_way_ids(&self) -> IdList {
        IdList::new()
    }

    fn reprocess_marked(&self) -> Result<(), OrchestratorError> {
        Ok(())
    }

    fn free_middle_references(&self) -> Result<(), OrchestratorError> {
        Ok(())
    }

    fn stop(&self) -> Result<(), OrchestratorError> {
        Ok(())
    }

    fn wait(&self) -> Result<(), OrchestratorError> {
        Ok(())
    }

    fn clone_for_worker(&self, _query: Self::Query) -> Self {
        Self::new()
    }

    fn merge_expire_trees(&self, _other: &Self) {}
}
