//! The `Output` collaborator contract: what the orchestrator needs from a
//! geometry-assembly/output backend. This crate defines the trait only — no
//! concrete output (table rendering, expire trees, style rules) ships here,
//! per the Non-goals this workspace carries forward.
//!
//! Grounded on `original_source/src/output.hpp` (`output_t`) and its use in
//! `osmdata.cpp`: one `Output` instance drives the single-threaded per-object
//! callbacks; [`Output::clone_for_worker`] produces the per-thread clones the
//! multithreaded pending processor (`crate::orchestrator`) hands out, each
//! bound to its own `MiddleQuery` and (implicitly) its own Copy Worker.

use geofabric_core::idlist::IdList;
use geofabric_core::middle::MiddleQuery;
use geofabric_core::osm::{Node, ObjectId, Relation, Way};

use crate::orchestrator::OrchestratorError;

/// An output backend: consumes the same per-object/phase-barrier callbacks
/// as the middle, plus pending-object reprocessing and lifecycle hooks.
///
/// Every method takes `&self`: a running output is expected to own its
/// mutable state behind its own synchronization (a Copy Worker channel, an
/// internal mutex), the same way `MiddleQuery` is a `&self` read handle over
/// a connection it owns — this is what lets
/// [`crate::orchestrator::multithreaded_process`] call the same clone's
/// methods from one dedicated worker thread without the orchestrator
/// itself managing `&mut` access across threads.
pub trait Output: Send + Sync {
    type Query: MiddleQuery;

    fn start(&self) -> Result<(), OrchestratorError>;

    fn node_add(&self, node: &Node) -> Result<(), OrchestratorError>;
    fn node_modify(&self, node: &Node) -> Result<(), OrchestratorError>;
    fn node_delete(&self, id: ObjectId) -> Result<(), OrchestratorError>;

    fn way_add(&self, way: &Way) -> Result<(), OrchestratorError>;
    fn way_modify(&self, way: &Way) -> Result<(), OrchestratorError>;
    fn way_delete(&self, id: ObjectId) -> Result<(), OrchestratorError>;

    fn relation_add(&self, relation: &Relation) -> Result<(), OrchestratorError>;
    fn relation_modify(&self, relation: &Relation) -> Result<(), OrchestratorError>;
    fn relation_delete(&self, id: ObjectId) -> Result<(), OrchestratorError>;

    /// Append mode only: called before the middle sees a non-deleted
    /// relation, so the output can stage its current members for
    /// before/after comparison (e.g. for expiry).
    fn select_relation_members(&self, id: ObjectId) -> Result<(), OrchestratorError>;

    fn after_nodes(&self) -> Result<(), OrchestratorError>;
    fn after_ways(&self) -> Result<(), OrchestratorError>;
    fn after_relations(&self) -> Result<(), OrchestratorError>;

    /// Flushes pending work and signals completion of one phase's writes.
    fn sync(&self) -> Result<(), OrchestratorError>;

    /// Stage 1b: reprocess a pending way/relation discovered via dependency
    /// propagation.
    fn pending_way(&self, id: ObjectId) -> Result<(), OrchestratorError>;
    fn pending_relation(&self, id: ObjectId) -> Result<(), OrchestratorError>;

    /// Stage 1c: reprocess a relation whose child was marked by the
    /// output's own style rules, not by ordinary dependency propagation.
    fn pending_relation_stage1c(&self, id: ObjectId) -> Result<(), OrchestratorError>;

    /// Node/way ids the output staged for re-emission during stage 1b,
    /// based on its own style rules (stage 1c input).
    fn get_marked_node_ids(&self) -> IdList;
    fn get_marked_way_ids(&self) -> IdList;

    /// Stage 2: flush any work still marked after stage 1c.
    fn reprocess_marked(&self) -> Result<(), OrchestratorError>;

    /// Releases any `MiddleQuery` handles the output is holding, so the
    /// middle's `stop` is free to drop or reindex its tables.
    fn free_middle_references(&self) -> Result<(), OrchestratorError>;

    fn stop(&self) -> Result<(), OrchestratorError>;

    /// Blocks until asynchronous work started by `stop` (index builds,
    /// clustering) completes.
    fn wait(&self) -> Result<(), OrchestratorError>;

    /// Builds a clone bound to `query`, for one multithreaded
    /// pending-processor worker thread.
    fn clone_for_worker(&self, query: Self::Query) -> Self
    where
        Self: Sized;

    /// Merges `other`'s accumulated expire-tree state into `self`, called
    /// once per worker clone after pending processing completes.
    fn merge_expire_trees(&self, other: &Self)
    where
        Self: Sized;
}
