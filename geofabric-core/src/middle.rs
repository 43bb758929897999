//! The `Middle`/`MiddleQuery` trait contracts (spec.md §4.3) and
//! `OutputRequirements` (spec.md §2, §4.3), satisfied by both the RAM middle
//! (`geofabric-mem`) and the persistent middle (`geofabric-db`).
//!
//! Grounded on `original_source/src/middle.hpp` (`middle_query_t`,
//! `middle_t`) and `output-requirements.hpp`.

use crate::idlist::IdList;
use crate::node_location::Location;
use crate::osm::{Node, ObjectId, Relation, Way};

/// Which object traits an output needs the middle to persist. Drives which
/// internal stores the RAM middle populates and which columns the
/// persistent middle's `COPY` statements include.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OutputRequirements {
    pub full_nodes: bool,
    pub full_ways: bool,
    pub full_relations: bool,
}

impl OutputRequirements {
    #[must_use]
    pub const fn new(full_nodes: bool, full_ways: bool, full_relations: bool) -> Self {
        Self {
            full_nodes,
            full_ways,
            full_relations,
        }
    }
}

/// Which member types to resolve from a relation (spec.md §4.3
/// `rel_members_get`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntityBits {
    pub nodes: bool,
    pub ways: bool,
}

impl EntityBits {
    pub const NODE: Self = Self {
        nodes: true,
        ways: false,
    };
    pub const WAY: Self = Self {
        nodes: false,
        ways: true,
    };
    pub const ALL: Self = Self {
        nodes: true,
        ways: true,
    };
}

/// The read-side contract: a cheaply-cloneable handle each worker thread
/// holds independently. For the persistent middle, cloning opens a fresh
/// database connection; for the RAM middle, cloning is a cheap shared-buffer
/// clone (spec.md §4.3 supplement).
pub trait MiddleQuery: Send {
    /// Returns the location of `id`, or an invalid location if unknown.
    fn get_node_location(&self, id: ObjectId) -> Location;

    /// Resolves locations for each id in `way_nodes`, returning how many
    /// were resolved.
    fn nodes_get_list(&self, way_nodes: &[ObjectId]) -> Vec<(ObjectId, Location)>;

    /// Materializes the full node `id`, if full nodes are being stored.
    fn node_get(&self, id: ObjectId) -> Option<Node>;

    /// Materializes way `id` (node ids only; locations are not resolved
    /// here — see `nodes_get_list`).
    fn way_get(&self, id: ObjectId) -> Option<Way>;

    /// Materializes relation `id`.
    fn relation_get(&self, id: ObjectId) -> Option<Relation>;

    /// Materializes the node and/or way members of `rel_id`, filtered by
    /// `entity_bits`. Relation-type members are never resolved here.
    fn rel_members_get(&self, rel_id: ObjectId, entity_bits: EntityBits) -> Vec<(ObjectId, char)>;
}

/// Errors a `Middle`'s write or dependency-query side can raise. Concrete
/// middles define their own richer error enum and convert into/through this
/// where a caller only needs the taxonomy (spec.md §7).
#[derive(Debug, thiserror::Error)]
pub enum MiddleError {
    #[error("database error: {0}")]
    Database(String),
    #[error("i/o error: {0}")]
    Io(String),
}

/// The write-side contract, called in strict phase order by the
/// orchestrator (spec.md §4.3).
pub trait Middle {
    type Query: MiddleQuery;

    fn set_requirements(&mut self, requirements: OutputRequirements);

    fn node(&mut self, node: &Node) -> Result<(), MiddleError>;
    fn way(&mut self, way: &Way) -> Result<(), MiddleError>;
    fn relation(&mut self, relation: &Relation) -> Result<(), MiddleError>;

    fn after_nodes(&mut self) -> Result<(), MiddleError>;
    fn after_ways(&mut self) -> Result<(), MiddleError>;
    fn after_relations(&mut self) -> Result<(), MiddleError>;

    /// For the given sorted, deduplicated node ids, determines parent ways
    /// and relations. Append mode only; the RAM middle does not implement
    /// this (it does not support append).
    fn get_node_parents(
        &self,
        changed_nodes: &IdList,
    ) -> Result<(IdList, IdList), MiddleError>;

    /// For the given sorted, deduplicated way ids, determines parent
    /// relations.
    fn get_way_parents(&self, changed_ways: &IdList) -> Result<IdList, MiddleError>;

    fn get_query_instance(&self) -> Self::Query;

    /// `drop_middle`: discard contents (drop-mode) vs hand off to the
    /// database's own index-creation pipeline (keep-mode).
    fn stop(&mut self, drop_middle: bool) -> Result<(), MiddleError>;

    /// Blocks until asynchronous index-build tasks started by `stop`
    /// complete.
    fn wait(&mut self) -> Result<(), MiddleError>;
}
