//! Streams ordered OSM objects from one or more input files, enforcing the
//! ordering invariants the rest of the pipeline depends on (spec.md §3,
//! §4.5).
//!
//! # Responsibilities
//! - Decode a single PBF file into a strictly-ordered sequence of
//!   [`OsmObject`]s ([`reader`]).
//! - Validate that sequence against the stream invariants (node → way →
//!   relation, ids strictly ascending within a type, ids positive)
//!   ([`check`]).
//! - Merge N already-validated-per-file streams into one globally ordered,
//!   duplicate-suppressed stream ([`merge`]).
//!
//! # Boundaries
//! Geometry construction, tag transformation, and style-file parsing are
//! out of scope (spec.md §1 Non-goals) — this crate only gets OSM objects
//! in front of the orchestrator in the right order.

#![forbid(unsafe_code)]

pub mod check;
pub mod merge;
pub mod reader;

use geofabric_core::osm::{Node, ObjectId, Relation, Way};

/// One object read from an input stream, tagged by its OSM type.
#[derive(Debug, Clone, PartialEq)]
pub enum OsmObject {
    Node(Node),
    Way(Way),
    Relation(Relation),
}

/// The three OSM object phases, in the order they must appear in a valid
/// input stream (spec.md §3). Declaration order doubles as the `Ord` used
/// to detect phase regressions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Phase {
    Node,
    Way,
    Relation,
}

impl OsmObject {
    /// Which phase this object belongs to.
    #[must_use]
    pub const fn phase(&self) -> Phase {
        match self {
            Self::Node(_) => Phase::Node,
            Self::Way(_) => Phase::Way,
            Self::Relation(_) => Phase::Relation,
        }
    }

    /// The object's id, regardless of type.
    #[must_use]
    pub const fn id(&self) -> ObjectId {
        match self {
            Self::Node(n) => n.id,
            Self::Way(w) => w.id,
            Self::Relation(r) => r.id,
        }
    }

    /// The object's version, regardless of type.
    #[must_use]
    pub const fn version(&self) -> u32 {
        match self {
            Self::Node(n) => n.version,
            Self::Way(w) => w.version,
            Self::Relation(r) => r.version,
        }
    }
}
