#![cfg_attr(docsrs, feature(doc_cfg))]
#![forbid(unsafe_code)]

//! Domain types and leaf data structures shared by every middle
//! implementation: the OSM object model, the Id Index, the Node Location
//! Store, and the `Middle`/`MiddleQuery` trait contracts that the RAM and
//! persistent middles both satisfy.
//!
//! # Responsibilities
//! - Define the OSM object model (node, way, relation, members, tags).
//! - Provide the Id Index: a memory-proportional-to-entries map from id to
//!   byte offset.
//! - Provide both Node Location Store variants: in-memory delta-encoded and
//!   flat-file dense-array.
//! - Define the read (`MiddleQuery`) and write (`Middle`) trait contracts
//!   implemented by `geofabric-mem` and `geofabric-db`.
//!
//! # Boundaries
//! This crate holds no I/O beyond the flat node file (a leaf component with
//! no database dependency) and performs no geometry assembly: it stores and
//! retrieves raw OSM objects and locations, nothing else.
//!
//! # Invariants
//! Id Index and Node Location Store entries must be inserted in strictly
//! ascending id order; see [`idindex`] and [`node_location`] for the exact
//! preconditions.

pub mod idindex;
pub mod idlist;
pub mod middle;
pub mod node_location;
pub mod osm;

pub use idindex::{IdIndex, NOT_FOUND};
pub use idlist::IdList;
pub use middle::{Middle, MiddleQuery, OutputRequirements};
pub use node_location::{Location, NodeLocationError, NodeLocationStore};
pub use osm::{Member, MemberType, Node, ObjectId, Relation, Tags, Way};
