//! The persistent middle: a Postgres-backed `Middle`/`MiddleQuery`
//! implementation for append-mode imports at planet scale (spec.md §4.3,
//! §6).
//!
//! Grounded on `original_source/src/middle-pgsql.cpp`, `db-copy.hpp`,
//! `properties.hpp` and `node-persistent-cache.{hpp,cpp}`. Bulk writes go
//! through a dedicated [`copy::CopyWorker`] thread so the caller's pending
//! thread never blocks on a `COPY` round trip; dependency lookups
//! (`get_node_parents`/`get_way_parents`) use the bucketed index tables
//! built by [`schema`].
#![forbid(unsafe_code)]

pub mod copy;
pub mod flat_nodes;
pub mod middle;
pub mod properties;
pub mod schema;

pub use middle::{PersistentMiddle, PersistentMiddleQuery};
