//! The ingestion orchestrator: sequences per-object callbacks into the
//! middle and output, drives append-mode dependency propagation, and runs
//! the multithreaded pending-object reprocessing stages (spec.md §4.6).
//!
//! Grounded on `original_source/src/osmdata.{hpp,cpp}` and
//! `dependency-manager.{hpp,cpp}`. This crate defines the [`output::Output`]
//! collaborator trait only; no concrete output (table rendering, expire
//! trees, style rules) ships here.
#![forbid(unsafe_code)]

pub mod dependency_manager;
pub mod orchestrator;
pub mod output;

pub use dependency_manager::{DependencyManager, FullDependencyManager, NoopDependencyManager};
pub use orchestrator::{BoundingBox, Osmdata, OsmdataOptions, OrchestratorError};
pub use output::Output;
