//! Errors emitted by the geofabric CLI, aggregating every layer's failures
//! into one type the binary logs once and exits on.
//!
//! Keep this error type reasonably small, as many CLI helpers return
//! `Result<_, CliError>` and the workspace enables `clippy::result_large_err`.

use std::sync::Arc;

use camino::Utf8PathBuf;
use geofabric_db::middle::PersistentMiddleError;
use geofabric_engine::OrchestratorError;
use geofabric_input::check::InputError;
use geofabric_input::reader::ReaderError;
use thiserror::Error;

/// Errors emitted by the geofabric CLI.
#[derive(Debug, Error)]
pub enum CliError {
    /// Provided arguments failed Clap validation.
    #[error(transparent)]
    ArgumentParsing(#[from] clap::Error),
    /// Configuration layering failed (files, env, CLI).
    #[error("failed to load configuration: {0}")]
    Configuration(#[from] Arc<ortho_config::OrthoError>),
    /// No input file was named on the command line or in configuration.
    #[error("no OSM input files given")]
    NoInputFiles,
    /// An input path does not exist or is not a regular file.
    #[error("input file {path:?} does not exist or is not a regular file")]
    InputFileNotFound { path: Utf8PathBuf },
    /// Inspecting an input path on disk failed.
    #[error("failed to inspect input file {path:?}: {source}")]
    InspectInputFile {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// Append mode needs a database to diff against; the RAM middle
    /// discards its state on exit, so it cannot support append runs.
    #[error("append mode requires --database-url; the RAM middle cannot track prior state")]
    AppendRequiresDatabase,
    /// A `--bbox` value did not parse as four comma-separated floats.
    #[error("invalid --bbox {value:?}: expected \"min_lon,min_lat,max_lon,max_lat\"")]
    InvalidBoundingBox { value: String },
    /// Connecting the persistent middle (schema setup, copy worker,
    /// flat node file) failed.
    #[error("failed to connect to the persistent middle: {0}")]
    PersistentMiddle(#[from] PersistentMiddleError),
    /// Reading or decoding a PBF input file failed.
    #[error("failed to read OSM input: {0}")]
    Reader(#[from] ReaderError),
    /// An input object violated the stream ordering invariants.
    #[error("malformed OSM input: {0}")]
    Input(#[from] InputError),
    /// The orchestrator, middle, or output rejected an object or a
    /// phase-barrier callback.
    #[error("ingestion failed: {0}")]
    Orchestrator(#[from] OrchestratorError),
}
