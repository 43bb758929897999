//! CLI argument parsing and layered configuration (files, environment,
//! command line) for the `import`/`append` subcommands (spec.md §6, §7
//! supplement).

use camino::Utf8PathBuf;
use clap::{Parser, Subcommand};
use geofabric_db::schema::DEFAULT_BUCKET_SHIFT;
use geofabric_engine::BoundingBox;
use ortho_config::{OrthoConfig, SubcmdConfigMerge};
use serde::{Deserialize, Serialize};

use crate::error::CliError;

const ARG_DATABASE_URL: &str = "database-url";

/// Top-level CLI: `geofabric import|append [options] --input <path>...`.
#[derive(Debug, Parser)]
#[command(
    name = "geofabric",
    about = "Streams OpenStreetMap PBF data into a middle object store and an output backend",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Import one or more PBF files into a fresh middle.
    Import(IngestArgs),
    /// Apply a diff or changeset file against an existing database.
    Append(IngestArgs),
}

/// Arguments shared by `import` and `append`, layered file → env → CLI by
/// [`ortho_config`] (spec.md §6 supplement).
#[derive(Debug, Clone, Parser, Deserialize, Serialize, OrthoConfig, Default)]
#[command(
    long_about = "Stream one or more OSM PBF files through the ingestion \
                 pipeline. Values can come from CLI flags, a configuration \
                 file, or environment variables.",
    about = "Read OSM PBF input into the middle and output"
)]
#[ortho_config(prefix = "GEOFABRIC")]
pub struct IngestArgs {
    /// An input PBF file; repeat for multiple files.
    #[arg(long = "input", value_name = "path")]
    #[serde(default)]
    pub inputs: Vec<Utf8PathBuf>,

    /// Postgres connection string for the persistent middle. Absent means
    /// an in-memory, import-only run.
    #[arg(long = ARG_DATABASE_URL, value_name = "conninfo")]
    #[serde(default)]
    pub database_url: Option<String>,

    /// Schema (or prefix) the persistent middle's tables live under.
    #[arg(long = "schema", value_name = "name")]
    #[serde(default)]
    pub schema: Option<String>,

    /// Bucket shift for the dependency index tables (spec.md §4.2).
    #[arg(long = "bucket-shift", value_name = "n")]
    #[serde(default)]
    pub bucket_shift: Option<i32>,

    /// Store node locations in a flat file on disk instead of the `nodes`
    /// table.
    #[arg(long = "flat-nodes", value_name = "path")]
    #[serde(default)]
    pub flat_nodes: Option<Utf8PathBuf>,

    /// Discard the middle's contents once the output no longer needs
    /// them, rather than leaving them for the database's own indexing.
    #[arg(long = "drop-middle")]
    #[serde(default)]
    pub drop_middle: bool,

    /// Store every object's tags/attributes even if the output would
    /// otherwise treat an untagged object as deleted.
    #[arg(long = "extra-attrs")]
    #[serde(default)]
    pub with_extra_attrs: bool,

    /// Worker threads for the stage 1b pending processor. Defaults to the
    /// available parallelism.
    #[arg(long = "threads", value_name = "n")]
    #[serde(default)]
    pub threads: Option<usize>,

    /// Drop nodes outside this box: `min_lon,min_lat,max_lon,max_lat`.
    #[arg(long = "bbox", value_name = "min_lon,min_lat,max_lon,max_lat")]
    #[serde(default)]
    pub bbox: Option<String>,
}

impl IngestArgs {
    /// Merges file, environment, and CLI layers, then validates the
    /// result into an [`IngestConfig`].
    pub fn into_config(self, append: bool) -> Result<IngestConfig, CliError> {
        let merged = self.load_and_merge().map_err(CliError::Configuration)?;
        IngestConfig::resolve(merged, append)
    }
}

/// Validated, defaulted configuration for one ingestion run.
#[derive(Debug, Clone, PartialEq)]
pub struct IngestConfig {
    pub inputs: Vec<Utf8PathBuf>,
    pub database_url: Option<String>,
    pub schema: String,
    pub bucket_shift: i32,
    pub flat_nodes: Option<Utf8PathBuf>,
    pub drop_middle: bool,
    pub with_extra_attrs: bool,
    pub threads: usize,
    pub bbox: Option<BoundingBox>,
    pub append: bool,
}

fn default_threads() -> usize {
    std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get)
}

fn parse_bbox(value: &str) -> Result<BoundingBox, CliError> {
    let parts: Vec<&str> = value.split(',').collect();
    let [min_lon, min_lat, max_lon, max_lat] = parts.as_slice() else {
        return Err(CliError::InvalidBoundingBox {
            value: value.to_owned(),
        });
    };
    let parse = |s: &str| -> Result<f64, CliError> {
        s.trim().parse().map_err(|_| CliError::InvalidBoundingBox {
            value: value.to_owned(),
        })
    };
    Ok(BoundingBox {
        min_lon: parse(min_lon)?,
        min_lat: parse(min_lat)?,
        max_lon: parse(max_lon)?,
        max_lat: parse(max_lat)?,
    })
}

impl IngestConfig {
    pub(crate) fn resolve(args: IngestArgs, append: bool) -> Result<Self, CliError> {
        if args.inputs.is_empty() {
            return Err(CliError::NoInputFiles);
        }
        if append && args.database_url.is_none() {
            return Err(CliError::AppendRequiresDatabase);
        }
        for path in &args.inputs {
            let is_file = geofabric_fs::file_is_file(path).map_err(|source| {
                CliError::InspectInputFile {
                    path: path.clone(),
                    source,
                }
            })?;
            if !is_file {
                return Err(CliError::InputFileNotFound { path: path.clone() });
            }
        }
        let bbox = args.bbox.as_deref().map(parse_bbox).transpose()?;

        Ok(Self {
            inputs: args.inputs,
            database_url: args.database_url,
            schema: args.schema.unwrap_or_else(|| "public".to_owned()),
            bucket_shift: args.bucket_shift.unwrap_or(DEFAULT_BUCKET_SHIFT),
            flat_nodes: args.flat_nodes,
            drop_middle: args.drop_middle,
            with_extra_attrs: args.with_extra_attrs,
            threads: args.threads.unwrap_or_else(default_threads),
            bbox,
            append,
        })
    }
}
