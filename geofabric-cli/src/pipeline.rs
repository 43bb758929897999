//! Wires a resolved [`IngestConfig`] into a concrete middle, dependency
//! manager, and [`NullOutput`], then drives the ingestion stream through
//! [`Osmdata`] (spec.md §4.5, §4.6).

use camino::Utf8PathBuf;
use geofabric_core::middle::Middle;
use geofabric_db::middle::PersistentMiddle;
use geofabric_db::schema::SchemaConfig;
use geofabric_engine::{
    DependencyManager, FullDependencyManager, NoopDependencyManager, Osmdata, OsmdataOptions,
};
use geofabric_input::check::InputValidator;
use geofabric_input::merge::{MultiFileMerge, Source};
use geofabric_input::reader::{PbfReader, ReaderError};
use geofabric_input::{OsmObject, Phase};
use geofabric_mem::RamMiddle;

use crate::config::IngestConfig;
use crate::error::CliError;
use crate::null_output::NullOutput;

/// Object counts from one completed ingestion run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestSummary {
    pub nodes: u64,
    pub ways: u64,
    pub relations: u64,
}

/// Picks a middle and dependency manager for `config` and runs the full
/// ingestion pipeline.
pub fn execute(config: &IngestConfig) -> Result<IngestSummary, CliError> {
    let options = OsmdataOptions {
        append: config.append,
        drop_middle: config.drop_middle,
        with_extra_attrs: config.with_extra_attrs,
        num_threads: config.threads,
        bbox: config.bbox,
    };

    match (&config.database_url, config.append) {
        (None, true) => Err(CliError::AppendRequiresDatabase),
        (None, false) => {
            let mid = RamMiddle::new();
            run_pipeline(mid, NoopDependencyManager, options, &config.inputs)
        }
        (Some(conninfo), append) => {
            let schema = SchemaConfig::new(&config.schema, config.bucket_shift);
            let mid =
                PersistentMiddle::connect(conninfo, schema, config.flat_nodes.clone(), append)?;
            if append {
                run_pipeline(mid, FullDependencyManager::new(), options, &config.inputs)
            } else {
                run_pipeline(mid, NoopDependencyManager, options, &config.inputs)
            }
        }
    }
}

/// Drives `inputs` through `mid`/`dependency_manager` via a [`NullOutput`],
/// calling the phase-barrier methods exactly once per phase regardless of
/// whether that phase's stream was empty (`osmdata.cpp`'s pull loop always
/// closes out node/way/relation in order).
fn run_pipeline<M, D>(
    mid: M,
    dependency_manager: D,
    options: OsmdataOptions,
    inputs: &[Utf8PathBuf],
) -> Result<IngestSummary, CliError>
where
    M: Middle,
    D: DependencyManager<M>,
{
    let mut osmdata: Osmdata<M, D, NullOutput<M::Query>> =
        Osmdata::new(mid, dependency_manager, NullOutput::new(), options);
    osmdata.start()?;

    let stream = open_stream(inputs)?;
    let mut validator = InputValidator::new();
    let mut summary = IngestSummary::default();
    let mut phase = Phase::Node;

    for object in stream {
        let object = object?;
        validator.check(&object)?;
        advance_phase(&mut osmdata, &mut phase, object.phase())?;
        match object {
            OsmObject::Node(node) => {
                osmdata.node(&node)?;
                summary.nodes += 1;
            }
            OsmObject::Way(way) => {
                osmdata.way(&way)?;
                summary.ways += 1;
            }
            OsmObject::Relation(relation) => {
                osmdata.relation(&relation)?;
                summary.relations += 1;
            }
        }
    }
    close_through(&mut osmdata, phase, Phase::Relation)?;
    osmdata.stop()?;
    Ok(summary)
}

fn open_stream(
    inputs: &[Utf8PathBuf],
) -> Result<Box<dyn Iterator<Item = Result<OsmObject, ReaderError>>>, CliError> {
    if let [only] = inputs {
        let reader = PbfReader::open(only.as_std_path())?;
        return Ok(Box::new(reader));
    }

    let mut sources: Vec<Source> = Vec::with_capacity(inputs.len());
    for path in inputs {
        sources.push(Box::new(PbfReader::open(path.as_std_path())?) as Source);
    }
    Ok(Box::new(MultiFileMerge::new(sources)))
}

const fn next_phase(phase: Phase) -> Phase {
    match phase {
        Phase::Node => Phase::Way,
        Phase::Way | Phase::Relation => Phase::Relation,
    }
}

fn close_phase<M, D>(
    osmdata: &mut Osmdata<M, D, NullOutput<M::Query>>,
    phase: Phase,
) -> Result<(), CliError>
where
    M: Middle,
    D: DependencyManager<M>,
{
    match phase {
        Phase::Node => osmdata.after_nodes()?,
        Phase::Way => osmdata.after_ways()?,
        Phase::Relation => osmdata.after_relations()?,
    }
    Ok(())
}

fn advance_phase<M, D>(
    osmdata: &mut Osmdata<M, D, NullOutput<M::Query>>,
    current: &mut Phase,
    target: Phase,
) -> Result<(), CliError>
where
    M: Middle,
    D: DependencyManager<M>,
{
    while *current < target {
        close_phase(osmdata, *current)?;
        *current = next_phase(*current);
    }
    Ok(())
}

fn close_through<M, D>(
    osmdata: &mut Osmdata<M, D, NullOutput<M::Query>>,
    mut current: Phase,
    target: Phase,
) -> Result<(), CliError>
where
    M: Middle,
    D: DependencyManager<M>,
{
    loop {
        close_phase(osmdata, current)?;
        if current == target {
            return Ok(());
        }
        current = next_phase(current);
    }
}
