use camino::Utf8PathBuf;
use rstest::rstest;
use tempfile::NamedTempFile;

use crate::config::{IngestArgs, IngestConfig};
use crate::error::CliError;

fn args_with_input(path: &Utf8PathBuf) -> IngestArgs {
    IngestArgs {
        inputs: vec![path.clone()],
        ..IngestArgs::default()
    }
}

#[rstest]
fn resolve_rejects_empty_input_list() {
    let err = IngestConfig::resolve(IngestArgs::default(), false).expect_err("no inputs given");
    assert!(matches!(err, CliError::NoInputFiles));
}

#[rstest]
fn resolve_rejects_append_without_database() {
    let file = NamedTempFile::new().expect("create temp file");
    let path = Utf8PathBuf::from_path_buf(file.path().to_path_buf()).expect("utf-8 path");
    let err =
        IngestConfig::resolve(args_with_input(&path), true).expect_err("append needs a database");
    assert!(matches!(err, CliError::AppendRequiresDatabase));
}

#[rstest]
fn resolve_rejects_missing_input_file() {
    let mut args = IngestArgs::default();
    args.inputs.push(Utf8PathBuf::from("/nonexistent/does-not-exist.osm.pbf"));
    let err = IngestConfig::resolve(args, false).expect_err("missing input file");
    assert!(matches!(err, CliError::InputFileNotFound { .. }));
}

#[rstest]
fn resolve_applies_schema_and_bucket_shift_defaults() {
    let file = NamedTempFile::new().expect("create temp file");
    let path = Utf8PathBuf::from_path_buf(file.path().to_path_buf()).expect("utf-8 path");
    let config =
        IngestConfig::resolve(args_with_input(&path), false).expect("valid config resolves");
    assert_eq!(config.schema, "public");
    assert_eq!(config.bucket_shift, geofabric_db::schema::DEFAULT_BUCKET_SHIFT);
    assert!(!config.append);
}

#[rstest]
fn resolve_parses_valid_bbox() {
    let file = NamedTempFile::new().expect("create temp file");
    let path = Utf8PathBuf::from_path_buf(file.path().to_path_buf()).expect("utf-8 path");
    let mut args = args_with_input(&path);
    args.bbox = Some("-1.5,51.0,0.5,52.0".to_owned());
    let config = IngestConfig::resolve(args, false).expect("valid bbox parses");
    let bbox = config.bbox.expect("bbox present");
    assert!(bbox.contains(0.0, 51.5));
    assert!(!bbox.contains(10.0, 51.5));
}

#[rstest]
fn resolve_rejects_malformed_bbox() {
    let file = NamedTempFile::new().expect("create temp file");
    let path = Utf8PathBuf::from_path_buf(file.path().to_path_buf()).expect("utf-8 path");
    let mut args = args_with_input(&path);
    args.bbox = Some("not,a,valid,bbox".to_owned());
    let err = IngestConfig::resolve(args, false).expect_err("malformed bbox is rejected");
    assert!(matches!(err, CliError::InvalidBoundingBox { .. }));
}
