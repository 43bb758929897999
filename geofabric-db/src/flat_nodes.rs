//! Opens the flat node file at a configured path, ensuring its parent
//! directory exists first (spec.md §6; `FlatNodeFile` itself is implemented
//! in `geofabric-core::node_location`, grounded on
//! `original_source/src/node-persistent-cache.{hpp,cpp}`).

use camino::Utf8Path;
use geofabric_core::node_location::{FlatNodeFile, NodeLocationError};

/// Errors preparing the flat node file's location.
#[derive(Debug, thiserror::Error)]
pub enum FlatNodeFileError {
    #[error("creating parent directory for flat node file at {path}")]
    CreateDir {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Store(#[from] NodeLocationError),
}

/// Opens (creating if necessary) the flat node file at `path`, creating its
/// parent directory first.
pub fn open(path: &Utf8Path) -> Result<FlatNodeFile, FlatNodeFileError> {
    geofabric_fs::ensure_parent_dir(path).map_err(|source| FlatNodeFileError::CreateDir {
        path: path.to_string(),
        source,
    })?;
    FlatNodeFile::open(path.as_std_path()).map_err(FlatNodeFileError::from)
}

#[cfg(test)]
#[expect(clippy::expect_used, reason = "tests fail fast on setup errors")]
mod tests {
    use super::*;
    use camino::Utf8PathBuf;
    use tempfile::tempdir;

    #[test]
    fn open_creates_missing_parent_directory() {
        let dir = tempdir().expect("tempdir");
        let path = Utf8PathBuf::from_path_buf(dir.path().join("nested").join("flat.nodes"))
            .expect("utf8 path");
        let file = open(&path);
        assert!(file.is_ok());
    }
}
