//! The Node Location Store: `node id -> (lon, lat)`, in two variants
//! (spec.md §4.2).
//!
//! The in-memory variant is grounded on `node_locations_t`
//! (`original_source/src/node-locations.{hpp,cpp}`): entries are grouped
//! into blocks of [`BLOCK_SIZE`], each block delta-encoding its ids and
//! zigzag-delta-encoding its scaled coordinates as varints into a single
//! growable byte buffer, with an [`IdIndex`] entry added at the start of
//! every block. The flat-file variant is grounded on `node_locations_t`'s
//! disk-backed sibling (`node-persistent-cache.{hpp,cpp}`): a dense array of
//! fixed-size slots addressed directly by id.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::idindex::{IdIndex, NOT_FOUND};

/// Coordinates are stored as degrees scaled by this factor and truncated to
/// `i32` (spec.md §4.2).
pub const COORD_SCALE: f64 = 1e7;

/// Sentinel scaled coordinate marking an invalid location.
pub const INVALID_COORD: i32 = i32::MIN;

/// A node location. May be invalid (never stored, or explicitly cleared).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Location {
    x: i32,
    y: i32,
}

impl Location {
    /// Builds a location from unscaled degrees.
    #[must_use]
    #[expect(clippy::cast_possible_truncation, reason = "OSM coordinates fit i32 at 1e7 scale")]
    pub fn new(lon: f64, lat: f64) -> Self {
        Self {
            x: (lon * COORD_SCALE).round() as i32,
            y: (lat * COORD_SCALE).round() as i32,
        }
    }

    /// The invalid location sentinel.
    #[must_use]
    pub const fn invalid() -> Self {
        Self {
            x: INVALID_COORD,
            y: INVALID_COORD,
        }
    }

    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.x != INVALID_COORD || self.y != INVALID_COORD
    }

    #[must_use]
    pub fn lon(&self) -> f64 {
        f64::from(self.x) / COORD_SCALE
    }

    #[must_use]
    pub fn lat(&self) -> f64 {
        f64::from(self.y) / COORD_SCALE
    }

    const fn from_scaled(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    const fn scaled(&self) -> (i32, i32) {
        (self.x, self.y)
    }
}

/// Errors from the flat-file Node Location Store.
#[derive(Debug, thiserror::Error)]
pub enum NodeLocationError {
    #[error("opening flat node file {path}")]
    Open {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("flat node file {path} is not a valid format (slot 0 is not the invalid sentinel)")]
    BadFormat { path: String },
    #[error("reading flat node file")]
    Read(#[source] std::io::Error),
    #[error("writing flat node file")]
    Write(#[source] std::io::Error),
}

/// Number of (id, location) pairs grouped into one delta-encoded block.
const BLOCK_SIZE: usize = 32;

/// Worst-case varint bytes for one entry: 10 bytes each for id, x, y deltas.
const MAX_BYTES_PER_ENTRY: usize = 10 * 3;

fn write_varint(buf: &mut Vec<u8>, mut value: u64) {
    loop {
        #[expect(clippy::cast_possible_truncation, reason = "masked to 7 bits above")]
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            buf.push(byte);
            break;
        }
        buf.push(byte | 0x80);
    }
}

fn read_varint(data: &[u8], pos: &mut usize) -> Option<u64> {
    let mut result: u64 = 0;
    let mut shift = 0;
    loop {
        let byte = *data.get(*pos)?;
        *pos += 1;
        result |= u64::from(byte & 0x7f) << shift;
        if byte & 0x80 == 0 {
            break;
        }
        shift += 7;
    }
    Some(result)
}

#[expect(clippy::cast_sign_loss, reason = "zigzag mapping of i64 onto u64's bit pattern")]
const fn zigzag_encode(value: i64) -> u64 {
    ((value << 1) ^ (value >> 63)) as u64
}

#[expect(
    clippy::cast_possible_wrap,
    reason = "zigzag decode of a zigzag-encoded value"
)]
const fn zigzag_decode(value: u64) -> i64 {
    ((value >> 1) as i64) ^ -((value & 1) as i64)
}

/// In-memory delta+varint-encoded Node Location Store.
///
/// `set` fails (returns `false`) once the configured memory budget is
/// reached and the next block would need to grow; the caller falls through
/// to the flat-file or persistent store (spec.md §4.2).
#[derive(Debug)]
pub struct NodeLocationStore {
    index: IdIndex,
    data: Vec<u8>,
    max_size: usize,
    count: usize,
    last_id: i64,
    last_x: i64,
    last_y: i64,
}

impl Default for NodeLocationStore {
    fn default() -> Self {
        Self::new(usize::MAX)
    }
}

impl NodeLocationStore {
    /// Builds a store capped at approximately `max_size` bytes.
    #[must_use]
    pub fn new(max_size: usize) -> Self {
        Self {
            index: IdIndex::new(),
            data: Vec::new(),
            max_size,
            count: 0,
            last_id: 0,
            last_x: 0,
            last_y: 0,
        }
    }

    #[must_use]
    pub fn size(&self) -> usize {
        self.count
    }

    #[must_use]
    pub fn used_memory(&self) -> usize {
        self.data.capacity() + self.index.used_memory()
    }

    fn will_resize(&self) -> bool {
        self.index.will_resize() || self.data.len() + MAX_BYTES_PER_ENTRY >= self.data.capacity()
    }

    fn first_entry_in_block(&self) -> bool {
        self.count % BLOCK_SIZE == 0
    }

    /// Stores a location for `id`. `id` must be strictly greater than every
    /// previously stored id. Returns `false` if the memory budget is
    /// exhausted and this entry would require growing the store.
    pub fn set(&mut self, id: i64, location: Location) -> bool {
        if self.used_memory() >= self.max_size && self.will_resize() {
            return false;
        }

        if self.first_entry_in_block() {
            self.last_id = 0;
            self.last_x = 0;
            self.last_y = 0;
            self.index.add(id, self.data.len());
        }

        let delta_id = id - self.last_id;
        debug_assert!(delta_id > 0, "ids must be strictly ascending");
        self.last_id = id;
        write_varint(&mut self.data, delta_id as u64);

        let (x, y) = location.scaled();
        let delta_x = i64::from(x) - self.last_x;
        self.last_x = i64::from(x);
        write_varint(&mut self.data, zigzag_encode(delta_x));

        let delta_y = i64::from(y) - self.last_y;
        self.last_y = i64::from(y);
        write_varint(&mut self.data, zigzag_encode(delta_y));

        self.count += 1;
        true
    }

    /// Returns the stored location for `id`, or an invalid location if it
    /// was never stored.
    #[must_use]
    pub fn get(&self, id: i64) -> Location {
        let offset = self.index.get_block(id);
        if offset == NOT_FOUND {
            return Location::invalid();
        }

        let mut pos = offset;
        let mut did = 0i64;
        let mut dx = 0i64;
        let mut dy = 0i64;

        for _ in 0..BLOCK_SIZE {
            let Some(id_delta) = read_varint(&self.data, &mut pos) else {
                break;
            };
            #[expect(clippy::cast_possible_wrap, reason = "id deltas fit i64 at planet scale")]
            let id_delta = id_delta as i64;
            did += id_delta;
            let Some(x_delta) = read_varint(&self.data, &mut pos) else {
                break;
            };
            let Some(y_delta) = read_varint(&self.data, &mut pos) else {
                break;
            };
            dx += zigzag_decode(x_delta);
            dy += zigzag_decode(y_delta);

            if did == id {
                #[expect(clippy::cast_possible_truncation, reason = "scaled coordinates fit i32")]
                return Location::from_scaled(dx as i32, dy as i32);
            }
            if did > id {
                break;
            }
        }
        Location::invalid()
    }

    /// Frees all memory. The store can be reused afterward.
    pub fn clear(&mut self) {
        self.data.clear();
        self.data.shrink_to_fit();
        self.index.clear();
        self.count = 0;
        self.last_id = 0;
        self.last_x = 0;
        self.last_y = 0;
    }
}

/// Flat-file dense-array Node Location Store, for planet-scale id spaces
/// where the in-memory store's budget is too tight.
///
/// Layout: `slot[i] = (lon_i32_LE, lat_i32_LE)`, 8 bytes per slot, slot 0
/// reserved as the invalid sentinel and used as a format check at open
/// (spec.md §6).
#[derive(Debug)]
pub struct FlatNodeFile {
    file: File,
    len_slots: u64,
}

const SLOT_BYTES: u64 = 8;

impl FlatNodeFile {
    /// Opens (creating if necessary) a flat node file at `path`. If the
    /// file is newly created, slot 0 is initialized to the invalid
    /// sentinel; if it already existed, slot 0 is checked against the
    /// sentinel and a mismatch is reported as [`NodeLocationError::BadFormat`].
    pub fn open(path: &Path) -> Result<Self, NodeLocationError> {
        let existed = path.exists();
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)
            .map_err(|source| NodeLocationError::Open {
                path: path.display().to_string(),
                source,
            })?;

        let len_slots = file
            .metadata()
            .map_err(NodeLocationError::Read)?
            .len()
            .max(SLOT_BYTES)
            / SLOT_BYTES;

        let mut flat = Self { file, len_slots };

        if existed {
            let slot0 = flat.read_slot(0)?;
            if slot0.is_valid() {
                return Err(NodeLocationError::BadFormat {
                    path: path.display().to_string(),
                });
            }
        } else {
            flat.file
                .set_len(SLOT_BYTES)
                .map_err(NodeLocationError::Write)?;
            flat.write_slot(0, Location::invalid())?;
        }

        Ok(flat)
    }

    fn ensure_len(&mut self, slot: u64) -> Result<(), NodeLocationError> {
        if slot >= self.len_slots {
            let new_len = (slot + 1) * SLOT_BYTES;
            self.file.set_len(new_len).map_err(NodeLocationError::Write)?;
            self.len_slots = slot + 1;
        }
        Ok(())
    }

    #[expect(clippy::indexing_slicing, reason = "buf is a fixed 8-byte array")]
    fn read_slot(&mut self, slot: u64) -> Result<Location, NodeLocationError> {
        if slot >= self.len_slots {
            return Ok(Location::invalid());
        }
        self.file
            .seek(SeekFrom::Start(slot * SLOT_BYTES))
            .map_err(NodeLocationError::Read)?;
        let mut buf = [0u8; 8];
        self.file.read_exact(&mut buf).map_err(NodeLocationError::Read)?;
        let x = i32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]);
        let y = i32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]);
        Ok(Location::from_scaled(x, y))
    }

    #[expect(clippy::indexing_slicing, reason = "buf is a fixed 8-byte array")]
    fn write_slot(&mut self, slot: u64, location: Location) -> Result<(), NodeLocationError> {
        self.ensure_len(slot)?;
        self.file
            .seek(SeekFrom::Start(slot * SLOT_BYTES))
            .map_err(NodeLocationError::Write)?;
        let (x, y) = location.scaled();
        let mut buf = [0u8; 8];
        buf[0..4].copy_from_slice(&x.to_le_bytes());
        buf[4..8].copy_from_slice(&y.to_le_bytes());
        self.file.write_all(&buf).map_err(NodeLocationError::Write)
    }

    /// Stores a location at the slot for `id`. `id` must be non-negative.
    pub fn set(&mut self, id: i64, location: Location) -> Result<(), NodeLocationError> {
        debug_assert!(id >= 0, "node ids are non-negative");
        #[expect(clippy::cast_sign_loss, reason = "id >= 0 asserted above")]
        self.write_slot(id as u64, location)
    }

    /// Returns the location stored for `id`, or an invalid location if `id`
    /// falls outside the file or was never written.
    #[must_use]
    pub fn get(&mut self, id: i64) -> Location {
        if id < 0 {
            return Location::invalid();
        }
        #[expect(clippy::cast_sign_loss, reason = "id >= 0 checked above")]
        self.read_slot(id as u64).unwrap_or_else(|_| Location::invalid())
    }
}

#[cfg(test)]
#[expect(clippy::expect_used, reason = "tests fail fast on setup errors")]
mod tests {
    use super::*;
    use rstest::rstest;
    use tempfile::tempdir;

    #[test]
    fn round_trips_single_entry() {
        let mut store = NodeLocationStore::default();
        let loc = Location::new(98.765_432_1, 12.345_678_9);
        assert!(store.set(1, loc));
        let got = store.get(1);
        assert!((got.lon() - 98.765_432_1).abs() < 1e-6);
        assert!((got.lat() - 12.345_678_9).abs() < 1e-6);
    }

    #[test]
    fn missing_id_returns_invalid() {
        let store = NodeLocationStore::default();
        assert!(!store.get(1).is_valid());
    }

    #[test]
    fn spans_multiple_blocks() {
        let mut store = NodeLocationStore::default();
        for i in 1..=100i64 {
            #[expect(clippy::cast_precision_loss, reason = "test fixture coordinates")]
            let loc = Location::new(i as f64 * 0.001, i as f64 * 0.002);
            assert!(store.set(i, loc));
        }
        for i in 1..=100i64 {
            let got = store.get(i);
            #[expect(clippy::cast_precision_loss, reason = "test fixture coordinates")]
            let expected_lon = i as f64 * 0.001;
            assert!((got.lon() - expected_lon).abs() < 1e-6);
        }
    }

    #[rstest]
    fn flat_file_round_trips(#[values(0i64, 1, 1000, 1_000_000)] id: i64) {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("nodes.bin");
        let mut flat = FlatNodeFile::open(&path).expect("open");
        let loc = Location::new(1.5, -2.5);
        flat.set(id, loc).expect("set");
        let got = flat.get(id);
        assert!((got.lon() - 1.5).abs() < 1e-6);
        assert!((got.lat() - -2.5).abs() < 1e-6);
    }

    #[test]
    fn flat_file_rejects_bad_format_on_reopen() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("nodes.bin");
        std::fs::write(&path, [1u8; 8]).expect("write garbage");
        let err = FlatNodeFile::open(&path).unwrap_err();
        assert!(matches!(err, NodeLocationError::BadFormat { .. }));
    }

    #[test]
    fn flat_file_slot_zero_starts_invalid() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("nodes.bin");
        let mut flat = FlatNodeFile::open(&path).expect("open");
        assert!(!flat.get(0).is_valid());
    }
}
