//! The Id Index: a memory-efficient, append-only map from OSM object id to a
//! byte offset in some backing store (spec.md §4.1).
//!
//! Grounded on `ordered_index_t`
//! (`original_source/src/ordered-index.{hpp,cpp}`): a two-level structure —
//! a first level of contiguous id ranges, each owning a second-level vector
//! of 32-bit (id, offset) deltas relative to the range's first id and
//! offset. A range never resizes in place; a new one starts when the
//! current block is full or when the next delta would overflow `u32`.

/// Sentinel returned by [`IdIndex::get`]/[`IdIndex::get_block`] when the id
/// (or any smaller id, for `get_block`) was never added.
pub const NOT_FOUND: usize = usize::MAX;

/// Second-level blocks start at this many entries and double on every new
/// range up to [`MAX_BLOCK_SIZE`] (`original_source/src/ordered-index.hpp`).
pub const DEFAULT_INITIAL_BLOCK_SIZE: usize = 1024 * 1024;

/// Upper bound on second-level block size.
pub const MAX_BLOCK_SIZE: usize = 16 * 1024 * 1024;

#[derive(Debug, Clone, Copy)]
struct SecondLevelEntry {
    id: u32,
    offset: u32,
}

#[derive(Debug)]
struct RangeEntry {
    index: Vec<SecondLevelEntry>,
    from: i64,
    to: i64,
    offset_from: usize,
    block_size: usize,
}

impl RangeEntry {
    fn new(id: i64, offset: usize, block_size: usize) -> Self {
        Self {
            index: Vec::with_capacity(block_size),
            from: id,
            to: id,
            offset_from: offset,
            block_size,
        }
    }

    fn full(&self) -> bool {
        self.index.len() == self.block_size
    }
}

/// An append-only `id -> offset` map. See the module docs for the design.
#[derive(Debug)]
pub struct IdIndex {
    ranges: Vec<RangeEntry>,
    block_size: usize,
    capacity: usize,
    size: usize,
}

impl Default for IdIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl IdIndex {
    /// Builds an index whose first second-level block holds
    /// [`DEFAULT_INITIAL_BLOCK_SIZE`] entries.
    #[must_use]
    pub fn new() -> Self {
        Self::with_initial_block_size(DEFAULT_INITIAL_BLOCK_SIZE)
    }

    /// Builds an index with a caller-chosen initial block size (tests use a
    /// small value to exercise range rollover without allocating megabytes).
    #[must_use]
    pub fn with_initial_block_size(initial_block_size: usize) -> Self {
        Self {
            ranges: Vec::new(),
            block_size: initial_block_size.max(1),
            capacity: 0,
            size: 0,
        }
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[must_use]
    pub fn size(&self) -> usize {
        self.size
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Approximate bytes currently allocated.
    #[must_use]
    pub fn used_memory(&self) -> usize {
        self.ranges.capacity() * std::mem::size_of::<RangeEntry>()
            + self.capacity * std::mem::size_of::<SecondLevelEntry>()
    }

    /// True if the next `add()` will need to start a new range.
    #[must_use]
    pub fn will_resize(&self) -> bool {
        self.size + 1 >= self.capacity
    }

    /// Frees all memory. The index cannot be reused afterward.
    pub fn clear(&mut self) {
        self.ranges.clear();
        self.ranges.shrink_to_fit();
        self.capacity = 0;
        self.size = 0;
    }

    fn needs_new_range(&self, id: i64, offset: usize) -> bool {
        let Some(last) = self.ranges.last() else {
            return true;
        };
        if last.full() {
            return true;
        }
        let id_delta_overflows = id.checked_sub(last.from).is_none_or(|d| d > i64::from(u32::MAX));
        let offset_delta_overflows = offset
            .checked_sub(last.offset_from)
            .is_none_or(|d| d >= u32::MAX as usize);
        id_delta_overflows || offset_delta_overflows
    }

    /// Appends an entry. `id` and `offset` must each be strictly greater
    /// than the previously added id and offset — a precondition violation,
    /// not a recoverable error (spec.md §4.1).
    ///
    /// # Panics
    /// In debug builds, panics if `id`/`offset` do not strictly increase.
    #[expect(clippy::expect_used, reason = "invariant guaranteed by needs_new_range just above")]
    pub fn add(&mut self, id: i64, offset: usize) {
        if let Some(last) = self.ranges.last() {
            debug_assert!(
                last.to < id,
                "ids must be added in strictly ascending order"
            );
            let last_offset = last.offset_from
                + last
                    .index
                    .last()
                    .map(|e| e.offset as usize)
                    .unwrap_or(0);
            debug_assert!(
                last_offset < offset,
                "offsets must be added in strictly ascending order"
            );
        }

        if self.needs_new_range(id, offset) {
            if let Some(last) = self.ranges.last_mut() {
                last.to = id - 1;
            }
            self.ranges.push(RangeEntry::new(id, offset, self.block_size));
            self.capacity += self.block_size;
            if self.block_size < MAX_BLOCK_SIZE {
                self.block_size <<= 1;
            }
        }

        let range = self.ranges.last_mut().expect("range just ensured");
        #[expect(clippy::cast_possible_truncation, reason = "bounded by needs_new_range")]
        let id_delta = (id - range.from) as u32;
        #[expect(clippy::cast_possible_truncation, reason = "bounded by needs_new_range")]
        let offset_delta = (offset - range.offset_from) as u32;
        range.index.push(SecondLevelEntry {
            id: id_delta,
            offset: offset_delta,
        });
        range.to = id;
        self.size += 1;
    }

    /// Returns the offset for `id`, or [`NOT_FOUND`] if it was never added.
    #[must_use]
    pub fn get(&self, id: i64) -> usize {
        let (found_id, offset) = self.get_internal(id);
        if found_id == id { offset } else { NOT_FOUND }
    }

    /// Returns the offset for the largest indexed id `<= id`, or
    /// [`NOT_FOUND`] if `id` is smaller than every indexed id.
    #[must_use]
    pub fn get_block(&self, id: i64) -> usize {
        self.get_internal(id).1
    }

    #[expect(
        clippy::expect_used,
        reason = "non-empty ranges and block floor are guaranteed by construction"
    )]
    fn get_internal(&self, id: i64) -> (i64, usize) {
        if self.ranges.is_empty() {
            return (0, NOT_FOUND);
        }

        let range_idx = self.ranges.partition_point(|r| r.to < id);

        let Some(range) = self.ranges.get(range_idx) else {
            let last = self.ranges.last().expect("checked non-empty above");
            let last_entry = last.index.last().expect("range always has >=1 entry");
            return (
                last.from + i64::from(last_entry.id),
                last.offset_from + last_entry.offset as usize,
            );
        };

        if id < range.from {
            return (0, NOT_FOUND);
        }

        #[expect(clippy::cast_possible_truncation, reason = "id within u32 range of from")]
        let target = (id - range.from) as u32;
        let entry_idx = range.index.partition_point(|e| e.id <= target);
        debug_assert!(entry_idx > 0, "first entry in a block always has id delta 0");
        let entry = range
            .index
            .get(entry_idx - 1)
            .copied()
            .expect("entry_idx > 0 and within bounds by partition_point");
        (
            range.from + i64::from(entry.id),
            range.offset_from + entry.offset as usize,
        )
    }
}
