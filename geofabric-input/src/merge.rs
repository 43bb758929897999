//! Merges N already-ordered per-file object streams into one globally
//! ordered stream with duplicate suppression (spec.md §4.5 "Multi file").
//!
//! Grounded on `original_source/src/input.{hpp,cpp}`: a priority queue
//! keyed by `(type, id, version)`, smallest wins; when the next-smallest
//! item is the same `(type, id)` as the one just emitted, it is a
//! duplicate from an overlapping extract and is discarded rather than
//! re-delivered.

use std::iter::Peekable;

use geofabric_core::osm::ObjectId;

use crate::{OsmObject, Phase};

/// A boxed per-file stream; each source is expected to have already passed
/// through its own [`crate::check::InputValidator`].
pub type Source = Box<dyn Iterator<Item = Result<OsmObject, crate::reader::ReaderError>>>;

/// Merges several ordered, validated sources into one ordered,
/// duplicate-suppressed stream.
pub struct MultiFileMerge {
    sources: Vec<Peekable<Source>>,
}

impl MultiFileMerge {
    /// Builds a merge over `sources`. Each source must already yield
    /// objects in strictly ascending `(phase, id)` order.
    #[must_use]
    pub fn new(sources: Vec<Source>) -> Self {
        Self {
            sources: sources.into_iter().map(Iterator::peekable).collect(),
        }
    }
}

/// `(phase, id, version)` — the priority-queue ordering key.
type OrderKey = (Phase, ObjectId, u32);

fn order_key(object: &OsmObject) -> OrderKey {
    (object.phase(), object.id(), object.version())
}

/// `(phase, id)` — duplicates are suppressed on this, not the full order
/// key, since two files may legitimately disagree on an overlapping
/// object's version (spec.md §4.5).
fn identity_key(object: &OsmObject) -> (Phase, ObjectId) {
    (object.phase(), object.id())
}

impl Iterator for MultiFileMerge {
    type Item = Result<OsmObject, crate::reader::ReaderError>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut best: Option<(usize, OrderKey)> = None;
        for (idx, source) in self.sources.iter_mut().enumerate() {
            match source.peek() {
                Some(Ok(object)) => {
                    let key = order_key(object);
                    if best.as_ref().is_none_or(|(_, best_key)| key < *best_key) {
                        best = Some((idx, key));
                    }
                }
                Some(Err(_)) => return source.next(),
                None => {}
            }
        }
        let (best_idx, best_key) = best?;
        let best_identity = (best_key.0, best_key.1);

        let mut result = None;
        for (idx, source) in self.sources.iter_mut().enumerate() {
            if idx == best_idx {
                result = source.next();
            } else if matches!(source.peek(), Some(Ok(object)) if identity_key(object) == best_identity)
            {
                source.next();
            }
        }
        result
    }
}

#[cfg(test)]
#[expect(clippy::expect_used, reason = "fixtures should fail fast during setup")]
mod tests {
    use super::*;
    use crate::reader::ReaderError;
    use geofabric_core::osm::Node;

    fn node_source(ids: Vec<ObjectId>) -> Source {
        Box::new(
            ids.into_iter()
                .map(|id| Ok(OsmObject::Node(Node::new(id, 0.0, 0.0)))),
        )
    }

    #[test]
    fn merges_disjoint_sources_in_id_order() {
        let merge = MultiFileMerge::new(vec![node_source(vec![1, 3, 5]), node_source(vec![2, 4])]);
        let ids: Vec<ObjectId> = merge
            .map(|r| r.expect("ok").id())
            .collect();
        assert_eq!(ids, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn suppresses_duplicate_ids_across_sources() {
        let merge = MultiFileMerge::new(vec![node_source(vec![5, 6]), node_source(vec![5, 7])]);
        let ids: Vec<ObjectId> = merge
            .map(|r| r.expect("ok").id())
            .collect();
        assert_eq!(ids, vec![5, 6, 7]);
    }

    #[test]
    fn single_source_passes_through_unchanged() {
        let merge = MultiFileMerge::new(vec![node_source(vec![1, 2, 3])]);
        let ids: Vec<ObjectId> = merge
            .map(|r| r.expect("ok").id())
            .collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn propagates_reader_errors_immediately() {
        let errored: Source = Box::new(std::iter::once(Err(ReaderError::WorkerPanicked {
            path: "x.osm.pbf".into(),
        })));
        let mut merge = MultiFileMerge::new(vec![errored, node_source(vec![1])]);
        assert!(merge.next().expect("one item").is_err());
    }
}
