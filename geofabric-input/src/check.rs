//! `check_input`: the stream-invariant validator (spec.md §3, §4.5,
//! §8 "for any ordered pair of objects").
//!
//! Grounded on `original_source/src/input.{hpp,cpp}`'s `check_input`
//! function, which is called once per object by the orchestrator's pull
//! loop before the object is handed to the middle.

use geofabric_core::osm::ObjectId;

use crate::{OsmObject, Phase};

/// Why an input object was rejected as fatally malformed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InputError {
    #[error("object id {id} is not positive")]
    NonPositiveId { id: ObjectId },

    #[error("object {id} has version 0 (OSM versions are 1-based)")]
    ZeroVersion { id: ObjectId },

    #[error("stream moved from phase {from:?} back to phase {to:?}")]
    PhaseRegression { from: Phase, to: Phase },

    #[error("id {id} does not strictly follow {last_id} within phase {phase:?}")]
    IdNotAscending {
        phase: Phase,
        last_id: ObjectId,
        id: ObjectId,
    },
}

/// Validates one object against the objects seen so far in its stream.
///
/// Grounded on `original_source/src/input.{hpp,cpp}`: objects must arrive
/// node → way → relation, strictly ascending by id within a type, with
/// positive ids and non-zero versions (spec.md §4.5 supplement). Version
/// regressions across separate append runs for the same id are an
/// assumption enforced by the input pipeline that produced the file, not by
/// this validator (spec.md §4.5 supplement) — a single call only ever sees
/// one version of a given id, because a repeated id within a phase is
/// already rejected by the ascending-order check.
#[derive(Debug, Clone, Default)]
pub struct InputValidator {
    last_phase: Option<Phase>,
    last_id_in_phase: Option<ObjectId>,
}

impl InputValidator {
    /// A validator with no history, ready for the first object of a
    /// stream.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Checks `object` against everything seen so far, recording it as the
    /// new "last" on success.
    pub fn check(&mut self, object: &OsmObject) -> Result<(), InputError> {
        let id = object.id();
        let phase = object.phase();

        if id <= 0 {
            return Err(InputError::NonPositiveId { id });
        }
        if object.version() == 0 {
            return Err(InputError::ZeroVersion { id });
        }

        match self.last_phase {
            Some(last_phase) if phase < last_phase => {
                return Err(InputError::PhaseRegression {
                    from: last_phase,
                    to: phase,
                });
            }
            Some(last_phase) if phase == last_phase => {
                if let Some(last_id) = self.last_id_in_phase {
                    if id <= last_id {
                        return Err(InputError::IdNotAscending {
                            phase,
                            last_id,
                            id,
                        });
                    }
                }
            }
            _ => {}
        }

        self.last_phase = Some(phase);
        self.last_id_in_phase = Some(id);
        Ok(())
    }
}

#[cfg(test)]
#[expect(clippy::expect_used, reason = "fixtures should fail fast during setup")]
mod tests {
    use super::*;
    use geofabric_core::osm::{Node, Way};
    use rstest::rstest;

    fn node(id: ObjectId) -> OsmObject {
        OsmObject::Node(Node::new(id, 0.0, 0.0))
    }

    fn way(id: ObjectId, nodes: Vec<ObjectId>) -> OsmObject {
        OsmObject::Way(Way {
            id,
            version: 1,
            nodes,
            tags: geofabric_core::osm::Tags::new(),
            deleted: false,
        })
    }

    #[rstest]
    fn accepts_ascending_ids_within_a_phase() {
        let mut validator = InputValidator::new();
        assert!(validator.check(&node(1)).is_ok());
        assert!(validator.check(&node(2)).is_ok());
        assert!(validator.check(&node(3)).is_ok());
    }

    #[rstest]
    fn rejects_non_ascending_id_within_a_phase() {
        let mut validator = InputValidator::new();
        validator.check(&node(5)).expect("first id accepted");
        let err = validator.check(&node(5)).expect_err("duplicate id rejected");
        assert!(matches!(err, InputError::IdNotAscending { .. }));
    }

    #[rstest]
    fn accepts_phase_progression_node_then_way() {
        let mut validator = InputValidator::new();
        validator.check(&node(1)).expect("node accepted");
        assert!(validator.check(&way(1, vec![1])).is_ok());
    }

    #[rstest]
    fn rejects_phase_regression() {
        let mut validator = InputValidator::new();
        validator.check(&way(1, vec![1])).expect("way accepted");
        let err = validator.check(&node(2)).expect_err("regression rejected");
        assert!(matches!(err, InputError::PhaseRegression { .. }));
    }

    #[rstest]
    fn rejects_non_positive_id() {
        let mut validator = InputValidator::new();
        let err = validator.check(&node(0)).expect_err("zero id rejected");
        assert!(matches!(err, InputError::NonPositiveId { .. }));
    }

    #[rstest]
    fn rejects_zero_version() {
        let mut validator = InputValidator::new();
        let mut n = Node::new(1, 0.0, 0.0);
        n.version = 0;
        let err = validator
            .check(&OsmObject::Node(n))
            .expect_err("zero version rejected");
        assert!(matches!(err, InputError::ZeroVersion { .. }));
    }
}
