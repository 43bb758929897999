//! The OSM object model: nodes, ways, relations, members, and tags.

use std::collections::HashMap;

/// A 64-bit OSM object id. Always positive; negative ids are rejected at the
/// input boundary (see `geofabric-input`), not represented here.
pub type ObjectId = i64;

/// Unordered key/value tags attached to an OSM object. Keys are unique
/// within an object.
pub type Tags = HashMap<String, String>;

/// A node: an id plus a location, optionally tagged.
///
/// ```
/// use geofabric_core::osm::Node;
///
/// let n = Node::new(1, 12.345_678_9, 98.765_432_1);
/// assert!(!n.is_tagged());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub id: ObjectId,
    pub version: u32,
    pub lon: f64,
    pub lat: f64,
    pub tags: Tags,
    pub deleted: bool,
}

impl Node {
    /// Builds an untagged node at `(lon, lat)` with version 1.
    #[must_use]
    pub fn new(id: ObjectId, lon: f64, lat: f64) -> Self {
        Self {
            id,
            version: 1,
            lon,
            lat,
            tags: Tags::new(),
            deleted: false,
        }
    }

    /// A node is tagged if its tag set is non-empty (spec.md §3).
    #[must_use]
    pub fn is_tagged(&self) -> bool {
        !self.tags.is_empty()
    }
}

/// A way: an ordered sequence of node ids (1..32767 per spec.md §3),
/// optionally tagged.
#[derive(Debug, Clone, PartialEq)]
pub struct Way {
    pub id: ObjectId,
    pub version: u32,
    pub nodes: Vec<ObjectId>,
    pub tags: Tags,
    pub deleted: bool,
}

impl Way {
    #[must_use]
    pub fn is_tagged(&self) -> bool {
        !self.tags.is_empty()
    }
}

/// The kind of object a relation member refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemberType {
    Node,
    Way,
    Relation,
}

impl MemberType {
    /// The single-letter code used in the persistent middle's JSON member
    /// encoding (spec.md §4.3 "Member encoding").
    #[must_use]
    pub const fn code(self) -> char {
        match self {
            Self::Node => 'N',
            Self::Way => 'W',
            Self::Relation => 'R',
        }
    }
}

/// A single (member_type, member_id, role) triple referenced by a relation.
#[derive(Debug, Clone, PartialEq)]
pub struct Member {
    pub member_type: MemberType,
    pub member_id: ObjectId,
    pub role: String,
}

/// Relations with more than this many members are ignored with a warning
/// (spec.md §3 and §4.6).
pub const MAX_RELATION_MEMBERS: usize = 32_767;

/// A relation: an ordered sequence of members, optionally tagged.
#[derive(Debug, Clone, PartialEq)]
pub struct Relation {
    pub id: ObjectId,
    pub version: u32,
    pub members: Vec<Member>,
    pub tags: Tags,
    pub deleted: bool,
}

impl Relation {
    #[must_use]
    pub fn is_tagged(&self) -> bool {
        !self.tags.is_empty()
    }

    /// True when the member count exceeds [`MAX_RELATION_MEMBERS`] and the
    /// relation must be skipped (spec.md §4.6).
    #[must_use]
    pub fn exceeds_member_limit(&self) -> bool {
        self.members.len() > MAX_RELATION_MEMBERS
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn untagged_node_reports_not_tagged() {
        let n = Node::new(1, 0.0, 0.0);
        assert!(!n.is_tagged());
    }

    #[test]
    fn tagged_node_reports_tagged() {
        let mut n = Node::new(1, 0.0, 0.0);
        n.tags.insert("historic".to_owned(), "monument".to_owned());
        assert!(n.is_tagged());
    }

    #[test]
    fn relation_over_limit_is_flagged() {
        let members = (0..=MAX_RELATION_MEMBERS)
            .map(|i| Member {
                member_type: MemberType::Node,
                member_id: i as ObjectId,
                role: String::new(),
            })
            .collect();
        let rel = Relation {
            id: 1,
            version: 1,
            members,
            tags: Tags::new(),
            deleted: false,
        };
        assert!(rel.exceeds_member_limit());
    }

    #[test]
    fn member_type_code_matches_persistent_encoding() {
        assert_eq!(MemberType::Node.code(), 'N');
        assert_eq!(MemberType::Way.code(), 'W');
        assert_eq!(MemberType::Relation.code(), 'R');
    }
}
