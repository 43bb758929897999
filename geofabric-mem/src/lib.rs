//! The RAM middle: an in-memory `Middle`/`MiddleQuery` implementation for
//! one-shot imports that fit entirely in memory (spec.md §4.3).
//!
//! Grounded on `middle_ram_t` (`original_source/src/middle-ram.{hpp,cpp}`).
//! The original stores objects in an `osmium::memory::Buffer` (a raw,
//! append-only byte arena) addressed by the Id Index. Reproducing that byte
//! layout in Rust buys nothing — spec.md §9 notes the layout itself is not
//! part of the contract — so full objects are kept in a plain `Vec<T>`
//! indexed by the Id Index's offset (the offset is a `Vec` index here,
//! rather than a byte offset into an arena). Way node lists that are stored
//! without their parent way (`full_ways` not requested) are kept in a flat
//! `Vec<ObjectId>` arena of `[count, id, id, ...]` runs, addressed the same
//! way; this keeps the one-IdIndex-per-store shape of the original without
//! its byte-packing, which is unnecessary absent a data structure with
//! per-byte memory pressure.
//!
//! The RAM middle does not support append mode: `get_node_parents` and
//! `get_way_parents` are only meaningful against a database that already
//! holds the previous state of the data, which the RAM middle discards on
//! `stop` (spec.md §4.3, "RAM variant ... does not implement parent
//! queries").

#![forbid(unsafe_code)]

use std::sync::{Arc, RwLock};

use geofabric_core::idindex::{IdIndex, NOT_FOUND};
use geofabric_core::idlist::IdList;
use geofabric_core::middle::{EntityBits, Middle, MiddleError, MiddleQuery, OutputRequirements};
use geofabric_core::node_location::{Location, NodeLocationStore};
use geofabric_core::osm::{MemberType, Node, ObjectId, Relation, Way};

/// Caps the in-memory Node Location Store (spec.md §4.2); the RAM middle has
/// no disk fallback, so this is simply a generous default rather than a
/// hard resource limit derived from a configured cache size.
const DEFAULT_LOCATION_STORE_BYTES: usize = 1024 * 1024 * 1024;

/// Which internal stores are populated, mirroring `middle_ram_t`'s
/// `m_store_options` (`original_source/src/middle-ram.cpp`,
/// `middle_ram_options` defaults: `locations=true, way_nodes=true` and
/// everything else `false`).
#[derive(Debug, Clone, Copy)]
struct StoreOptions {
    locations: bool,
    way_nodes: bool,
    nodes: bool,
    ways: bool,
    relations: bool,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            locations: true,
            way_nodes: true,
            nodes: false,
            ways: false,
            relations: false,
        }
    }
}

#[derive(Debug)]
struct RamMiddleData {
    options: StoreOptions,
    locations: NodeLocationStore,
    nodes: Vec<Node>,
    node_index: IdIndex,
    ways: Vec<Way>,
    way_index: IdIndex,
    way_nodes_data: Vec<ObjectId>,
    way_nodes_index: IdIndex,
    relations: Vec<Relation>,
    relation_index: IdIndex,
}

impl Default for RamMiddleData {
    fn default() -> Self {
        Self {
            options: StoreOptions::default(),
            locations: NodeLocationStore::new(DEFAULT_LOCATION_STORE_BYTES),
            nodes: Vec::new(),
            node_index: IdIndex::new(),
            ways: Vec::new(),
            way_index: IdIndex::new(),
            way_nodes_data: Vec::new(),
            way_nodes_index: IdIndex::new(),
            relations: Vec::new(),
            relation_index: IdIndex::new(),
        }
    }
}

impl RamMiddleData {
    fn store_way_node_list(&mut self, way_id: ObjectId, nodes: &[ObjectId]) {
        let offset = self.way_nodes_data.len();
        self.way_nodes_index.add(way_id, offset);
        #[expect(
            clippy::cast_possible_wrap,
            reason = "way node counts are bounded well under i64::MAX"
        )]
        self.way_nodes_data.push(nodes.len() as ObjectId);
        self.way_nodes_data.extend_from_slice(nodes);
    }

    fn load_way_node_list(&self, way_id: ObjectId) -> Option<&[ObjectId]> {
        let offset = self.way_nodes_index.get(way_id);
        if offset == NOT_FOUND {
            return None;
        }
        let count_idx = offset;
        #[expect(
            clippy::cast_sign_loss,
            reason = "count was stored as a non-negative length"
        )]
        let count = *self.way_nodes_data.get(count_idx)? as usize;
        let start = count_idx + 1;
        self.way_nodes_data.get(start..start + count)
    }

    fn way_from_node_list(&self, way_id: ObjectId) -> Option<Way> {
        self.load_way_node_list(way_id).map(|nodes| Way {
            id: way_id,
            version: 0,
            nodes: nodes.to_vec(),
            tags: geofabric_core::osm::Tags::new(),
            deleted: false,
        })
    }
}

/// An in-memory `Middle`. Populate it by calling [`Middle::node`],
/// [`Middle::way`], [`Middle::relation`] in id order, then share read
/// access via [`Middle::get_query_instance`].
#[derive(Debug, Clone, Default)]
pub struct RamMiddle {
    data: Arc<RwLock<RamMiddleData>>,
}

impl RamMiddle {
    /// Builds an empty RAM middle with the default store options
    /// (`locations` and `way_nodes` only; see [`OutputRequirements`]).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[expect(
    clippy::expect_used,
    reason = "the lock is only ever poisoned by a prior panic in this same process, at which \
              point propagating is not meaningfully safer than continuing"
)]
#[expect(
    clippy::missing_panics_doc,
    reason = "panics only on lock poisoning, see the expect_used justification on this impl"
)]
impl Middle for RamMiddle {
    type Query = RamMiddleQuery;

    fn set_requirements(&mut self, requirements: OutputRequirements) {
        let mut data = self.data.write().expect("ram middle lock poisoned");
        data.options.nodes = requirements.full_nodes;
        if requirements.full_ways {
            data.options.ways = true;
            data.options.way_nodes = false;
        }
        data.options.relations = requirements.full_relations;
    }

    fn node(&mut self, node: &Node) -> Result<(), MiddleError> {
        let mut data = self.data.write().expect("ram middle lock poisoned");
        if data.options.locations {
            data.locations.set(node.id, Location::new(node.lon, node.lat));
        }
        if data.options.nodes {
            let idx = data.nodes.len();
            data.node_index.add(node.id, idx);
            data.nodes.push(node.clone());
        }
        Ok(())
    }

    fn way(&mut self, way: &Way) -> Result<(), MiddleError> {
        let mut data = self.data.write().expect("ram middle lock poisoned");
        if data.options.ways {
            let idx = data.ways.len();
            data.way_index.add(way.id, idx);
            data.ways.push(way.clone());
        } else if data.options.way_nodes {
            data.store_way_node_list(way.id, &way.nodes);
        }
        Ok(())
    }

    fn relation(&mut self, relation: &Relation) -> Result<(), MiddleError> {
        let mut data = self.data.write().expect("ram middle lock poisoned");
        if data.options.relations {
            let idx = data.relations.len();
            data.relation_index.add(relation.id, idx);
            data.relations.push(relation.clone());
        }
        Ok(())
    }

    fn after_nodes(&mut self) -> Result<(), MiddleError> {
        log::debug!("ram middle: node phase complete, {} nodes stored", {
            let data = self.data.read().expect("ram middle lock poisoned");
            data.nodes.len()
        });
        Ok(())
    }

    fn after_ways(&mut self) -> Result<(), MiddleError> {
        log::debug!("ram middle: way phase complete, {} ways stored", {
            let data = self.data.read().expect("ram middle lock poisoned");
            data.ways.len()
        });
        Ok(())
    }

    fn after_relations(&mut self) -> Result<(), MiddleError> {
        log::debug!("ram middle: relation phase complete, {} relations stored", {
            let data = self.data.read().expect("ram middle lock poisoned");
            data.relations.len()
        });
        Ok(())
    }

    fn get_node_parents(&self, _changed_nodes: &IdList) -> Result<(IdList, IdList), MiddleError> {
        Err(MiddleError::Database(
            "ram middle does not support append mode (no parent-dependency tracking)".to_owned(),
        ))
    }

    fn get_way_parents(&self, _changed_ways: &IdList) -> Result<IdList, MiddleError> {
        Err(MiddleError::Database(
            "ram middle does not support append mode (no parent-dependency tracking)".to_owned(),
        ))
    }

    fn get_query_instance(&self) -> Self::Query {
        RamMiddleQuery {
            data: Arc::clone(&self.data),
        }
    }

    fn stop(&mut self, drop_middle: bool) -> Result<(), MiddleError> {
        if drop_middle {
            let mut data = self.data.write().expect("ram middle lock poisoned");
            *data = RamMiddleData::default();
        }
        Ok(())
    }

    fn wait(&mut self) -> Result<(), MiddleError> {
        Ok(())
    }
}

/// A cheap, shareable read handle onto a [`RamMiddle`]'s contents. Cloning
/// just clones the `Arc` (spec.md §4.3 supplement on worker-thread handles).
#[derive(Debug, Clone)]
pub struct RamMiddleQuery {
    data: Arc<RwLock<RamMiddleData>>,
}

#[expect(
    clippy::expect_used,
    reason = "the lock is only ever poisoned by a prior panic in this same process"
)]
#[expect(
    clippy::missing_panics_doc,
    reason = "panics only on lock poisoning, see the expect_used justification on this impl"
)]
impl MiddleQuery for RamMiddleQuery {
    fn get_node_location(&self, id: ObjectId) -> Location {
        let data = self.data.read().expect("ram middle lock poisoned");
        data.locations.get(id)
    }

    fn nodes_get_list(&self, way_nodes: &[ObjectId]) -> Vec<(ObjectId, Location)> {
        let data = self.data.read().expect("ram middle lock poisoned");
        way_nodes
            .iter()
            .map(|&id| (id, data.locations.get(id)))
            .filter(|(_, location)| location.is_valid())
            .collect()
    }

    fn node_get(&self, id: ObjectId) -> Option<Node> {
        let data = self.data.read().expect("ram middle lock poisoned");
        if !data.options.nodes {
            return None;
        }
        let idx = data.node_index.get(id);
        if idx == NOT_FOUND {
            return None;
        }
        data.nodes.get(idx).cloned()
    }

    fn way_get(&self, id: ObjectId) -> Option<Way> {
        let data = self.data.read().expect("ram middle lock poisoned");
        if data.options.ways {
            let idx = data.way_index.get(id);
            if idx == NOT_FOUND {
                return None;
            }
            return data.ways.get(idx).cloned();
        }
        if data.options.way_nodes {
            return data.way_from_node_list(id);
        }
        None
    }

    fn relation_get(&self, id: ObjectId) -> Option<Relation> {
        let data = self.data.read().expect("ram middle lock poisoned");
        if !data.options.relations {
            return None;
        }
        let idx = data.relation_index.get(id);
        if idx == NOT_FOUND {
            return None;
        }
        data.relations.get(idx).cloned()
    }

    fn rel_members_get(&self, rel_id: ObjectId, entity_bits: EntityBits) -> Vec<(ObjectId, char)> {
        let Some(relation) = self.relation_get(rel_id) else {
            return Vec::new();
        };
        relation
            .members
            .into_iter()
            .filter(|member| match member.member_type {
                MemberType::Node => entity_bits.nodes,
                MemberType::Way => entity_bits.ways,
                MemberType::Relation => false,
            })
            .map(|member| (member.member_id, member.member_type.code()))
            .collect()
    }
}

#[cfg(test)]
#[expect(clippy::expect_used, reason = "fixtures should fail fast during setup")]
mod tests {
    use super::*;
    use geofabric_core::osm::{Member, Tags};
    use rstest::{fixture, rstest};

    #[fixture]
    fn sample_node() -> Node {
        Node::new(1, 12.5, 54.25)
    }

    #[rstest]
    fn node_round_trips_through_location_store(sample_node: Node) {
        let mut middle = RamMiddle::new();
        middle.node(&sample_node).expect("node write");
        let query = middle.get_query_instance();
        let location = query.get_node_location(1);
        assert!(location.is_valid());
        assert!((location.lon() - 12.5).abs() < 1e-6);
        assert!((location.lat() - 54.25).abs() < 1e-6);
    }

    #[rstest]
    fn full_node_storage_requires_requirement() {
        let mut middle = RamMiddle::new();
        middle.node(&Node::new(7, 1.0, 1.0)).expect("node write");
        assert_eq!(middle.get_query_instance().node_get(7), None);

        middle.set_requirements(OutputRequirements::new(true, false, false));
        middle.node(&Node::new(8, 2.0, 2.0)).expect("node write");
        let stored = middle.get_query_instance().node_get(8);
        assert_eq!(stored.map(|n| n.id), Some(8));
    }

    #[rstest]
    fn way_with_ten_nodes_round_trips_node_ids_without_full_way_storage() {
        let mut middle = RamMiddle::new();
        let node_ids: Vec<ObjectId> = (1..=10).collect();
        let way = Way {
            id: 100,
            version: 1,
            nodes: node_ids.clone(),
            tags: Tags::new(),
            deleted: false,
        };
        middle.way(&way).expect("way write");
        let resolved = middle
            .get_query_instance()
            .way_get(100)
            .expect("way nodes were stored");
        assert_eq!(resolved.nodes, node_ids);
    }

    #[rstest]
    fn way_get_returns_full_way_when_requested() {
        let mut middle = RamMiddle::new();
        middle.set_requirements(OutputRequirements::new(false, true, false));
        let mut tags = Tags::new();
        tags.insert("highway".to_owned(), "residential".to_owned());
        let way = Way {
            id: 200,
            version: 3,
            nodes: vec![1, 2, 3],
            tags,
            deleted: false,
        };
        middle.way(&way).expect("way write");
        let resolved = middle.get_query_instance().way_get(200).expect("way stored");
        assert_eq!(resolved, way);
    }

    #[rstest]
    fn relation_with_mixed_members_resolves_requested_member_kinds() {
        let mut middle = RamMiddle::new();
        middle.set_requirements(OutputRequirements::new(false, false, true));
        let relation = Relation {
            id: 300,
            version: 1,
            members: vec![
                Member {
                    member_type: MemberType::Node,
                    member_id: 1,
                    role: "stop".to_owned(),
                },
                Member {
                    member_type: MemberType::Way,
                    member_id: 2,
                    role: "outer".to_owned(),
                },
                Member {
                    member_type: MemberType::Relation,
                    member_id: 3,
                    role: "child".to_owned(),
                },
            ],
            tags: Tags::new(),
            deleted: false,
        };
        middle.relation(&relation).expect("relation write");
        let query = middle.get_query_instance();

        let node_only = query.rel_members_get(300, EntityBits::NODE);
        assert_eq!(node_only, vec![(1, 'N')]);

        let all = query.rel_members_get(300, EntityBits::ALL);
        assert_eq!(all, vec![(1, 'N'), (2, 'W')]);
    }

    #[rstest]
    fn get_node_parents_reports_unsupported() {
        let middle = RamMiddle::new();
        let err = middle.get_node_parents(&IdList::new());
        assert!(err.is_err());
    }

    #[rstest]
    fn stop_with_drop_clears_stored_locations() {
        let mut middle = RamMiddle::new();
        middle.node(&Node::new(5, 3.0, 3.0)).expect("node write");
        middle.stop(true).expect("stop");
        let location = middle.get_query_instance().get_node_location(5);
        assert!(!location.is_valid());
    }
}
