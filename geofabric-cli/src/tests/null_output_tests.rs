use geofabric_core::middle::{EntityBits, MiddleQuery};
use geofabric_core::node_location::Location;
use geofabric_core::osm::{Node, ObjectId, Relation, Way};
use geofabric_engine::Output;
use rstest::rstest;

use crate::null_output::NullOutput;

#[derive(Debug, Default, Clone)]
struct StubQuery;

impl MiddleQuery for StubQuery {
    fn get_node_location(&self, _id: ObjectId) -> Location {
        Location::invalid()
    }

    fn nodes_get_list(&self, _way_nodes: &[ObjectId]) -> Vec<(ObjectId, Location)> {
        Vec::new()
    }

    fn node_get(&self, _id: ObjectId) -> Option<Node> {
        None
    }

    fn way_get(&self, _id: ObjectId) -> Option<Way> {
        None
    }

    fn relation_get(&self, _id: ObjectId) -> Option<Relation> {
        None
    }

    fn rel_members_get(&self, _rel_id: ObjectId, _bits: EntityBits) -> Vec<(ObjectId, char)> {
        Vec::new()
    }
}

#[rstest]
fn every_callback_is_a_no_op() {
    let output: NullOutput<StubQuery> = NullOutput::new();
    output.start().expect("no-op succeeds");
    output
        .node_add(&Node::new(1, 0.0, 0.0))
        .expect("no-op succeeds");
    output.node_delete(1).expect("no-op succeeds");
    output.after_nodes().expect("no-op succeeds");
    output.after_ways().expect("no-op succeeds");
    output.after_relations().expect("no-op succeeds");
    output.sync().expect("no-op succeeds");
    output.reprocess_marked().expect("no-op succeeds");
    output.free_middle_references().expect("no-op succeeds");
    output.stop().expect("no-op succeeds");
    output.wait().expect("no-op succeeds");

    assert!(output.get_marked_node_ids().is_empty());
    assert!(output.get_marked_way_ids().is_empty());
}

#[rstest]
fn clone_for_worker_ignores_the_query() {
    let output: NullOutput<StubQuery> = NullOutput::new();
    let worker = output.clone_for_worker(StubQuery);
    worker.sync().expect("cloned worker is also a no-op");
    output.merge_expire_trees(&worker);
}
