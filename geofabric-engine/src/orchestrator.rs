//! `Osmdata`: sequences the phases, delivers per-object callbacks to the
//! middle and output, and drives append-mode dependency propagation and
//! pending-object reprocessing (spec.md §4.6).
//!
//! Grounded on `original_source/src/osmdata.cpp` (`osmdata_t`) and
//! `dependency-manager.{hpp,cpp}`.

use std::sync::Mutex;
use std::thread;
use std::time::Duration;

use geofabric_core::idlist::IdList;
use geofabric_core::middle::{Middle, MiddleError};
use geofabric_core::osm::{Node, ObjectId, Relation, Way, MAX_RELATION_MEMBERS};

use crate::dependency_manager::DependencyManager;
use crate::output::Output;

/// Below this many pending ids, processing runs inline on the calling
/// thread rather than spinning up a worker pool (`osmdata.cpp`'s
/// `multithreaded_processor::process_queue`: "Worker startup is quite
/// expensive").
pub const INLINE_THRESHOLD: usize = 100;

/// Errors from any orchestrator-level failure: the middle, the output, or
/// the orchestrator's own phase-sequencing logic.
#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error("middle error: {0}")]
    Middle(#[from] MiddleError),
    #[error("output error: {0}")]
    Output(String),
}

/// An axis-aligned bounding box in degrees; nodes outside it are dropped
/// silently during import (spec.md §4.6 "if a bounding-box filter is
/// configured and the node lies outside, drop silently").
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_lon: f64,
    pub min_lat: f64,
    pub max_lon: f64,
    pub max_lat: f64,
}

impl BoundingBox {
    #[must_use]
    pub const fn contains(&self, lon: f64, lat: f64) -> bool {
        lon >= self.min_lon && lon <= self.max_lon && lat >= self.min_lat && lat <= self.max_lat
    }
}

/// Run-scoped flags driving phase behaviour (spec.md §4.6, §6).
#[derive(Debug, Clone, Copy, Default)]
pub struct OsmdataOptions {
    pub append: bool,
    /// Discard the middle's contents once the output no longer needs them,
    /// rather than handing them off to the database's own indexing.
    pub drop_middle: bool,
    /// Store every object's tags/attributes regardless of whether the
    /// output would otherwise skip an untagged one (mirrors
    /// `with_extra_attrs` in the original, folded together with "extra
    /// attributes" since both force a `modify`/`add` rather than a
    /// `delete` for an untagged object).
    pub with_extra_attrs: bool,
    /// Worker threads for the stage 1b pending processor.
    pub num_threads: usize,
    pub bbox: Option<BoundingBox>,
}

/// Sequences OSM object ingestion through the middle and output, generic
/// over the concrete middle, dependency manager, and output in use.
pub struct Osmdata<M, D, O>
where
    M: Middle,
    D: DependencyManager<M>,
    O: Output<Query = M::Query>,
{
    mid: M,
    dependency_manager: D,
    output: O,
    options: OsmdataOptions,
}

impl<M, D, O> Osmdata<M, D, O>
where
    M: Middle,
    D: DependencyManager<M>,
    O: Output<Query = M::Query>,
{
    pub fn new(mid: M, dependency_manager: D, output: O, options: OsmdataOptions) -> Self {
        Self {
            mid,
            dependency_manager,
            output,
            options,
        }
    }

    pub fn start(&self) -> Result<(), OrchestratorError> {
        self.output.start()
    }

    pub fn node(&mut self, node: &Node) -> Result<(), OrchestratorError> {
        if !node.deleted {
            if !node.lon.is_finite() || !node.lat.is_finite() {
                log::warn!(
                    "ignored node {} (version {}) with invalid location",
                    node.id,
                    node.version
                );
                return Ok(());
            }
            if let Some(bbox) = self.options.bbox {
                if !bbox.contains(node.lon, node.lat) {
                    return Ok(());
                }
            }
        }

        self.mid.node(node)?;

        if node.deleted {
            self.output.node_delete(node.id)?;
            return Ok(());
        }

        let has_tags_or_attrs = self.options.with_extra_attrs || !node.tags.is_empty();
        if self.options.append {
            if has_tags_or_attrs {
                self.output.node_modify(node)?;
            } else {
                self.output.node_delete(node.id)?;
            }
            if node.version != 1 {
                self.dependency_manager.node_changed(node.id);
            }
        } else if has_tags_or_attrs {
            self.output.node_add(node)?;
        }
        Ok(())
    }

    pub fn after_nodes(&mut self) -> Result<(), OrchestratorError> {
        self.mid.after_nodes()?;
        self.output.after_nodes()?;

        if !self.options.append {
            return Ok(());
        }

        self.dependency_manager.after_nodes(&self.mid)?;
        Ok(())
    }

    pub fn way(&mut self, way: &Way) -> Result<(), OrchestratorError> {
        self.mid.way(way)?;

        if way.deleted {
            self.output.way_delete(way.id)?;
            return Ok(());
        }

        let has_tags_or_attrs = self.options.with_extra_attrs || !way.tags.is_empty();
        if self.options.append {
            if has_tags_or_attrs {
                self.output.way_modify(way)?;
            } else {
                self.output.way_delete(way.id)?;
            }
            if way.version != 1 {
                self.dependency_manager.way_changed(way.id);
            }
        } else if has_tags_or_attrs {
            self.output.way_add(way)?;
        }
        Ok(())
    }

    pub fn after_ways(&mut self) -> Result<(), OrchestratorError> {
        self.mid.after_ways()?;
        self.output.after_ways()?;

        if !self.options.append {
            return Ok(());
        }

        self.dependency_manager.after_ways(&self.mid)?;
        Ok(())
    }

    pub fn relation(&mut self, relation: &Relation) -> Result<(), OrchestratorError> {
        if relation.exceeds_member_limit() {
            log::warn!(
                "relation id {} ignored, because it has more than {} members",
                relation.id,
                MAX_RELATION_MEMBERS
            );
            return Ok(());
        }

        if self.options.append && !relation.deleted {
            self.output.select_relation_members(relation.id)?;
        }

        self.mid.relation(relation)?;

        if relation.deleted {
            self.output.relation_delete(relation.id)?;
            return Ok(());
        }

        let has_tags_or_attrs = self.options.with_extra_attrs || !relation.tags.is_empty();
        if self.options.append {
            if has_tags_or_attrs {
                self.output.relation_modify(relation)?;
            } else {
                self.output.relation_delete(relation.id)?;
            }
            self.dependency_manager.relation_changed(relation.id);
        } else if has_tags_or_attrs {
            self.output.relation_add(relation)?;
        }
        Ok(())
    }

    pub fn after_relations(&mut self) -> Result<(), OrchestratorError> {
        self.mid.after_relations()?;
        self.output.after_relations()?;

        if self.options.append {
            self.dependency_manager.after_relations();
        }

        self.output.sync()
    }

    /// Stage 1b/1c plus database postprocessing (spec.md §4.6).
    pub fn stop(&mut self) -> Result<(), OrchestratorError> {
        if self.options.append {
            self.process_dependents()?;
        }
        self.output.reprocess_marked()?;
        self.postprocess_database()
    }

    fn process_dependents(&mut self) -> Result<(), OrchestratorError> {
        if self.dependency_manager.has_pending() {
            let ways_pending = self.dependency_manager.take_pending_way_ids();
            let rels_pending = self.dependency_manager.take_pending_relation_ids();

            if !ways_pending.is_empty() {
                multithreaded_process(
                    &self.output,
                    &self.mid,
                    ways_pending,
                    self.options.num_threads,
                    "way",
                    Output::pending_way,
                )?;
            }
            if !rels_pending.is_empty() {
                multithreaded_process(
                    &self.output,
                    &self.mid,
                    rels_pending,
                    self.options.num_threads,
                    "relation",
                    Output::pending_relation,
                )?;
            }
        }

        // Stage 1c: parent relations of objects the output marked for
        // re-emission based on its own style rules.
        let marked_nodes = self.output.get_marked_node_ids();
        let marked_ways = self.output.get_marked_way_ids();
        if marked_nodes.is_empty() && marked_ways.is_empty() {
            return Ok(());
        }

        let (_, mut rels_pending) = self.mid.get_node_parents(&marked_nodes)?;
        let way_rels = self.mid.get_way_parents(&marked_ways)?;
        rels_pending.merge_sorted(&way_rels);

        if rels_pending.is_empty() {
            return Ok(());
        }
        rels_pending.sort_unique();
        multithreaded_process(
            &self.output,
            &self.mid,
            rels_pending,
            self.options.num_threads,
            "relation",
            Output::pending_relation_stage1c,
        )
    }

    fn postprocess_database(&mut self) -> Result<(), OrchestratorError> {
        self.output.free_middle_references()?;

        if self.options.drop_middle {
            self.mid.stop(true)?;
        }

        self.output.stop()?;

        if !self.options.drop_middle {
            self.mid.stop(false)?;
        }

        self.mid.wait()?;
        self.output.wait()?;
        Ok(())
    }
}

/// Runs `output.pending_way`/`pending_relation`/`pending_relation_stage1c`
/// over `ids`, either inline (below [`INLINE_THRESHOLD`]) or across
/// `thread_count` worker threads each popping from a shared, mutex-guarded
/// queue (spec.md §4.6 "Pending processing (stage 1b)").
fn multithreaded_process<M, O>(
    output: &O,
    mid: &M,
    ids: IdList,
    thread_count: usize,
    kind: &str,
    func: fn(&O, ObjectId) -> Result<(), OrchestratorError>,
) -> Result<(), OrchestratorError>
where
    M: Middle,
    O: Output<Query = M::Query>,
{
    let count = ids.len();
    if count < INLINE_THRESHOLD {
        log::info!("going over {count} pending {kind}s");
        for &id in ids.iter() {
            func(output, id)?;
        }
        output.sync()?;
        return Ok(());
    }

    log::info!("going over {count} pending {kind}s (using {thread_count} threads)");
    let queue = Mutex::new(ids);

    thread::scope(|scope| {
        let progress = scope.spawn(|| {
            loop {
                let remaining = queue.lock().map(|q| q.len()).unwrap_or(0);
                if remaining == 0 {
                    break;
                }
                log::info!("left to process: {remaining}");
                thread::sleep(Duration::from_secs(1));
            }
        });

        let mut workers = Vec::with_capacity(thread_count);
        for _ in 0..thread_count {
            let query = mid.get_query_instance();
            let clone = output.clone_for_worker(query);
            workers.push(scope.spawn(move || -> Result<(), OrchestratorError> {
                loop {
                    let Some(id) = pop_id(&queue) else { break };
                    func(&clone, id)?;
                }
                clone.sync()
            }));
        }

        let mut first_err = None;
        for worker in workers {
            match worker.join() {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    drain(&queue);
                    first_err.get_or_insert(err);
                }
                Err(_) => {
                    drain(&queue);
                    first_err.get_or_insert(OrchestratorError::Output(
                        "pending worker thread panicked".to_owned(),
                    ));
                }
            }
        }
        let _ = progress.join();

        match first_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    })
}

fn pop_id(queue: &Mutex<IdList>) -> Option<ObjectId> {
    let mut guard = match queue.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    guard.pop_id()
}

fn drain(queue: &Mutex<IdList>) {
    let mut guard = match queue.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    guard.clear();
}

#[cfg(test)]
#[expect(clippy::expect_used, reason = "fixtures should fail fast during setup")]
mod tests {
    use std::sync::Arc;

    use geofabric_core::middle::{EntityBits, MiddleQuery, OutputRequirements};
    use geofabric_core::node_location::Location;
    use geofabric_core::osm::{Member, MemberType, Tags};
    use rstest::rstest;

    use crate::dependency_manager::NoopDependencyManager;

    use super::*;

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

    #[derive(Debug, Default)]
    struct StubMiddle;

    impl Middle for StubMiddle {
        type Query = StubQuery;

        fn set_requirements(&mut self, _requirements: OutputRequirements) {}

        fn node(&mut self, _node: &Node) -> Result<(), MiddleError> {
            Ok(())
        }

        fn way(&mut self, _way: &Way) -> Result<(), MiddleError> {
            Ok(())
        }

        fn relation(&mut self, _relation: &Relation) -> Result<(), MiddleError> {
            Ok(())
        }

        fn after_nodes(&mut self) -> Result<(), MiddleError> {
            Ok(())
        }

        fn after_ways(&mut self) -> Result<(), MiddleError> {
            Ok(())
        }

        fn after_relations(&mut self) -> Result<(), MiddleError> {
            Ok(())
        }

        fn get_node_parents(&self, _changed_nodes: &IdList) -> Result<(IdList, IdList), MiddleError> {
            Ok((IdList::new(), IdList::new()))
        }

        fn get_way_parents(&self, _changed_ways: &IdList) -> Result<IdList, MiddleError> {
            Ok(IdList::new())
        }

        fn get_query_instance(&self) -> Self::Query {
            StubQuery
        }

        fn stop(&mut self, _drop_middle: bool) -> Result<(), MiddleError> {
            Ok(())
        }

        fn wait(&mut self) -> Result<(), MiddleError> {
            Ok(())
        }
    }

    /// Records which callbacks ran, so dispatch can be asserted without a
    /// real output backend.
    #[derive(Debug, Clone, Default)]
    struct StubOutput {
        calls: Arc<Mutex<Vec<String>>>,
    }

    impl StubOutput {
        fn calls(&self) -> Vec<String> {
            match self.calls.lock() {
                Ok(calls) => calls.clone(),
                Err(poisoned) => poisoned.into_inner().clone(),
            }
        }

        fn record(&self, call: &str) {
            let mut calls = match self.calls.lock() {
                Ok(calls) => calls,
                Err(poisoned) => poisoned.into_inner(),
            };
            calls.push(call.to_owned());
        }
    }

    impl Output for StubOutput {
        type Query = StubQuery;

        fn start(&self) -> Result<(), OrchestratorError> {
            self.record("start");
            Ok(())
        }

        fn node_add(&self, _node: &Node) -> Result<(), OrchestratorError> {
            self.record("node_add");
            Ok(())
        }

        fn node_modify(&self, _node: &Node) -> Result<(), OrchestratorError> {
            self.record("node_modify");
            Ok(())
        }

        fn node_delete(&self, _id: ObjectId) -> Result<(), OrchestratorError> {
            self.record("node_delete");
            Ok(())
        }

        fn way_add(&self, _way: &Way) -> Result<(), OrchestratorError> {
            self.record("way_add");
            Ok(())
        }

        fn way_modify(&self, _way: &Way) -> Result<(), OrchestratorError> {
            self.record("way_modify");
            Ok(())
        }

        fn way_delete(&self, _id: ObjectId) -> Result<(), OrchestratorError> {
            self.record("way_delete");
            Ok(())
        }

        fn relation_add(&self, _relation: &Relation) -> Result<(), OrchestratorError> {
            self.record("relation_add");
            Ok(())
        }

        fn relation_modify(&self, _relation: &Relation) -> Result<(), OrchestratorError> {
            self.record("relation_modify");
            Ok(())
        }

        fn relation_delete(&self, _id: ObjectId) -> Result<(), OrchestratorError> {
            self.record("relation_delete");
            Ok(())
        }

        fn select_relation_members(&self, _id: ObjectId) -> Result<(), OrchestratorError> {
            self.record("select_relation_members");
            Ok(())
        }

        fn after_nodes(&self) -> Result<(), OrchestratorError> {
            Ok(())
        }

        fn after_ways(&self) -> Result<(), OrchestratorError> {
            Ok(())
        }

        fn after_relations(&self) -> Result<(), OrchestratorError> {
            Ok(())
        }

        fn sync(&self) -> Result<(), OrchestratorError> {
            self.record("sync");
            Ok(())
        }

        fn pending_way(&self, _id: ObjectId) -> Result<(), OrchestratorError> {
            Ok(())
        }

        fn pending_relation(&self, _id: ObjectId) -> Result<(), OrchestratorError> {
            Ok(())
        }

        fn pending_relation_stage1c(&self, _id: ObjectId) -> Result<(), OrchestratorError> {
            Ok(())
        }

        fn get_marked_node_ids(&self) -> IdList {
            IdList::new()
        }

        fn get_marked_way_ids(&self) -> IdList {
            IdList::new()
        }

        fn reprocess_marked(&self) -> Result<(), OrchestratorError> {
            Ok(())
        }

        fn free_middle_references(&self) -> Result<(), OrchestratorError> {
            Ok(())
        }

        fn stop(&self) -> Result<(), OrchestratorError> {
            Ok(())
        }

        fn wait(&self) -> Result<(), OrchestratorError> {
            Ok(())
        }

        fn clone_for_worker(&self, _query: Self::Query) -> Self {
            self.clone()
        }

        fn merge_expire_trees(&self, _other: &Self) {}
    }

    fn osmdata(
        options: OsmdataOptions,
    ) -> (Osmdata<StubMiddle, NoopDependencyManager, StubOutput>, StubOutput) {
        let output = StubOutput::default();
        let built = Osmdata::new(StubMiddle, NoopDependencyManager, output.clone(), options);
        (built, output)
    }

    #[rstest]
    fn node_with_invalid_location_is_dropped() {
        let (mut data, output) = osmdata(OsmdataOptions::default());
        let node = Node::new(1, f64::NAN, 1.0);
        data.node(&node).expect("drop is not an error");
        assert!(output.calls().is_empty());
    }

    #[rstest]
    fn node_outside_bbox_is_dropped() {
        let bbox = BoundingBox {
            min_lon: 0.0,
            min_lat: 0.0,
            max_lon: 1.0,
            max_lat: 1.0,
        };
        let options = OsmdataOptions {
            bbox: Some(bbox),
            ..OsmdataOptions::default()
        };
        let (mut data, output) = osmdata(options);
        let node = Node::new(1, 5.0, 5.0);
        data.node(&node).expect("drop is not an error");
        assert!(output.calls().is_empty());
    }

    #[rstest]
    fn import_mode_adds_tagged_node() {
        let (mut data, output) = osmdata(OsmdataOptions::default());
        let mut node = Node::new(1, 0.5, 0.5);
        node.tags.insert("amenity".to_owned(), "cafe".to_owned());
        data.node(&node).expect("node add succeeds");
        assert_eq!(output.calls(), vec!["node_add".to_owned()]);
    }

    #[rstest]
    fn import_mode_skips_untagged_node() {
        let (mut data, output) = osmdata(OsmdataOptions::default());
        let node = Node::new(1, 0.5, 0.5);
        data.node(&node).expect("no-op succeeds");
        assert!(output.calls().is_empty());
    }

    #[rstest]
    fn append_mode_modifies_tagged_node() {
        let options = OsmdataOptions {
            append: true,
            ..OsmdataOptions::default()
        };
        let (mut data, output) = osmdata(options);
        let mut node = Node::new(1, 0.5, 0.5);
        node.version = 2;
        node.tags.insert("amenity".to_owned(), "cafe".to_owned());
        data.node(&node).expect("node modify succeeds");
        assert_eq!(output.calls(), vec!["node_modify".to_owned()]);
    }

    #[rstest]
    fn append_mode_deletes_untagged_node() {
        let options = OsmdataOptions {
            append: true,
            ..OsmdataOptions::default()
        };
        let (mut data, output) = osmdata(options);
        let node = Node::new(1, 0.5, 0.5);
        data.node(&node).expect("node delete succeeds");
        assert_eq!(output.calls(), vec!["node_delete".to_owned()]);
    }

    #[rstest]
    fn oversized_relation_is_skipped_with_no_output_call() {
        let (mut data, output) = osmdata(OsmdataOptions::default());
        let member = Member {
            member_type: MemberType::Node,
            member_id: 1,
            role: String::new(),
        };
        let relation = Relation {
            id: 1,
            version: 1,
            members: vec![member; MAX_RELATION_MEMBERS + 1],
            tags: Tags::new(),
            deleted: false,
        };
        data.relation(&relation).expect("skip is not an error");
        assert!(output.calls().is_empty());
    }
}
