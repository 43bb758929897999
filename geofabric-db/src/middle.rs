//! The persistent `Middle`/`MiddleQuery` implementation: Postgres tables
//! for full objects plus bucketed dependency indexes, writes routed through
//! a [`CopyWorker`], reads (and dependency queries) against a client
//! connection each handle owns independently.
//!
//! Grounded on `original_source/src/middle-pgsql.cpp`.

use std::cell::RefCell;
use std::sync::{Arc, Mutex};

use camino::Utf8PathBuf;
use geofabric_core::idlist::IdList;
use geofabric_core::middle::{EntityBits, Middle, MiddleError, MiddleQuery, OutputRequirements};
use geofabric_core::node_location::{FlatNodeFile, Location};
use geofabric_core::osm::{MemberType, Node, ObjectId, Relation, Tags, Way};
use postgres::{Client, NoTls};

use crate::copy::{copy_row, CopyTarget, CopyWorker, CopyWorkerError, Deleter};
use crate::properties::{PropertiesError, PropertiesStore};
use crate::schema::{self, SchemaConfig};

/// Errors internal to the persistent middle, collapsed to
/// [`MiddleError::Database`] at the trait boundary (spec.md §7: callers
/// only need the coarse taxonomy `Middle` defines).
#[derive(Debug, thiserror::Error)]
pub enum PersistentMiddleError {
    #[error(transparent)]
    Database(#[from] postgres::Error),
    #[error(transparent)]
    CopyWorker(#[from] CopyWorkerError),
    #[error(transparent)]
    Properties(#[from] PropertiesError),
    #[error(transparent)]
    FlatNodeFile(#[from] crate::flat_nodes::FlatNodeFileError),
}

impl From<PersistentMiddleError> for MiddleError {
    fn from(err: PersistentMiddleError) -> Self {
        Self::Database(err.to_string())
    }
}

fn target(schema: &str, table: &str, id_column: &str) -> CopyTarget {
    CopyTarget::new(schema, table, id_column)
}

/// Accumulates `COPY`-format rows, plus any ids pending deletion ahead of
/// them, for one table until full, then the caller flushes it through the
/// [`CopyWorker`].
struct TableBuffer {
    target: CopyTarget,
    bytes: Vec<u8>,
    deletes: Vec<ObjectId>,
}

impl TableBuffer {
    fn new(target: CopyTarget) -> Self {
        Self {
            target,
            bytes: Vec::new(),
            deletes: Vec::new(),
        }
    }

    fn push_row(&mut self, row: Vec<u8>) {
        self.bytes.extend(row);
    }

    /// Queues `id` for deletion before this buffer's rows are copied in
    /// (append mode's delete-then-insert, `middle-pgsql.cpp:436-474`).
    fn push_delete(&mut self, id: ObjectId) {
        self.deletes.push(id);
    }

    fn is_full(&self) -> bool {
        self.bytes.len() > crate::copy::MAX_BUF_SIZE - 100
            || self.deletes.len() > crate::copy::MAX_DELETE_ENTRIES
    }

    fn take(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.bytes)
    }

    fn take_deleter(&mut self) -> Deleter {
        if self.deletes.is_empty() {
            Deleter::None
        } else {
            Deleter::ById(std::mem::take(&mut self.deletes))
        }
    }
}

fn pg_array_literal(ids: &[ObjectId]) -> String {
    let mut out = String::from("{");
    for (i, id) in ids.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push_str(&id.to_string());
    }
    out.push('}');
    out
}

fn tags_json(tags: &Tags) -> String {
    serde_json::to_string(tags).unwrap_or_else(|_| "{}".to_owned())
}

fn members_json(members: &[geofabric_core::osm::Member]) -> String {
    let values: Vec<serde_json::Value> = members
        .iter()
        .map(|m| {
            serde_json::json!({
                "t": m.member_type.code().to_string(),
                "id": m.member_id,
                "role": m.role,
            })
        })
        .collect();
    serde_json::Value::Array(values).to_string()
}

/// Where the persistent middle's write path sends node locations: either
/// the flat node file, or the `nodes` table's `lon`/`lat` columns.
enum LocationSink {
    FlatFile(Arc<Mutex<FlatNodeFile>>),
    Table,
}

/// The write side of the persistent middle.
pub struct PersistentMiddle {
    conninfo: String,
    client: RefCell<Client>,
    schema: SchemaConfig,
    requirements: OutputRequirements,
    /// Append mode deletes each object by id before re-inserting it
    /// (`middle-pgsql.cpp:436-474`), so a re-sent object never hits the
    /// `bigint PRIMARY KEY` tables' unique-violation path.
    append: bool,
    copy_worker: Option<CopyWorker>,
    properties: PropertiesStore,
    flat_nodes: Option<Arc<Mutex<FlatNodeFile>>>,
    nodes_buf: TableBuffer,
    ways_buf: TableBuffer,
    relations_buf: TableBuffer,
    way_node_buckets_buf: TableBuffer,
    relation_node_buckets_buf: TableBuffer,
    relation_way_buckets_buf: TableBuffer,
}

impl PersistentMiddle {
    /// Connects to `conninfo`, creates the schema if absent, and spawns the
    /// copy worker. `flat_node_path`, if given, stores node locations on
    /// disk instead of in the `nodes` table (spec.md §6). `append` selects
    /// delete-then-insert semantics for every subsequent `node`/`way`/
    /// `relation` call (spec.md §4.3).
    pub fn connect(
        conninfo: &str,
        schema: SchemaConfig,
        flat_node_path: Option<Utf8PathBuf>,
        append: bool,
    ) -> Result<Self, PersistentMiddleError> {
        let mut client = Client::connect(conninfo, NoTls)?;
        client.batch_execute(&schema::create_schema_sql(&schema, OutputRequirements::default()))?;

        let mut properties = PropertiesStore::new(&schema.schema);
        if !properties.load(&mut client)? {
            // No properties table yet: a fresh import. `init_table` creates
            // it (and would truncate an existing one, which `load` having
            // just returned `true` rules out).
            properties.init_table(&mut client)?;
        }
        properties.set_int("bucket_shift", i64::from(schema.bucket_shift));

        let flat_nodes = match &flat_node_path {
            Some(path) => Some(Arc::new(Mutex::new(crate::flat_nodes::open(path)?))),
            None => None,
        };

        let copy_worker = Some(CopyWorker::spawn(conninfo.to_owned())?);

        let s = &schema.schema;
        Ok(Self {
            conninfo: conninfo.to_owned(),
            client: RefCell::new(client),
            nodes_buf: TableBuffer::new(target(s, "nodes", "id")),
            ways_buf: TableBuffer::new(target(s, "ways", "id")),
            relations_buf: TableBuffer::new(target(s, "relations", "id")),
            way_node_buckets_buf: TableBuffer::new(target(s, "way_node_buckets", "way_id")),
            relation_node_buckets_buf: TableBuffer::new(target(
                s,
                "relation_node_buckets",
                "relation_id",
            )),
            relation_way_buckets_buf: TableBuffer::new(target(
                s,
                "relation_way_buckets",
                "relation_id",
            )),
            schema,
            requirements: OutputRequirements::default(),
            append,
            copy_worker,
            properties,
            flat_nodes,
        })
    }

    fn location_sink(&self) -> LocationSink {
        match &self.flat_nodes {
            Some(flat) => LocationSink::FlatFile(Arc::clone(flat)),
            None => LocationSink::Table,
        }
    }

    fn flush(&mut self, which: BufferKind) -> Result<(), PersistentMiddleError> {
        let Some(worker) = self.copy_worker.as_ref() else {
            return Ok(());
        };
        let buffer = match which {
            BufferKind::Nodes => &mut self.nodes_buf,
            BufferKind::Ways => &mut self.ways_buf,
            BufferKind::Relations => &mut self.relations_buf,
            BufferKind::WayNodeBuckets => &mut self.way_node_buckets_buf,
            BufferKind::RelationNodeBuckets => &mut self.relation_node_buckets_buf,
            BufferKind::RelationWayBuckets => &mut self.relation_way_buckets_buf,
        };
        if buffer.bytes.is_empty() && buffer.deletes.is_empty() {
            return Ok(());
        }
        let deleter = buffer.take_deleter();
        worker.copy_delete(buffer.target.clone(), buffer.take(), deleter)?;
        Ok(())
    }

    fn flush_if_full(&mut self, which: BufferKind) -> Result<(), PersistentMiddleError> {
        let is_full = match which {
            BufferKind::Nodes => self.nodes_buf.is_full(),
            BufferKind::Ways => self.ways_buf.is_full(),
            BufferKind::Relations => self.relations_buf.is_full(),
            BufferKind::WayNodeBuckets => self.way_node_buckets_buf.is_full(),
            BufferKind::RelationNodeBuckets => self.relation_node_buckets_buf.is_full(),
            BufferKind::RelationWayBuckets => self.relation_way_buckets_buf.is_full(),
        };
        if is_full {
            self.flush(which)?;
        }
        Ok(())
    }

    fn flush_all(&mut self) -> Result<(), PersistentMiddleError> {
        for kind in [
            BufferKind::Nodes,
            BufferKind::Ways,
            BufferKind::Relations,
            BufferKind::WayNodeBuckets,
            BufferKind::RelationNodeBuckets,
            BufferKind::RelationWayBuckets,
        ] {
            self.flush(kind)?;
        }
        Ok(())
    }

    /// Runs a bucketed dependency query: groups `ids` into buckets, then
    /// runs `sql` with `(buckets, ids)` as `$1`/`$2`. Grounded on spec.md §9
    /// Open Question #1: the changed-id set is loaded into a temp table and
    /// `ANALYZE`d before the join runs, rather than relying on the
    /// planner's generic parameter-array row estimate.
    ///
    /// Takes `&self`: this only runs ad hoc read queries against its own
    /// connection and never touches the write-side buffers, so the
    /// connection itself is the only mutable state involved — held in a
    /// `RefCell` rather than widening every read method to `&mut self`.
    fn query_bucketed_ids(
        &self,
        sql: &str,
        ids: &[ObjectId],
    ) -> Result<Vec<ObjectId>, PersistentMiddleError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let buckets = schema::buckets_of(ids, self.schema.bucket_shift);

        let mut client = self.client.borrow_mut();
        let mut transaction = client.transaction()?;
        transaction.batch_execute(
            "CREATE TEMP TABLE IF NOT EXISTS changed_ids_scratch (id bigint) ON COMMIT DROP",
        )?;
        transaction.execute("TRUNCATE changed_ids_scratch", &[])?;
        transaction.execute(
            "INSERT INTO changed_ids_scratch SELECT unnest($1::bigint[])",
            &[&ids],
        )?;
        transaction.batch_execute("ANALYZE changed_ids_scratch")?;

        let rows = transaction.query(sql, &[&buckets, &ids])?;
        transaction.commit()?;

        Ok(rows.iter().map(|row| row.get::<_, i64>(0)).collect())
    }
}

#[derive(Clone, Copy)]
enum BufferKind {
    Nodes,
    Ways,
    Relations,
    WayNodeBuckets,
    RelationNodeBuckets,
    RelationWayBuckets,
}

#[expect(
    clippy::expect_used,
    reason = "a poisoned flat node file lock means a prior writer panicked; nothing safe to do but propagate"
)]
#[expect(
    clippy::missing_panics_doc,
    reason = "panics only on flat node file lock poisoning, see the expect_used justification on this impl"
)]
impl Middle for PersistentMiddle {
    type Query = PersistentMiddleQuery;

    fn set_requirements(&mut self, requirements: OutputRequirements) {
        self.requirements = requirements;
    }

    fn node(&mut self, node: &Node) -> Result<(), MiddleError> {
        (|| -> Result<(), PersistentMiddleError> {
            if self.append {
                self.nodes_buf.push_delete(node.id);
            }

            if node.deleted {
                if let LocationSink::FlatFile(flat) = self.location_sink() {
                    let mut file = flat.lock().expect("flat node file lock poisoned");
                    file.set(node.id, Location::invalid())?;
                }
                self.flush_if_full(BufferKind::Nodes)?;
                return Ok(());
            }

            let location = Location::new(node.lon, node.lat);
            let has_flat_file = match self.location_sink() {
                LocationSink::FlatFile(flat) => {
                    let mut file = flat.lock().expect("flat node file lock poisoned");
                    file.set(node.id, location)?;
                    true
                }
                LocationSink::Table => false,
            };

            if !has_flat_file || self.requirements.full_nodes {
                let tags = if self.requirements.full_nodes {
                    tags_json(&node.tags)
                } else {
                    "null".to_owned()
                };
                let (x, y) = location_coord(location);
                let row = copy_row(&[node.id.to_string(), x.to_string(), y.to_string(), tags]);
                self.nodes_buf.push_row(row);
                self.flush_if_full(BufferKind::Nodes)?;
            }
            Ok(())
        })()
        .map_err(Into::into)
    }

    fn way(&mut self, way: &Way) -> Result<(), MiddleError> {
        (|| -> Result<(), PersistentMiddleError> {
            if self.append {
                self.ways_buf.push_delete(way.id);
                self.way_node_buckets_buf.push_delete(way.id);
            }

            if way.deleted {
                self.flush_if_full(BufferKind::Ways)?;
                self.flush_if_full(BufferKind::WayNodeBuckets)?;
                return Ok(());
            }

            let tags = if self.requirements.full_ways {
                tags_json(&way.tags)
            } else {
                "null".to_owned()
            };
            let row = copy_row(&[
                way.id.to_string(),
                pg_array_literal(&way.nodes),
                tags,
            ]);
            self.ways_buf.push_row(row);
            self.flush_if_full(BufferKind::Ways)?;

            for bucket in schema::buckets_of(&way.nodes, self.schema.bucket_shift) {
                let row = copy_row(&[bucket.to_string(), way.id.to_string()]);
                self.way_node_buckets_buf.push_row(row);
            }
            self.flush_if_full(BufferKind::WayNodeBuckets)?;
            Ok(())
        })()
        .map_err(Into::into)
    }

    fn relation(&mut self, relation: &Relation) -> Result<(), MiddleError> {
        (|| -> Result<(), PersistentMiddleError> {
            if self.append {
                self.relations_buf.push_delete(relation.id);
                self.relation_node_buckets_buf.push_delete(relation.id);
                self.relation_way_buckets_buf.push_delete(relation.id);
            }

            if relation.deleted {
                self.flush_if_full(BufferKind::Relations)?;
                self.flush_if_full(BufferKind::RelationNodeBuckets)?;
                self.flush_if_full(BufferKind::RelationWayBuckets)?;
                return Ok(());
            }

            let tags = if self.requirements.full_relations {
                tags_json(&relation.tags)
            } else {
                "null".to_owned()
            };
            let row = copy_row(&[
                relation.id.to_string(),
                members_json(&relation.members),
                tags,
            ]);
            self.relations_buf.push_row(row);
            self.flush_if_full(BufferKind::Relations)?;

            let node_member_ids: Vec<ObjectId> = relation
                .members
                .iter()
                .filter(|m| m.member_type == MemberType::Node)
                .map(|m| m.member_id)
                .collect();
            for bucket in schema::buckets_of(&node_member_ids, self.schema.bucket_shift) {
                let row = copy_row(&[bucket.to_string(), relation.id.to_string()]);
                self.relation_node_buckets_buf.push_row(row);
            }
            self.flush_if_full(BufferKind::RelationNodeBuckets)?;

            let way_member_ids: Vec<ObjectId> = relation
                .members
                .iter()
                .filter(|m| m.member_type == MemberType::Way)
                .map(|m| m.member_id)
                .collect();
            for bucket in schema::buckets_of(&way_member_ids, self.schema.bucket_shift) {
                let row = copy_row(&[bucket.to_string(), relation.id.to_string()]);
                self.relation_way_buckets_buf.push_row(row);
            }
            self.flush_if_full(BufferKind::RelationWayBuckets)?;
            Ok(())
        })()
        .map_err(Into::into)
    }

    fn after_nodes(&mut self) -> Result<(), MiddleError> {
        self.flush(BufferKind::Nodes).map_err(Into::into)
    }

    fn after_ways(&mut self) -> Result<(), MiddleError> {
        self.flush(BufferKind::Ways)
            .and_then(|()| self.flush(BufferKind::WayNodeBuckets))
            .map_err(Into::into)
    }

    fn after_relations(&mut self) -> Result<(), MiddleError> {
        self.flush(BufferKind::Relations)
            .and_then(|()| self.flush(BufferKind::RelationNodeBuckets))
            .and_then(|()| self.flush(BufferKind::RelationWayBuckets))
            .map_err(Into::into)
    }

    fn get_node_parents(&self, changed_nodes: &IdList) -> Result<(IdList, IdList), MiddleError> {
        let ids = changed_nodes.as_slice();
        let ways = self
            .query_bucketed_ids(&schema::find_parent_ways_sql(&self.schema.schema), ids)
            .map_err(PersistentMiddleError::into_middle_error)?;
        let relations = self
            .query_bucketed_ids(
                &schema::find_parent_relations_by_node_sql(&self.schema.schema),
                ids,
            )
            .map_err(PersistentMiddleError::into_middle_error)?;
        Ok((IdList::from(ways), IdList::from(relations)))
    }

    fn get_way_parents(&self, changed_ways: &IdList) -> Result<IdList, MiddleError> {
        let ids = changed_ways.as_slice();
        let relations = self
            .query_bucketed_ids(
                &schema::find_parent_relations_by_way_sql(&self.schema.schema),
                ids,
            )
            .map_err(PersistentMiddleError::into_middle_error)?;
        Ok(IdList::from(relations))
    }

    fn get_query_instance(&self) -> Self::Query {
        PersistentMiddleQuery {
            conninfo: self.conninfo.clone(),
            schema: self.schema.schema.clone(),
            flat_nodes: self.flat_nodes.clone(),
        }
    }

    fn stop(&mut self, drop_middle: bool) -> Result<(), MiddleError> {
        self.flush_all().map_err(MiddleError::from)?;
        if let Some(worker) = self.copy_worker.take() {
            worker
                .finish()
                .map_err(PersistentMiddleError::from)
                .map_err(MiddleError::from)?;
        }
        if drop_middle {
            self.client
                .borrow_mut()
                .batch_execute(&schema::drop_schema_sql(&self.schema.schema))
                .map_err(|e| MiddleError::Database(e.to_string()))?;
        } else {
            self.properties
                .store(&mut self.client.borrow_mut())
                .map_err(|e| MiddleError::Database(e.to_string()))?;
        }
        Ok(())
    }

    fn wait(&mut self) -> Result<(), MiddleError> {
        if let Some(worker) = self.copy_worker.as_ref() {
            worker
                .sync_and_wait()
                .map_err(|e| MiddleError::Database(e.to_string()))?;
        }
        Ok(())
    }
}

impl PersistentMiddleError {
    fn into_middle_error(self) -> MiddleError {
        self.into()
    }
}

#[expect(
    clippy::cast_possible_truncation,
    reason = "re-scaling lon()/lat() back to the stored i32 representation; Location has no public scaled accessor"
)]
fn location_coord(location: Location) -> (i32, i32) {
    if location.is_valid() {
        (
            (location.lon() * geofabric_core::node_location::COORD_SCALE).round() as i32,
            (location.lat() * geofabric_core::node_location::COORD_SCALE).round() as i32,
        )
    } else {
        (
            geofabric_core::node_location::INVALID_COORD,
            geofabric_core::node_location::INVALID_COORD,
        )
    }
}

/// The read side of the persistent middle: a handle each worker thread
/// clones independently, each opening its own connection (spec.md §4.3
/// supplement).
pub struct PersistentMiddleQuery {
    conninfo: String,
    schema: String,
    flat_nodes: Option<Arc<Mutex<FlatNodeFile>>>,
}

impl PersistentMiddleQuery {
    #[expect(
        clippy::expect_used,
        reason = "a query handle that cannot open its own connection cannot do anything useful; surfaced as a panic at first use rather than threading a fallible connect through every read method"
    )]
    fn connect(&self) -> Client {
        Client::connect(&self.conninfo, NoTls).expect("persistent middle query connection failed")
    }
}

#[expect(
    clippy::expect_used,
    reason = "each method opens its own connection via PersistentMiddleQuery::connect, which panics on a connection failure rather than threading a fallible connect through every read method"
)]
#[expect(
    clippy::missing_panics_doc,
    reason = "panics only on a failed connection attempt or a poisoned flat node file lock, per the expect_used justification above"
)]
impl MiddleQuery for PersistentMiddleQuery {
    fn get_node_location(&self, id: ObjectId) -> Location {
        if let Some(flat) = &self.flat_nodes {
            let mut file = flat.lock().expect("flat node file lock poisoned");
            return file.get(id);
        }
        let mut client = self.connect();
        let row = client.query_opt(
            &format!("SELECT lon, lat FROM {}.nodes WHERE id = $1", self.schema),
            &[&id],
        );
        match row {
            Ok(Some(row)) => {
                let lon: i32 = row.get(0);
                let lat: i32 = row.get(1);
                if lon == geofabric_core::node_location::INVALID_COORD {
                    Location::invalid()
                } else {
                    Location::new(
                        f64::from(lon) / geofabric_core::node_location::COORD_SCALE,
                        f64::from(lat) / geofabric_core::node_location::COORD_SCALE,
                    )
                }
            }
            _ => Location::invalid(),
        }
    }

    fn nodes_get_list(&self, way_nodes: &[ObjectId]) -> Vec<(ObjectId, Location)> {
        way_nodes
            .iter()
            .map(|&id| (id, self.get_node_location(id)))
            .filter(|(_, location)| location.is_valid())
            .collect()
    }

    fn node_get(&self, id: ObjectId) -> Option<Node> {
        let mut client = self.connect();
        let row = client
            .query_opt(
                &format!(
                    "SELECT lon, lat, tags FROM {}.nodes WHERE id = $1",
                    self.schema
                ),
                &[&id],
            )
            .ok()??;
        let lon: i32 = row.get(0);
        let lat: i32 = row.get(1);
        let tags: Option<serde_json::Value> = row.get(2);
        Some(Node {
            id,
            version: 0,
            lon: f64::from(lon) / geofabric_core::node_location::COORD_SCALE,
            lat: f64::from(lat) / geofabric_core::node_location::COORD_SCALE,
            tags: tags_from_json(tags),
            deleted: false,
        })
    }

    fn way_get(&self, id: ObjectId) -> Option<Way> {
        let mut client = self.connect();
        let row = client
            .query_opt(
                &format!(
                    "SELECT nodes, tags FROM {}.ways WHERE id = $1",
                    self.schema
                ),
                &[&id],
            )
            .ok()??;
        let nodes: Vec<ObjectId> = row.get(0);
        let tags: Option<serde_json::Value> = row.get(1);
        Some(Way {
            id,
            version: 0,
            nodes,
            tags: tags_from_json(tags),
            deleted: false,
        })
    }

    fn relation_get(&self, id: ObjectId) -> Option<Relation> {
        let mut client = self.connect();
        let row = client
            .query_opt(
                &format!(
                    "SELECT members, tags FROM {}.relations WHERE id = $1",
                    self.schema
                ),
                &[&id],
            )
            .ok()??;
        let members: serde_json::Value = row.get(0);
        let tags: Option<serde_json::Value> = row.get(1);
        Some(Relation {
            id,
            version: 0,
            members: members_from_json(&members),
            tags: tags_from_json(tags),
            deleted: false,
        })
    }

    fn rel_members_get(&self, rel_id: ObjectId, entity_bits: EntityBits) -> Vec<(ObjectId, char)> {
        let Some(relation) = self.relation_get(rel_id) else {
            return Vec::new();
        };
        relation
            .members
            .into_iter()
            .filter(|m| match m.member_type {
                MemberType::Node => entity_bits.nodes,
                MemberType::Way => entity_bits.ways,
                MemberType::Relation => false,
            })
            .map(|m| (m.member_id, m.member_type.code()))
            .collect()
    }
}

fn tags_from_json(tags: Option<serde_json::Value>) -> Tags {
    tags.and_then(|v| serde_json::from_value(v).ok())
        .unwrap_or_default()
}

fn members_from_json(value: &serde_json::Value) -> Vec<geofabric_core::osm::Member> {
    let Some(array) = value.as_array() else {
        return Vec::new();
    };
    array
        .iter()
        .filter_map(|entry| {
            let t = entry.get("t")?.as_str()?;
            let member_type = match t {
                "N" => MemberType::Node,
                "W" => MemberType::Way,
                "R" => MemberType::Relation,
                _ => return None,
            };
            let member_id = entry.get("id")?.as_i64()?;
            let role = entry
                .get("role")
                .and_then(|r| r.as_str())
                .unwrap_or_default()
                .to_owned();
            Some(geofabric_core::osm::Member {
                member_type,
                member_id,
                role,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn pg_array_literal_formats_ids() {
        assert_eq!(pg_array_literal(&[1, 2, 3]), "{1,2,3}");
    }

    #[rstest]
    fn pg_array_literal_empty_is_braces() {
        assert_eq!(pg_array_literal(&[]), "{}");
    }

    #[rstest]
    fn members_json_round_trips_through_members_from_json() {
        let members = vec![geofabric_core::osm::Member {
            member_type: MemberType::Way,
            member_id: 42,
            role: "outer".to_owned(),
        }];
        let json = members_json(&members);
        let value: serde_json::Value = serde_json::from_str(&json).expect("valid json");
        let parsed = members_from_json(&value);
        assert_eq!(parsed, members);
    }

    #[rstest]
    fn tags_json_round_trips_through_tags_from_json() {
        let mut tags = Tags::new();
        tags.insert("highway".to_owned(), "residential".to_owned());
        let json = tags_json(&tags);
        let value: serde_json::Value = serde_json::from_str(&json).expect("valid json");
        assert_eq!(tags_from_json(Some(value)), tags);
    }

    #[rstest]
    fn table_buffer_queues_no_deleter_by_default() {
        let mut buffer = TableBuffer::new(target("public", "nodes", "id"));
        buffer.push_row(copy_row(&["1".to_owned()]));
        assert_eq!(buffer.take_deleter(), Deleter::None);
    }

    /// Scenario 4 (append-mode delete-then-add): queuing a delete ahead of
    /// an insert for the same id produces a `Deleter::ById` covering that
    /// id, which the copy worker applies before the row lands
    /// (`run` in `crate::copy` executes the deleter before the `COPY`).
    #[rstest]
    fn table_buffer_queues_delete_before_insert_in_append_mode() {
        let mut buffer = TableBuffer::new(target("public", "nodes", "id"));
        buffer.push_delete(10);
        buffer.push_row(copy_row(&["10".to_owned()]));
        assert_eq!(buffer.take_deleter(), Deleter::ById(vec![10]));
        assert_eq!(buffer.take(), copy_row(&["10".to_owned()]));
    }

    /// Scenario 4's delete-only half: a deleted object queues its id but
    /// contributes no row, so the worker only deletes.
    #[rstest]
    fn table_buffer_delete_without_a_row_is_delete_only() {
        let mut buffer = TableBuffer::new(target("public", "nodes", "id"));
        buffer.push_delete(10);
        assert_eq!(buffer.take_deleter(), Deleter::ById(vec![10]));
        assert!(buffer.take().is_empty());
    }
}
