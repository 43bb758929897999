//! The Copy Worker: a dedicated thread that owns the `COPY ... FROM STDIN`
//! connection and applies interleaved deletes, so the pending thread never
//! blocks on a round trip to the database (spec.md §4.4).
//!
//! Grounded on `original_source/src/db-copy.hpp`/`db-copy-mgr.hpp`. The
//! original's `db_cmd_t` is a `std::variant` including
//! `db_cmd_copy_delete_t<db_deleter_by_id_t>`, `db_cmd_end_copy_t`,
//! `db_cmd_sync_t`, `db_cmd_finish_t`; the original's second deleter
//! template, `db_deleter_by_type_and_id_t`, disambiguates rows by an object-
//! type discriminator column that none of this crate's tables have (every
//! `nodes`/`ways`/`relations` row and every bucket-index row is already
//! uniquely addressed by a single id column), so only the by-id deleter has
//! a counterpart here.
use std::collections::VecDeque;
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::thread::{self, JoinHandle};

use geofabric_core::osm::ObjectId;
use postgres::Client;

/// Bulk copy buffers above this size are flushed rather than grown further
/// (`db-copy.hpp`'s `db_cmd_copy_t::MAX_BUF_SIZE`).
pub const MAX_BUF_SIZE: usize = 10 * 1024 * 1024;

/// How many pending commands may queue ahead of the worker
/// (`db-copy.hpp`'s `db_cmd_copy_t::MAX_BUFFERS`).
pub const MAX_BUFFERS: usize = 10;

/// A deleter holds more than this many entries is considered full and
/// should be flushed (`db-copy.hpp`'s `MAX_ENTRIES`).
pub const MAX_DELETE_ENTRIES: usize = 1_000_000;

/// Describes a target table for a `COPY` command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyTarget {
    pub schema: String,
    pub table: String,
    /// The column `COPY ... DELETE FROM ... WHERE id = ANY($1)` matches on.
    pub id_column: String,
}

impl CopyTarget {
    #[must_use]
    pub fn new(schema: &str, table: &str, id_column: &str) -> Self {
        Self {
            schema: schema.to_owned(),
            table: table.to_owned(),
            id_column: id_column.to_owned(),
        }
    }

    fn qualified(&self) -> String {
        format!("{}.{}", self.schema, self.table)
    }
}

/// Rows to delete before (or instead of) a copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Deleter {
    /// No deletions — a pure append (import mode, or an append run that
    /// found nothing stale for this target).
    None,
    /// Delete by id alone (`db_deleter_by_id_t`): used for every table this
    /// crate writes, since each is keyed by a single id column —
    /// `nodes`/`ways`/`relations` by their own id, the bucket tables by the
    /// way/relation id they index.
    ById(Vec<ObjectId>),
}

impl Deleter {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::None => true,
            Self::ById(ids) => ids.is_empty(),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::None => 0,
            Self::ById(ids) => ids.len(),
        }
    }

    #[must_use]
    pub fn is_full(&self) -> bool {
        self.len() > MAX_DELETE_ENTRIES
    }

    fn execute(&self, client: &mut Client, target: &CopyTarget) -> Result<(), postgres::Error> {
        match self {
            Self::None => Ok(()),
            Self::ById(ids) => {
                let sql = format!(
                    "DELETE FROM {} WHERE {} = ANY($1)",
                    target.qualified(),
                    target.id_column
                );
                client.execute(&sql, &[ids]).map(|_| ())
            }
        }
    }
}

/// One command handed to the worker's run loop.
pub enum Command {
    /// Deletes `deleter`'s rows (if any), then appends `buffer` (already in
    /// `COPY ... FROM STDIN` text format, newline-terminated rows) to
    /// `target`.
    CopyDelete {
        target: CopyTarget,
        buffer: Vec<u8>,
        deleter: Deleter,
    },
    /// Ends the in-flight `COPY` for `target`, if one is open.
    EndCopy { target: CopyTarget },
    /// A barrier: the worker acknowledges once every command queued before
    /// this one has been applied.
    Sync { ack: SyncSender<()> },
    /// Ends the in-flight copy (if any) and stops the worker thread.
    Finish,
}

/// Errors surfaced from the worker thread back to its owner.
#[derive(Debug, thiserror::Error)]
pub enum CopyWorkerError {
    #[error("copy worker database error")]
    Database(#[source] postgres::Error),
    #[error("writing to a copy-in stream")]
    Io(#[source] std::io::Error),
    #[error("the copy worker thread panicked")]
    WorkerPanicked,
}

/// Builds one `COPY ... FROM STDIN` text-format row from already-formatted
/// field strings, escaping `\`, tab, newline and carriage return per the
/// `COPY` text format (grounded on `db-copy.hpp`'s row-building helpers).
#[must_use]
pub fn copy_row(fields: &[String]) -> Vec<u8> {
    let mut row = fields
        .iter()
        .map(|field| escape_copy_text(field))
        .collect::<Vec<_>>()
        .join("\t");
    row.push('\n');
    row.into_bytes()
}

/// Escapes a single field's text for the `COPY` text format.
#[must_use]
pub fn escape_copy_text(field: &str) -> String {
    field
        .replace('\\', "\\\\")
        .replace('\t', "\\t")
        .replace('\n', "\\n")
        .replace('\r', "\\r")
}

/// A handle to the background thread driving `COPY` commands. Dropping this
/// without calling [`Self::finish`] leaves the worker thread blocked
/// forever on its channel; callers must call `finish` before going out of
/// scope.
pub struct CopyWorker {
    tx: SyncSender<Command>,
    worker: Option<JoinHandle<Result<(), CopyWorkerError>>>,
}

impl CopyWorker {
    /// Spawns the worker thread, which opens its own connection using
    /// `conninfo` (the worker's connection is independent of the caller's,
    /// since `postgres::Client` is not `Send`-shared across threads).
    pub fn spawn(conninfo: String) -> Result<Self, CopyWorkerError> {
        let (tx, rx) = mpsc::sync_channel(MAX_BUFFERS);
        let worker = thread::spawn(move || run(conninfo, rx));
        Ok(Self {
            tx,
            worker: Some(worker),
        })
    }

    /// Queues a copy-with-optional-delete command. Blocks if the worker's
    /// queue is full (`MAX_BUFFERS` deep) until it drains.
    pub fn copy_delete(
        &self,
        target: CopyTarget,
        buffer: Vec<u8>,
        deleter: Deleter,
    ) -> Result<(), CopyWorkerError> {
        self.send(Command::CopyDelete {
            target,
            buffer,
            deleter,
        })
    }

    pub fn end_copy(&self, target: CopyTarget) -> Result<(), CopyWorkerError> {
        self.send(Command::EndCopy { target })
    }

    /// Blocks until every command queued before this call has been applied.
    pub fn sync_and_wait(&self) -> Result<(), CopyWorkerError> {
        let (ack_tx, ack_rx) = mpsc::sync_channel(1);
        self.send(Command::Sync { ack: ack_tx })?;
        ack_rx.recv().map_err(|_| CopyWorkerError::WorkerPanicked)
    }

    /// Ends any in-flight copy, stops the worker thread, and surfaces its
    /// final result.
    pub fn finish(mut self) -> Result<(), CopyWorkerError> {
        self.send(Command::Finish)?;
        let Some(worker) = self.worker.take() else {
            return Ok(());
        };
        worker
            .join()
            .map_err(|_| CopyWorkerError::WorkerPanicked)?
    }

    fn send(&self, command: Command) -> Result<(), CopyWorkerError> {
        self.tx
            .send(command)
            .map_err(|_| CopyWorkerError::WorkerPanicked)
    }
}

/// Each `CopyDelete` command opens its own `COPY ... FROM STDIN`, writes its
/// buffer, and finishes it before the next command runs — trading the
/// original's "leave the stream open across buffers for the same table"
/// optimization for a connection that never holds a self-referential
/// writer across loop iterations. `EndCopy` is consequently a no-op; it is
/// kept as a command so callers can mark "no more rows for this target
/// until further notice" without caring how the worker is implemented.
fn run(conninfo: String, rx: Receiver<Command>) -> Result<(), CopyWorkerError> {
    let mut client =
        Client::connect(&conninfo, postgres::NoTls).map_err(CopyWorkerError::Database)?;
    let mut pending: VecDeque<Command> = VecDeque::new();

    loop {
        let command = if let Some(command) = pending.pop_front() {
            command
        } else {
            match rx.recv() {
                Ok(command) => command,
                Err(_) => return Ok(()),
            }
        };

        match command {
            Command::CopyDelete {
                target,
                buffer,
                deleter,
            } => {
                if !deleter.is_empty() {
                    deleter
                        .execute(&mut client, &target)
                        .map_err(CopyWorkerError::Database)?;
                }
                if !buffer.is_empty() {
                    run_copy(&mut client, &target, &buffer)?;
                }
            }
            Command::EndCopy { .. } => {}
            Command::Sync { ack } => {
                let _ = ack.send(());
            }
            Command::Finish => return Ok(()),
        }
    }
}

fn run_copy(client: &mut Client, target: &CopyTarget, buffer: &[u8]) -> Result<(), CopyWorkerError> {
    use std::io::Write;
    let sql = format!("COPY {} FROM STDIN", target.qualified());
    let mut writer = client.copy_in(&sql).map_err(CopyWorkerError::Database)?;
    writer.write_all(buffer).map_err(CopyWorkerError::Io)?;
    writer.finish().map_err(CopyWorkerError::Database)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn escapes_tabs_newlines_and_backslashes() {
        assert_eq!(escape_copy_text("a\tb\nc\\d"), "a\\tb\\nc\\\\d");
    }

    #[rstest]
    fn copy_row_joins_fields_with_tabs_and_terminates_with_newline() {
        let row = copy_row(&["1".to_owned(), "hello world".to_owned()]);
        assert_eq!(row, b"1\thello world\n");
    }

    #[rstest]
    fn by_id_deleter_reports_length_and_fullness() {
        let deleter = Deleter::ById(vec![1, 2, 3]);
        assert_eq!(deleter.len(), 3);
        assert!(!deleter.is_full());
    }

    #[rstest]
    fn none_deleter_is_empty() {
        assert!(Deleter::None.is_empty());
    }

    #[rstest]
    #[expect(clippy::cast_possible_wrap, reason = "MAX_DELETE_ENTRIES is tiny relative to i64::MAX")]
    fn by_id_deleter_over_limit_is_full() {
        let ids: Vec<ObjectId> = (0..=MAX_DELETE_ENTRIES as i64).collect();
        assert!(Deleter::ById(ids).is_full());
    }
}
