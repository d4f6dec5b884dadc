pub mod table;

use std::sync::Arc;
use std::time::{Duration, Instant};
use parking_lot::Mutex;
use crate::accessor::config::AccessorKind;
use crate::background::control::{BackgroundControl, BackgroundKind};
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::stats::{ColumnStats, ShardStats};
use crate::core::types::{Row, SeqNo, ShardId};
use crate::mvcc::controller::{Snapshot, VersionController};
use crate::reader::chunk_cache::ChunkCache;
use crate::reader::snapshot_reader::SnapshotReader;
use crate::schema::catalog::TableEntry;
use crate::storage::blob_store::BlobStore;
use crate::storage::write_buffer::WriteBuffer;
use crate::writer::compaction::{CompactionOutcome, Compactor};
use crate::writer::indexation::{IndexationOutcome, Indexer};

/// Result of one background run
#[derive(Debug, Clone)]
pub enum RunOutcome {
    Indexed(Option<IndexationOutcome>),
    Compacted(Option<CompactionOutcome>),
}

impl RunOutcome {
    pub fn did_work(&self) -> bool {
        match self {
            RunOutcome::Indexed(outcome) => outcome.is_some(),
            RunOutcome::Compacted(outcome) => outcome.is_some(),
        }
    }
}

/// One partition of a table: write buffer, published chunks, and the
/// background switches that govern them.
pub struct Shard {
    pub id: ShardId,
    pub table: Arc<TableEntry>,
    pub buffer: WriteBuffer,
    pub versions: VersionController,
    pub store: Arc<dyn BlobStore>,
    pub control: BackgroundControl,
    pub cache: Arc<ChunkCache>,
    indexer: Indexer,
    compactor: Compactor,
    // Runs of the same kind never overlap within a shard
    run_locks: [Mutex<()>; 2],
}

impl Shard {
    pub fn new(
        id: ShardId,
        table: Arc<TableEntry>,
        store: Arc<dyn BlobStore>,
        cache: Arc<ChunkCache>,
        indexer: Indexer,
        compactor: Compactor,
        background_enabled: bool,
    ) -> Self {
        let snapshot = Snapshot::empty(table.schema.column_names());
        Shard {
            id,
            table,
            buffer: WriteBuffer::new(),
            versions: VersionController::new(snapshot),
            store,
            control: BackgroundControl::new(background_enabled),
            cache,
            indexer,
            compactor,
            run_locks: [Mutex::new(()), Mutex::new(())],
        }
    }

    /// Rows must already be validated against the table schema
    pub fn append(&self, rows: Vec<Row>) -> (SeqNo, SeqNo) {
        self.buffer.append(rows)
    }

    pub fn reader(&self) -> SnapshotReader {
        // Commits take the write lock, so the buffer tail read here matches the snapshot
        let guard = self.versions.read_guard();
        let snapshot = guard.clone();
        let buffered = self.buffer.snapshot_from(snapshot.buffer_boundary);
        drop(guard);
        SnapshotReader::new(self.id, snapshot, buffered, self.cache.clone())
    }

    /// Physical rows held by the shard (buffer plus chunks)
    pub fn row_count(&self) -> u64 {
        let guard = self.versions.read_guard();
        guard.indexed_rows + self.buffer.len_from(guard.buffer_boundary) as u64
    }

    /// Execute one run of `kind` now, waiting for a run already in progress
    pub fn run_background(&self, kind: BackgroundKind) -> Result<RunOutcome> {
        let _serial = self.run_locks[kind.index()].lock();
        let mut guard = self.control.begin_run(kind);

        let result = match kind {
            BackgroundKind::Indexation => self.indexer.run(self).map(RunOutcome::Indexed),
            BackgroundKind::Compaction => self.compactor.run(self).map(RunOutcome::Compacted),
        };

        if let Err(e) = &result {
            guard.mark_failed();
            tracing::warn!(
                table = %self.table.schema.name,
                shard = %self.id,
                kind = %kind,
                error = %e,
                retryable = e.is_retryable(),
                "background run aborted without commit"
            );
        }
        result
    }

    /// Work exists that an enabled task of `kind` would pick up
    pub fn has_pending(&self, kind: BackgroundKind) -> bool {
        match kind {
            BackgroundKind::Indexation => !self.buffer.is_empty(),
            BackgroundKind::Compaction => {
                self.compactor.has_work(&self.versions.current_snapshot(), &self.table.accessors())
            }
        }
    }

    pub fn is_quiescent(&self, kind: BackgroundKind) -> bool {
        !self.control.is_running(kind)
            && !(self.control.is_enabled(kind) && self.has_pending(kind))
    }

    /// Block until no run of `kind` is in progress or eligible to start
    pub fn wait_quiescent(&self, kind: BackgroundKind, deadline: Instant) -> Result<()> {
        loop {
            let seen = self.control.generation();
            if self.is_quiescent(kind) {
                return Ok(());
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(Error::new(
                    ErrorKind::Timeout,
                    format!(
                        "{} of {} in '{}' did not settle in time",
                        kind, self.id, self.table.schema.name
                    ),
                ));
            }
            // Re-check periodically: pending work can appear without a control change
            let slice = (deadline - now).min(Duration::from_millis(20));
            self.control.wait_for_change(seen, slice);
        }
    }

    pub fn stats(&self) -> ShardStats {
        let reader = self.reader();
        ShardStats {
            shard: self.id.0,
            snapshot_version: reader.snapshot.version,
            chunk_count: reader.snapshot.chunk_count(),
            indexed_rows: reader.snapshot.indexed_rows,
            buffered_rows: reader.buffered.len() as u64,
            indexation_enabled: self.control.is_enabled(BackgroundKind::Indexation),
            compaction_enabled: self.control.is_enabled(BackgroundKind::Compaction),
            indexation_runs: self.control.runs(BackgroundKind::Indexation),
            indexation_failures: self.control.failures(BackgroundKind::Indexation),
            compaction_runs: self.control.runs(BackgroundKind::Compaction),
            compaction_failures: self.control.failures(BackgroundKind::Compaction),
        }
    }

    pub fn column_stats(&self, column: &str) -> Result<ColumnStats> {
        let reader = self.reader();
        let chunks = reader
            .snapshot
            .columns
            .get(column)
            .ok_or_else(|| Error::not_found(format!("column '{}' in {}", column, self.id)))?;

        let mut stats = ColumnStats {
            buffered_rows: reader.buffered.len() as u64,
            ..Default::default()
        };
        for chunk in chunks {
            match chunk.stamp.kind() {
                AccessorKind::Plain => stats.plain_chunks += 1,
                AccessorKind::Sparsed => stats.sparsed_chunks += 1,
            }
            stats.chunk_rows += chunk.row_count() as u64;
            stats.explicit_values += chunk.metadata.explicit_values as u64;
        }
        Ok(stats)
    }

    /// Teardown: blobs are deleted as soon as no reader holds the chunks
    pub fn destroy(&self) {
        self.versions.retire_all();
    }
}
