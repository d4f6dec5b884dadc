use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use std::time::{Duration, Instant};
use parking_lot::Mutex;
use rayon::prelude::*;
use crate::background::control::BackgroundKind;
use crate::background::scheduler::BackgroundWorker;
use crate::core::config::Config;
use crate::core::error::{Error, Result};
use crate::core::stats::{ColumnStats, ShardStats};
use crate::core::types::{Row, ShardId};
use crate::reader::chunk_cache::ChunkCache;
use crate::reader::snapshot_reader::SnapshotReader;
use crate::schema::catalog::TableEntry;
use crate::shard::{RunOutcome, Shard};
use crate::storage::blob_store::BlobStore;
use crate::storage::merge_policy::TieredMergePolicy;
use crate::writer::compaction::Compactor;
use crate::writer::indexation::Indexer;

/// A table partitioned by primary-key hash into shards, each with its own
/// indexation and compaction workers.
pub struct Table {
    pub entry: Arc<TableEntry>,
    shards: Vec<Arc<Shard>>,
    workers: Mutex<Vec<BackgroundWorker>>,
}

impl Table {
    /// `open_store` provides the blob store of each shard
    pub fn create<F>(
        entry: Arc<TableEntry>,
        config: &Config,
        cache: Arc<ChunkCache>,
        interval: Arc<AtomicU64>,
        open_store: F,
    ) -> Result<Self>
    where
        F: Fn(ShardId) -> Result<Arc<dyn BlobStore>>,
    {
        let mut shards = Vec::with_capacity(config.shard_count);
        for i in 0..config.shard_count {
            let id = ShardId(i as u32);
            shards.push(Arc::new(Shard::new(
                id,
                entry.clone(),
                open_store(id)?,
                cache.clone(),
                Indexer::new(config.indexation_max_chunk_rows),
                Compactor::new(
                    Box::new(TieredMergePolicy::from_config(config)),
                    config.compaction_max_chunk_rows,
                ),
                config.background_enabled_at_start,
            )));
        }

        let mut workers = Vec::with_capacity(shards.len() * BackgroundKind::ALL.len());
        for shard in &shards {
            for kind in BackgroundKind::ALL {
                workers.push(BackgroundWorker::spawn(shard.clone(), kind, interval.clone())?);
            }
        }

        tracing::info!(
            table = %entry.schema.name,
            shards = shards.len(),
            columns = entry.schema.columns.len(),
            "table created"
        );
        Ok(Table {
            entry,
            shards,
            workers: Mutex::new(workers),
        })
    }

    pub fn shards(&self) -> &[Arc<Shard>] {
        &self.shards
    }

    pub fn route(&self, row: &Row) -> usize {
        let key = self.entry.schema.key_bytes(row);
        crc32fast::hash(&key) as usize % self.shards.len()
    }

    /// Validate the whole batch, then append each row to its shard's buffer.
    /// A batch with any invalid row writes nothing.
    pub fn upsert(&self, rows: Vec<Row>) -> Result<usize> {
        for row in &rows {
            self.entry.schema.validate_row(row)?;
        }
        let count = rows.len();

        let mut buckets: Vec<Vec<Row>> = (0..self.shards.len()).map(|_| Vec::new()).collect();
        for row in rows {
            let shard = self.route(&row);
            buckets[shard].push(row);
        }
        for (shard, bucket) in self.shards.iter().zip(buckets) {
            if !bucket.is_empty() {
                shard.append(bucket);
            }
        }
        Ok(count)
    }

    /// One consistent reader per shard
    pub fn readers(&self) -> Vec<SnapshotReader> {
        self.shards.iter().map(|s| s.reader()).collect()
    }

    pub fn set_background_enabled(&self, kind: BackgroundKind, enabled: bool) {
        for shard in &self.shards {
            shard.control.set_enabled(kind, enabled);
        }
        if enabled {
            self.wakeup(kind);
        }
        tracing::info!(table = %self.entry.schema.name, kind = %kind, enabled, "background switched");
    }

    pub fn wakeup(&self, kind: BackgroundKind) {
        for worker in self.workers.lock().iter().filter(|w| w.kind == kind) {
            worker.wakeup();
        }
    }

    /// Wait until every shard is quiescent for `kind`. All shards share one deadline.
    pub fn wait(&self, kind: BackgroundKind, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        self.wakeup(kind);
        for shard in &self.shards {
            shard.wait_quiescent(kind, deadline).map_err(|e| {
                tracing::warn!(table = %self.entry.schema.name, kind = %kind, timeout_ms = timeout.as_millis() as u64, "wait timed out");
                e
            })?;
        }
        Ok(())
    }

    /// Run `kind` once on every shard in parallel, regardless of the switches
    pub fn run_now(&self, kind: BackgroundKind) -> Result<Vec<RunOutcome>> {
        self.shards.par_iter().map(|shard| shard.run_background(kind)).collect()
    }

    pub fn shard_stats(&self) -> Vec<ShardStats> {
        self.shards.iter().map(|s| s.stats()).collect()
    }

    pub fn column_stats(&self, column: &str) -> Result<ColumnStats> {
        if self.entry.schema.column(column).is_none() {
            return Err(Error::not_found(format!(
                "column '{}' in table '{}'",
                column, self.entry.schema.name
            )));
        }
        let mut total = ColumnStats::default();
        for shard in &self.shards {
            total.merge(&shard.column_stats(column)?);
        }
        Ok(total)
    }

    /// Stop and join every worker. Runs in progress finish first.
    pub fn shutdown(&self) {
        let mut workers = self.workers.lock();
        for worker in workers.iter_mut() {
            worker.shutdown();
        }
        workers.clear();
    }

    /// Shut down and release every chunk blob of the table
    pub fn destroy(&self) {
        self.shutdown();
        for shard in &self.shards {
            shard.destroy();
        }
    }
}

impl Drop for Table {
    fn drop(&mut self) {
        self.shutdown();
    }
}
