use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use crate::accessor::config::AccessorConfig;
use crate::background::control::BackgroundKind;
use crate::core::config::Config;
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::stats::{ColumnStats, DatabaseStats, ShardStats};
use crate::core::types::{Row, ShardId, Value};
use crate::query::ast::{Predicate, Query};
use crate::query::executor::{QueryExecutor, QueryResult};
use crate::reader::chunk_cache::ChunkCache;
use crate::schema::catalog::{AlterColumnRequest, Catalog};
use crate::schema::schema::TableSchema;
use crate::shard::RunOutcome;
use crate::shard::table::Table;
use crate::storage::blob_store::{BlobStore, FileBlobStore, MemoryBlobStore};
use crate::storage::layout::StorageLayout;

pub struct Database {
    config: Config,
    catalog: Catalog,
    tables: RwLock<HashMap<String, Arc<Table>>>,

    layout: Option<StorageLayout>,          // Chunk files on disk when set
    shared_store: Option<Arc<dyn BlobStore>>,
    cache: Arc<ChunkCache>,

    // Background switches applied to every table, including ones created later
    background_enabled: [AtomicBool; 2],
    wakeup_interval_ms: Arc<AtomicU64>,

    // Metrics
    start_time: Instant,
    started_at: DateTime<Utc>,
    rows_written: AtomicU64,
    queries_executed: AtomicU64,
}

impl Database {
    pub fn open(config: Config) -> Result<Self> {
        config.validate()?;
        let layout = match &config.storage_path {
            Some(path) => Some(StorageLayout::new(path.clone())?),
            None => None,
        };
        Ok(Self::build(config, layout, None))
    }

    /// Every shard of every table keeps its blobs in `store`
    pub fn open_with_store(config: Config, store: Arc<dyn BlobStore>) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(config, None, Some(store)))
    }

    fn build(config: Config, layout: Option<StorageLayout>, shared_store: Option<Arc<dyn BlobStore>>) -> Self {
        let enabled = config.background_enabled_at_start;
        tracing::info!(
            shards = config.shard_count,
            storage = ?config.storage_path,
            wakeup_ms = config.wakeup_interval_ms,
            background = enabled,
            "database opened"
        );
        Database {
            cache: Arc::new(ChunkCache::new(config.chunk_cache_entries)),
            wakeup_interval_ms: Arc::new(AtomicU64::new(config.wakeup_interval_ms)),
            background_enabled: [AtomicBool::new(enabled), AtomicBool::new(enabled)],
            config,
            catalog: Catalog::new(),
            tables: RwLock::new(HashMap::new()),
            layout,
            shared_store,
            start_time: Instant::now(),
            started_at: Utc::now(),
            rows_written: AtomicU64::new(0),
            queries_executed: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Define a table partitioned by primary-key hash into `shard_count` shards
    pub fn create_table(&self, schema: TableSchema) -> Result<()> {
        let entry = self.catalog.create_table(schema)?;
        let name = entry.schema.name.clone();

        let table = Table::create(
            entry,
            &self.config,
            self.cache.clone(),
            self.wakeup_interval_ms.clone(),
            |shard| self.open_store(&name, shard),
        );
        let table = match table {
            Ok(table) => Arc::new(table),
            Err(e) => {
                let _ = self.catalog.drop_table(&name);
                return Err(e);
            }
        };
        for kind in BackgroundKind::ALL {
            let enabled = self.is_background_enabled(kind);
            if enabled != self.config.background_enabled_at_start {
                table.set_background_enabled(kind, enabled);
            }
        }
        self.tables.write().insert(name, table);
        Ok(())
    }

    fn open_store(&self, table: &str, shard: ShardId) -> Result<Arc<dyn BlobStore>> {
        if let Some(store) = &self.shared_store {
            return Ok(store.clone());
        }
        match &self.layout {
            Some(layout) => {
                let store = FileBlobStore::open(layout.shard_dir(table, shard))?;
                // Chunks are only reachable through in-memory snapshots; leftovers are orphans
                let orphans = store.purge()?;
                if orphans > 0 {
                    tracing::warn!(table, shard = %shard, orphans, "removed orphan chunk files");
                }
                Ok(Arc::new(store))
            }
            None => Ok(Arc::new(MemoryBlobStore::new())),
        }
    }

    /// Stop the table's workers and delete its chunks
    pub fn drop_table(&self, name: &str) -> Result<()> {
        let table = self
            .tables
            .write()
            .remove(name)
            .ok_or_else(|| Error::not_found(format!("table '{}'", name)))?;
        self.catalog.drop_table(name)?;
        table.destroy();
        self.cache.clear();
        tracing::info!(table = name, "table dropped");
        Ok(())
    }

    pub fn table(&self, name: &str) -> Result<Arc<Table>> {
        self.tables
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| Error::not_found(format!("table '{}'", name)))
    }

    pub fn table_names(&self) -> Vec<String> {
        self.catalog.table_names()
    }

    /// Insert-or-replace by primary key. The batch is validated as a whole.
    pub fn upsert(&self, table: &str, rows: Vec<Row>) -> Result<usize> {
        let written = self.table(table)?.upsert(rows)?;
        self.rows_written.fetch_add(written as u64, Ordering::Relaxed);
        Ok(written)
    }

    /// Switch `column` to `config`. `target` is a table, or a store prefix
    /// whose tables all change together. Existing chunks keep their encoding;
    /// runs starting afterwards use the new one.
    pub fn alter_column_accessor(&self, table: &str, column: &str, config: AccessorConfig) -> Result<u64> {
        self.catalog.alter_column_accessor(table, column, config)
    }

    /// Option form: `ACTION=ALTER_COLUMN, NAME=..., DATA_ACCESSOR_CONSTRUCTOR.CLASS_NAME=..., DEFAULT_VALUE=...`
    pub fn alter_with_options(&self, table: &str, options: &HashMap<String, String>) -> Result<u64> {
        let request = AlterColumnRequest::from_options(options)?;
        self.catalog.alter_with_request(table, &request)
    }

    pub fn query(&self, table: &str, query: &Query) -> Result<QueryResult> {
        let table = self.table(table)?;
        let result = QueryExecutor::execute(&table, query)?;
        self.queries_executed.fetch_add(1, Ordering::Relaxed);
        Ok(result)
    }

    pub fn count(&self, table: &str) -> Result<u64> {
        self.count_matching(table, Query::count())
    }

    pub fn count_where_eq(&self, table: &str, column: &str, value: Value) -> Result<u64> {
        self.count_matching(table, Query::count_where(Predicate::equals(column, value)))
    }

    fn count_matching(&self, table: &str, query: Query) -> Result<u64> {
        self.query(table, &query)?
            .as_count()
            .ok_or_else(|| Error::new(ErrorKind::Internal, "count query returned rows".to_string()))
    }

    pub fn enable_background(&self, kind: BackgroundKind) {
        self.set_background_enabled(kind, true);
    }

    pub fn disable_background(&self, kind: BackgroundKind) {
        self.set_background_enabled(kind, false);
    }

    fn set_background_enabled(&self, kind: BackgroundKind, enabled: bool) {
        self.background_enabled[kind.index()].store(enabled, Ordering::SeqCst);
        for table in self.tables.read().values() {
            table.set_background_enabled(kind, enabled);
        }
    }

    pub fn is_background_enabled(&self, kind: BackgroundKind) -> bool {
        self.background_enabled[kind.index()].load(Ordering::SeqCst)
    }

    pub fn wait_indexation(&self, timeout: Duration) -> Result<()> {
        self.wait(BackgroundKind::Indexation, timeout)
    }

    pub fn wait_compaction(&self, timeout: Duration) -> Result<()> {
        self.wait(BackgroundKind::Compaction, timeout)
    }

    /// Block until no run of `kind` is in progress or eligible in any table.
    /// Returns a `Timeout` error if that does not happen within `timeout`.
    pub fn wait(&self, kind: BackgroundKind, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        let tables: Vec<Arc<Table>> = self.tables.read().values().cloned().collect();
        for table in tables {
            table.wait(kind, deadline.saturating_duration_since(Instant::now()))?;
        }
        Ok(())
    }

    /// Period of the periodic background activation; applies from the next tick
    pub fn set_wakeup_interval(&self, interval: Duration) {
        let ms = interval.as_millis().clamp(1, u64::MAX as u128) as u64;
        self.wakeup_interval_ms.store(ms, Ordering::Relaxed);
        for table in self.tables.read().values() {
            for kind in BackgroundKind::ALL {
                table.wakeup(kind);
            }
        }
    }

    pub fn run_indexation_now(&self, table: &str) -> Result<Vec<RunOutcome>> {
        self.table(table)?.run_now(BackgroundKind::Indexation)
    }

    pub fn run_compaction_now(&self, table: &str) -> Result<Vec<RunOutcome>> {
        self.table(table)?.run_now(BackgroundKind::Compaction)
    }

    pub fn column_stats(&self, table: &str, column: &str) -> Result<ColumnStats> {
        self.table(table)?.column_stats(column)
    }

    pub fn shard_stats(&self, table: &str) -> Result<Vec<ShardStats>> {
        Ok(self.table(table)?.shard_stats())
    }

    pub fn stats(&self) -> DatabaseStats {
        let tables = self.tables.read();
        let shards: Vec<ShardStats> = tables.values().flat_map(|t| t.shard_stats()).collect();
        DatabaseStats {
            uptime_secs: self.start_time.elapsed().as_secs(),
            start_time: self.started_at,
            table_count: tables.len(),
            chunk_count: shards.iter().map(|s| s.chunk_count).sum(),
            shards,
            cache_stats: self.cache.stats(),
            rows_written: self.rows_written.load(Ordering::Relaxed),
            queries_executed: self.queries_executed.load(Ordering::Relaxed),
        }
    }

    /// Stop every background worker; runs in progress complete first
    pub fn shutdown(&self) {
        for table in self.tables.read().values() {
            table.shutdown();
        }
    }
}

impl Drop for Database {
    fn drop(&mut self) {
        self.shutdown();
    }
}
