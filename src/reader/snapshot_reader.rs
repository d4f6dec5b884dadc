use std::sync::Arc;
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::types::{ShardId, Value};
use crate::mvcc::controller::Snapshot;
use crate::reader::chunk_cache::ChunkCache;
use crate::storage::write_buffer::BufferedRow;

/// Consistent view of one shard: published chunks plus the buffer rows
/// not yet folded into them.
pub struct SnapshotReader {
    pub shard: ShardId,
    pub snapshot: Arc<Snapshot>,
    pub buffered: Vec<BufferedRow>,
    cache: Arc<ChunkCache>,
}

impl SnapshotReader {
    pub fn new(
        shard: ShardId,
        snapshot: Arc<Snapshot>,
        buffered: Vec<BufferedRow>,
        cache: Arc<ChunkCache>,
    ) -> Self {
        SnapshotReader {
            shard,
            snapshot,
            buffered,
            cache,
        }
    }

    /// Physical rows: indexed rows plus buffered rows
    pub fn row_count(&self) -> usize {
        self.snapshot.indexed_rows as usize + self.buffered.len()
    }

    /// Logical values of `column` in row order. Each chunk is decoded with
    /// its own stamp, whatever the column's current config is.
    pub fn column_values(&self, column: &str) -> Result<Vec<Value>> {
        let chunks = self
            .snapshot
            .columns
            .get(column)
            .ok_or_else(|| Error::not_found(format!("column '{}' in {}", column, self.shard)))?;

        let mut out = Vec::with_capacity(self.row_count());
        for chunk in chunks {
            let data = self.cache.get_or_load(chunk)?;
            out.extend(data.decode());
        }
        if out.len() as u64 != self.snapshot.indexed_rows {
            return Err(Error::new(
                ErrorKind::Corrupted,
                format!(
                    "column '{}' of {} decodes to {} rows, expected {}",
                    column,
                    self.shard,
                    out.len(),
                    self.snapshot.indexed_rows
                ),
            ));
        }

        out.extend(self.buffered.iter().map(|r| r.row.get(column).clone()));
        Ok(out)
    }
}
