use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use rayon::prelude::*;
use serde::Serialize;
use crate::core::error::Result;
use crate::core::types::Value;
use crate::mvcc::controller::IndexedBatch;
use crate::shard::Shard;
use crate::storage::chunk::Chunk;
use crate::writer::write_chunks;

#[derive(Debug, Clone, Serialize)]
pub struct IndexationOutcome {
    pub rows: u64,
    pub chunks_written: usize,
    pub accessor_version: u64,
    pub snapshot_version: u64,
}

/// Folds the committed prefix of a shard's write buffer into chunks,
/// encoding each column under the accessor config current when the run starts.
pub struct Indexer {
    pub max_chunk_rows: usize,
}

impl Indexer {
    pub fn new(max_chunk_rows: usize) -> Self {
        Indexer {
            max_chunk_rows: max_chunk_rows.max(1),
        }
    }

    /// Returns `None` when the buffer held nothing to index
    pub fn run(&self, shard: &Shard) -> Result<Option<IndexationOutcome>> {
        let started = Instant::now();
        let snapshot = shard.versions.current_snapshot();
        let base = snapshot.buffer_boundary;
        let rows = shard.buffer.snapshot(base, shard.buffer.capture_boundary());
        let Some(last) = rows.last() else {
            return Ok(None);
        };
        let new_boundary = last.seq.next();

        // One config snapshot for the whole run
        let accessors = shard.table.accessors();
        let columns: Vec<&str> = shard.table.schema.column_names().collect();

        let chunks: BTreeMap<String, Vec<Arc<Chunk>>> = columns
            .par_iter()
            .map(|column| -> Result<(String, Vec<Arc<Chunk>>)> {
                let values: Vec<Value> = rows.iter().map(|r| r.row.get(column).clone()).collect();
                let chunks = write_chunks(
                    &shard.store,
                    column,
                    snapshot.indexed_rows,
                    &values,
                    accessors.get(column),
                    self.max_chunk_rows,
                )?;
                Ok((column.to_string(), chunks))
            })
            .collect::<Result<_>>()?;

        let chunks_written = chunks.values().map(|c| c.len()).sum();
        let batch = IndexedBatch {
            base_boundary: base,
            new_boundary,
            rows: rows.len() as u64,
            columns: chunks,
        };
        let committed = shard.versions.commit_indexation(batch, &shard.buffer)?;

        tracing::debug!(
            table = %shard.table.schema.name,
            shard = %shard.id,
            rows = rows.len(),
            chunks = chunks_written,
            accessor_version = accessors.version,
            snapshot_version = committed.version,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "indexation committed"
        );

        Ok(Some(IndexationOutcome {
            rows: rows.len() as u64,
            chunks_written,
            accessor_version: accessors.version,
            snapshot_version: committed.version,
        }))
    }
}
