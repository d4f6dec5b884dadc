use parking_lot::{RwLock, RwLockReadGuard};
use std::sync::atomic::{AtomicU64, Ordering};
use std::collections::BTreeMap;
use std::sync::Arc;
use chrono::{DateTime, Utc};
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::types::{ChunkId, SeqNo};
use crate::storage::chunk::Chunk;
use crate::storage::write_buffer::WriteBuffer;

/// Chunk set of a shard at one point in time.
///
/// Every column's chunk list covers rows `[0, indexed_rows)` in order; rows
/// with `seq >= buffer_boundary` are still in the write buffer.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub version: u64,
    pub columns: BTreeMap<String, Vec<Arc<Chunk>>>,
    pub indexed_rows: u64,
    pub buffer_boundary: SeqNo,
    pub timestamp: DateTime<Utc>,
}

impl Snapshot {
    pub fn empty<'a>(columns: impl IntoIterator<Item = &'a str>) -> Self {
        Snapshot {
            version: 0,
            columns: columns.into_iter().map(|c| (c.to_string(), Vec::new())).collect(),
            indexed_rows: 0,
            buffer_boundary: SeqNo(0),
            timestamp: Utc::now(),
        }
    }

    pub fn chunks(&self, column: &str) -> &[Arc<Chunk>] {
        self.columns.get(column).map(|c| c.as_slice()).unwrap_or(&[])
    }

    pub fn chunk_count(&self) -> usize {
        self.columns.values().map(|c| c.len()).sum()
    }
}

/// Publishes shard snapshots. Every state change (indexation commit,
/// compaction replace-set) swaps in one new snapshot under the write lock.
pub struct VersionController {
    current: RwLock<Arc<Snapshot>>,
    next_version: AtomicU64,
}

/// Chunks built by one indexation run, one list per column
pub struct IndexedBatch {
    pub base_boundary: SeqNo,
    pub new_boundary: SeqNo,
    pub rows: u64,
    pub columns: BTreeMap<String, Vec<Arc<Chunk>>>,
}

impl VersionController {
    pub fn new(initial: Snapshot) -> Self {
        VersionController {
            current: RwLock::new(Arc::new(initial)),
            next_version: AtomicU64::new(1),
        }
    }

    pub fn current_snapshot(&self) -> Arc<Snapshot> {
        self.current.read().clone()
    }

    /// Hold off commits while the caller reads the buffer tail matching the snapshot
    pub fn read_guard(&self) -> RwLockReadGuard<'_, Arc<Snapshot>> {
        self.current.read()
    }

    /// Append indexed chunks and trim the buffer as one visible transition
    pub fn commit_indexation(&self, batch: IndexedBatch, buffer: &WriteBuffer) -> Result<Arc<Snapshot>> {
        let mut current = self.current.write();

        if current.buffer_boundary != batch.base_boundary {
            return Err(Error::new(
                ErrorKind::Conflict,
                format!(
                    "indexation started at {:?} but shard is at {:?}",
                    batch.base_boundary, current.buffer_boundary
                ),
            ));
        }

        let mut next = (**current).clone();
        for (column, chunks) in &next.columns {
            let added = batch.columns.get(column).ok_or_else(|| {
                Error::new(ErrorKind::Internal, format!("indexation produced nothing for '{}'", column))
            })?;
            let mut expected = current.indexed_rows;
            for chunk in added {
                if chunk.metadata.first_row != expected {
                    return Err(Error::new(
                        ErrorKind::Internal,
                        format!("chunk for '{}' starts at {} instead of {}", column, chunk.metadata.first_row, expected),
                    ));
                }
                expected = chunk.end_row();
            }
            if expected != current.indexed_rows + batch.rows {
                return Err(Error::new(
                    ErrorKind::Internal,
                    format!("chunks for '{}' cover {} rows, batch has {}", column, expected - current.indexed_rows, batch.rows),
                ));
            }
            debug_assert!(chunks.last().map_or(true, |c| c.end_row() == current.indexed_rows));
        }

        for (column, added) in batch.columns {
            if let Some(chunks) = next.columns.get_mut(&column) {
                for chunk in &added {
                    chunk.mark_published();
                }
                chunks.extend(added);
            }
        }
        next.indexed_rows += batch.rows;
        next.buffer_boundary = batch.new_boundary;
        next.version = self.next_version.fetch_add(1, Ordering::SeqCst);
        next.timestamp = Utc::now();

        // Still under the write lock: no reader sees the new chunks with an untrimmed buffer
        buffer.trim(batch.new_boundary);

        let next = Arc::new(next);
        *current = next.clone();
        Ok(next)
    }

    /// Swap `retired` (a contiguous run of one column) for `installed`
    pub fn commit_replace(
        &self,
        column: &str,
        retired: &[Arc<Chunk>],
        installed: Vec<Arc<Chunk>>,
    ) -> Result<Arc<Snapshot>> {
        if retired.is_empty() {
            return Err(Error::invalid_argument("replace-set without chunks to retire"));
        }
        let mut current = self.current.write();
        let chunks = current
            .columns
            .get(column)
            .ok_or_else(|| Error::not_found(format!("column '{}' in shard snapshot", column)))?;

        let first_id: ChunkId = retired[0].id;
        let start = chunks
            .iter()
            .position(|c| c.id == first_id)
            .ok_or_else(|| Error::new(ErrorKind::Conflict, format!("chunk {} is no longer live", first_id)))?;
        let end = start + retired.len();
        if end > chunks.len() || chunks[start..end].iter().zip(retired).any(|(a, b)| a.id != b.id) {
            return Err(Error::new(
                ErrorKind::Conflict,
                format!("chunks of '{}' changed since selection", column),
            ));
        }

        let retired_rows: u64 = retired.iter().map(|c| c.row_count() as u64).sum();
        let installed_rows: u64 = installed.iter().map(|c| c.row_count() as u64).sum();
        if retired_rows != installed_rows {
            return Err(Error::new(
                ErrorKind::Internal,
                format!("replace-set for '{}' would turn {} rows into {}", column, retired_rows, installed_rows),
            ));
        }
        let mut expected = retired[0].metadata.first_row;
        for chunk in &installed {
            if chunk.metadata.first_row != expected {
                return Err(Error::new(
                    ErrorKind::Internal,
                    format!("replacement chunk for '{}' starts at {} instead of {}", column, chunk.metadata.first_row, expected),
                ));
            }
            expected = chunk.end_row();
        }

        let mut next = (**current).clone();
        if let Some(list) = next.columns.get_mut(column) {
            for chunk in &installed {
                chunk.mark_published();
            }
            list.splice(start..end, installed);
        }
        next.version = self.next_version.fetch_add(1, Ordering::SeqCst);
        next.timestamp = Utc::now();

        for chunk in retired {
            chunk.retire();
        }

        let next = Arc::new(next);
        *current = next.clone();
        Ok(next)
    }

    /// Shard teardown: every chunk's blob goes away with its last reference
    pub fn retire_all(&self) {
        let current = self.current.read();
        for chunks in current.columns.values() {
            for chunk in chunks {
                chunk.retire();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accessor::{AccessorConfig, ChunkData};
    use crate::core::types::{Row, Value};
    use crate::storage::blob_store::{BlobStore, MemoryBlobStore};

    fn write(store: &Arc<dyn BlobStore>, column: &str, first_row: u64, n: usize) -> Arc<Chunk> {
        let data = ChunkData::encode(&vec![Value::Int64(first_row as i64); n], &AccessorConfig::Plain);
        Chunk::write(store.clone(), column, first_row, &data).unwrap()
    }

    fn batch(store: &Arc<dyn BlobStore>, base: u64, first_row: u64, n: usize) -> IndexedBatch {
        let mut columns = BTreeMap::new();
        columns.insert("c".to_string(), vec![write(store, "c", first_row, n)]);
        IndexedBatch {
            base_boundary: SeqNo(base),
            new_boundary: SeqNo(base + n as u64),
            rows: n as u64,
            columns,
        }
    }

    fn setup() -> (VersionController, WriteBuffer, Arc<dyn BlobStore>) {
        let buffer = WriteBuffer::new();
        buffer.append((0..10).map(|i| Row::new().with("c", Value::Int64(i))).collect());
        let store: Arc<dyn BlobStore> = Arc::new(MemoryBlobStore::new());
        (VersionController::new(Snapshot::empty(["c"])), buffer, store)
    }

    #[test]
    fn test_indexation_commit_trims_buffer() {
        let (controller, buffer, store) = setup();
        let snap = controller.commit_indexation(batch(&store, 0, 0, 4), &buffer).unwrap();
        assert_eq!(snap.indexed_rows, 4);
        assert_eq!(snap.buffer_boundary, SeqNo(4));
        assert_eq!(buffer.len(), 6);
        assert!(snap.chunks("c")[0].is_published());
        assert_eq!(snap.version, 1);
    }

    #[test]
    fn test_stale_indexation_is_a_conflict() {
        let (controller, buffer, store) = setup();
        controller.commit_indexation(batch(&store, 0, 0, 4), &buffer).unwrap();
        let err = controller.commit_indexation(batch(&store, 0, 0, 4), &buffer).err().unwrap();
        assert_eq!(err.kind, ErrorKind::Conflict);
        assert_eq!(buffer.len(), 6);
        // The rejected chunk was never published, so its blob is gone
        assert_eq!(store.blob_count(), 1);
    }

    #[test]
    fn test_replace_set_swaps_run_and_conserves_rows() {
        let (controller, buffer, store) = setup();
        controller.commit_indexation(batch(&store, 0, 0, 3), &buffer).unwrap();
        controller.commit_indexation(batch(&store, 3, 3, 3), &buffer).unwrap();
        let before = controller.current_snapshot();
        let old: Vec<_> = before.chunks("c").to_vec();

        let merged = write(&store, "c", 0, 6);
        let after = controller.commit_replace("c", &old, vec![merged]).unwrap();
        assert_eq!(after.chunks("c").len(), 1);
        assert_eq!(after.indexed_rows, 6);

        // The old snapshot still reads the retired chunks
        assert_eq!(store.blob_count(), 3);
        drop(old);
        drop(before);
        assert_eq!(store.blob_count(), 1);
    }

    #[test]
    fn test_replace_rejects_row_mismatch_and_vanished_chunks() {
        let (controller, buffer, store) = setup();
        controller.commit_indexation(batch(&store, 0, 0, 3), &buffer).unwrap();
        let old: Vec<_> = controller.current_snapshot().chunks("c").to_vec();

        let short = write(&store, "c", 0, 2);
        let err = controller.commit_replace("c", &old, vec![short]).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Internal);

        let merged = write(&store, "c", 0, 3);
        controller.commit_replace("c", &old, vec![merged]).unwrap();
        let again = write(&store, "c", 0, 3);
        let err = controller.commit_replace("c", &old, vec![again]).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Conflict);
    }
}
