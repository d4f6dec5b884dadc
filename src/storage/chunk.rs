use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use crate::accessor::chunk::ChunkData;
use crate::accessor::codec;
use crate::accessor::config::AccessorConfig;
use crate::core::error::{Error, Result};
use crate::core::types::ChunkId;
use crate::storage::blob_store::BlobStore;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub created_at: DateTime<Utc>,
    pub first_row: u64,         // Position of the first row in the column's chunk sequence
    pub row_count: u32,
    pub explicit_values: u32,   // Values physically stored (all rows for Plain)
    pub size_bytes: usize,
}

/// Immutable encoded unit of one column, backed by a blob.
///
/// A chunk starts out unpublished: if it is dropped before a shard installs
/// it, its blob is removed. Once installed it survives until a compaction
/// retires it and the last snapshot holding it lets go.
pub struct Chunk {
    pub id: ChunkId,
    pub column: String,
    pub stamp: AccessorConfig,
    pub metadata: ChunkMetadata,
    store: Arc<dyn BlobStore>,
    discard_on_drop: AtomicBool,
}

impl Chunk {
    /// Encode-side entry point: persist `data` and return the unpublished chunk
    pub fn write(
        store: Arc<dyn BlobStore>,
        column: &str,
        first_row: u64,
        data: &ChunkData,
    ) -> Result<Arc<Chunk>> {
        let blob = codec::encode_blob(data)?;
        let size_bytes = blob.len();
        let id = ChunkId::new();
        store.put(id, blob)?;

        Ok(Arc::new(Chunk {
            id,
            column: column.to_string(),
            stamp: data.stamp(),
            metadata: ChunkMetadata {
                created_at: Utc::now(),
                first_row,
                row_count: data.row_count() as u32,
                explicit_values: data.explicit_count() as u32,
                size_bytes,
            },
            store,
            discard_on_drop: AtomicBool::new(true),
        }))
    }

    /// Read and verify the blob against this chunk's recorded stamp
    pub fn load(&self) -> Result<ChunkData> {
        let blob = self.store.get(self.id)?;
        let data = codec::decode_blob(&blob)
            .map_err(|e| Error::corrupted(format!("chunk {} of '{}': {}", self.id, self.column, e.context)))?;

        if data.stamp() != self.stamp {
            return Err(Error::corrupted(format!(
                "chunk {} stamped {} but blob is {}",
                self.id,
                self.stamp,
                data.stamp()
            )));
        }
        if data.row_count() != self.metadata.row_count as usize {
            return Err(Error::corrupted(format!(
                "chunk {} should hold {} rows, blob has {}",
                self.id,
                self.metadata.row_count,
                data.row_count()
            )));
        }
        Ok(data)
    }

    pub fn row_count(&self) -> usize {
        self.metadata.row_count as usize
    }

    pub fn end_row(&self) -> u64 {
        self.metadata.first_row + self.metadata.row_count as u64
    }

    pub fn is_published(&self) -> bool {
        !self.discard_on_drop.load(Ordering::Acquire)
    }

    pub(crate) fn mark_published(&self) {
        self.discard_on_drop.store(false, Ordering::Release);
    }

    /// Superseded by compaction (or shard teardown): delete the blob once unreferenced
    pub(crate) fn retire(&self) {
        self.discard_on_drop.store(true, Ordering::Release);
    }
}

impl std::fmt::Debug for Chunk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Chunk")
            .field("id", &self.id)
            .field("column", &self.column)
            .field("stamp", &self.stamp)
            .field("metadata", &self.metadata)
            .finish()
    }
}

impl Drop for Chunk {
    fn drop(&mut self) {
        if self.discard_on_drop.load(Ordering::Acquire) {
            if let Err(e) = self.store.delete(self.id) {
                tracing::warn!(chunk = %self.id, column = %self.column, error = %e, "failed to delete chunk blob");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::ErrorKind;
    use crate::core::types::Value;
    use crate::storage::blob_store::MemoryBlobStore;

    fn values() -> Vec<Value> {
        vec![Value::utf8("abcde"), Value::utf8("q"), Value::utf8("abcde")]
    }

    #[test]
    fn test_write_then_load() {
        let store: Arc<dyn BlobStore> = Arc::new(MemoryBlobStore::new());
        let config = AccessorConfig::sparsed(Value::utf8("abcde"));
        let data = ChunkData::encode(&values(), &config);
        let chunk = Chunk::write(store.clone(), "field", 10, &data).unwrap();

        assert_eq!(chunk.stamp, config);
        assert_eq!(chunk.metadata.explicit_values, 1);
        assert_eq!(chunk.end_row(), 13);
        assert_eq!(chunk.load().unwrap().decode(), values());
    }

    #[test]
    fn test_unpublished_chunk_cleans_up_blob() {
        let store = Arc::new(MemoryBlobStore::new());
        let data = ChunkData::encode(&values(), &AccessorConfig::Plain);
        let chunk = Chunk::write(store.clone(), "field", 0, &data).unwrap();
        assert_eq!(store.blob_count(), 1);
        drop(chunk);
        assert_eq!(store.blob_count(), 0);
    }

    #[test]
    fn test_published_chunk_keeps_blob_until_retired() {
        let store = Arc::new(MemoryBlobStore::new());
        let data = ChunkData::encode(&values(), &AccessorConfig::Plain);

        let kept = Chunk::write(store.clone(), "field", 0, &data).unwrap();
        kept.mark_published();
        let retired = Chunk::write(store.clone(), "field", 3, &data).unwrap();
        retired.mark_published();
        retired.retire();

        let reader_copy = retired.clone();
        drop(retired);
        assert_eq!(store.blob_count(), 2, "reader still holds the retired chunk");
        drop(reader_copy);
        drop(kept);
        assert_eq!(store.blob_count(), 1);
    }

    #[test]
    fn test_tampered_blob_reports_corruption() {
        let store = Arc::new(MemoryBlobStore::new());
        let data = ChunkData::encode(&values(), &AccessorConfig::Plain);
        let chunk = Chunk::write(store.clone(), "field", 0, &data).unwrap();

        let mut blob = store.get(chunk.id).unwrap().to_vec();
        let last = blob.len() - 1;
        blob[last] ^= 0x55;
        store.put(chunk.id, blob).unwrap();

        let err = chunk.load().unwrap_err();
        assert_eq!(err.kind, ErrorKind::Corrupted);
    }
}
