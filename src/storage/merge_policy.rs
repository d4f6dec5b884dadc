use std::sync::Arc;
use crate::accessor::config::AccessorConfig;
use crate::core::config::Config;
use crate::storage::chunk::Chunk;

/// Policy for deciding when and which chunks of one column to merge
pub trait MergePolicy: Send + Sync {
    /// Select a run of chunks to rewrite under `current`. `chunks` is in row
    /// order; the selection must be contiguous so the result keeps that order.
    fn select_chunks_to_merge(&self, chunks: &[Arc<Chunk>], current: &AccessorConfig) -> Vec<Arc<Chunk>>;

    fn should_merge(&self, chunks: &[Arc<Chunk>], current: &AccessorConfig) -> bool {
        !self.select_chunks_to_merge(chunks, current).is_empty()
    }
}

/// Merges runs of adjacent small chunks. When there are none, picks the
/// first run of chunks stamped with a config other than the current one so
/// an accessor change eventually reaches every chunk.
#[derive(Debug, Clone)]
pub struct TieredMergePolicy {
    pub small_chunk_rows: usize,
    pub min_chunks_to_merge: usize,
    pub max_chunks_to_merge: usize,
}

impl Default for TieredMergePolicy {
    fn default() -> Self {
        TieredMergePolicy {
            small_chunk_rows: 8_192,
            min_chunks_to_merge: 2,
            max_chunks_to_merge: 16,
        }
    }
}

impl TieredMergePolicy {
    pub fn from_config(config: &Config) -> Self {
        TieredMergePolicy {
            small_chunk_rows: config.compaction_small_chunk_rows,
            min_chunks_to_merge: config.compaction_min_chunks,
            max_chunks_to_merge: config.compaction_max_chunks,
        }
    }
}

impl TieredMergePolicy {
    fn small_run(&self, chunks: &[Arc<Chunk>]) -> Vec<Arc<Chunk>> {
        let mut run: Vec<Arc<Chunk>> = Vec::new();

        for chunk in chunks {
            if chunk.row_count() < self.small_chunk_rows {
                run.push(chunk.clone());
                if run.len() >= self.max_chunks_to_merge {
                    break;
                }
            } else if run.len() >= self.min_chunks_to_merge {
                break;
            } else {
                // A large chunk splits runs
                run.clear();
            }
        }

        if run.len() < self.min_chunks_to_merge {
            Vec::new()
        } else {
            run
        }
    }

    fn stale_run(&self, chunks: &[Arc<Chunk>], current: &AccessorConfig) -> Vec<Arc<Chunk>> {
        chunks
            .iter()
            .skip_while(|c| &c.stamp == current)
            .take_while(|c| &c.stamp != current)
            .take(self.max_chunks_to_merge.max(1))
            .cloned()
            .collect()
    }
}

impl MergePolicy for TieredMergePolicy {
    fn select_chunks_to_merge(&self, chunks: &[Arc<Chunk>], current: &AccessorConfig) -> Vec<Arc<Chunk>> {
        let run = self.small_run(chunks);
        if run.is_empty() {
            self.stale_run(chunks, current)
        } else {
            run
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accessor::{AccessorConfig, ChunkData};
    use crate::core::types::Value;
    use crate::storage::blob_store::{BlobStore, MemoryBlobStore};

    fn chunks(sizes: &[usize]) -> Vec<Arc<Chunk>> {
        stamped(&sizes.iter().map(|&n| (n, AccessorConfig::Plain)).collect::<Vec<_>>())
    }

    fn stamped(sizes_and_stamps: &[(usize, AccessorConfig)]) -> Vec<Arc<Chunk>> {
        let store: Arc<dyn BlobStore> = Arc::new(MemoryBlobStore::new());
        let mut first_row = 0;
        sizes_and_stamps
            .iter()
            .map(|(n, config)| {
                let n = *n;
                let data = ChunkData::encode(&vec![Value::Int64(1); n], config);
                let chunk = Chunk::write(store.clone(), "c", first_row, &data).unwrap();
                first_row += n as u64;
                chunk
            })
            .collect()
    }

    fn policy() -> TieredMergePolicy {
        TieredMergePolicy {
            small_chunk_rows: 10,
            min_chunks_to_merge: 2,
            max_chunks_to_merge: 3,
        }
    }

    fn rows_of(selected: &[Arc<Chunk>]) -> Vec<u64> {
        selected.iter().map(|c| c.metadata.first_row).collect()
    }

    #[test]
    fn test_picks_first_adjacent_run() {
        let all = chunks(&[50, 5, 5, 50, 5, 5]);
        let selected = policy().select_chunks_to_merge(&all, &AccessorConfig::Plain);
        assert_eq!(rows_of(&selected), vec![50, 55]);
    }

    #[test]
    fn test_isolated_small_chunks_are_left_alone() {
        let all = chunks(&[5, 50, 5, 50, 5]);
        assert!(!policy().should_merge(&all, &AccessorConfig::Plain));
    }

    #[test]
    fn test_run_is_capped() {
        let all = chunks(&[1, 1, 1, 1, 1]);
        let selected = policy().select_chunks_to_merge(&all, &AccessorConfig::Plain);
        assert_eq!(rows_of(&selected), vec![0, 1, 2]);
    }

    #[test]
    fn test_nothing_to_do_on_large_chunks() {
        let all = chunks(&[50, 60, 70]);
        assert!(policy().select_chunks_to_merge(&all, &AccessorConfig::Plain).is_empty());
    }

    #[test]
    fn test_stale_chunks_are_selected_for_migration() {
        let sparsed = AccessorConfig::sparsed(Value::Int64(1));
        let all = stamped(&[
            (50, sparsed.clone()),
            (60, AccessorConfig::Plain),
            (70, AccessorConfig::Plain),
            (80, sparsed.clone()),
            (90, AccessorConfig::Plain),
        ]);
        let selected = policy().select_chunks_to_merge(&all, &sparsed);
        assert_eq!(rows_of(&selected), vec![50, 110]);

        let migrated = stamped(&[(50, sparsed.clone()), (60, sparsed.clone())]);
        assert!(!policy().should_merge(&migrated, &sparsed));
    }
}
