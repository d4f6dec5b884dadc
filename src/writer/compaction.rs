use std::time::Instant;
use serde::Serialize;
use crate::core::error::Result;
use crate::core::types::Value;
use crate::mvcc::controller::Snapshot;
use crate::schema::catalog::ColumnAccessors;
use crate::shard::Shard;
use crate::storage::merge_policy::MergePolicy;
use crate::writer::write_chunks;

#[derive(Debug, Clone, Default, Serialize)]
pub struct CompactionOutcome {
    pub columns: usize,
    pub chunks_retired: usize,
    pub chunks_written: usize,
    pub rows_rewritten: u64,
    /// Retired chunks whose stamp differed from the config they were rewritten under
    pub chunks_reencoded: usize,
    pub snapshot_version: u64,
}

/// Merges runs of chunks within each column and re-encodes them under the
/// column's current accessor config. This is the only path by which an
/// accessor change reaches rows that were already indexed.
pub struct Compactor {
    policy: Box<dyn MergePolicy>,
    max_chunk_rows: usize,
}

impl Compactor {
    pub fn new(policy: Box<dyn MergePolicy>, max_chunk_rows: usize) -> Self {
        Compactor {
            policy,
            max_chunk_rows: max_chunk_rows.max(1),
        }
    }

    pub fn has_work(&self, snapshot: &Snapshot, accessors: &ColumnAccessors) -> bool {
        snapshot
            .columns
            .iter()
            .any(|(column, chunks)| self.policy.should_merge(chunks, accessors.get(column)))
    }

    /// One replace-set per column with a selection. Each replace-set commits
    /// on its own; a failure leaves earlier ones in place.
    pub fn run(&self, shard: &Shard) -> Result<Option<CompactionOutcome>> {
        let started = Instant::now();
        let snapshot = shard.versions.current_snapshot();
        let accessors = shard.table.accessors();
        let mut outcome = CompactionOutcome::default();

        for (column, chunks) in &snapshot.columns {
            let config = accessors.get(column);
            let selected = self.policy.select_chunks_to_merge(chunks, config);
            if selected.is_empty() {
                continue;
            }

            let mut values: Vec<Value> = Vec::new();
            for chunk in &selected {
                let data = shard.cache.get_or_load(chunk)?;
                values.extend(data.decode());
            }

            let installed = write_chunks(
                &shard.store,
                column,
                selected[0].metadata.first_row,
                &values,
                config,
                self.max_chunk_rows,
            )?;
            let written = installed.len();
            let committed = shard.versions.commit_replace(column, &selected, installed)?;

            for chunk in &selected {
                shard.cache.invalidate(&chunk.id);
            }
            outcome.columns += 1;
            outcome.chunks_retired += selected.len();
            outcome.chunks_written += written;
            outcome.rows_rewritten += values.len() as u64;
            outcome.chunks_reencoded += selected.iter().filter(|c| &c.stamp != config).count();
            outcome.snapshot_version = committed.version;
        }

        if outcome.columns == 0 {
            return Ok(None);
        }
        tracing::debug!(
            table = %shard.table.schema.name,
            shard = %shard.id,
            columns = outcome.columns,
            retired = outcome.chunks_retired,
            written = outcome.chunks_written,
            reencoded = outcome.chunks_reencoded,
            accessor_version = accessors.version,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "compaction committed"
        );
        Ok(Some(outcome))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use crate::accessor::config::{AccessorConfig, AccessorKind};
    use crate::background::control::BackgroundKind;
    use crate::core::types::Value;
    use crate::shard::RunOutcome;
    use crate::shard::tests::{rows, test_shard, test_shard_with_store, GatedStore};
    use crate::storage::blob_store::BlobStore;

    fn field_values(range: std::ops::Range<i64>) -> Vec<Value> {
        rows(range).into_iter().map(|r| r.get("field").clone()).collect()
    }

    fn assert_contiguous(shard: &crate::shard::Shard, column: &str, rows: u64) {
        let snapshot = shard.versions.current_snapshot();
        let mut expected = 0;
        for chunk in snapshot.chunks(column) {
            assert_eq!(chunk.metadata.first_row, expected);
            expected = chunk.end_row();
        }
        assert_eq!(expected, rows);
    }

    fn compact(shard: &crate::shard::Shard) -> Option<super::CompactionOutcome> {
        match shard.run_background(BackgroundKind::Compaction).unwrap() {
            RunOutcome::Compacted(outcome) => outcome,
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[test]
    fn test_merges_small_chunks_and_conserves_rows() {
        let (shard, store) = test_shard(10);
        shard.append(rows(0..50));
        shard.run_background(BackgroundKind::Indexation).unwrap();
        let before = shard.reader().column_values("field").unwrap();
        assert_eq!(shard.versions.current_snapshot().chunks("field").len(), 5);

        assert!(shard.has_pending(BackgroundKind::Compaction));
        let outcome = compact(&shard).unwrap();
        assert_eq!(outcome.columns, 2);
        assert_eq!(outcome.chunks_retired, 10);
        assert_eq!(outcome.rows_rewritten, 100);

        let snapshot = shard.versions.current_snapshot();
        assert_eq!(snapshot.chunks("field").len(), 1);
        assert_eq!(snapshot.indexed_rows, 50);
        assert_eq!(shard.reader().column_values("field").unwrap(), before);
        assert!(!shard.has_pending(BackgroundKind::Compaction));
        drop(snapshot);
        assert_eq!(store.blob_count(), 2);
    }

    #[test]
    fn test_reencodes_under_current_config() {
        let (shard, _store) = test_shard(10);
        shard.append(rows(0..30));
        shard.run_background(BackgroundKind::Indexation).unwrap();
        let before = shard.reader().column_values("field").unwrap();

        let sparsed = AccessorConfig::sparsed(Value::utf8("abcde"));
        shard.table.alter_column_accessor("field", sparsed.clone()).unwrap();
        // Altering touches no chunk
        let snapshot = shard.versions.current_snapshot();
        assert!(snapshot.chunks("field").iter().all(|c| c.stamp.kind() == AccessorKind::Plain));
        drop(snapshot);

        let outcome = compact(&shard).unwrap();
        assert_eq!(outcome.chunks_reencoded, 3);

        let snapshot = shard.versions.current_snapshot();
        let field = snapshot.chunks("field");
        assert_eq!(field.len(), 1);
        assert_eq!(field[0].stamp, sparsed);
        assert_eq!(field[0].metadata.explicit_values, 3);
        assert_eq!(shard.reader().column_values("field").unwrap(), before);
    }

    #[test]
    fn test_large_chunks_migrate_after_alter() {
        let (shard, _store) = test_shard(1_000);
        shard.append(rows(0..30));
        shard.run_background(BackgroundKind::Indexation).unwrap();
        assert!(!shard.has_pending(BackgroundKind::Compaction));

        let sparsed = AccessorConfig::sparsed(Value::utf8("abcde"));
        shard.table.alter_column_accessor("field", sparsed.clone()).unwrap();
        assert!(shard.has_pending(BackgroundKind::Compaction));

        let outcome = compact(&shard).unwrap();
        assert_eq!(outcome.columns, 1);
        assert_eq!(outcome.chunks_reencoded, 1);
        assert_eq!(shard.versions.current_snapshot().chunks("field")[0].stamp, sparsed);
        assert!(!shard.has_pending(BackgroundKind::Compaction));
    }

    #[test]
    fn test_nothing_to_merge() {
        let (shard, _store) = test_shard(1_000);
        shard.append(rows(0..30));
        shard.run_background(BackgroundKind::Indexation).unwrap();
        assert!(!shard.has_pending(BackgroundKind::Compaction));
        assert!(compact(&shard).is_none());
    }

    #[test]
    fn test_repeated_runs_converge_in_row_order() {
        let (shard, _store) = test_shard(90);
        for start in (0..2_700).step_by(90) {
            shard.append(rows(start..start + 90));
            shard.run_background(BackgroundKind::Indexation).unwrap();
        }
        while compact(&shard).is_some() {}

        let snapshot = shard.versions.current_snapshot();
        let field = snapshot.chunks("field");
        assert!(field.iter().all(|c| c.row_count() <= 1_000));
        assert_eq!(field.iter().map(|c| c.row_count()).sum::<usize>(), 2_700);
        let mut expected = 0;
        for chunk in field {
            assert_eq!(chunk.metadata.first_row, expected);
            expected = chunk.end_row();
        }
    }

    #[test]
    fn test_alter_during_run_keeps_starting_config() {
        let store = Arc::new(GatedStore::new());
        let shard = test_shard_with_store(10, store.clone());
        shard.append(rows(0..30));
        shard.run_background(BackgroundKind::Indexation).unwrap();
        store.arm();

        let sparsed = AccessorConfig::sparsed(Value::utf8("abcde"));
        let outcome = std::thread::scope(|s| {
            let run = s.spawn(|| compact(&shard));
            store.wait_parked();
            shard.table.alter_column_accessor("field", sparsed.clone()).unwrap();
            store.release.send(()).unwrap();
            run.join().unwrap().unwrap()
        });

        assert_eq!(outcome.chunks_reencoded, 0);
        let snapshot = shard.versions.current_snapshot();
        assert_eq!(snapshot.chunks("field").len(), 1);
        assert_eq!(snapshot.chunks("field")[0].stamp, AccessorConfig::Plain);
        drop(snapshot);

        // Migration is left to the next run
        assert!(shard.has_pending(BackgroundKind::Compaction));
        assert_eq!(compact(&shard).unwrap().chunks_reencoded, 1);
        assert_eq!(shard.versions.current_snapshot().chunks("field")[0].stamp, sparsed);
        assert_eq!(shard.reader().column_values("field").unwrap(), field_values(0..30));
    }

    #[test]
    fn test_indexation_commits_while_compaction_is_mid_run() {
        let store = Arc::new(GatedStore::new());
        let shard = test_shard_with_store(10, store.clone());
        shard.append(rows(0..30));
        shard.run_background(BackgroundKind::Indexation).unwrap();
        store.arm();

        std::thread::scope(|s| {
            let compaction = s.spawn(|| compact(&shard));
            store.wait_parked();

            // Indexation appends behind the chunks compaction selected
            shard.append(rows(30..50));
            shard.run_background(BackgroundKind::Indexation).unwrap();
            assert_eq!(shard.versions.current_snapshot().indexed_rows, 50);

            store.release.send(()).unwrap();
            let outcome = compaction.join().unwrap().unwrap();
            assert_eq!(outcome.rows_rewritten, 60);
        });

        assert_eq!(shard.versions.current_snapshot().indexed_rows, 50);
        assert_eq!(shard.reader().column_values("field").unwrap(), field_values(0..50));
        assert_contiguous(&shard, "field", 50);
        assert_contiguous(&shard, "pk_int", 50);
    }

    #[test]
    fn test_concurrent_indexation_and_compaction_conserve_rows() {
        let (shard, _store) = test_shard(7);
        std::thread::scope(|s| {
            let writer = s.spawn(|| {
                for start in (0..1_000).step_by(25) {
                    shard.append(rows(start..start + 25));
                    shard.run_background(BackgroundKind::Indexation).unwrap();
                }
            });
            let compactor = s.spawn(|| {
                for _ in 0..200 {
                    shard.run_background(BackgroundKind::Compaction).unwrap();
                }
            });
            writer.join().unwrap();
            compactor.join().unwrap();
        });
        while compact(&shard).is_some() {}

        assert!(shard.buffer.is_empty());
        assert_eq!(shard.versions.current_snapshot().indexed_rows, 1_000);
        assert_eq!(shard.reader().column_values("field").unwrap(), field_values(0..1_000));
        assert_contiguous(&shard, "field", 1_000);
        assert_contiguous(&shard, "pk_int", 1_000);
    }
}
