use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use crate::reader::chunk_cache::CacheStats;

/// Physical layout of one column across the shards of a table
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ColumnStats {
    pub plain_chunks: usize,
    pub sparsed_chunks: usize,
    pub chunk_rows: u64,
    pub buffered_rows: u64,
    pub explicit_values: u64,   // Values physically stored in chunks
}

impl ColumnStats {
    pub fn total_rows(&self) -> u64 {
        self.chunk_rows + self.buffered_rows
    }

    pub fn merge(&mut self, other: &ColumnStats) {
        self.plain_chunks += other.plain_chunks;
        self.sparsed_chunks += other.sparsed_chunks;
        self.chunk_rows += other.chunk_rows;
        self.buffered_rows += other.buffered_rows;
        self.explicit_values += other.explicit_values;
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShardStats {
    pub shard: u32,
    pub snapshot_version: u64,
    pub chunk_count: usize,
    pub indexed_rows: u64,
    pub buffered_rows: u64,

    // Background bookkeeping
    pub indexation_enabled: bool,
    pub compaction_enabled: bool,
    pub indexation_runs: u64,
    pub indexation_failures: u64,
    pub compaction_runs: u64,
    pub compaction_failures: u64,
}

/// Database statistics for monitoring
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseStats {
    pub uptime_secs: u64,
    pub start_time: DateTime<Utc>,
    pub table_count: usize,
    pub shards: Vec<ShardStats>,
    pub chunk_count: usize,
    pub cache_stats: CacheStats,
    pub rows_written: u64,
    pub queries_executed: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_stats_merge() {
        let mut total = ColumnStats::default();
        total.merge(&ColumnStats { plain_chunks: 2, chunk_rows: 100, explicit_values: 100, ..Default::default() });
        total.merge(&ColumnStats { sparsed_chunks: 1, chunk_rows: 50, buffered_rows: 7, explicit_values: 4, ..Default::default() });
        assert_eq!(total.plain_chunks, 2);
        assert_eq!(total.sparsed_chunks, 1);
        assert_eq!(total.total_rows(), 157);
        assert_eq!(total.explicit_values, 104);
    }
}
