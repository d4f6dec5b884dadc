use std::path::{Path, PathBuf};
use std::time::Duration;
use serde::{Deserialize, Serialize};
use crate::core::error::{Error, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Root for chunk files; `None` keeps chunk blobs in memory
    pub storage_path: Option<PathBuf>,
    pub shard_count: usize,

    // Background tasks
    pub wakeup_interval_ms: u64,                // Periodic activation period
    pub background_enabled_at_start: bool,

    // Indexation
    pub indexation_max_chunk_rows: usize,       // Rows per chunk built from the buffer

    // Compaction
    pub compaction_small_chunk_rows: usize,     // Chunks below this are merge candidates
    pub compaction_min_chunks: usize,
    pub compaction_max_chunks: usize,
    pub compaction_max_chunk_rows: usize,       // Upper bound on a re-encoded chunk

    // Read path
    pub chunk_cache_entries: usize,             // Decoded chunks kept in the LRU
}

impl Default for Config {
    fn default() -> Self {
        Config {
            storage_path: None,
            shard_count: num_cpus::get().clamp(1, 8),

            wakeup_interval_ms: 1_000,
            background_enabled_at_start: true,

            indexation_max_chunk_rows: 1_024,

            compaction_small_chunk_rows: 8_192,
            compaction_min_chunks: 2,
            compaction_max_chunks: 16,
            compaction_max_chunk_rows: 65_536,

            chunk_cache_entries: 256,
        }
    }
}

impl Config {
    pub fn in_memory(shard_count: usize) -> Self {
        Config {
            shard_count,
            ..Config::default()
        }
    }

    pub fn with_storage_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.storage_path = Some(path.into());
        self
    }

    pub fn with_wakeup_interval(mut self, interval: Duration) -> Self {
        self.wakeup_interval_ms = interval.as_millis().max(1) as u64;
        self
    }

    pub fn with_background_enabled(mut self, enabled: bool) -> Self {
        self.background_enabled_at_start = enabled;
        self
    }

    pub fn wakeup_interval(&self) -> Duration {
        Duration::from_millis(self.wakeup_interval_ms)
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Config = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    pub fn validate(&self) -> Result<()> {
        if self.shard_count == 0 {
            return Err(Error::invalid_argument("shard_count must be at least 1"));
        }
        if self.wakeup_interval_ms == 0 {
            return Err(Error::invalid_argument("wakeup_interval_ms must be positive"));
        }
        if self.indexation_max_chunk_rows == 0 || self.compaction_max_chunk_rows == 0 {
            return Err(Error::invalid_argument("chunk row limits must be positive"));
        }
        // Chunk headers record row counts as u32
        let limit = u32::MAX as usize;
        if self.indexation_max_chunk_rows > limit || self.compaction_max_chunk_rows > limit {
            return Err(Error::invalid_argument("chunk row limits must fit in u32"));
        }
        // Otherwise a merge can emit as many small chunks as it consumed
        if self.compaction_max_chunk_rows < self.compaction_small_chunk_rows {
            return Err(Error::invalid_argument(
                "compaction_max_chunk_rows must not be below compaction_small_chunk_rows",
            ));
        }
        if self.compaction_min_chunks < 2 {
            return Err(Error::invalid_argument("compaction_min_chunks must be at least 2"));
        }
        if self.compaction_max_chunks < self.compaction_min_chunks {
            return Err(Error::invalid_argument(
                "compaction_max_chunks must not be below compaction_min_chunks",
            ));
        }
        if self.chunk_cache_entries == 0 {
            return Err(Error::invalid_argument("chunk_cache_entries must be positive"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::ErrorKind;

    #[test]
    fn test_default_is_valid() {
        Config::default().validate().unwrap();
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = Config::from_json_str(r#"{ "shard_count": 3, "wakeup_interval_ms": 100 }"#)
            .unwrap();
        assert_eq!(config.shard_count, 3);
        assert_eq!(config.wakeup_interval(), Duration::from_millis(100));
        assert_eq!(config.indexation_max_chunk_rows, 1_024);
        assert!(config.storage_path.is_none());
    }

    #[test]
    fn test_rejects_zero_shards() {
        let err = Config::from_json_str(r#"{ "shard_count": 0 }"#).unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidArgument);
    }

    #[test]
    fn test_rejects_malformed_json() {
        let err = Config::from_json_str("{ shard_count").unwrap_err();
        assert_eq!(err.kind, ErrorKind::Parse);
    }
}
