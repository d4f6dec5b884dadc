use std::path::PathBuf;
use std::fs;
use crate::core::error::Result;
use crate::core::types::ShardId;

/// Directory structure for chunk files
#[derive(Debug, Clone)]
pub struct StorageLayout {
    pub base_dir: PathBuf,      // Root directory
    pub chunks_dir: PathBuf,    // Encoded column chunks (.chunk files)
}

impl StorageLayout {
    pub fn new(base_dir: PathBuf) -> Result<Self> {
        let chunks_dir = base_dir.join("chunks");
        fs::create_dir_all(&chunks_dir)?;

        Ok(StorageLayout {
            base_dir,
            chunks_dir,
        })
    }

    /// One directory per shard. Table names may contain path separators, so
    /// the readable prefix is suffixed with a crc32 of the raw name.
    pub fn shard_dir(&self, table: &str, shard: ShardId) -> PathBuf {
        let readable: String = table
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
            .collect();
        let table_dir = format!("{}-{:08x}", readable, crc32fast::hash(table.as_bytes()));
        self.chunks_dir.join(table_dir).join(format!("{:04}", shard.0))
    }
}
