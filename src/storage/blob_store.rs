use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use bytes::Bytes;
use parking_lot::RwLock;
use crate::core::error::{Error, Result};
use crate::core::types::ChunkId;
use crate::storage::file_lock::FileLock;

/// Where encoded chunk blobs live. One store per shard.
pub trait BlobStore: Send + Sync {
    fn put(&self, id: ChunkId, blob: Vec<u8>) -> Result<()>;

    fn get(&self, id: ChunkId) -> Result<Bytes>;

    fn delete(&self, id: ChunkId) -> Result<()>;

    fn contains(&self, id: ChunkId) -> bool;

    fn blob_count(&self) -> usize;
}

/// Blob store backed by a hash map
pub struct MemoryBlobStore {
    blobs: RwLock<HashMap<ChunkId, Bytes>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        MemoryBlobStore {
            blobs: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for MemoryBlobStore {
    fn default() -> Self {
        Self::new()
    }
}

impl BlobStore for MemoryBlobStore {
    fn put(&self, id: ChunkId, blob: Vec<u8>) -> Result<()> {
        self.blobs.write().insert(id, Bytes::from(blob));
        Ok(())
    }

    fn get(&self, id: ChunkId) -> Result<Bytes> {
        self.blobs
            .read()
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::not_found(format!("chunk blob {}", id)))
    }

    fn delete(&self, id: ChunkId) -> Result<()> {
        self.blobs.write().remove(&id);
        Ok(())
    }

    fn contains(&self, id: ChunkId) -> bool {
        self.blobs.read().contains_key(&id)
    }

    fn blob_count(&self) -> usize {
        self.blobs.read().len()
    }
}

/// Blob store writing one file per chunk into a locked directory
pub struct FileBlobStore {
    dir: PathBuf,
    _lock: FileLock,
}

impl FileBlobStore {
    pub fn open(dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(&dir)?;
        let lock = FileLock::acquire(&dir)?;
        Ok(FileBlobStore { dir, _lock: lock })
    }

    fn path(&self, id: ChunkId) -> PathBuf {
        self.dir.join(format!("{}.chunk", id.0))
    }

    /// Remove every chunk and leftover temp file. Returns the number removed.
    pub fn purge(&self) -> Result<usize> {
        let mut removed = 0;
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            match path.extension().and_then(|s| s.to_str()) {
                Some("chunk") | Some("tmp") => {
                    fs::remove_file(&path)?;
                    removed += 1;
                }
                _ => {}
            }
        }
        Ok(removed)
    }
}

impl BlobStore for FileBlobStore {
    // Written to a temp name, synced, then renamed so a partial file is never visible
    fn put(&self, id: ChunkId, blob: Vec<u8>) -> Result<()> {
        let final_path = self.path(id);
        let tmp_path = final_path.with_extension("tmp");
        {
            let mut file = fs::File::create(&tmp_path)?;
            file.write_all(&blob)?;
            file.sync_all()?;
        }
        fs::rename(&tmp_path, &final_path)?;
        Ok(())
    }

    fn get(&self, id: ChunkId) -> Result<Bytes> {
        match fs::read(self.path(id)) {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(Error::not_found(format!("chunk file {}", id)))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn delete(&self, id: ChunkId) -> Result<()> {
        match fs::remove_file(self.path(id)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn contains(&self, id: ChunkId) -> bool {
        self.path(id).exists()
    }

    fn blob_count(&self) -> usize {
        fs::read_dir(&self.dir)
            .map(|entries| {
                entries
                    .filter_map(|e| e.ok())
                    .filter(|e| e.path().extension().and_then(|s| s.to_str()) == Some("chunk"))
                    .count()
            })
            .unwrap_or(0)
    }
}
