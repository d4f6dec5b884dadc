use std::fs::{File, OpenOptions};
use std::path::Path;
use crate::core::error::{Error, ErrorKind, Result};

/// Single-owner guarantee for a shard's chunk directory
pub struct FileLock {
    pub file: File,
}

impl FileLock {
    pub fn acquire(dir: &Path) -> Result<Self> {
        let lock_path = dir.join(".lock");

        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&lock_path)?;

        #[cfg(unix)]
        {
            use std::os::unix::io::AsRawFd;
            use libc::{flock, LOCK_EX, LOCK_NB};

            let fd = file.as_raw_fd();
            unsafe {
                if flock(fd, LOCK_EX | LOCK_NB) != 0 {
                    return Err(Error {
                        kind: ErrorKind::Io,
                        context: format!("chunk directory {} is locked by another owner", dir.display()),
                    })
                }
            }
        }

        Ok(FileLock { file })
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        #[cfg(unix)]
        {
            use std::os::unix::io::AsRawFd;
            use libc::{flock, LOCK_UN};

            let fd = self.file.as_raw_fd();
            unsafe {
                flock(fd, LOCK_UN);
            }
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn test_second_owner_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let first = FileLock::acquire(dir.path()).unwrap();
        let err = FileLock::acquire(dir.path()).err().unwrap();
        assert_eq!(err.kind, ErrorKind::Io);
        drop(first);
        FileLock::acquire(dir.path()).unwrap();
    }
}
