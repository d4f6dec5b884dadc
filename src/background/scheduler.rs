use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use crossbeam::channel::{unbounded, Receiver, RecvTimeoutError, Sender, TryRecvError};
use crate::background::control::BackgroundKind;
use crate::core::error::Result;
use crate::shard::Shard;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Wakeup,
    Shutdown,
}

/// Periodic task of one kind for one shard.
///
/// Wakes every `interval` milliseconds (or on `wakeup`) and, while the kind
/// is enabled and has work, runs it back to back. A failed run is retried
/// at the next wakeup.
pub struct BackgroundWorker {
    pub kind: BackgroundKind,
    sender: Sender<Command>,
    handle: Option<JoinHandle<()>>,
}

impl BackgroundWorker {
    pub fn spawn(shard: Arc<Shard>, kind: BackgroundKind, interval: Arc<AtomicU64>) -> Result<Self> {
        let (sender, receiver) = unbounded();
        let name = format!("{}-{}-{}", shard.table.schema.name, shard.id, kind);
        let handle = thread::Builder::new()
            .name(name)
            .spawn(move || Self::worker_loop(shard, kind, interval, receiver))?;

        Ok(BackgroundWorker {
            kind,
            sender,
            handle: Some(handle),
        })
    }

    pub fn wakeup(&self) {
        let _ = self.sender.send(Command::Wakeup);
    }

    /// Stop after the run in progress, if any, and join the thread
    pub fn shutdown(&mut self) {
        let _ = self.sender.send(Command::Shutdown);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::error!(kind = %self.kind, "background worker panicked");
            }
        }
    }

    fn worker_loop(shard: Arc<Shard>, kind: BackgroundKind, interval: Arc<AtomicU64>, receiver: Receiver<Command>) {
        tracing::debug!(shard = %shard.id, kind = %kind, "background worker started");
        loop {
            let period = Duration::from_millis(interval.load(Ordering::Relaxed).max(1));
            match receiver.recv_timeout(period) {
                Ok(Command::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
                Ok(Command::Wakeup) | Err(RecvTimeoutError::Timeout) => {}
            }

            while shard.control.is_enabled(kind) && shard.has_pending(kind) {
                match shard.run_background(kind) {
                    Ok(outcome) if outcome.did_work() => {}
                    // Failure already logged by the shard
                    _ => break,
                }
                match receiver.try_recv() {
                    Ok(Command::Shutdown) | Err(TryRecvError::Disconnected) => {
                        tracing::debug!(shard = %shard.id, kind = %kind, "background worker stopped");
                        return;
                    }
                    Ok(Command::Wakeup) | Err(TryRecvError::Empty) => {}
                }
            }
        }
        tracing::debug!(shard = %shard.id, kind = %kind, "background worker stopped");
    }
}

impl Drop for BackgroundWorker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;
    use crate::shard::tests::{rows, test_shard};

    #[test]
    fn test_worker_indexes_once_enabled() {
        let (shard, _store) = test_shard(16);
        let shard = Arc::new(shard);
        let interval = Arc::new(AtomicU64::new(10));
        let mut worker = BackgroundWorker::spawn(shard.clone(), BackgroundKind::Indexation, interval).unwrap();

        shard.append(rows(0..40));
        thread::sleep(Duration::from_millis(50));
        assert_eq!(shard.versions.current_snapshot().indexed_rows, 0, "disabled worker must not run");

        shard.control.set_enabled(BackgroundKind::Indexation, true);
        worker.wakeup();
        shard
            .wait_quiescent(BackgroundKind::Indexation, Instant::now() + Duration::from_secs(5))
            .unwrap();
        assert_eq!(shard.versions.current_snapshot().indexed_rows, 40);
        worker.shutdown();
    }

    #[test]
    fn test_shutdown_joins_idle_worker() {
        let (shard, _store) = test_shard(16);
        let interval = Arc::new(AtomicU64::new(60_000));
        let mut worker = BackgroundWorker::spawn(Arc::new(shard), BackgroundKind::Compaction, interval).unwrap();
        let started = Instant::now();
        worker.shutdown();
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
