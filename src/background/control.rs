use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BackgroundKind {
    Indexation,
    Compaction,
}

impl BackgroundKind {
    pub const ALL: [BackgroundKind; 2] = [BackgroundKind::Indexation, BackgroundKind::Compaction];

    pub fn index(self) -> usize {
        match self {
            BackgroundKind::Indexation => 0,
            BackgroundKind::Compaction => 1,
        }
    }
}

impl fmt::Display for BackgroundKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            BackgroundKind::Indexation => write!(f, "indexation"),
            BackgroundKind::Compaction => write!(f, "compaction"),
        }
    }
}

/// Background task switches and run bookkeeping of one shard.
///
/// Created with the shard, changed only through enable/disable and the run
/// guard, dropped with the shard.
pub struct BackgroundControl {
    enabled: [AtomicBool; 2],
    running: [AtomicBool; 2],
    runs: [AtomicU64; 2],
    failures: [AtomicU64; 2],
    generation: Mutex<u64>,
    changed: Condvar,
}

impl BackgroundControl {
    pub fn new(enabled: bool) -> Self {
        BackgroundControl {
            enabled: [AtomicBool::new(enabled), AtomicBool::new(enabled)],
            running: [AtomicBool::new(false), AtomicBool::new(false)],
            runs: [AtomicU64::new(0), AtomicU64::new(0)],
            failures: [AtomicU64::new(0), AtomicU64::new(0)],
            generation: Mutex::new(0),
            changed: Condvar::new(),
        }
    }

    /// Takes effect at the next scheduled run; a run in progress finishes
    pub fn set_enabled(&self, kind: BackgroundKind, enabled: bool) {
        self.enabled[kind.index()].store(enabled, Ordering::SeqCst);
        self.bump();
    }

    pub fn is_enabled(&self, kind: BackgroundKind) -> bool {
        self.enabled[kind.index()].load(Ordering::SeqCst)
    }

    pub fn is_running(&self, kind: BackgroundKind) -> bool {
        self.running[kind.index()].load(Ordering::SeqCst)
    }

    pub fn begin_run(&self, kind: BackgroundKind) -> RunGuard<'_> {
        self.running[kind.index()].store(true, Ordering::SeqCst);
        RunGuard {
            control: self,
            kind,
            failed: false,
        }
    }

    pub fn runs(&self, kind: BackgroundKind) -> u64 {
        self.runs[kind.index()].load(Ordering::Relaxed)
    }

    pub fn failures(&self, kind: BackgroundKind) -> u64 {
        self.failures[kind.index()].load(Ordering::Relaxed)
    }

    /// Counter bumped on every state change; pair with `wait_for_change`
    pub fn generation(&self) -> u64 {
        *self.generation.lock()
    }

    /// Block until the generation moves past `seen` or `timeout` elapses
    pub fn wait_for_change(&self, seen: u64, timeout: Duration) {
        let mut generation = self.generation.lock();
        if *generation == seen {
            self.changed.wait_for(&mut generation, timeout);
        }
    }

    fn bump(&self) {
        let mut generation = self.generation.lock();
        *generation += 1;
        self.changed.notify_all();
    }
}

/// Marks a run in progress; dropping it records the outcome and wakes waiters
pub struct RunGuard<'a> {
    control: &'a BackgroundControl,
    kind: BackgroundKind,
    failed: bool,
}

impl RunGuard<'_> {
    pub fn mark_failed(&mut self) {
        self.failed = true;
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        let i = self.kind.index();
        self.control.runs[i].fetch_add(1, Ordering::Relaxed);
        if self.failed {
            self.control.failures[i].fetch_add(1, Ordering::Relaxed);
        }
        self.control.running[i].store(false, Ordering::SeqCst);
        self.control.bump();
    }
}
