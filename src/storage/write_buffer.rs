use std::collections::VecDeque;
use std::sync::Arc;
use parking_lot::Mutex;
use crate::core::types::{Row, SeqNo};

/// A committed row waiting to be folded into chunks
#[derive(Debug, Clone)]
pub struct BufferedRow {
    pub seq: SeqNo,
    pub row: Arc<Row>,
}

/// Append-only holding area for committed rows, ordered by commit sequence.
///
/// Logically Plain: rows are kept exactly as written until indexation
/// trims the consumed prefix.
pub struct WriteBuffer {
    inner: Mutex<BufferInner>,
}

struct BufferInner {
    rows: VecDeque<BufferedRow>,
    next_seq: SeqNo,
}

impl WriteBuffer {
    pub fn new() -> Self {
        WriteBuffer {
            inner: Mutex::new(BufferInner {
                rows: VecDeque::new(),
                next_seq: SeqNo(0),
            }),
        }
    }

    /// Append a batch at the tail. Returns the half-open sequence range assigned.
    pub fn append(&self, rows: Vec<Row>) -> (SeqNo, SeqNo) {
        let mut inner = self.inner.lock();
        let first = inner.next_seq;
        for row in rows {
            let seq = inner.next_seq;
            inner.rows.push_back(BufferedRow {
                seq,
                row: Arc::new(row),
            });
            inner.next_seq = seq.next();
        }
        (first, inner.next_seq)
    }

    /// Sequence number the next appended row will get; rows below it are captured
    pub fn capture_boundary(&self) -> SeqNo {
        self.inner.lock().next_seq
    }

    /// Stable copy of rows with `from <= seq < upto`
    pub fn snapshot(&self, from: SeqNo, upto: SeqNo) -> Vec<BufferedRow> {
        let inner = self.inner.lock();
        inner
            .rows
            .iter()
            .skip_while(|r| r.seq < from)
            .take_while(|r| r.seq < upto)
            .cloned()
            .collect()
    }

    /// Stable copy of every row with `seq >= from`
    pub fn snapshot_from(&self, from: SeqNo) -> Vec<BufferedRow> {
        let inner = self.inner.lock();
        inner.rows.iter().skip_while(|r| r.seq < from).cloned().collect()
    }

    /// Drop rows strictly older than `boundary`. Rows appended after the
    /// boundary was captured are never touched.
    pub fn trim(&self, boundary: SeqNo) -> usize {
        let mut inner = self.inner.lock();
        let mut removed = 0;
        while inner.rows.front().map_or(false, |r| r.seq < boundary) {
            inner.rows.pop_front();
            removed += 1;
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.inner.lock().rows.len()
    }

    pub fn len_from(&self, from: SeqNo) -> usize {
        let inner = self.inner.lock();
        inner.rows.iter().filter(|r| r.seq >= from).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for WriteBuffer {
    fn default() -> Self {
        Self::new()
    }
}
