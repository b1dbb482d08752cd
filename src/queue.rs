//! The pending-job priority queue.
//!
//! A min-heap keyed by `(priority rank, insertion sequence)`: lower ranks
//! dispatch first, and ties resolve first-in-first-out through the
//! monotonically increasing sequence. Aging promotion is the dispatcher's
//! call at pop time; the queue only orders references.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::job::JobId;

/// Rank assigned on submission.
pub(crate) const PRIORITY_NORMAL: u8 = 100;
/// Rank assigned when a queued job outlives the aging threshold.
pub(crate) const PRIORITY_BOOSTED: u8 = 50;

/// One pending reference. Ordering compares `(rank, seq)`; the id never
/// participates because sequences are unique.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) struct QueueEntry {
    pub(crate) rank: u8,
    seq: u64,
    pub(crate) job_id: JobId,
}

#[derive(Debug, Default)]
pub(crate) struct DispatchQueue {
    heap: Mutex<BinaryHeap<Reverse<QueueEntry>>>,
    notify: Notify,
    seq: AtomicU64,
}

impl DispatchQueue {
    pub(crate) fn push(&self, job_id: JobId, rank: u8) {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        self.heap.lock().push(Reverse(QueueEntry { rank, seq, job_id }));
        self.notify.notify_one();
    }

    /// Pops the highest-priority pending reference, waiting for one to exist.
    pub(crate) async fn pop(&self) -> QueueEntry {
        loop {
            if let Some(Reverse(entry)) = self.heap.lock().pop() {
                return entry;
            }
            self.notify.notified().await;
        }
    }

    /// Number of references not yet handed to the dispatcher.
    pub(crate) fn depth(&self) -> usize {
        self.heap.lock().len()
    }
}
