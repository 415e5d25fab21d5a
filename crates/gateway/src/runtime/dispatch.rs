//! Priority dispatch queue.
//!
//! Jobs are ordered by `(priority, seq)`: lower priority values first, and
//! among equal priorities the earlier submission first. The queue is
//! unbounded; workers block in [`DispatchQueue::next`] while it is empty.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

use cr_domain::job::Job;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::time::Instant;

/// A job waiting on the queue.
#[derive(Debug)]
pub struct Queued {
    pub priority: u8,
    /// Submission counter; breaks priority ties in arrival order.
    pub seq: u64,
    pub job: Job,
    pub enqueued_at: Instant,
}

impl PartialEq for Queued {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Queued {}

impl PartialOrd for Queued {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Queued {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.priority, self.seq).cmp(&(other.priority, other.seq))
    }
}

#[derive(Default)]
struct Inner {
    heap: BinaryHeap<Reverse<Queued>>,
    next_seq: u64,
    closed: bool,
}

#[derive(Default)]
pub struct DispatchQueue {
    inner: Mutex<Inner>,
    available: Notify,
}

impl DispatchQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue `job`. Returns `false` (dropping the job) once the queue is
    /// closed.
    pub fn submit(&self, priority: u8, job: Job) -> bool {
        let mut inner = self.inner.lock();
        if inner.closed {
            tracing::warn!(
                job_id = %job.id,
                session_id = %job.session_id,
                "queue closed, job dropped"
            );
            return false;
        }
        let seq = inner.next_seq;
        inner.next_seq += 1;
        tracing::debug!(
            job_id = %job.id,
            session_id = %job.session_id,
            priority,
            seq,
            depth = inner.heap.len() + 1,
            "job queued"
        );
        inner.heap.push(Reverse(Queued {
            priority,
            seq,
            job,
            enqueued_at: Instant::now(),
        }));
        drop(inner);

        self.available.notify_one();
        true
    }

    /// Take the most urgent job, waiting while the queue is empty.
    /// Returns `None` once the queue is closed.
    pub async fn next(&self) -> Option<Queued> {
        loop {
            let notified = self.available.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut inner = self.inner.lock();
                if inner.closed {
                    return None;
                }
                if let Some(Reverse(queued)) = inner.heap.pop() {
                    return Some(queued);
                }
            }

            notified.await;
        }
    }

    /// Stop handing out jobs. Workers waiting in [`next`](Self::next) wake
    /// up with `None`; jobs still queued are discarded.
    pub fn close(&self) {
        let mut inner = self.inner.lock();
        if inner.closed {
            return;
        }
        inner.closed = true;
        let dropped = inner.heap.len();
        inner.heap.clear();
        drop(inner);

        if dropped > 0 {
            tracing::warn!(dropped, "dispatch queue closed with jobs pending");
        } else {
            tracing::info!("dispatch queue closed");
        }
        self.available.notify_waiters();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    pub fn len(&self) -> usize {
        self.inner.lock().heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
