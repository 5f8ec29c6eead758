//! Priority queue for pending transition requests.
//!
//! Contended requests drain by priority rather than arrival order;
//! within a priority class, FIFO. Disk sweeps enqueue under a batch id
//! so the remainder of a batch can be cancelled once the relief target
//! is met.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet};

use custodian_types::TransitionRequest;
use uuid::Uuid;

/// A queued request, optionally tagged with its sweep batch.
#[derive(Debug, Clone)]
pub struct QueuedRequest {
    /// The request to dispatch.
    pub request: TransitionRequest,

    /// Sweep batch this request belongs to, if any.
    pub batch: Option<Uuid>,

    seq: u64,
}

impl PartialEq for QueuedRequest {
    fn eq(&self, other: &Self) -> bool {
        self.request.priority == other.request.priority && self.seq == other.seq
    }
}

impl Eq for QueuedRequest {}

impl PartialOrd for QueuedRequest {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedRequest {
    fn cmp(&self, other: &Self) -> Ordering {
        // Higher priority first; lower sequence (earlier arrival) first
        // within a priority class.
        self.request
            .priority
            .cmp(&other.request.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Priority-ordered request queue with batch cancellation.
#[derive(Default)]
pub struct RequestQueue {
    heap: BinaryHeap<QueuedRequest>,
    cancelled: HashSet<Uuid>,
    next_seq: u64,
}

impl RequestQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue a standalone request.
    pub fn push(&mut self, request: TransitionRequest) {
        self.push_in_batch(request, None);
    }

    /// Enqueue a request belonging to a sweep batch.
    pub fn push_in_batch(&mut self, request: TransitionRequest, batch: Option<Uuid>) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(QueuedRequest {
            request,
            batch,
            seq,
        });
    }

    /// Dequeue the highest-priority live request, discarding entries
    /// from cancelled batches.
    pub fn pop(&mut self) -> Option<QueuedRequest> {
        while let Some(entry) = self.heap.pop() {
            if let Some(batch) = entry.batch {
                if self.cancelled.contains(&batch) {
                    continue;
                }
            }
            return Some(entry);
        }
        None
    }

    /// Cancel every queued-but-not-yet-processed request of `batch`.
    pub fn cancel_batch(&mut self, batch: Uuid) {
        self.cancelled.insert(batch);
    }

    /// Number of live queued requests.
    pub fn len(&self) -> usize {
        self.heap
            .iter()
            .filter(|e| e.batch.map(|b| !self.cancelled.contains(&b)).unwrap_or(true))
            .count()
    }

    /// Whether no live requests are queued.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use custodian_types::{
        BackupId, BackupState, DiskLevel, HookKind, TriggerSource,
    };

    fn request(id: &str, trigger: TriggerSource) -> TransitionRequest {
        TransitionRequest::new(BackupId::new(id), BackupState::Deleted, trigger)
    }

    #[test]
    fn test_drains_by_priority() {
        let mut queue = RequestQueue::new();
        queue.push(request(
            "hook",
            TriggerSource::GitHook {
                event: HookKind::PostCommit,
            },
        ));
        queue.push(request(
            "emergency",
            TriggerSource::Disk {
                level: DiskLevel::Emergency,
            },
        ));
        queue.push(request("user", TriggerSource::User));
        queue.push(request("time", TriggerSource::Time));
        queue.push(request(
            "warning",
            TriggerSource::Disk {
                level: DiskLevel::Warning,
            },
        ));

        let order: Vec<String> = std::iter::from_fn(|| queue.pop())
            .map(|e| e.request.backup_id.as_str().to_string())
            .collect();
        assert_eq!(order, ["user", "emergency", "time", "hook", "warning"]);
    }

    #[test]
    fn test_fifo_within_priority() {
        let mut queue = RequestQueue::new();
        queue.push(request("first", TriggerSource::Time));
        queue.push(request("second", TriggerSource::Time));
        queue.push(request("third", TriggerSource::Time));

        assert_eq!(queue.pop().unwrap().request.backup_id.as_str(), "first");
        assert_eq!(queue.pop().unwrap().request.backup_id.as_str(), "second");
        assert_eq!(queue.pop().unwrap().request.backup_id.as_str(), "third");
    }

    #[test]
    fn test_cancelled_batch_is_discarded() {
        let mut queue = RequestQueue::new();
        let batch = Uuid::new_v4();

        queue.push_in_batch(
            request(
                "swept-1",
                TriggerSource::Disk {
                    level: DiskLevel::Emergency,
                },
            ),
            Some(batch),
        );
        queue.push_in_batch(
            request(
                "swept-2",
                TriggerSource::Disk {
                    level: DiskLevel::Emergency,
                },
            ),
            Some(batch),
        );
        queue.push(request("kept", TriggerSource::Time));

        queue.cancel_batch(batch);

        assert_eq!(queue.len(), 1);
        assert_eq!(queue.pop().unwrap().request.backup_id.as_str(), "kept");
        assert!(queue.pop().is_none());
    }
}
