// Scheduler - Single-threaded timer queue with an injectable time source
// Every timed callback of the sequencer (clock fires, MIDI drains, deferred
// note-offs) is a task in this queue; the owning context pops and runs them.

use std::cmp::Ordering as CmpOrdering;
use std::collections::{BinaryHeap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Source of "now", in milliseconds
pub trait TimeSource {
    fn now_ms(&self) -> f64;
}

/// Wall-clock time measured from the moment the source was created
#[derive(Debug, Clone, Copy)]
pub struct MonotonicTime {
    origin: Instant,
}

impl MonotonicTime {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicTime {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for MonotonicTime {
    fn now_ms(&self) -> f64 {
        self.origin.elapsed().as_secs_f64() * 1000.0
    }
}

/// Simulated time, advanced explicitly by its owner
///
/// Clones share the same underlying time, so a test can keep one handle while
/// the scheduler owns another.
#[derive(Debug, Clone, Default)]
pub struct ManualTime {
    now_bits: Arc<AtomicU64>,
}

impl ManualTime {
    pub fn new(start_ms: f64) -> Self {
        Self {
            now_bits: Arc::new(AtomicU64::new(start_ms.to_bits())),
        }
    }

    pub fn set(&self, now_ms: f64) {
        self.now_bits.store(now_ms.to_bits(), Ordering::Relaxed);
    }

    pub fn advance(&self, delta_ms: f64) {
        self.set(self.now_ms() + delta_ms);
    }
}

impl TimeSource for ManualTime {
    fn now_ms(&self) -> f64 {
        f64::from_bits(self.now_bits.load(Ordering::Relaxed))
    }
}

/// Handle to a scheduled task, used for cancellation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(u64);

struct Entry<E> {
    deadline: f64,
    id: TimerId,
    task: E,
}

impl<E> PartialEq for Entry<E> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == CmpOrdering::Equal
    }
}

impl<E> Eq for Entry<E> {}

impl<E> PartialOrd for Entry<E> {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl<E> Ord for Entry<E> {
    // Reversed: BinaryHeap is a max-heap, we want the earliest deadline on top.
    // Ids grow monotonically so equal deadlines run in insertion order.
    fn cmp(&self, other: &Self) -> CmpOrdering {
        other
            .deadline
            .total_cmp(&self.deadline)
            .then_with(|| other.id.0.cmp(&self.id.0))
    }
}

/// Timer queue holding tasks of type `E`
///
/// Cancellation is lazy: cancelled entries stay in the heap and are skipped
/// when they reach the top.
pub struct Scheduler<E> {
    time: Box<dyn TimeSource>,
    queue: BinaryHeap<Entry<E>>,
    live: HashSet<TimerId>,
    next_id: u64,
}

impl<E> Scheduler<E> {
    pub fn new(time: Box<dyn TimeSource>) -> Self {
        Self {
            time,
            queue: BinaryHeap::new(),
            live: HashSet::new(),
            next_id: 0,
        }
    }

    /// Current time of the injected source
    pub fn now_ms(&self) -> f64 {
        self.time.now_ms()
    }

    /// Schedule `task` to run `delay_ms` from now (negative delays run immediately)
    pub fn schedule_in(&mut self, delay_ms: f64, task: E) -> TimerId {
        let deadline = self.now_ms() + delay_ms.max(0.0);
        self.schedule_at(deadline, task)
    }

    /// Schedule `task` at an absolute deadline
    pub fn schedule_at(&mut self, deadline_ms: f64, task: E) -> TimerId {
        let id = TimerId(self.next_id);
        self.next_id += 1;
        self.live.insert(id);
        self.queue.push(Entry {
            deadline: deadline_ms,
            id,
            task,
        });
        id
    }

    /// Cancel a pending task. Returns false if it already ran or was cancelled.
    pub fn cancel(&mut self, id: TimerId) -> bool {
        self.live.remove(&id)
    }

    pub fn is_pending(&self, id: TimerId) -> bool {
        self.live.contains(&id)
    }

    /// Deadline of the earliest live task
    pub fn next_deadline(&mut self) -> Option<f64> {
        self.discard_cancelled();
        self.queue.peek().map(|entry| entry.deadline)
    }

    /// Pop the earliest live task whose deadline has passed
    pub fn pop_due(&mut self) -> Option<E> {
        self.discard_cancelled();
        let now = self.now_ms();
        if self.queue.peek()?.deadline > now {
            return None;
        }
        let entry = self.queue.pop()?;
        self.live.remove(&entry.id);
        Some(entry.task)
    }

    /// Number of live tasks
    pub fn len(&self) -> usize {
        self.live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    /// Drop every pending task
    pub fn clear(&mut self) {
        self.queue.clear();
        self.live.clear();
    }

    fn discard_cancelled(&mut self) {
        while let Some(entry) = self.queue.peek() {
            if self.live.contains(&entry.id) {
                break;
            }
            self.queue.pop();
        }
    }
}
