//! Blocking priority queue shared between a worker's loops.
//!
//! Items are ordered by `(priority, sequence)`: a lower priority number is
//! popped first, and within one priority items come out in push order.
//!
//! Closing a queue stops its consumers without discarding what is queued;
//! a reopened queue hands out the remaining items again.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

struct Slot<T> {
    priority: u8,
    seq: u64,
    item: T,
}

impl<T> PartialEq for Slot<T> {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}

impl<T> Eq for Slot<T> {}

impl<T> PartialOrd for Slot<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Slot<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.priority, self.seq).cmp(&(other.priority, other.seq))
    }
}

struct State<T> {
    heap: BinaryHeap<Reverse<Slot<T>>>,
    seq: u64,
    closed: bool,
}

/// A multi-producer priority queue with blocking pops.
pub struct PriorityQueue<T> {
    state: Mutex<State<T>>,
    available: Condvar,
}

impl<T> Default for PriorityQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> PriorityQueue<T> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                heap: BinaryHeap::new(),
                seq: 0,
                closed: false,
            }),
            available: Condvar::new(),
        }
    }

    /// Enqueues `item`. Returns `false` once the queue is closed.
    pub fn push(&self, priority: u8, item: T) -> bool {
        let mut state = self.state.lock();
        if state.closed {
            return false;
        }
        state.seq += 1;
        let seq = state.seq;
        state.heap.push(Reverse(Slot {
            priority,
            seq,
            item,
        }));
        drop(state);
        self.available.notify_one();
        true
    }

    /// Blocks until an item is available. `None` once closed.
    pub fn pop(&self) -> Option<T> {
        let mut state = self.state.lock();
        loop {
            if state.closed {
                return None;
            }
            if let Some(Reverse(slot)) = state.heap.pop() {
                return Some(slot.item);
            }
            self.available.wait(&mut state);
        }
    }

    /// Like [`pop`](Self::pop) but gives up after `timeout`.
    pub fn pop_timeout(&self, timeout: Duration) -> Option<T> {
        let mut state = self.state.lock();
        if state.heap.is_empty() && !state.closed {
            self.available.wait_for(&mut state, timeout);
        }
        if state.closed {
            return None;
        }
        state.heap.pop().map(|Reverse(slot)| slot.item)
    }

    pub fn len(&self) -> usize {
        self.state.lock().heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().heap.is_empty()
    }

    /// Rejects pushes and pops and wakes every blocked consumer.
    pub fn close(&self) {
        self.state.lock().closed = true;
        self.available.notify_all();
    }

    /// Accepts pushes again after [`close`](Self::close).
    pub fn reopen(&self) {
        self.state.lock().closed = false;
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Removes every queued item.
    pub fn clear(&self) -> usize {
        let mut state = self.state.lock();
        let count = state.heap.len();
        state.heap.clear();
        count
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use super::*;

    #[test]
    fn test_fifo_within_priority() {
        let queue = PriorityQueue::new();
        for i in 0..10 {
            queue.push(5, i);
        }
        let popped: Vec<_> = (0..10).filter_map(|_| queue.pop()).collect();
        assert_eq!(popped, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn test_lower_priority_first() {
        let queue = PriorityQueue::new();
        queue.push(5, "normal-1");
        queue.push(9, "slow");
        queue.push(1, "urgent");
        queue.push(5, "normal-2");
        assert_eq!(queue.pop(), Some("urgent"));
        assert_eq!(queue.pop(), Some("normal-1"));
        assert_eq!(queue.pop(), Some("normal-2"));
        assert_eq!(queue.pop(), Some("slow"));
    }

    #[test]
    fn test_close_wakes_blocked_pop() {
        let queue = Arc::new(PriorityQueue::<u32>::new());
        let popper = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.pop())
        };
        thread::sleep(Duration::from_millis(50));
        queue.close();
        assert_eq!(popper.join().unwrap(), None);
        assert!(!queue.push(1, 7));
    }

    #[test]
    fn test_pop_timeout() {
        let queue = PriorityQueue::<u32>::new();
        assert_eq!(queue.pop_timeout(Duration::from_millis(20)), None);
        queue.push(1, 3);
        assert_eq!(queue.pop_timeout(Duration::from_millis(20)), Some(3));
    }

    #[test]
    fn test_close_keeps_items() {
        let queue = PriorityQueue::new();
        queue.push(1, 'a');
        queue.close();
        assert_eq!(queue.pop(), None);
        assert_eq!(queue.len(), 1);

        queue.reopen();
        assert!(queue.push(1, 'b'));
        assert_eq!(queue.pop(), Some('a'));
        assert_eq!(queue.clear(), 1);
        assert!(queue.is_empty());
    }
}
