use std::sync::{Arc, Mutex};

use crate::scheduler::Action;

/// Shared slot holding a scheduled item's not-yet-run action.
///
/// The slot is the arbiter of the cancel-vs-execute race: both `invoke` and a
/// cancellation handle `take` from it under the same mutex, so exactly one
/// side ever observes the action.
pub(crate) type ActionSlot = Arc<Mutex<Option<Action>>>;

/// A unit of deferred work tagged with its due time.
///
/// The sequence number is assigned at enqueue time and breaks due-time ties
/// in insertion order, which is what makes replay deterministic.
pub struct ScheduledItem<T> {
    due: T,
    seq: u64,
    slot: ActionSlot,
}

impl<T: Copy + Ord> ScheduledItem<T> {
    pub fn new(due: T, seq: u64, action: Action) -> Self {
        Self {
            due,
            seq,
            slot: Arc::new(Mutex::new(Some(action))),
        }
    }

    pub fn due(&self) -> T {
        self.due
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// True once the item's cancellation handle was disposed (or the item
    /// already ran).
    pub fn is_cancelled(&self) -> bool {
        self.slot.lock().unwrap().is_none()
    }

    pub(crate) fn slot(&self) -> ActionSlot {
        Arc::clone(&self.slot)
    }

    /// Runs the action unless the cancellation handle already claimed it, in
    /// which case this is a no-op.
    pub fn invoke(self) {
        let action = self.slot.lock().unwrap().take();
        if let Some(action) = action {
            action();
        }
    }
}

/// Min-heap of scheduled items ordered by `(due, seq)` ascending.
///
/// Equal due times resolve in enqueue order. `peek`/`dequeue` always return
/// the minimum by that key; `remove` deletes a specific pending item and is
/// how cancellation-before-execution reaches into the queue.
pub struct PriorityQueue<T> {
    items: Vec<ScheduledItem<T>>,
}

impl<T: Copy + Ord> PriorityQueue<T> {
    pub fn new() -> Self {
        Self { items: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn enqueue(&mut self, item: ScheduledItem<T>) {
        self.items.push(item);
        self.percolate(self.items.len() - 1);
    }

    pub fn peek(&self) -> Option<&ScheduledItem<T>> {
        self.items.first()
    }

    pub fn dequeue(&mut self) -> Option<ScheduledItem<T>> {
        if self.items.is_empty() {
            return None;
        }
        let item = self.items.swap_remove(0);
        if !self.items.is_empty() {
            self.heapify(0);
        }
        Some(item)
    }

    /// Pops the head only when it is due at or before `limit`. This is the
    /// drain-loop primitive shared by both scheduler implementations.
    pub fn dequeue_due(&mut self, limit: T) -> Option<ScheduledItem<T>> {
        match self.items.first() {
            Some(head) if head.due <= limit => self.dequeue(),
            _ => None,
        }
    }

    /// Deletes the pending item with the given sequence number. Returns false
    /// when no such item is queued (it may already have run).
    pub fn remove(&mut self, seq: u64) -> bool {
        let Some(index) = self.items.iter().position(|item| item.seq == seq) else {
            return false;
        };
        let last = self.items.len() - 1;
        self.items.swap(index, last);
        self.items.pop();
        if index < self.items.len() {
            // The relocated leaf may violate the invariant in either
            // direction; at most one of these moves it.
            self.percolate(index);
            self.heapify(index);
        }
        true
    }

    fn is_higher_priority(&self, a: usize, b: usize) -> bool {
        let (a, b) = (&self.items[a], &self.items[b]);
        a.due < b.due || (a.due == b.due && a.seq < b.seq)
    }

    /// Sift up until the parent is no lower priority.
    fn percolate(&mut self, mut index: usize) {
        while index > 0 {
            let parent = (index - 1) / 2;
            if !self.is_higher_priority(index, parent) {
                break;
            }
            self.items.swap(index, parent);
            index = parent;
        }
    }

    /// Sift down until both children are no higher priority.
    fn heapify(&mut self, mut index: usize) {
        loop {
            let left = 2 * index + 1;
            let right = 2 * index + 2;
            let mut smallest = index;
            if left < self.items.len() && self.is_higher_priority(left, smallest) {
                smallest = left;
            }
            if right < self.items.len() && self.is_higher_priority(right, smallest) {
                smallest = right;
            }
            if smallest == index {
                break;
            }
            self.items.swap(index, smallest);
            index = smallest;
        }
    }
}

impl<T: Copy + Ord> Default for PriorityQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(due: u64, seq: u64) -> ScheduledItem<u64> {
        ScheduledItem::new(due, seq, Box::new(|| {}))
    }

    fn drain_keys(queue: &mut PriorityQueue<u64>) -> Vec<(u64, u64)> {
        let mut keys = Vec::new();
        while let Some(item) = queue.dequeue() {
            keys.push((item.due(), item.seq()));
        }
        keys
    }

    #[test]
    fn dequeues_in_due_order() {
        let mut queue = PriorityQueue::new();
        for (due, seq) in [(30, 0), (10, 1), (20, 2), (5, 3), (25, 4)] {
            queue.enqueue(item(due, seq));
        }
        assert_eq!(
            drain_keys(&mut queue),
            vec![(5, 3), (10, 1), (20, 2), (25, 4), (30, 0)]
        );
    }

    #[test]
    fn equal_due_times_resolve_in_enqueue_order() {
        let mut queue = PriorityQueue::new();
        for seq in 0..6 {
            queue.enqueue(item(7, seq));
        }
        assert_eq!(
            drain_keys(&mut queue),
            (0..6).map(|seq| (7, seq)).collect::<Vec<_>>()
        );
    }

    #[test]
    fn remove_deletes_pending_item_and_keeps_order() {
        let mut queue = PriorityQueue::new();
        for (due, seq) in [(10, 0), (20, 1), (30, 2), (40, 3), (50, 4)] {
            queue.enqueue(item(due, seq));
        }

        assert!(queue.remove(2));
        assert!(!queue.remove(2));
        assert_eq!(queue.len(), 4);
        assert_eq!(
            drain_keys(&mut queue),
            vec![(10, 0), (20, 1), (40, 3), (50, 4)]
        );
    }

    #[test]
    fn dequeue_due_respects_limit() {
        let mut queue = PriorityQueue::new();
        for (due, seq) in [(10, 0), (20, 1), (30, 2)] {
            queue.enqueue(item(due, seq));
        }

        assert_eq!(queue.dequeue_due(20).map(|i| i.seq()), Some(0));
        assert_eq!(queue.dequeue_due(20).map(|i| i.seq()), Some(1));
        assert!(queue.dequeue_due(20).is_none());
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn invoke_after_slot_claimed_is_noop() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;

        let counter = Arc::new(AtomicUsize::new(0));
        let counted = {
            let counter = counter.clone();
            ScheduledItem::new(1u64, 0, Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }))
        };

        counted.slot().lock().unwrap().take();
        assert!(counted.is_cancelled());
        counted.invoke();
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }
}
