use std::sync::{Arc, Mutex};

use crate::disposable::Disposable;
use crate::queue::{PriorityQueue, ScheduledItem};
use crate::scheduler::{Action, Due, Scheduler, TimeError};
use crate::time::{Timestamp, VirtualTime};

/// Scheduler whose clock is a logical value advanced explicitly by the
/// caller instead of by wall-clock passage.
///
/// All draining happens synchronously on the calling thread: "wait N time
/// units" becomes "advance the clock by N", which turns timing-dependent
/// pipelines into deterministic, instantly-executing scenarios. Actions may
/// re-enter the scheduler to queue more work; such work lands in the queue
/// and is picked up by the same iterative drain loop rather than invoked
/// recursively, so stack depth stays bounded over long chains.
///
/// Handles are cheap clones sharing one state, mirroring how operators pass
/// schedulers around.
pub struct VirtualTimeScheduler<T: VirtualTime = Timestamp> {
    inner: Arc<Mutex<VirtualState<T>>>,
}

/// Virtual scheduler running on plain [`Timestamp`] values, the
/// instantiation used to replay recorded timelines and drive tests.
pub type HistoricalScheduler = VirtualTimeScheduler<Timestamp>;

struct VirtualState<T: VirtualTime> {
    clock: T,
    queue: PriorityQueue<T>,
    enabled: bool,
    halt_requested: bool,
    next_seq: u64,
}

/// Due time and enqueue sequence of the queue head, as reported by
/// [`VirtualTimeScheduler::get_next`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NextItem<T> {
    pub due: T,
    pub seq: u64,
}

impl<T: VirtualTime> VirtualTimeScheduler<T> {
    /// Creates a scheduler with its clock set to `initial`.
    pub fn new(initial: T) -> Self {
        Self {
            inner: Arc::new(Mutex::new(VirtualState {
                clock: initial,
                queue: PriorityQueue::new(),
                enabled: false,
                halt_requested: false,
                next_seq: 0,
            })),
        }
    }

    /// Current virtual clock reading.
    pub fn clock(&self) -> T {
        self.inner.lock().unwrap().clock
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.lock().unwrap().enabled
    }

    /// Number of pending queue entries.
    pub fn queue_len(&self) -> usize {
        self.inner.lock().unwrap().queue.len()
    }

    /// The next item due to execute, without removing it.
    pub fn get_next(&self) -> Option<NextItem<T>> {
        let state = self.inner.lock().unwrap();
        state.queue.peek().map(|item| NextItem {
            due: item.due(),
            seq: item.seq(),
        })
    }

    /// Schedule `action` at the absolute virtual time `due`.
    ///
    /// A due time already in the past executes at the current clock; the
    /// clock never rewinds to meet it.
    pub fn schedule_absolute(&self, due: T, action: impl FnOnce() + Send + 'static) -> Disposable {
        self.schedule_item(due, Box::new(action))
    }

    /// Schedule `action` a relative span past the current clock.
    pub fn schedule_relative(
        &self,
        span: T::Span,
        action: impl FnOnce() + Send + 'static,
    ) -> Disposable {
        let due = self.inner.lock().unwrap().clock.advance(span);
        self.schedule_item(due, Box::new(action))
    }

    /// Runs every item due at or before `target`, then sets the clock there.
    ///
    /// Fails without touching the clock when `target` lies before it. A
    /// `stop()` issued by one of the executed actions halts the drain early:
    /// the clock stays at the due time of the last executed item and the
    /// rest of the queue survives for a later call. An action that panics
    /// unwinds out of this call with the same resumability guarantee.
    pub fn advance_to(&self, target: T) -> Result<(), TimeError> {
        {
            let mut state = self.inner.lock().unwrap();
            if target < state.clock {
                return Err(TimeError::MovesBackward);
            }
            state.halt_requested = false;
        }
        loop {
            let item = {
                let mut state = self.inner.lock().unwrap();
                if state.halt_requested {
                    return Ok(());
                }
                match state.queue.dequeue_due(target) {
                    Some(item) => {
                        if state.clock < item.due() {
                            state.clock = item.due();
                        }
                        item
                    }
                    None => {
                        state.clock = target;
                        return Ok(());
                    }
                }
            };
            // Lock released: the action may schedule, cancel, or stop.
            item.invoke();
        }
    }

    /// Equivalent to `advance_to(clock.advance(span))`.
    pub fn advance_by(&self, span: T::Span) -> Result<(), TimeError> {
        let target = {
            let state = self.inner.lock().unwrap();
            let target = state.clock.advance(span);
            if target < state.clock {
                return Err(TimeError::NegativeSpan);
            }
            target
        };
        self.advance_to(target)
    }

    /// Moves the clock forward by `span` without executing anything, even
    /// items that become overdue as a result.
    pub fn sleep(&self, span: T::Span) -> Result<(), TimeError> {
        let mut state = self.inner.lock().unwrap();
        let target = state.clock.advance(span);
        if target < state.clock {
            return Err(TimeError::NegativeSpan);
        }
        state.clock = target;
        Ok(())
    }

    /// Enables the scheduler and drains the whole queue in due order,
    /// advancing the clock to each item (never backward). Disables itself on
    /// exhaustion. The returned handle stops the scheduler when disposed.
    pub fn start(&self) -> Disposable {
        {
            let mut state = self.inner.lock().unwrap();
            state.enabled = true;
            state.halt_requested = false;
        }
        tracing::debug!("virtual scheduler draining");
        loop {
            let item = {
                let mut state = self.inner.lock().unwrap();
                if !state.enabled {
                    break;
                }
                match state.queue.dequeue() {
                    Some(item) => {
                        if state.clock < item.due() {
                            state.clock = item.due();
                        }
                        item
                    }
                    None => {
                        state.enabled = false;
                        break;
                    }
                }
            };
            item.invoke();
        }
        let this = self.clone();
        Disposable::new(move || this.stop())
    }

    /// Disables the scheduler and asks any in-progress drain (`start` or a
    /// manual `advance_to`) to halt after the current action. Pending items
    /// stay queued.
    pub fn stop(&self) {
        let mut state = self.inner.lock().unwrap();
        state.enabled = false;
        state.halt_requested = true;
        tracing::debug!("virtual scheduler stopped");
    }

    fn schedule_item(&self, due: T, action: Action) -> Disposable {
        let mut state = self.inner.lock().unwrap();
        let seq = state.next_seq;
        state.next_seq += 1;

        let item = ScheduledItem::new(due, seq, action);
        let slot = item.slot();
        let weak = Arc::downgrade(&self.inner);
        let handle = Disposable::new(move || {
            // Claim the action first so a concurrent drain can no longer run
            // it, then drop the queue entry.
            slot.lock().unwrap().take();
            if let Some(inner) = weak.upgrade() {
                inner.lock().unwrap().queue.remove(seq);
            }
        });

        tracing::trace!(seq, due = ?due, "queueing virtual action");
        state.queue.enqueue(item);
        handle
    }
}

impl<T: VirtualTime> Clone for VirtualTimeScheduler<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: VirtualTime + Default> Default for VirtualTimeScheduler<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl Scheduler for HistoricalScheduler {
    fn schedule(&self, due: Due, action: Action) -> Disposable {
        let due = {
            let state = self.inner.lock().unwrap();
            match due {
                Due::Now => state.clock,
                Due::After(delay) => state.clock + delay,
                Due::At(at) => at,
            }
        };
        self.schedule_item(due, action)
    }

    fn now(&self) -> Timestamp {
        self.clock()
    }

    fn clone_scheduler(&self) -> Box<dyn Scheduler> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disposable::Dispose;
    use crate::scheduler::SchedulerExt;
    use std::panic::{catch_unwind, AssertUnwindSafe};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn millis(ms: u64) -> Timestamp {
        Timestamp::from_millis(ms)
    }

    fn recorder() -> (Arc<Mutex<Vec<&'static str>>>, impl Fn(&'static str) + Clone) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let push = {
            let log = log.clone();
            move |tag: &'static str| log.lock().unwrap().push(tag)
        };
        (log, push)
    }

    #[test]
    fn equal_due_times_execute_in_schedule_order() {
        let scheduler = HistoricalScheduler::default();
        let (log, push) = recorder();

        let a = push.clone();
        scheduler.schedule_absolute(millis(5), move || a("a"));
        let b = push.clone();
        scheduler.schedule_absolute(millis(5), move || b("b"));

        scheduler.advance_to(millis(10)).unwrap();

        assert_eq!(*log.lock().unwrap(), vec!["a", "b"]);
        assert_eq!(scheduler.clock(), millis(10));
    }

    #[test]
    fn advance_to_rejects_time_travel() {
        let scheduler = HistoricalScheduler::default();
        scheduler.advance_to(millis(10)).unwrap();

        assert_eq!(
            scheduler.advance_to(millis(5)),
            Err(TimeError::MovesBackward)
        );
        assert_eq!(scheduler.clock(), millis(10));
    }

    #[test]
    fn disposing_before_due_time_prevents_execution() {
        let scheduler = HistoricalScheduler::default();
        let count = Arc::new(AtomicUsize::new(0));

        let handle = {
            let count = count.clone();
            scheduler.schedule_absolute(millis(5), move || {
                count.fetch_add(1, Ordering::SeqCst);
            })
        };
        scheduler.schedule_absolute(millis(7), || {});
        assert_eq!(scheduler.queue_len(), 2);

        handle.dispose();
        assert_eq!(scheduler.queue_len(), 1);

        scheduler.advance_to(millis(10)).unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn advance_by_matches_advance_to() {
        let run = |use_advance_by: bool| {
            let scheduler = HistoricalScheduler::default();
            let (log, push) = recorder();
            for (tag, at) in [("x", 2u64), ("y", 4), ("z", 4)] {
                let push = push.clone();
                scheduler.schedule_absolute(millis(at), move || push(tag));
            }
            if use_advance_by {
                scheduler.advance_by(Duration::from_millis(6)).unwrap();
            } else {
                scheduler.advance_to(millis(6)).unwrap();
            }
            let result = (log.lock().unwrap().clone(), scheduler.clock());
            result
        };

        assert_eq!(run(true), run(false));
    }

    #[test]
    fn sleep_skips_work_in_the_window() {
        let scheduler = HistoricalScheduler::default();
        let count = Arc::new(AtomicUsize::new(0));
        {
            let count = count.clone();
            scheduler.schedule_absolute(millis(3), move || {
                count.fetch_add(1, Ordering::SeqCst);
            });
        }

        scheduler.sleep(Duration::from_millis(10)).unwrap();

        assert_eq!(scheduler.clock(), millis(10));
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert_eq!(scheduler.queue_len(), 1);
    }

    #[test]
    fn start_drains_everything_and_disables() {
        let scheduler = HistoricalScheduler::default();
        let (log, push) = recorder();
        for (tag, at) in [("late", 9u64), ("early", 1)] {
            let push = push.clone();
            scheduler.schedule_absolute(millis(at), move || push(tag));
        }

        scheduler.start();

        assert_eq!(*log.lock().unwrap(), vec!["early", "late"]);
        assert!(!scheduler.is_enabled());
        assert_eq!(scheduler.clock(), millis(9));
    }

    #[test]
    fn stop_from_inside_an_action_halts_the_drain() {
        let scheduler = HistoricalScheduler::default();
        let (log, push) = recorder();
        {
            let inner = scheduler.clone();
            let push = push.clone();
            scheduler.schedule_absolute(millis(2), move || {
                push("first");
                inner.stop();
            });
        }
        {
            let push = push.clone();
            scheduler.schedule_absolute(millis(4), move || push("second"));
        }

        scheduler.advance_to(millis(10)).unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["first"]);
        assert_eq!(scheduler.clock(), millis(2));
        assert_eq!(scheduler.queue_len(), 1);

        // The halted window resumes on the next drain.
        scheduler.advance_to(millis(10)).unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["first", "second"]);
        assert_eq!(scheduler.clock(), millis(10));
    }

    #[test]
    fn reentrant_scheduling_runs_in_enqueue_order() {
        let scheduler = HistoricalScheduler::default();
        let (log, push) = recorder();
        {
            let inner = scheduler.clone();
            let push_a = push.clone();
            scheduler.schedule_absolute(millis(5), move || {
                push_a("a");
                let push_c = push_a.clone();
                inner.schedule_absolute(millis(5), move || push_c("c"));
            });
        }
        {
            let push = push.clone();
            scheduler.schedule_absolute(millis(5), move || push("b"));
        }

        scheduler.advance_to(millis(5)).unwrap();

        assert_eq!(*log.lock().unwrap(), vec!["a", "b", "c"]);
    }

    #[test]
    fn overdue_items_run_without_rewinding_the_clock() {
        let scheduler = HistoricalScheduler::default();
        scheduler.advance_to(millis(8)).unwrap();

        let seen = Arc::new(Mutex::new(None));
        {
            let seen = seen.clone();
            let inner = scheduler.clone();
            scheduler.schedule_absolute(millis(3), move || {
                *seen.lock().unwrap() = Some(inner.clock());
            });
        }

        scheduler.advance_to(millis(10)).unwrap();
        assert_eq!(*seen.lock().unwrap(), Some(millis(8)));
    }

    #[test]
    fn get_next_peeks_without_removal() {
        let scheduler = HistoricalScheduler::default();
        assert_eq!(scheduler.get_next(), None);

        scheduler.schedule_absolute(millis(9), || {});
        scheduler.schedule_absolute(millis(4), || {});

        let next = scheduler.get_next().unwrap();
        assert_eq!(next.due, millis(4));
        assert_eq!(scheduler.queue_len(), 2);
    }

    #[test]
    fn trait_scheduling_resolves_due_against_the_clock() {
        let scheduler = HistoricalScheduler::default();
        scheduler.advance_to(millis(10)).unwrap();

        let (log, push) = recorder();
        {
            let push = push.clone();
            scheduler.schedule_after(Duration::from_millis(5), move || push("after"));
        }
        {
            let push = push.clone();
            scheduler.schedule_now(move || push("now"));
        }

        scheduler.advance_by(Duration::from_millis(5)).unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["now", "after"]);
        assert_eq!(scheduler.now(), millis(15));
    }

    #[test]
    fn panicking_action_leaves_the_rest_of_the_queue_intact() {
        let scheduler = HistoricalScheduler::default();
        let (log, push) = recorder();
        scheduler.schedule_absolute(millis(1), || panic!("boom"));
        {
            let push = push.clone();
            scheduler.schedule_absolute(millis(2), move || push("survivor"));
        }

        let result = catch_unwind(AssertUnwindSafe(|| scheduler.advance_to(millis(5))));
        assert!(result.is_err());
        assert_eq!(scheduler.clock(), millis(1));
        assert_eq!(scheduler.queue_len(), 1);

        scheduler.advance_to(millis(5)).unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["survivor"]);
    }
}
