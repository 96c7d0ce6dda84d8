use std::sync::{Arc, Condvar, Mutex, Weak};
use std::thread;
use std::time::{Duration, Instant};

use crate::disposable::Disposable;
use crate::queue::{PriorityQueue, ScheduledItem};
use crate::scheduler::{Action, Due, Scheduler};
use crate::time::Timestamp;

/// Tuning for the real-time scheduler's worker.
#[derive(Debug, Clone)]
pub struct RealTimeConfig {
    /// Name given to the timer thread.
    pub thread_name: String,
    /// Upper bound on one condvar park. Shorter parks make the worker notice
    /// an abandoned scheduler sooner; they do not affect firing precision.
    pub idle_park: Duration,
}

impl Default for RealTimeConfig {
    fn default() -> Self {
        Self {
            thread_name: "reactive-scheduler-timer".into(),
            idle_park: Duration::from_millis(500),
        }
    }
}

/// Wall-clock scheduler backed by one dedicated timer thread.
///
/// `schedule` may be called from any thread. Actions run on the timer
/// thread, one at a time in `(due, enqueue)` order, so two actions due at
/// the same instant never interleave their side effects. The thread is
/// spawned lazily on first use and exits once every handle is dropped (any
/// still-pending actions are discarded) or [`RealTimeScheduler::shutdown`]
/// is called.
///
/// The scheduler's clock is the time elapsed since its construction, so
/// `Due::At` timestamps are interpreted against this scheduler's epoch.
#[derive(Clone)]
pub struct RealTimeScheduler {
    shared: Arc<RealShared>,
}

struct RealShared {
    epoch: Instant,
    thread_name: String,
    idle_park: Duration,
    state: Mutex<RealState>,
    work_ready: Condvar,
}

struct RealState {
    queue: PriorityQueue<Timestamp>,
    next_seq: u64,
    worker_spawned: bool,
    shutdown: bool,
}

impl RealTimeScheduler {
    pub fn new(config: RealTimeConfig) -> Self {
        Self {
            shared: Arc::new(RealShared {
                epoch: Instant::now(),
                thread_name: config.thread_name,
                idle_park: config.idle_park,
                state: Mutex::new(RealState {
                    queue: PriorityQueue::new(),
                    next_seq: 0,
                    worker_spawned: false,
                    shutdown: false,
                }),
                work_ready: Condvar::new(),
            }),
        }
    }

    /// Stops the timer thread. Pending actions are discarded; scheduling
    /// afterwards quietly does nothing.
    pub fn shutdown(&self) {
        {
            let mut state = self.shared.state.lock().unwrap();
            state.shutdown = true;
        }
        self.shared.work_ready.notify_one();
        tracing::debug!("real-time scheduler shut down");
    }

    /// Number of not-yet-due actions.
    pub fn queue_len(&self) -> usize {
        self.shared.state.lock().unwrap().queue.len()
    }
}

impl Default for RealTimeScheduler {
    fn default() -> Self {
        Self::new(RealTimeConfig::default())
    }
}

impl Scheduler for RealTimeScheduler {
    fn schedule(&self, due: Due, action: Action) -> Disposable {
        let target = match due {
            Due::Now => self.now(),
            Due::After(delay) => self.now() + delay,
            Due::At(at) => at,
        };

        let mut state = self.shared.state.lock().unwrap();
        if state.shutdown {
            return Disposable::empty();
        }
        let seq = state.next_seq;
        state.next_seq += 1;

        let item = ScheduledItem::new(target, seq, action);
        let slot = item.slot();
        let weak = Arc::downgrade(&self.shared);
        let handle = Disposable::new(move || {
            // Claim the action first: if the timer already dequeued the item
            // but has not run it, the claim wins; if the action already
            // started, it runs to completion and this is a no-op.
            slot.lock().unwrap().take();
            if let Some(shared) = weak.upgrade() {
                shared.state.lock().unwrap().queue.remove(seq);
            }
        });

        tracing::trace!(seq, due = ?target, "queueing timed action");
        state.queue.enqueue(item);

        if !state.worker_spawned {
            state.worker_spawned = true;
            let weak = Arc::downgrade(&self.shared);
            thread::Builder::new()
                .name(self.shared.thread_name.clone())
                .spawn(move || timer_loop(weak))
                .expect("failed to spawn timer thread");
            tracing::debug!(thread = %self.shared.thread_name, "timer thread spawned");
        }
        drop(state);
        self.shared.work_ready.notify_one();
        handle
    }

    fn now(&self) -> Timestamp {
        Timestamp::new(self.shared.epoch.elapsed())
    }

    fn clone_scheduler(&self) -> Box<dyn Scheduler> {
        Box::new(self.clone())
    }
}

fn timer_loop(weak: Weak<RealShared>) {
    loop {
        // Hold a strong reference only for one pass, so an abandoned
        // scheduler is noticed within one park interval.
        let Some(shared) = weak.upgrade() else { break };
        let due_item = {
            let mut state = shared.state.lock().unwrap();
            if state.shutdown {
                break;
            }
            let now = Timestamp::new(shared.epoch.elapsed());
            match state.queue.dequeue_due(now) {
                Some(item) => Some(item),
                None => {
                    let park = state
                        .queue
                        .peek()
                        .map(|head| head.due().saturating_since(now))
                        .unwrap_or(shared.idle_park)
                        .min(shared.idle_park);
                    let _ = shared.work_ready.wait_timeout(state, park).unwrap();
                    None
                }
            }
        };
        if let Some(item) = due_item {
            tracing::trace!(seq = item.seq(), "running timed action");
            item.invoke();
        }
    }
    tracing::debug!("timer thread exiting");
}
