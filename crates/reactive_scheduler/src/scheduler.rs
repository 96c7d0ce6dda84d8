use std::future::Future;
use std::time::Duration;

use thiserror::Error;

use crate::disposable::Disposable;
use crate::task::Task;
use crate::time::Timestamp;

/// Type-erased unit of work accepted by every scheduler.
pub type Action = Box<dyn FnOnce() + Send + 'static>;

/// When a scheduled action becomes due.
#[derive(Clone, Copy, Debug)]
pub enum Due {
    /// As soon as the scheduler next gets control.
    Now,
    /// Once the given span of scheduler time has elapsed.
    After(Duration),
    /// Once the scheduler's clock reaches the given instant.
    At(Timestamp),
}

/// Errors surfaced by clock-advancing calls on a virtual scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TimeError {
    /// `advance_to` was handed a target before the current clock.
    #[error("virtual time cannot move backward")]
    MovesBackward,
    /// A relative span folded the clock to an earlier instant.
    #[error("relative span moves virtual time backward")]
    NegativeSpan,
}

/// Core object-safe scheduling contract.
///
/// This trait is object-safe because the one scheduling method takes a
/// type-erased action and concrete time values; the generic convenience
/// forms live in [`SchedulerExt`] and compile down to [`Scheduler::schedule`].
///
/// Every scheduling call returns a [`Disposable`] wired to that one unit of
/// work: disposing it before the due time removes the pending entry (virtual
/// queue or host timer), while work that already started always runs to
/// completion. Schedulers are injected explicitly, never reached through
/// process-wide defaults.
pub trait Scheduler: Send + Sync + 'static {
    /// Schedule a type-erased action, returning its cancellation handle.
    fn schedule(&self, due: Due, action: Action) -> Disposable;

    /// Current reading of this scheduler's clock.
    fn now(&self) -> Timestamp;

    /// Clone the scheduler handle (for `Arc<dyn Scheduler>` usage).
    fn clone_scheduler(&self) -> Box<dyn Scheduler>;
}

/// Extension trait providing the convenient generic scheduling forms.
///
/// Not object-safe; blanket-implemented for every [`Scheduler`].
pub trait SchedulerExt: Scheduler {
    /// Run `action` as soon as possible.
    fn schedule_now(&self, action: impl FnOnce() + Send + 'static) -> Disposable {
        self.schedule(Due::Now, Box::new(action))
    }

    /// Run `action` once `delay` scheduler-time has elapsed.
    fn schedule_after(&self, delay: Duration, action: impl FnOnce() + Send + 'static) -> Disposable {
        self.schedule(Due::After(delay), Box::new(action))
    }

    /// Run `action` once the scheduler's clock reaches `due`.
    fn schedule_at(&self, due: Timestamp, action: impl FnOnce() + Send + 'static) -> Disposable {
        self.schedule(Due::At(due), Box::new(action))
    }

    /// Generic form threading `state` into the action and handing it a
    /// scheduler reference, so recursively scheduled work needs no
    /// caller-side captures. Recursive calls land back in the queue and are
    /// picked up by the iterative drain loop, keeping stack depth bounded
    /// over long chains.
    fn schedule_future<S>(
        &self,
        state: S,
        due: Due,
        action: impl FnOnce(&dyn Scheduler, S) + Send + 'static,
    ) -> Disposable
    where
        S: Send + 'static,
    {
        let handle = self.clone_scheduler();
        self.schedule(due, Box::new(move || action(handle.as_ref(), state)))
    }

    /// Spawn a future whose wakes are trampolined through this scheduler.
    ///
    /// Under a virtual scheduler every poll happens during a drain, so the
    /// future executes deterministically as the clock is advanced.
    fn spawn<F, T>(&self, future: F) -> Task<T>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let scheduler = self.clone_scheduler();
        let (runnable, task) = async_task::spawn(future, move |runnable: async_task::Runnable| {
            scheduler.schedule(
                Due::Now,
                Box::new(move || {
                    runnable.run();
                }),
            );
        });
        runnable.schedule();
        Task::spawned(task)
    }

    /// A future that completes once `duration` has elapsed on this scheduler.
    fn timer(&self, duration: Duration) -> Task<()> {
        let (tx, rx) = futures::channel::oneshot::channel();
        self.schedule(
            Due::After(duration),
            Box::new(move || {
                let _ = tx.send(());
            }),
        );
        self.spawn(async move {
            let _ = rx.await;
        })
    }
}

impl<S: Scheduler + ?Sized> SchedulerExt for S {}
