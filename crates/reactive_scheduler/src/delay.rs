use std::sync::Arc;

use crate::disposable::{Disposable, SerialDisposable};
use crate::scheduler::{Due, Scheduler, SchedulerExt};

/// Error payload carried by [`Observer::on_error`]. The scheduling core
/// never inspects it.
pub type StreamError = Box<dyn std::error::Error + Send + Sync>;

/// Downstream notification surface. Opaque to the scheduling core: scheduled
/// actions call into it, the core never does.
pub trait Observer<T>: Send + Sync + 'static {
    fn on_next(&self, value: T);
    fn on_error(&self, error: StreamError);
    fn on_completed(&self);
}

/// Upstream source of values. `subscribe` wires an observer in and returns
/// the handle that tears the connection down.
pub trait Observable<T>: Send + Sync + 'static {
    fn subscribe(&self, observer: Arc<dyn Observer<T>>) -> Disposable;
}

/// Time-shifts a subscription: the connection to `source` is established
/// only once `due` elapses on `scheduler`, and stays cancellable throughout.
///
/// A serial disposable is returned to the caller immediately and initially
/// guards the pending timer; when the timer fires, the upstream
/// subscription's handle takes its place. Disposing the returned handle
/// before the due time cancels the timer and the upstream `subscribe` is
/// never entered; disposing afterwards tears the live subscription down.
pub fn delay_subscription<T: 'static>(
    source: Arc<dyn Observable<T>>,
    due: Due,
    scheduler: &dyn Scheduler,
    observer: Arc<dyn Observer<T>>,
) -> Disposable {
    let gate = SerialDisposable::new();
    // The timer handle goes through its own slot: a timer that fires on
    // another thread before `set` returns must not be able to clobber the
    // freshly installed subscription.
    let timer_slot = SerialDisposable::new();
    gate.set(timer_slot.clone().into());

    let subscription_gate = gate.clone();
    timer_slot.set(scheduler.schedule_future(observer, due, move |_, observer| {
        subscription_gate.set(source.subscribe(observer));
    }));
    gate.into()
}
