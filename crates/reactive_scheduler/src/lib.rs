pub mod delay;
pub mod disposable;
pub mod executor;
pub mod queue;
pub mod runtime;
pub mod scheduler;
pub mod task;
pub mod time;

pub use delay::{delay_subscription, Observable, Observer, StreamError};
pub use disposable::{CompositeDisposable, Disposable, Dispose, SerialDisposable};
pub use executor::SchedulerHandle;
pub use queue::{PriorityQueue, ScheduledItem};
pub use runtime::{
    HistoricalScheduler, NextItem, RealTimeConfig, RealTimeScheduler, VirtualTimeScheduler,
};
pub use scheduler::{Action, Due, Scheduler, SchedulerExt, TimeError};
pub use task::Task;
pub use time::{Timestamp, VirtualTime};
