use std::ops::Deref;
use std::sync::Arc;

use crate::scheduler::Scheduler;

/// Cheaply cloneable shared reference to a scheduler.
///
/// Operators hold one of these rather than a concrete scheduler type, so the
/// same pipeline runs unchanged against wall-clock time in production and
/// virtual time under test.
#[derive(Clone)]
pub struct SchedulerHandle {
    inner: Arc<dyn Scheduler>,
}

impl SchedulerHandle {
    pub fn new<S: Scheduler>(scheduler: S) -> Self {
        Self {
            inner: Arc::new(scheduler),
        }
    }

    pub fn scheduler(&self) -> &dyn Scheduler {
        &*self.inner
    }
}

impl Deref for SchedulerHandle {
    type Target = dyn Scheduler;

    fn deref(&self) -> &Self::Target {
        &*self.inner
    }
}
