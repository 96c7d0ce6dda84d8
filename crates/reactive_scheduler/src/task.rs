use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

/// Handle to work spawned through a scheduler.
///
/// Dropping the handle cancels the underlying future; call [`Task::detach`]
/// to let it run to completion unobserved. Awaiting the handle yields the
/// future's output.
#[derive(Debug)]
pub struct Task<T>(TaskState<T>);

#[derive(Debug)]
enum TaskState<T> {
    /// A value immediately available without any spawning.
    Ready(Option<T>),
    /// A future running via scheduler-dispatched wakes.
    Spawned(async_task::Task<T>),
}

impl<T> Task<T> {
    /// A task that resolves to `value` without touching a scheduler.
    pub fn ready(value: T) -> Self {
        Task(TaskState::Ready(Some(value)))
    }

    pub(crate) fn spawned(task: async_task::Task<T>) -> Self {
        Task(TaskState::Spawned(task))
    }

    /// Let the task run to completion without retaining the handle.
    pub fn detach(self) {
        match self.0 {
            TaskState::Ready(_) => {}
            TaskState::Spawned(task) => task.detach(),
        }
    }

    pub fn is_finished(&self) -> bool {
        match &self.0 {
            TaskState::Ready(_) => true,
            TaskState::Spawned(task) => task.is_finished(),
        }
    }
}

impl<T: Unpin> Future for Task<T> {
    type Output = T;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match &mut self.get_mut().0 {
            TaskState::Ready(value) => Poll::Ready(
                value
                    .take()
                    .expect("Task polled after completion"),
            ),
            TaskState::Spawned(task) => Pin::new(task).poll(cx),
        }
    }
}
