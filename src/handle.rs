use crate::error::PoolError;
use crate::session::Session;
use crate::task::Task;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing;

/// A handle to a task submitted to a [`Pool`](crate::Pool).
///
/// Allows requesting cancellation of the task and awaiting its completion.
/// Polling the handle as a future yields the task once its runner has finished
/// with it; the outcome is read from the task itself.
#[derive(Debug)]
pub struct TaskHandle<S: Session> {
  pub(crate) task: Arc<Task<S>>,
  pub(crate) cancellation_token: CancellationToken,
  pub(crate) result_receiver: oneshot::Receiver<Result<(), PoolError>>,
}

impl<S: Session> TaskHandle<S> {
  /// Returns the unique ID of the task.
  pub fn id(&self) -> u64 {
    self.task.id()
  }

  pub fn task(&self) -> &Arc<Task<S>> {
    &self.task
  }

  /// Checks if cancellation has been requested for this task.
  pub fn is_cancellation_requested(&self) -> bool {
    self.cancellation_token.is_cancelled()
  }

  /// Requests best-effort cancellation. A queued task is never started; a running
  /// one is dropped at its next suspension point and ends up `Abandoned`.
  pub fn cancel(&self) {
    tracing::debug!(task_id = %self.task.id(), "TaskHandle: Cancellation requested.");
    self.cancellation_token.cancel();
  }

  /// Awaits the runner and returns the task.
  ///
  /// # Errors
  /// Returns `PoolError::TaskCancelled` if the task was cancelled before recording an outcome.
  /// Returns `PoolError::ResultChannelError` if the pool dropped the task without running it
  /// (e.g. the pool shut down while it was queued).
  pub async fn await_result(self) -> Result<Arc<Task<S>>, PoolError> {
    let task = self.task;
    match self.result_receiver.await {
      Ok(Ok(())) => Ok(task),
      Ok(Err(pool_error)) => Err(pool_error),
      Err(recv_error) => {
        tracing::warn!(task_id = %task.id(), "Result channel receive error: {}", recv_error);
        task.mark_abandoned();
        Err(PoolError::ResultChannelError(format!(
          "Task (id: {}) result channel unexpectedly closed: {}",
          task.id(),
          recv_error
        )))
      }
    }
  }
}

impl<S: Session> Future for TaskHandle<S> {
  type Output = Arc<Task<S>>;

  fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
    let this = self.get_mut();
    match Pin::new(&mut this.result_receiver).poll(cx) {
      Poll::Ready(Ok(Ok(()))) => Poll::Ready(this.task.clone()),
      Poll::Ready(Ok(Err(pool_error))) => {
        tracing::debug!(task_id = %this.task.id(), "Task ended without an outcome: {}", pool_error);
        this.task.mark_abandoned();
        Poll::Ready(this.task.clone())
      }
      Poll::Ready(Err(recv_error)) => {
        tracing::warn!(task_id = %this.task.id(), "Result channel receive error: {}", recv_error);
        this.task.mark_abandoned();
        Poll::Ready(this.task.clone())
      }
      Poll::Pending => Poll::Pending,
    }
  }
}
