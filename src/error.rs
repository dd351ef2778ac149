use thiserror::Error;

/// Errors that can occur within the `request_orchestra` pool.
///
/// These never describe a failed request; request failures are captured on
/// the task as a [`Failure`](crate::Failure).
#[derive(Error, Debug, PartialEq)]
pub enum PoolError {
  #[error("Task result channel error (runner might have been dropped or receiver closed): {0}")]
  ResultChannelError(String),

  #[error("Pool's internal task queue was closed unexpectedly")]
  QueueSendChannelClosed,

  #[error("Task was cancelled")]
  TaskCancelled,

  #[error("Task (id: {0}) was already submitted to a pool")]
  TaskAlreadySubmitted(u64),

  #[error("Pool is shutting down or already shut down, cannot accept new tasks")]
  PoolShuttingDown,

  #[error("No Tokio runtime available to drive the pool")]
  RuntimeUnavailable,

  #[error("Join timed out with {pending} task(s) still pending")]
  JoinTimedOut { pending: usize },
}

/// Errors reported by a [`Session`](crate::Session) while opening or executing a request.
#[derive(Error, Debug)]
pub enum SessionError {
  #[error("Connection error: {0}")]
  Connection(String),

  #[error("Request timed out: {0}")]
  Timeout(String),

  #[error("Invalid request: {0}")]
  InvalidRequest(String),

  #[error("Protocol error: {0}")]
  Protocol(String),

  #[error(transparent)]
  Other(#[from] Box<dyn std::error::Error + Send + Sync + 'static>),
}

impl SessionError {
  /// Returns `true` if this error reports an elapsed request timeout.
  pub fn is_timeout(&self) -> bool {
    matches!(self, SessionError::Timeout(_))
  }
}
