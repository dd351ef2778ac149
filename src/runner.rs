use crate::failure::Failure;
use crate::session::Session;
use crate::task::{SessionBinding, Task};

use std::ops::Deref;
use std::panic::AssertUnwindSafe;

use futures::FutureExt;
use tracing::{debug, trace, warn};

/// A session opened by a task for its own run. Released on drop, so every exit
/// path (success, error, panic, cancellation) gives it back.
struct OwnedSession<S: Session> {
  session: S,
}

impl<S: Session> OwnedSession<S> {
  fn open() -> Result<Self, Failure> {
    S::open()
      .map(|session| Self { session })
      .map_err(Failure::session_setup)
  }
}

impl<S: Session> Deref for OwnedSession<S> {
  type Target = S;

  fn deref(&self) -> &S {
    &self.session
  }
}

impl<S: Session> Drop for OwnedSession<S> {
  fn drop(&mut self) {
    self.session.release();
  }
}

/// Executes `task` once and records its outcome on it. Never panics and never
/// returns an error: failures live on the task.
pub(crate) async fn run<S: Session>(task: &Task<S>, log_failures: bool) {
  task.mark_running();
  trace!(task_id = %task.id(), method = %task.method(), url = %task.url(), "Runner started.");

  match AssertUnwindSafe(execute(task)).catch_unwind().await {
    Ok(Ok(response)) => {
      trace!(task_id = %task.id(), "Request succeeded.");
      task.record_result(response);
    }
    Ok(Err(failure)) => {
      report(task, &failure, log_failures);
      task.record_failure(failure);
    }
    Err(panic_payload) => {
      let failure = Failure::panicked(&*panic_payload);
      report(task, &failure, log_failures);
      task.record_failure(failure);
    }
  }
}

async fn execute<S: Session>(task: &Task<S>) -> Result<S::Response, Failure> {
  let response = match task.binding() {
    SessionBinding::Shared(session) => session.execute(task.request()).await,
    SessionBinding::Owned => {
      let session = OwnedSession::<S>::open()?;
      session.execute(task.request()).await
    }
  }
  .map_err(Failure::request)?;

  match task.hook() {
    Some(hook) => Ok(hook(&response, task.request()).unwrap_or(response)),
    None => Ok(response),
  }
}

fn report<S: Session>(task: &Task<S>, failure: &Failure, log_failures: bool) {
  if log_failures {
    warn!(task_id = %task.id(), url = %task.url(), kind = ?failure.kind(), "Task failed: {}", failure.message());
  } else {
    debug!(task_id = %task.id(), url = %task.url(), kind = ?failure.kind(), "Task failed: {}", failure.message());
  }
}
