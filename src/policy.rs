//! Outcome resolution shared by the three collection protocols.

use crate::failure::{Failure, Outcome};
use crate::session::Session;
use crate::task::Task;

use std::sync::Arc;

use tracing::trace;

/// Caller-supplied mapping from a task without a result to a substitute outcome.
///
/// The failure is `None` when the task never recorded one (abandoned). Returning
/// `None` yields a `None` slot in `map` and drops the element from `imap`.
/// Always called from the collecting side, one task at a time. A panic inside
/// the handler propagates out of the collection call.
pub type ExceptionHandler<S> =
  Arc<dyn Fn(&Task<S>, Option<&Failure>) -> Option<Outcome<<S as Session>::Response>> + Send + Sync + 'static>;

/// Wraps a closure as an [`ExceptionHandler`].
pub fn exception_handler<S, F>(handler: F) -> ExceptionHandler<S>
where
  S: Session,
  F: Fn(&Task<S>, Option<&Failure>) -> Option<Outcome<S::Response>> + Send + Sync + 'static,
{
  Arc::new(handler)
}

/// Resolves a finished (or abandoned) task into the outcome reported to the caller.
///
/// 1. a recorded result is handed over;
/// 2. otherwise the handler, if any, decides, seeing the failure or `None`;
/// 3. otherwise there is no outcome.
///
/// `map` keeps a `None` as a placeholder, `imap` drops it, `imap_enumerated`
/// tags it with the task's index.
pub(crate) fn resolve<S: Session>(task: &Task<S>, handler: Option<&ExceptionHandler<S>>) -> Option<Outcome<S::Response>> {
  if let Some(response) = task.take_result() {
    return Some(Outcome::Response(response));
  }

  let failure = task.failure();
  match handler {
    Some(handler) => {
      trace!(task_id = %task.id(), has_failure = failure.is_some(), "Invoking exception handler.");
      handler(task, failure.as_ref())
    }
    None => {
      trace!(task_id = %task.id(), state = ?task.state(), "Task has no result and no exception handler.");
      None
    }
  }
}
