use crate::error::PoolError;
use crate::failure::Failure;
use crate::session::{Method, Request, Session};

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, trace};

lazy_static::lazy_static! {
  static ref NEXT_TASK_ID_COUNTER: AtomicU64 = AtomicU64::new(0);
}

/// Post-response callback. A `Some` return value replaces the response as the
/// task's result.
pub type ResponseHook<R> = Arc<dyn Fn(&R, &Request) -> Option<R> + Send + Sync + 'static>;

/// Lifecycle of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
  Created,
  Submitted,
  Running,
  Succeeded,
  Failed,
  /// Never recorded an outcome: cancelled, timed out in a join, or lost by the pool.
  Abandoned,
}

impl TaskState {
  pub fn is_terminal(self) -> bool {
    matches!(self, TaskState::Succeeded | TaskState::Failed | TaskState::Abandoned)
  }
}

pub(crate) enum SessionBinding<S: Session> {
  Shared(Arc<S>),
  Owned,
}

struct TaskCell<R> {
  state: TaskState,
  result: Option<R>,
  failure: Option<Failure>,
}

/// A deferred request bound to a session, run at most once.
pub struct Task<S: Session> {
  task_id: u64,
  request: Request,
  binding: SessionBinding<S>,
  hook: Option<ResponseHook<S::Response>>,
  index: Option<usize>,
  cell: Mutex<TaskCell<S::Response>>,
}

impl<S: Session> Task<S> {
  /// Creates a task that opens its own session when run.
  pub fn new(method: impl Into<Method>, url: impl Into<String>) -> Self {
    Self {
      task_id: NEXT_TASK_ID_COUNTER.fetch_add(1, AtomicOrdering::Relaxed),
      request: Request::new(method, url),
      binding: SessionBinding::Owned,
      hook: None,
      index: None,
      cell: Mutex::new(TaskCell {
        state: TaskState::Created,
        result: None,
        failure: None,
      }),
    }
  }

  /// Runs the request on a caller-owned session instead of opening a fresh one.
  pub fn session(mut self, session: Arc<S>) -> Self {
    self.binding = SessionBinding::Shared(session);
    self
  }

  /// Registers a callback run on the response before it becomes the result.
  pub fn callback<F>(mut self, hook: F) -> Self
  where
    F: Fn(&S::Response, &Request) -> Option<S::Response> + Send + Sync + 'static,
  {
    self.hook = Some(Arc::new(hook));
    self
  }

  pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
    self.request.options_mut().headers.push((name.into(), value.into()));
    self
  }

  pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
    self.request.options_mut().query.push((key.into(), value.into()));
    self
  }

  pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
    self.request.options_mut().body = Some(body.into());
    self
  }

  pub fn timeout(mut self, timeout: Duration) -> Self {
    self.request.options_mut().timeout = Some(timeout);
    self
  }

  pub fn allow_redirects(mut self, allow: bool) -> Self {
    self.request.options_mut().allow_redirects = Some(allow);
    self
  }

  pub fn stream(mut self, stream: bool) -> Self {
    self.request.options_mut().stream = stream;
    self
  }

  pub fn id(&self) -> u64 {
    self.task_id
  }

  pub fn request(&self) -> &Request {
    &self.request
  }

  pub fn method(&self) -> &Method {
    self.request.method()
  }

  pub fn url(&self) -> &str {
    self.request.url()
  }

  /// Position in the input sequence; only set by `imap_enumerated`.
  pub fn index(&self) -> Option<usize> {
    self.index
  }

  pub fn state(&self) -> TaskState {
    self.cell.lock().state
  }

  /// `true` while the result is recorded and not yet handed to the caller.
  pub fn has_result(&self) -> bool {
    self.cell.lock().result.is_some()
  }

  pub fn failure(&self) -> Option<Failure> {
    self.cell.lock().failure.clone()
  }

  pub(crate) fn binding(&self) -> &SessionBinding<S> {
    &self.binding
  }

  pub(crate) fn hook(&self) -> Option<&ResponseHook<S::Response>> {
    self.hook.as_ref()
  }

  pub(crate) fn set_index(&mut self, index: usize) {
    self.index = Some(index);
  }

  pub(crate) fn take_result(&self) -> Option<S::Response> {
    self.cell.lock().result.take()
  }

  pub(crate) fn mark_submitted(&self) -> Result<(), PoolError> {
    let mut cell = self.cell.lock();
    if cell.state != TaskState::Created {
      return Err(PoolError::TaskAlreadySubmitted(self.task_id));
    }
    cell.state = TaskState::Submitted;
    Ok(())
  }

  pub(crate) fn mark_running(&self) {
    let mut cell = self.cell.lock();
    if cell.state == TaskState::Submitted {
      cell.state = TaskState::Running;
    }
  }

  pub(crate) fn record_result(&self, response: S::Response) {
    let mut cell = self.cell.lock();
    if cell.state.is_terminal() {
      debug!(task_id = %self.task_id, state = ?cell.state, "Discarding late result for task with a recorded outcome.");
      return;
    }
    cell.state = TaskState::Succeeded;
    cell.result = Some(response);
  }

  pub(crate) fn record_failure(&self, failure: Failure) {
    let mut cell = self.cell.lock();
    if cell.state.is_terminal() {
      debug!(task_id = %self.task_id, state = ?cell.state, "Discarding late failure for task with a recorded outcome.");
      return;
    }
    cell.state = TaskState::Failed;
    cell.failure = Some(failure);
  }

  pub(crate) fn mark_abandoned(&self) {
    let mut cell = self.cell.lock();
    if !cell.state.is_terminal() {
      trace!(task_id = %self.task_id, previous = ?cell.state, "Task abandoned.");
      cell.state = TaskState::Abandoned;
    }
  }
}

impl<S: Session> fmt::Debug for Task<S> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let shared_session = matches!(self.binding, SessionBinding::Shared(_));
    f.debug_struct("Task")
      .field("task_id", &self.task_id)
      .field("method", self.request.method())
      .field("url", &self.request.url())
      .field("index", &self.index)
      .field("shared_session", &shared_session)
      .field("has_callback", &self.hook.is_some())
      .field("state", &self.state())
      .finish()
  }
}

/// Builds a task for an arbitrary verb.
pub fn request<S: Session>(method: impl Into<Method>, url: impl Into<String>) -> Task<S> {
  Task::new(method, url)
}

pub fn get<S: Session>(url: impl Into<String>) -> Task<S> {
  Task::new(Method::Get, url).allow_redirects(true)
}

pub fn options<S: Session>(url: impl Into<String>) -> Task<S> {
  Task::new(Method::Options, url).allow_redirects(true)
}

pub fn head<S: Session>(url: impl Into<String>) -> Task<S> {
  Task::new(Method::Head, url).allow_redirects(false)
}

pub fn post<S: Session>(url: impl Into<String>) -> Task<S> {
  Task::new(Method::Post, url)
}

pub fn put<S: Session>(url: impl Into<String>) -> Task<S> {
  Task::new(Method::Put, url)
}

pub fn patch<S: Session>(url: impl Into<String>) -> Task<S> {
  Task::new(Method::Patch, url)
}

pub fn delete<S: Session>(url: impl Into<String>) -> Task<S> {
  Task::new(Method::Delete, url)
}
