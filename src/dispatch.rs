use crate::config::{DispatchConfig, DEFAULT_STREAM_SIZE};
use crate::error::PoolError;
use crate::failure::{Failure, Outcome};
use crate::handle::TaskHandle;
use crate::policy::{self, ExceptionHandler};
use crate::pool::Pool;
use crate::session::Session;
use crate::task::Task;

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use futures::future;
use futures::stream::{self, FuturesUnordered, Stream, StreamExt};
use tracing::{debug, info_span, warn, Instrument};

/// Runs batches of tasks on a fresh pool per call and collects their outcomes.
///
/// Each protocol call builds its own [`Pool`] from the configuration, so a
/// dispatcher can be reused and shared freely.
pub struct Dispatcher<S: Session> {
  config: DispatchConfig,
  exception_handler: Option<ExceptionHandler<S>>,
}

impl<S: Session> Dispatcher<S> {
  pub fn new(config: DispatchConfig) -> Self {
    Self {
      config,
      exception_handler: None,
    }
  }

  pub fn with_exception_handler<F>(self, handler: F) -> Self
  where
    F: Fn(&Task<S>, Option<&Failure>) -> Option<Outcome<S::Response>> + Send + Sync + 'static,
  {
    self.with_handler(Some(policy::exception_handler(handler)))
  }

  pub fn with_handler(mut self, handler: Option<ExceptionHandler<S>>) -> Self {
    self.exception_handler = handler;
    self
  }

  pub fn config(&self) -> &DispatchConfig {
    &self.config
  }

  fn build_pool(&self, size: Option<usize>) -> Result<Arc<Pool<S>>, PoolError> {
    // Without a handler, nobody else will see the failure.
    let pool_config = self
      .config
      .pool_config(self.exception_handler.is_none())
      .with_size(size);
    match &self.config.tokio_handle {
      Some(tokio_handle) => Ok(Pool::new(pool_config, tokio_handle.clone())),
      None => Pool::try_current(pool_config),
    }
  }

  /// Concurrency bound of the streaming protocols, which are never unbounded.
  fn stream_size(&self) -> usize {
    self.config.size.unwrap_or(DEFAULT_STREAM_SIZE).max(1)
  }

  /// Number of tasks kept submitted ahead of the consumer: twice the bound, so
  /// the pool's queue stays primed while the caller handles an outcome.
  fn stream_window(&self) -> usize {
    self.stream_size().saturating_mul(2)
  }

  /// Runs every task and returns one outcome per task, aligned with the input.
  ///
  /// Never fails because a task failed. Tasks still unfinished when the
  /// configured timeout elapses are cancelled best-effort and resolved as if
  /// they had no failure.
  pub async fn map<I>(&self, tasks: I) -> Result<Vec<Option<Outcome<S::Response>>>, PoolError>
  where
    I: IntoIterator<Item = Task<S>>,
  {
    let tasks: Vec<Arc<Task<S>>> = tasks.into_iter().map(Arc::new).collect();
    let pool = self.build_pool(self.config.size)?;
    let span = info_span!("dispatch_map", pool_name = %pool.name(), tasks = tasks.len());
    self.map_on(&pool, tasks).instrument(span).await
  }

  async fn map_on(
    &self,
    pool: &Pool<S>,
    tasks: Vec<Arc<Task<S>>>,
  ) -> Result<Vec<Option<Outcome<S::Response>>>, PoolError> {
    let mut handles = Vec::with_capacity(tasks.len());
    for task in &tasks {
      handles.push(pool.submit(task.clone())?);
    }

    match pool.join(handles, self.config.timeout).await {
      Ok(()) => debug!("All tasks finished."),
      Err(PoolError::JoinTimedOut { pending }) => {
        debug!(%pending, "Collecting outcomes after join timeout.");
      }
      Err(other) => return Err(other),
    }

    Ok(
      tasks
        .iter()
        .map(|task| policy::resolve(task, self.exception_handler.as_ref()))
        .collect(),
    )
  }

  /// Streams outcomes in completion order.
  ///
  /// Runs at most `size` tasks at once, [`DEFAULT_STREAM_SIZE`] when the
  /// configuration leaves it unset.
  ///
  /// A task that failed is dropped unless the exception handler substitutes an
  /// outcome for it. `tasks` is pulled lazily as slots free up. Dropping the
  /// stream stops admission of queued tasks; running ones are left to finish.
  pub fn imap<I>(&self, tasks: I) -> Result<impl Stream<Item = Outcome<S::Response>>, PoolError>
  where
    I: IntoIterator<Item = Task<S>>,
  {
    let pool = self.build_pool(Some(self.stream_size()))?;
    let handler = self.exception_handler.clone();
    Ok(
      completions(pool, tasks.into_iter(), self.stream_window())
        .filter_map(move |task| future::ready(policy::resolve(&task, handler.as_ref()))),
    )
  }

  /// Streams `(index, outcome)` pairs in completion order, one per input task.
  pub fn imap_enumerated(
    &self,
    tasks: Vec<Task<S>>,
  ) -> Result<impl Stream<Item = (usize, Option<Outcome<S::Response>>)>, PoolError> {
    let pool = self.build_pool(Some(self.stream_size()))?;
    let handler = self.exception_handler.clone();
    let indexed = tasks.into_iter().enumerate().map(|(index, mut task)| {
      task.set_index(index);
      task
    });
    Ok(
      completions(pool, indexed, self.stream_window()).map(move |task| {
        // Every task was indexed above.
        let index = task.index().unwrap_or_default();
        (index, policy::resolve(&task, handler.as_ref()))
      }),
    )
  }
}

impl<S: Session> Default for Dispatcher<S> {
  fn default() -> Self {
    Self::new(DispatchConfig::default())
  }
}

/// Concurrently runs `tasks` and returns their outcomes in input order.
///
/// `size = None` runs every task at once. The result always has one slot per task.
pub async fn map<S, I>(
  tasks: I,
  size: Option<usize>,
  exception_handler: Option<ExceptionHandler<S>>,
  timeout: Option<Duration>,
) -> Result<Vec<Option<Outcome<S::Response>>>, PoolError>
where
  S: Session,
  I: IntoIterator<Item = Task<S>>,
{
  let mut config = DispatchConfig::default();
  if let Some(size) = size {
    config = config.with_size(size);
  }
  if let Some(timeout) = timeout {
    config = config.with_timeout(timeout);
  }
  Dispatcher::new(config).with_handler(exception_handler).map(tasks).await
}

/// Concurrently runs `tasks`, at most `size` at a time, and streams outcomes as
/// they complete. Must be called from within a Tokio runtime.
///
/// [`DEFAULT_STREAM_SIZE`] is the conventional `size`.
pub fn imap<S, I>(
  tasks: I,
  size: usize,
  exception_handler: Option<ExceptionHandler<S>>,
) -> Result<impl Stream<Item = Outcome<S::Response>>, PoolError>
where
  S: Session,
  I: IntoIterator<Item = Task<S>>,
{
  Dispatcher::new(DispatchConfig::default().with_size(size))
    .with_handler(exception_handler)
    .imap(tasks)
}

/// Like [`imap`], but tags every outcome with the task's input position and
/// never drops an element.
pub fn imap_enumerated<S>(
  tasks: Vec<Task<S>>,
  size: usize,
  exception_handler: Option<ExceptionHandler<S>>,
) -> Result<impl Stream<Item = (usize, Option<Outcome<S::Response>>)>, PoolError>
where
  S: Session,
{
  Dispatcher::new(DispatchConfig::default().with_size(size))
    .with_handler(exception_handler)
    .imap_enumerated(tasks)
}

struct Completions<S: Session, I> {
  pool: Arc<Pool<S>>,
  pending: I,
  in_flight: FuturesUnordered<TaskHandle<S>>,
  rejected: VecDeque<Arc<Task<S>>>,
  window: usize,
}

impl<S, I> Completions<S, I>
where
  S: Session,
  I: Iterator<Item = Task<S>>,
{
  fn refill(&mut self) {
    while self.in_flight.len() + self.rejected.len() < self.window {
      let Some(task) = self.pending.next() else {
        break;
      };
      let task = Arc::new(task);
      match self.pool.submit(task.clone()) {
        Ok(handle) => self.in_flight.push(handle),
        Err(pool_error) => {
          warn!(pool_name = %self.pool.name(), task_id = %task.id(), "Task could not be submitted: {}", pool_error);
          self.rejected.push_back(task);
        }
      }
    }
  }
}

/// Yields each task once its runner is done with it, in completion order.
fn completions<S, I>(pool: Arc<Pool<S>>, pending: I, window: usize) -> impl Stream<Item = Arc<Task<S>>>
where
  S: Session,
  I: Iterator<Item = Task<S>>,
{
  let span = info_span!("dispatch_stream", pool_name = %pool.name(), pool_size = ?pool.size());
  let state = Completions {
    pool,
    pending,
    in_flight: FuturesUnordered::new(),
    rejected: VecDeque::new(),
    window,
  };

  stream::unfold(state, move |mut state| {
    async move {
      state.refill();
      if let Some(task) = state.rejected.pop_front() {
        return Some((task, state));
      }
      let task = state.in_flight.next().await?;
      Some((task, state))
    }
    .instrument(span.clone())
  })
}
