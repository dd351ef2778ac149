use crate::config::PoolConfig;
use crate::error::PoolError;
use crate::handle::TaskHandle;
use crate::runner;
use crate::session::Session;
use crate::task::Task;

use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use futures::future::join_all;
use futures::FutureExt;
use parking_lot::Mutex;
use tokio::runtime::Handle as TokioHandle;
use tokio::sync::{mpsc, oneshot, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, info_span, trace, warn, Instrument};

/// Defines how the pool should behave upon shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownMode {
  /// Waits for currently running tasks to complete.
  /// Queued tasks that haven't started will not be processed.
  Graceful,
  /// Attempts to cancel all running tasks.
  /// Queued tasks that haven't started will not be processed.
  ForcefulCancel,
}

/// A task waiting in the admission queue.
struct QueuedTask<S: Session> {
  task: Arc<Task<S>>,
  token: CancellationToken,
  result_sender: oneshot::Sender<Result<(), PoolError>>,
}

/// Bounded-concurrency admission for tasks.
///
/// A single worker loop admits queued tasks in submission order, taking one
/// semaphore permit per task when the pool is bounded. Each admitted task is
/// spawned as its own runner on the pool's Tokio handle and gives its permit
/// back when it finishes.
pub struct Pool<S: Session> {
  pool_name: Arc<String>,
  size: Option<usize>,
  task_queue_tx: mpsc::UnboundedSender<QueuedTask<S>>,
  queued_tasks: Arc<AtomicUsize>,
  active_task_info: Arc<DashMap<u64, CancellationToken>>,
  shutdown_token: CancellationToken,
  runner_tracker: TaskTracker,
  worker_join_handle_internal: Mutex<Option<JoinHandle<()>>>,
}

impl<S: Session> Pool<S> {
  pub fn new(config: PoolConfig, tokio_handle: TokioHandle) -> Arc<Self> {
    let (tx, rx) = mpsc::unbounded_channel();
    let shutdown_token = CancellationToken::new();
    let pool_name = Arc::new(config.pool_name);
    let semaphore = config.size.map(|size| Arc::new(Semaphore::new(size.max(1))));
    let queued_tasks = Arc::new(AtomicUsize::new(0));
    let active_task_info = Arc::new(DashMap::new());
    let runner_tracker = TaskTracker::new();

    let worker_loop_join_handle = tokio_handle.spawn(
      Self::run_worker_loop(
        pool_name.clone(),
        semaphore,
        rx,
        tokio_handle.clone(),
        queued_tasks.clone(),
        active_task_info.clone(),
        runner_tracker.clone(),
        shutdown_token.clone(),
        config.log_failures,
      )
      .instrument(info_span!("request_pool_worker_loop", pool_name = %*pool_name)),
    );

    Arc::new(Self {
      pool_name,
      size: config.size.map(|size| size.max(1)),
      task_queue_tx: tx,
      queued_tasks,
      active_task_info,
      shutdown_token,
      runner_tracker,
      worker_join_handle_internal: Mutex::new(Some(worker_loop_join_handle)),
    })
  }

  /// Builds a pool on the current Tokio runtime.
  pub fn try_current(config: PoolConfig) -> Result<Arc<Self>, PoolError> {
    let tokio_handle = TokioHandle::try_current().map_err(|_| PoolError::RuntimeUnavailable)?;
    Ok(Self::new(config, tokio_handle))
  }

  pub fn name(&self) -> &str {
    &self.pool_name
  }

  /// The concurrency bound, `None` when unbounded.
  pub fn size(&self) -> Option<usize> {
    self.size
  }

  pub fn active_task_count(&self) -> usize {
    self.active_task_info.len()
  }

  /// Returns the current number of tasks waiting for admission.
  pub fn queued_task_count(&self) -> usize {
    self.queued_tasks.load(AtomicOrdering::Acquire)
  }

  /// Queues `task` for execution. It starts as soon as a slot is free; queued
  /// tasks are admitted in submission order.
  pub fn submit(&self, task: Arc<Task<S>>) -> Result<TaskHandle<S>, PoolError> {
    if self.shutdown_token.is_cancelled() || self.task_queue_tx.is_closed() {
      warn!(pool_name = %self.pool_name, "Submit: Attempted to submit task to a pool that is shutting down or closed.");
      return Err(PoolError::PoolShuttingDown);
    }

    task.mark_submitted()?;

    let token = CancellationToken::new();
    let (result_tx, result_rx) = oneshot::channel::<Result<(), PoolError>>();
    let task_id = task.id();

    debug!(pool_name = %self.pool_name, %task_id, url = %task.url(), "Submitting task to queue.");

    self.queued_tasks.fetch_add(1, AtomicOrdering::AcqRel);
    let queued = QueuedTask {
      task: task.clone(),
      token: token.clone(),
      result_sender: result_tx,
    };

    match self.task_queue_tx.send(queued) {
      Ok(()) => Ok(TaskHandle {
        task,
        cancellation_token: token,
        result_receiver: result_rx,
      }),
      Err(_send_error) => {
        self.queued_tasks.fetch_sub(1, AtomicOrdering::AcqRel);
        task.mark_abandoned();
        error!(pool_name = %self.pool_name, %task_id, "Submit: Failed to send task to queue, worker loop has stopped.");
        if self.shutdown_token.is_cancelled() {
          Err(PoolError::PoolShuttingDown)
        } else {
          Err(PoolError::QueueSendChannelClosed)
        }
      }
    }
  }

  /// Waits until every handle's task has finished, or until `timeout` elapses.
  ///
  /// On timeout the unfinished tasks are cancelled best-effort and
  /// `PoolError::JoinTimedOut` reports how many were still pending. Their
  /// outcome fields stay unset.
  pub async fn join(&self, handles: Vec<TaskHandle<S>>, timeout: Option<Duration>) -> Result<(), PoolError> {
    let watched: Vec<(Arc<Task<S>>, CancellationToken)> = handles
      .iter()
      .map(|handle| (handle.task.clone(), handle.cancellation_token.clone()))
      .collect();
    let all_finished = join_all(handles).map(|_| ());

    let Some(timeout) = timeout else {
      all_finished.await;
      return Ok(());
    };

    match tokio::time::timeout(timeout, all_finished).await {
      Ok(()) => Ok(()),
      Err(_elapsed) => {
        let mut pending = 0;
        for (task, token) in watched {
          if !task.state().is_terminal() {
            debug!(pool_name = %self.pool_name, task_id = %task.id(), "Join timed out, cancelling unfinished task.");
            token.cancel();
            task.mark_abandoned();
            pending += 1;
          }
        }
        warn!(pool_name = %self.pool_name, %pending, ?timeout, "Join timed out before all tasks finished.");
        Err(PoolError::JoinTimedOut { pending })
      }
    }
  }

  pub async fn shutdown(self: Arc<Self>, mode: ShutdownMode) -> Result<(), PoolError> {
    let already_initiating_shutdown = self.shutdown_token.is_cancelled();

    if !already_initiating_shutdown {
      info!(pool_name = %self.pool_name, "Initiating explicit pool shutdown (mode: {:?}).", mode);
      self.shutdown_token.cancel();

      if mode == ShutdownMode::ForcefulCancel {
        info!(pool_name = %self.pool_name, "Forceful shutdown: Cancelling all running tasks.");
        for entry in self.active_task_info.iter() {
          debug!(pool_name = %self.pool_name, task_id = %entry.key(), "Forcefully cancelling running task during shutdown.");
          entry.value().cancel();
        }
      } else {
        info!(pool_name = %self.pool_name, "Graceful shutdown: Allowing running tasks to complete.");
      }
    } else {
      info!(pool_name = %self.pool_name, "Shutdown already in progress or initiated by another call/Drop.");
    }

    let handle_to_await = self.worker_join_handle_internal.lock().take();

    if let Some(handle) = handle_to_await {
      info!(pool_name = %self.pool_name, "Waiting for worker loop to join.");
      if let Err(join_error) = handle.await {
        error!(pool_name = %self.pool_name, "Error joining worker loop during shutdown: {:?}.", join_error);
      }
    } else {
      trace!(pool_name = %self.pool_name, "Worker join handle already taken.");
    }

    // Runners are spawned independently of the worker loop.
    self.runner_tracker.close();
    self.runner_tracker.wait().await;

    if !already_initiating_shutdown {
      info!(pool_name = %self.pool_name, "Pool shutdown process completed by this call.");
    }
    Ok(())
  }

  #[allow(clippy::too_many_arguments)]
  async fn run_worker_loop(
    pool_name: Arc<String>,
    semaphore: Option<Arc<Semaphore>>,
    mut task_queue_rx: mpsc::UnboundedReceiver<QueuedTask<S>>,
    tasks_tokio_handle: TokioHandle,
    queued_tasks: Arc<AtomicUsize>,
    active_task_info_map: Arc<DashMap<u64, CancellationToken>>,
    runner_tracker: TaskTracker,
    shutdown_token: CancellationToken,
    log_failures: bool,
  ) {
    info!(name = %*pool_name, bounded = semaphore.is_some(), "Worker loop started.");

    loop {
      let permit: Option<OwnedSemaphorePermit> = match &semaphore {
        Some(semaphore) => tokio::select! {
          biased;
          _ = shutdown_token.cancelled() => {
            info!(name = %*pool_name, "Shutdown signal received. Worker loop terminating.");
            break;
          }
          acquired = semaphore.clone().acquire_owned() => match acquired {
            Ok(permit) => {
              trace!(name = %*pool_name, "Acquired semaphore permit. Available: {}", semaphore.available_permits());
              Some(permit)
            }
            Err(_) => {
              error!(name = %*pool_name, "Semaphore closed. Worker loop exiting.");
              break;
            }
          }
        },
        None => None,
      };

      let queued = tokio::select! {
        biased;
        _ = shutdown_token.cancelled() => {
          info!(name = %*pool_name, "Shutdown signal received while waiting for a task. Worker loop terminating.");
          None
        }
        received = task_queue_rx.recv() => {
          if received.is_none() {
            info!(name = %*pool_name, "Task queue closed and empty.");
          }
          received
        }
      };

      let Some(queued) = queued else {
        drop(permit);
        break;
      };
      queued_tasks.fetch_sub(1, AtomicOrdering::AcqRel);

      let QueuedTask {
        task,
        token,
        result_sender,
      } = queued;
      let task_id = task.id();

      if token.is_cancelled() {
        debug!(name = %*pool_name, %task_id, "Dequeued task already cancelled.");
        task.mark_abandoned();
        let _ = result_sender.send(Err(PoolError::TaskCancelled));
        continue;
      }

      active_task_info_map.insert(task_id, token.clone());
      debug!(name = %*pool_name, %task_id, "Dequeued task. Spawning runner.");

      let active_task_info_map_cleanup = active_task_info_map.clone();
      let pool_name_for_task_execution = pool_name.clone();

      tasks_tokio_handle.spawn(runner_tracker.track_future(
        async move {
          let _permit_guard = permit;

          let execution_outcome: Result<(), PoolError> = tokio::select! {
            biased;
            _ = token.cancelled() => {
              debug!(pool_name = %*pool_name_for_task_execution, %task_id, "Runner cancelled by its token.");
              task.mark_abandoned();
              Err(PoolError::TaskCancelled)
            }
            _ = runner::run(&task, log_failures) => Ok(()),
          };

          active_task_info_map_cleanup.remove(&task_id);
          if result_sender.send(execution_outcome).is_err() {
            trace!(pool_name = %*pool_name_for_task_execution, %task_id, "Handle for task was dropped before completion.");
          }
        }
        .instrument(info_span!("runner", pool_name = %*pool_name, %task_id)),
      ));
    }

    info!(
      name = %*pool_name,
      "Worker loop stopped. Running tasks remaining: {}",
      active_task_info_map.len()
    );
  }
}

impl<S: Session> Drop for Pool<S> {
  fn drop(&mut self) {
    if !self.shutdown_token.is_cancelled() {
      debug!(
        pool_name = %*self.pool_name,
        "Pool dropped. Signalling worker loop to stop; running tasks are left to finish."
      );
      self.shutdown_token.cancel();
    }
  }
}
