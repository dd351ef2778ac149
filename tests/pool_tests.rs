mod common;

use common::{delayed, failing, setup_tracing_for_test, was_released, MockSession};
use request_orchestra::{get, FailureKind, Pool, PoolConfig, PoolError, ShutdownMode, Task, TaskState};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::runtime::Handle;
use tokio::time::sleep;

fn bounded_pool(size: usize, pool_name: &str) -> Arc<Pool<MockSession>> {
  Pool::new(PoolConfig::bounded(size).with_pool_name(pool_name), Handle::current())
}

#[tokio::test]
async fn test_submit_and_await_basic_task() {
  setup_tracing_for_test();
  let pool = bounded_pool(2, "test_pool_basic_submit");
  let session = MockSession::shared();

  let task = Arc::new(delayed(&session, "mock://basic/1", 20));
  assert_eq!(task.state(), TaskState::Created);

  let handle = pool.submit(task.clone()).unwrap();
  assert_eq!(handle.id(), task.id());

  let finished = handle.await_result().await.unwrap();
  assert!(Arc::ptr_eq(&finished, &task));
  assert_eq!(task.state(), TaskState::Succeeded);
  assert!(task.has_result());
  assert!(task.failure().is_none());

  pool.shutdown(ShutdownMode::Graceful).await.unwrap();
}

#[tokio::test]
async fn test_failure_is_captured_on_the_task() {
  setup_tracing_for_test();
  let pool = bounded_pool(1, "test_pool_failure_capture");
  let session = MockSession::shared();

  let task = Arc::new(failing(&session, "mock://failure/1"));
  let handle = pool.submit(task.clone()).unwrap();
  assert!(handle.await_result().await.is_ok());

  assert_eq!(task.state(), TaskState::Failed);
  assert!(!task.has_result());
  let failure = task.failure().expect("failure should be recorded");
  assert_eq!(failure.kind(), FailureKind::Request);
  assert!(failure.message().contains("connection refused"));
  assert!(failure.trace().contains("connection refused"));

  pool.shutdown(ShutdownMode::Graceful).await.unwrap();
}

#[tokio::test]
async fn test_queued_tasks_are_admitted_in_submission_order() {
  setup_tracing_for_test();
  let pool = bounded_pool(1, "test_pool_fifo");
  let session = MockSession::shared();

  let urls: Vec<String> = (0..6).map(|i| format!("mock://fifo/{}", i)).collect();
  let mut handles = Vec::new();
  for url in &urls {
    handles.push(pool.submit(Arc::new(delayed(&session, url, 10))).unwrap());
  }
  pool.join(handles, None).await.unwrap();

  assert_eq!(session.started(), urls);
  assert_eq!(session.peak(), 1);

  pool.shutdown(ShutdownMode::Graceful).await.unwrap();
}

#[tokio::test]
async fn test_bounded_pool_queues_excess_tasks() {
  setup_tracing_for_test();
  let pool = bounded_pool(2, "test_pool_bounded_queue");
  let session = MockSession::shared();

  let mut handles = Vec::new();
  for i in 0..5 {
    let url = format!("mock://bounded/{}", i);
    handles.push(pool.submit(Arc::new(delayed(&session, &url, 300))).unwrap());
  }

  sleep(Duration::from_millis(50)).await;
  assert_eq!(pool.size(), Some(2));
  assert_eq!(pool.active_task_count(), 2);
  assert_eq!(pool.queued_task_count(), 3);

  pool.join(handles, None).await.unwrap();
  assert_eq!(session.peak(), 2);
  assert_eq!(session.calls(), 5);

  pool.shutdown(ShutdownMode::Graceful).await.unwrap();
}

#[tokio::test]
async fn test_unbounded_pool_admits_every_task_immediately() {
  setup_tracing_for_test();
  let pool: Arc<Pool<MockSession>> = Pool::new(
    PoolConfig::unbounded().with_pool_name("test_pool_unbounded"),
    Handle::current(),
  );
  let session = MockSession::shared();

  let mut handles = Vec::new();
  for i in 0..6 {
    let url = format!("mock://unbounded/{}", i);
    handles.push(pool.submit(Arc::new(delayed(&session, &url, 200))).unwrap());
  }

  sleep(Duration::from_millis(50)).await;
  assert_eq!(pool.size(), None);
  assert_eq!(pool.active_task_count(), 6);
  assert_eq!(pool.queued_task_count(), 0);

  pool.join(handles, None).await.unwrap();
  assert_eq!(session.peak(), 6);

  pool.shutdown(ShutdownMode::Graceful).await.unwrap();
}

#[tokio::test]
async fn test_task_cannot_be_submitted_twice() {
  setup_tracing_for_test();
  let pool = bounded_pool(1, "test_pool_resubmit");
  let session = MockSession::shared();

  let task = Arc::new(delayed(&session, "mock://resubmit/1", 10));
  let handle = pool.submit(task.clone()).unwrap();
  assert_eq!(pool.submit(task.clone()).unwrap_err(), PoolError::TaskAlreadySubmitted(task.id()));

  handle.await_result().await.unwrap();
  assert_eq!(session.calls(), 1);

  pool.shutdown(ShutdownMode::Graceful).await.unwrap();
}

#[tokio::test]
async fn test_cancel_running_task_releases_owned_session() {
  setup_tracing_for_test();
  let pool = bounded_pool(1, "test_pool_cancel_running");

  let url = "mock://cancel/running";
  let task: Arc<Task<MockSession>> = Arc::new(get(url).param("delay_ms", "5000"));
  let handle = pool.submit(task.clone()).unwrap();

  sleep(Duration::from_millis(50)).await;
  assert_eq!(task.state(), TaskState::Running);
  handle.cancel();
  assert!(handle.is_cancellation_requested());

  assert_eq!(handle.await_result().await.unwrap_err(), PoolError::TaskCancelled);
  assert_eq!(task.state(), TaskState::Abandoned);
  assert!(task.failure().is_none());
  assert!(was_released(url), "owned session should be released on cancellation");

  pool.shutdown(ShutdownMode::Graceful).await.unwrap();
}

#[tokio::test]
async fn test_cancelled_queued_task_never_runs() {
  setup_tracing_for_test();
  let pool = bounded_pool(1, "test_pool_cancel_queued");
  let session = MockSession::shared();

  let first = pool.submit(Arc::new(delayed(&session, "mock://queued/first", 100))).unwrap();
  let second_task = Arc::new(delayed(&session, "mock://queued/second", 10));
  let second = pool.submit(second_task.clone()).unwrap();

  second.cancel();
  assert!(first.await_result().await.is_ok());
  assert_eq!(second.await_result().await.unwrap_err(), PoolError::TaskCancelled);
  assert_eq!(second_task.state(), TaskState::Abandoned);
  assert_eq!(session.started(), vec!["mock://queued/first".to_string()]);

  pool.shutdown(ShutdownMode::Graceful).await.unwrap();
}

#[tokio::test]
async fn test_join_timeout_abandons_unfinished_tasks() {
  setup_tracing_for_test();
  let pool: Arc<Pool<MockSession>> = Pool::new(
    PoolConfig::unbounded().with_pool_name("test_pool_join_timeout"),
    Handle::current(),
  );
  let session = MockSession::shared();

  let slow = Arc::new(delayed(&session, "mock://join/slow", 5000));
  let fast = Arc::new(delayed(&session, "mock://join/fast", 10));
  let handles = vec![pool.submit(slow.clone()).unwrap(), pool.submit(fast.clone()).unwrap()];

  let started = Instant::now();
  let joined = pool.join(handles, Some(Duration::from_millis(200))).await;
  assert!(started.elapsed() < Duration::from_secs(2));
  assert_eq!(joined, Err(PoolError::JoinTimedOut { pending: 1 }));

  assert_eq!(fast.state(), TaskState::Succeeded);
  assert_eq!(slow.state(), TaskState::Abandoned);
  assert!(!slow.has_result());
  assert!(slow.failure().is_none());

  pool.shutdown(ShutdownMode::Graceful).await.unwrap();
}

#[tokio::test]
async fn test_shutdown_graceful_allows_running_tasks_to_complete() {
  setup_tracing_for_test();
  let pool = bounded_pool(2, "test_pool_shutdown_graceful");
  let session = MockSession::shared();

  let task1 = Arc::new(delayed(&session, "mock://graceful/1", 300));
  let task2 = Arc::new(delayed(&session, "mock://graceful/2", 350));
  let task3 = Arc::new(delayed(&session, "mock://graceful/3", 50));
  let handle1 = pool.submit(task1.clone()).unwrap();
  let handle2 = pool.submit(task2.clone()).unwrap();
  let handle3 = pool.submit(task3.clone()).unwrap();

  sleep(Duration::from_millis(50)).await;
  assert_eq!(pool.active_task_count(), 2);
  assert_eq!(pool.queued_task_count(), 1);

  pool.clone().shutdown(ShutdownMode::Graceful).await.unwrap();

  assert!(handle1.await_result().await.is_ok());
  assert!(handle2.await_result().await.is_ok());
  assert_eq!(task1.state(), TaskState::Succeeded);
  assert_eq!(task2.state(), TaskState::Succeeded);

  match handle3.await_result().await {
    Err(PoolError::ResultChannelError(_)) => { /* Expected: dropped from the queue */ }
    other => panic!("Expected ResultChannelError for queued task, got {:?}", other.map(|t| t.id())),
  }
  assert_eq!(task3.state(), TaskState::Abandoned);
  assert!(!session.started().contains(&"mock://graceful/3".to_string()));

  assert_eq!(
    pool.submit(Arc::new(delayed(&session, "mock://graceful/late", 1))).unwrap_err(),
    PoolError::PoolShuttingDown
  );
}

#[tokio::test]
async fn test_shutdown_forceful_cancels_running_tasks() {
  setup_tracing_for_test();
  let pool = bounded_pool(2, "test_pool_shutdown_forceful");
  let session = MockSession::shared();

  let task1 = Arc::new(delayed(&session, "mock://forceful/1", 5000));
  let handle1 = pool.submit(task1.clone()).unwrap();
  let handle2 = pool.submit(Arc::new(delayed(&session, "mock://forceful/2", 5000))).unwrap();
  let _handle3 = pool.submit(Arc::new(delayed(&session, "mock://forceful/3", 50))).unwrap();

  sleep(Duration::from_millis(50)).await;
  let started = Instant::now();
  pool.shutdown(ShutdownMode::ForcefulCancel).await.unwrap();
  assert!(started.elapsed() < Duration::from_secs(2));

  assert_eq!(handle1.await_result().await.unwrap_err(), PoolError::TaskCancelled);
  assert_eq!(handle2.await_result().await.unwrap_err(), PoolError::TaskCancelled);
  assert_eq!(task1.state(), TaskState::Abandoned);
  assert!(!session.started().contains(&"mock://forceful/3".to_string()));
}
