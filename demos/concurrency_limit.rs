use futures::future::BoxFuture;
use futures::StreamExt;
use request_orchestra::{get, imap, Request, Session, SessionError, Task};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::info;

/// Sleeps one second per request and tracks how many run at once.
#[derive(Debug, Default)]
struct CountingSession {
  active: AtomicUsize,
  peak: AtomicUsize,
}

impl Session for CountingSession {
  type Response = String;

  fn open() -> Result<Self, SessionError> {
    Ok(Self::default())
  }

  fn execute<'a>(&'a self, request: &'a Request) -> BoxFuture<'a, Result<String, SessionError>> {
    Box::pin(async move {
      let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
      self.peak.fetch_max(now, Ordering::SeqCst);
      info!("{} started ({} in flight)", request.url(), now);
      tokio::time::sleep(Duration::from_secs(1)).await;
      self.active.fetch_sub(1, Ordering::SeqCst);
      Ok(format!("{} finished", request.url()))
    })
  }
}

#[tokio::main]
async fn main() {
  tracing_subscriber::fmt()
    .with_max_level(tracing::Level::DEBUG)
    .with_target(false)
    .init();

  let concurrency_limit = 2;
  let num_tasks = 5;
  info!("--- Concurrency Limit Example (Limit: {}) ---", concurrency_limit);
  info!(
    "Streaming {} requests, each takes 1 sec. With concurrency {}, this should take ~{} secs.",
    num_tasks,
    concurrency_limit,
    (num_tasks as f32 / concurrency_limit as f32).ceil()
  );

  let session = Arc::new(CountingSession::default());
  let tasks = (0..num_tasks).map(|i| -> Task<CountingSession> {
    get(format!("http://example.invalid/slow/{}", i)).session(session.clone())
  });

  let start = Instant::now();
  let mut outcomes = Box::pin(imap(tasks, concurrency_limit, None).expect("No Tokio runtime"));
  while let Some(outcome) = outcomes.next().await {
    if let Some(body) = outcome.as_response() {
      info!("[{:?}] {}", start.elapsed(), body);
    }
  }

  info!(
    "All {} requests done in {:?}; peak concurrency was {}.",
    num_tasks,
    start.elapsed(),
    session.peak.load(Ordering::SeqCst)
  );
  info!("--- Concurrency Limit Example End ---");
}
