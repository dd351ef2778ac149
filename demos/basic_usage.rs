use futures::future::BoxFuture;
use request_orchestra::{get, map, Request, Session, SessionError, Task};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Pretends to fetch a URL by sleeping for a bit.
#[derive(Debug, Default)]
struct SleepySession;

impl Session for SleepySession {
  type Response = String;

  fn open() -> Result<Self, SessionError> {
    Ok(Self)
  }

  fn execute<'a>(&'a self, request: &'a Request) -> BoxFuture<'a, Result<String, SessionError>> {
    Box::pin(async move {
      let delay_ms = request
        .options()
        .query_param("delay_ms")
        .and_then(|v| v.parse().ok())
        .unwrap_or(100);
      info!("Fetching {} ({}ms)", request.url(), delay_ms);
      tokio::time::sleep(Duration::from_millis(delay_ms)).await;
      Ok(format!("200 OK from {}", request.url()))
    })
  }
}

#[tokio::main]
async fn main() {
  tracing_subscriber::fmt()
    .with_max_level(tracing::Level::DEBUG)
    .with_target(false) // Disable module paths for cleaner example output
    .init();

  info!("--- Basic Usage Example ---");

  let session = Arc::new(SleepySession);
  let tasks: Vec<Task<SleepySession>> = (0..5)
    .map(|i| {
      // Later tasks finish first; the output order still matches the input.
      let delay_ms = 500 - i * 100;
      get(format!("http://example.invalid/item/{}", i))
        .param("delay_ms", delay_ms.to_string())
        .session(session.clone())
    })
    .collect();

  let outcomes = map(tasks, Some(2), None, None).await.expect("No Tokio runtime");

  for (i, outcome) in outcomes.iter().enumerate() {
    match outcome.as_ref().and_then(|o| o.as_response()) {
      Some(body) => info!("Result {}: {}", i, body),
      None => info!("Result {}: no response", i),
    }
  }
  info!("--- Basic Usage Example End ---");
}
