use futures::future::BoxFuture;
use request_orchestra::{exception_handler, get, map, FailureKind, Outcome, Request, Session, SessionError, Task};
use std::time::Duration;
use tracing::info;

/// Panics on `/panic`, fails on `/down`, answers everything else.
#[derive(Debug, Default)]
struct FragileSession;

impl Session for FragileSession {
  type Response = String;

  fn open() -> Result<Self, SessionError> {
    Ok(Self)
  }

  fn execute<'a>(&'a self, request: &'a Request) -> BoxFuture<'a, Result<String, SessionError>> {
    Box::pin(async move {
      tokio::time::sleep(Duration::from_millis(100)).await;
      if request.url().ends_with("/panic") {
        panic!("This request is designed to panic!");
      }
      if request.url().ends_with("/down") {
        return Err(SessionError::Connection("connection refused".to_string()));
      }
      Ok(format!("fetched {}", request.url()))
    })
  }

  fn release(&self) {
    info!("Task-owned session released.");
  }
}

#[tokio::main]
async fn main() {
  tracing_subscriber::fmt()
    .with_max_level(tracing::Level::DEBUG)
    .with_target(false)
    .init();
  info!("--- Task Panic Example ---");

  let tasks: Vec<Task<FragileSession>> = vec![
    get("http://example.invalid/ok"),
    get("http://example.invalid/panic"),
    get("http://example.invalid/down"),
  ];

  // Hand every failure back to the caller instead of dropping it.
  let handler = exception_handler(|task: &Task<FragileSession>, failure| {
    info!("Handler saw task {} ({})", task.id(), task.url());
    failure.cloned().map(Outcome::Failure)
  });

  let outcomes = map(tasks, Some(1), Some(handler), None).await.expect("No Tokio runtime");

  for outcome in outcomes.into_iter().flatten() {
    match outcome {
      Outcome::Response(body) => info!("Response: {}", body),
      Outcome::Failure(failure) if failure.kind() == FailureKind::Panicked => {
        info!("Request panicked and was captured: {}", failure.message());
      }
      Outcome::Failure(failure) => info!("Request failed: {}", failure),
    }
  }
  info!("--- Task Panic Example End ---");
}
