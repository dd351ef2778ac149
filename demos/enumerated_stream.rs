use futures::future::BoxFuture;
use futures::StreamExt;
use request_orchestra::{get, imap_enumerated, Request, Session, SessionError, Task, DEFAULT_STREAM_SIZE};
use std::time::Duration;
use tracing::info;

/// Fails every request whose URL ends in an odd digit.
#[derive(Debug, Default)]
struct PickySession;

impl Session for PickySession {
  type Response = String;

  fn open() -> Result<Self, SessionError> {
    Ok(Self)
  }

  fn execute<'a>(&'a self, request: &'a Request) -> BoxFuture<'a, Result<String, SessionError>> {
    Box::pin(async move {
      tokio::time::sleep(Duration::from_millis(50)).await;
      let odd = request
        .url()
        .chars()
        .last()
        .and_then(|c| c.to_digit(10))
        .is_some_and(|d| d % 2 == 1);
      if odd {
        Err(SessionError::Protocol(format!("refusing {}", request.url())))
      } else {
        Ok(format!("body of {}", request.url()))
      }
    })
  }
}

#[tokio::main]
async fn main() {
  tracing_subscriber::fmt()
    .with_max_level(tracing::Level::INFO)
    .with_target(false)
    .init();

  info!("--- Enumerated Stream Example ---");

  let tasks: Vec<Task<PickySession>> = (0..6).map(|i| get(format!("http://example.invalid/page/{}", i))).collect();
  let total = tasks.len();

  let mut slots: Vec<Option<String>> = vec![None; total];
  let mut stream = Box::pin(imap_enumerated(tasks, DEFAULT_STREAM_SIZE, None).expect("No Tokio runtime"));
  while let Some((index, outcome)) = stream.next().await {
    info!("Task {} finished, got response: {}", index, outcome.is_some());
    slots[index] = outcome.and_then(|o| o.into_result().ok());
  }

  for (index, slot) in slots.iter().enumerate() {
    info!("Slot {}: {:?}", index, slot);
  }
  info!("--- Enumerated Stream Example End ---");
}
