use futures::StreamExt;
use request_orchestra::{get, head, imap, map, ReqwestSession, Task};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[tokio::main]
async fn main() {
  tracing_subscriber::fmt()
    .with_max_level(tracing::Level::INFO)
    .with_target(false)
    .init();

  info!("--- reqwest Fetch Example ---");

  let urls = ["https://www.rust-lang.org", "https://crates.io", "https://docs.rs"];
  let session = Arc::new(ReqwestSession::default());

  let tasks: Vec<Task<ReqwestSession>> = urls
    .iter()
    .map(|url| get(*url).timeout(Duration::from_secs(10)).session(session.clone()))
    .collect();
  let outcomes = map(tasks, Some(2), None, Some(Duration::from_secs(30)))
    .await
    .expect("No Tokio runtime");
  for (url, outcome) in urls.iter().zip(outcomes) {
    match outcome.and_then(|o| o.into_result().ok()) {
      Some(response) => info!("GET {} -> {}", url, response.status()),
      None => warn!("GET {} -> no response", url),
    }
  }

  // Each HEAD opens and releases its own client.
  let heads = urls.iter().map(|url| -> Task<ReqwestSession> { head(*url) });
  let mut stream = Box::pin(imap(heads, 2, None).expect("No Tokio runtime"));
  while let Some(outcome) = stream.next().await {
    if let Some(response) = outcome.as_response() {
      info!("HEAD {} -> {}", response.url(), response.status());
    }
  }
  info!("--- reqwest Fetch Example End ---");
}
