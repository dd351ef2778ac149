#![allow(dead_code)]

use request_orchestra::{get, Request, Session, SessionError, Task};

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::time::sleep;

/// URLs whose task-owned session has been released, across all tests.
static RELEASED_URLS: Mutex<Vec<String>> = Mutex::new(Vec::new());
static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone, PartialEq)]
pub struct MockResponse {
  pub url: String,
  pub body: String,
  pub session_id: u64,
}

/// A scripted session. Behaviour is driven by query parameters:
/// `delay_ms` (sleep before answering), `fail=connection|panic`, `value` (body).
/// A per-request timeout shorter than the delay yields a timeout error.
#[derive(Debug)]
pub struct MockSession {
  id: u64,
  active: AtomicUsize,
  peak: AtomicUsize,
  calls: AtomicUsize,
  started: Mutex<Vec<String>>,
  last_url: Mutex<Option<String>>,
}

impl Default for MockSession {
  fn default() -> Self {
    Self {
      id: NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed),
      active: AtomicUsize::new(0),
      peak: AtomicUsize::new(0),
      calls: AtomicUsize::new(0),
      started: Mutex::new(Vec::new()),
      last_url: Mutex::new(None),
    }
  }
}

impl MockSession {
  pub fn shared() -> Arc<Self> {
    Arc::new(Self::default())
  }

  pub fn id(&self) -> u64 {
    self.id
  }

  /// Highest number of requests observed in flight at once.
  pub fn peak(&self) -> usize {
    self.peak.load(Ordering::SeqCst)
  }

  pub fn calls(&self) -> usize {
    self.calls.load(Ordering::SeqCst)
  }

  /// URLs in the order their requests started.
  pub fn started(&self) -> Vec<String> {
    self.started.lock().unwrap().clone()
  }
}

struct ActiveGuard<'a> {
  active: &'a AtomicUsize,
}

impl<'a> ActiveGuard<'a> {
  fn enter(active: &'a AtomicUsize, peak: &AtomicUsize) -> Self {
    let now = active.fetch_add(1, Ordering::SeqCst) + 1;
    peak.fetch_max(now, Ordering::SeqCst);
    Self { active }
  }
}

impl Drop for ActiveGuard<'_> {
  fn drop(&mut self) {
    self.active.fetch_sub(1, Ordering::SeqCst);
  }
}

impl Session for MockSession {
  type Response = MockResponse;

  fn open() -> Result<Self, SessionError> {
    Ok(Self::default())
  }

  fn execute<'a>(&'a self, request: &'a Request) -> BoxFuture<'a, Result<MockResponse, SessionError>> {
    Box::pin(async move {
      let url = request.url().to_string();
      self.calls.fetch_add(1, Ordering::SeqCst);
      self.started.lock().unwrap().push(url.clone());
      *self.last_url.lock().unwrap() = Some(url.clone());
      let _active = ActiveGuard::enter(&self.active, &self.peak);

      let options = request.options();
      let delay = options
        .query_param("delay_ms")
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or_default();

      if let Some(timeout) = options.timeout {
        if timeout < delay {
          sleep(timeout).await;
          return Err(SessionError::Timeout(format!("{} exceeded {:?}", url, timeout)));
        }
      }
      sleep(delay).await;

      match options.query_param("fail") {
        Some("connection") => return Err(SessionError::Connection(format!("connection refused: {}", url))),
        Some("panic") => panic!("mock session panicked for {}", url),
        _ => {}
      }

      Ok(MockResponse {
        body: options.query_param("value").unwrap_or(&url).to_string(),
        url,
        session_id: self.id,
      })
    })
  }

  fn release(&self) {
    let url = self
      .last_url
      .lock()
      .unwrap()
      .clone()
      .unwrap_or_else(|| "<unused>".to_string());
    RELEASED_URLS.lock().unwrap().push(url);
  }
}

pub fn was_released(url: &str) -> bool {
  RELEASED_URLS.lock().unwrap().iter().any(|u| u == url)
}

/// A session type whose `open` always fails.
#[derive(Debug)]
pub struct RefusingSession;

impl Session for RefusingSession {
  type Response = MockResponse;

  fn open() -> Result<Self, SessionError> {
    Err(SessionError::Connection("no route to host".to_string()))
  }

  fn execute<'a>(&'a self, _request: &'a Request) -> BoxFuture<'a, Result<MockResponse, SessionError>> {
    Box::pin(async { Err(SessionError::Protocol("unreachable".to_string())) })
  }
}

/// A GET on a shared session that answers after `delay_ms`.
pub fn delayed(session: &Arc<MockSession>, url: &str, delay_ms: u64) -> Task<MockSession> {
  get(url).param("delay_ms", delay_ms.to_string()).session(session.clone())
}

/// A GET on a shared session that fails with a connection error.
pub fn failing(session: &Arc<MockSession>, url: &str) -> Task<MockSession> {
  get(url).param("fail", "connection").session(session.clone())
}

pub fn response_of<R>(outcome: &Option<request_orchestra::Outcome<R>>) -> Option<&R> {
  outcome.as_ref().and_then(|o| o.as_response())
}

// Helper to initialize tracing for tests (call once per test run, not per test function)
pub fn setup_tracing_for_test() {
  use std::sync::Once;
  use tracing_subscriber::{fmt, EnvFilter};
  static TRACING_INIT: Once = Once::new();

  TRACING_INIT.call_once(|| {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,request_orchestra=trace"));

    fmt::Subscriber::builder()
      .with_env_filter(filter)
      .with_test_writer()
      .try_init()
      .ok();
  });
}
