use std::time::Duration;

use tokio::runtime::Handle as TokioHandle;

/// Concurrency used by the streaming protocols when the caller does not pick one.
pub const DEFAULT_STREAM_SIZE: usize = 2;

const DEFAULT_POOL_NAME: &str = "request_orchestra";

/// Settings for a [`Pool`](crate::Pool).
#[derive(Debug, Clone)]
pub struct PoolConfig {
  /// Maximum number of concurrently running tasks; `None` admits every task immediately.
  pub size: Option<usize>,
  pub pool_name: String,
  /// Log captured failures at `warn` instead of `debug`.
  pub log_failures: bool,
}

impl Default for PoolConfig {
  fn default() -> Self {
    Self {
      size: None,
      pool_name: DEFAULT_POOL_NAME.to_string(),
      log_failures: true,
    }
  }
}

impl PoolConfig {
  pub fn bounded(size: usize) -> Self {
    Self::default().with_size(Some(size))
  }

  pub fn unbounded() -> Self {
    Self::default()
  }

  /// Sets the concurrency bound. `Some(0)` is treated as `Some(1)`.
  pub fn with_size(mut self, size: Option<usize>) -> Self {
    self.size = size.map(|s| s.max(1));
    self
  }

  pub fn with_pool_name(mut self, pool_name: impl Into<String>) -> Self {
    self.pool_name = pool_name.into();
    self
  }

  pub fn with_failure_logging(mut self, log_failures: bool) -> Self {
    self.log_failures = log_failures;
    self
  }
}

/// Settings shared by `map`, `imap` and `imap_enumerated` on a [`Dispatcher`](crate::Dispatcher).
#[derive(Debug, Clone, Default)]
pub struct DispatchConfig {
  /// Concurrency bound. `None` means unbounded for `map` and
  /// [`DEFAULT_STREAM_SIZE`] for the streaming protocols.
  pub size: Option<usize>,
  /// Total wait bound for `map`. Ignored by the streaming protocols.
  pub timeout: Option<Duration>,
  pub pool_name: Option<String>,
  /// Runtime to spawn runners on; defaults to the current one.
  pub tokio_handle: Option<TokioHandle>,
}

impl DispatchConfig {
  pub fn with_size(mut self, size: usize) -> Self {
    self.size = Some(size.max(1));
    self
  }

  pub fn unbounded(mut self) -> Self {
    self.size = None;
    self
  }

  pub fn with_timeout(mut self, timeout: Duration) -> Self {
    self.timeout = Some(timeout);
    self
  }

  pub fn with_pool_name(mut self, pool_name: impl Into<String>) -> Self {
    self.pool_name = Some(pool_name.into());
    self
  }

  pub fn with_tokio_handle(mut self, tokio_handle: TokioHandle) -> Self {
    self.tokio_handle = Some(tokio_handle);
    self
  }

  pub(crate) fn pool_config(&self, log_failures: bool) -> PoolConfig {
    PoolConfig::default()
      .with_size(self.size)
      .with_pool_name(self.pool_name.as_deref().unwrap_or(DEFAULT_POOL_NAME))
      .with_failure_logging(log_failures)
  }
}
