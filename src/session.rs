use crate::error::SessionError;

use std::fmt;
use std::time::Duration;

use futures::future::BoxFuture;

/// HTTP verb of a request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Method {
  Get,
  Options,
  Head,
  Post,
  Put,
  Patch,
  Delete,
  /// Any other verb, kept verbatim (upper-cased).
  Custom(String),
}

impl Method {
  pub fn as_str(&self) -> &str {
    match self {
      Method::Get => "GET",
      Method::Options => "OPTIONS",
      Method::Head => "HEAD",
      Method::Post => "POST",
      Method::Put => "PUT",
      Method::Patch => "PATCH",
      Method::Delete => "DELETE",
      Method::Custom(verb) => verb,
    }
  }
}

impl fmt::Display for Method {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl From<&str> for Method {
  fn from(verb: &str) -> Self {
    match verb.to_ascii_uppercase().as_str() {
      "GET" => Method::Get,
      "OPTIONS" => Method::Options,
      "HEAD" => Method::Head,
      "POST" => Method::Post,
      "PUT" => Method::Put,
      "PATCH" => Method::Patch,
      "DELETE" => Method::Delete,
      other => Method::Custom(other.to_string()),
    }
  }
}

/// Per-request options handed to the session untouched.
///
/// The dispatcher never interprets these; redirect handling, timeouts and body
/// consumption are entirely the session's business.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestOptions {
  pub headers: Vec<(String, String)>,
  pub query: Vec<(String, String)>,
  pub body: Option<Vec<u8>>,
  /// Per-request timeout. Surfaces as a task failure when the session enforces it.
  pub timeout: Option<Duration>,
  pub allow_redirects: Option<bool>,
  /// When set, the session should not consume the response body eagerly.
  pub stream: bool,
}

impl RequestOptions {
  /// Returns the first query parameter named `key`.
  pub fn query_param(&self, key: &str) -> Option<&str> {
    self
      .query
      .iter()
      .find(|(k, _)| k == key)
      .map(|(_, v)| v.as_str())
  }

  /// Returns the first header named `name` (case-insensitive).
  pub fn header(&self, name: &str) -> Option<&str> {
    self
      .headers
      .iter()
      .find(|(k, _)| k.eq_ignore_ascii_case(name))
      .map(|(_, v)| v.as_str())
  }
}

/// The work descriptor of a task: verb, target and options.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
  method: Method,
  url: String,
  options: RequestOptions,
}

impl Request {
  pub fn new(method: impl Into<Method>, url: impl Into<String>) -> Self {
    Self {
      method: method.into(),
      url: url.into(),
      options: RequestOptions::default(),
    }
  }

  pub fn method(&self) -> &Method {
    &self.method
  }

  pub fn url(&self) -> &str {
    &self.url
  }

  pub fn options(&self) -> &RequestOptions {
    &self.options
  }

  pub(crate) fn options_mut(&mut self) -> &mut RequestOptions {
    &mut self.options
  }
}

/// The HTTP client a task executes against.
///
/// A session is either shared by the caller across many tasks (it must then be
/// safe to use concurrently) or opened by a task for its own exclusive use and
/// released as soon as that task's request has finished.
pub trait Session: Send + Sync + 'static {
  type Response: Send + 'static;

  /// Opens a fresh session for a task that was not given one.
  fn open() -> Result<Self, SessionError>
  where
    Self: Sized;

  /// Executes a single request. Suspends only while waiting on I/O.
  fn execute<'a>(&'a self, request: &'a Request) -> BoxFuture<'a, Result<Self::Response, SessionError>>;

  /// Releases resources held by a task-owned session. Called exactly once per
  /// opened session, on every exit path.
  fn release(&self) {}
}
