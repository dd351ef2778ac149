use crate::error::SessionError;

use std::any::Any;
use std::backtrace::Backtrace;
use std::fmt;
use std::sync::Arc;

/// Where in a task's run the failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
  /// The task-owned session could not be opened; no request was sent.
  SessionSetup,
  /// The session executed (or attempted) the request and reported an error.
  Request,
  /// The session or the response callback panicked.
  Panicked,
}

impl fmt::Display for FailureKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      FailureKind::SessionSetup => "session setup failed",
      FailureKind::Request => "request failed",
      FailureKind::Panicked => "request panicked",
    };
    f.write_str(name)
  }
}

/// A failure captured on a task by its runner.
///
/// Cheap to clone, so an exception handler can hand it back as a substitute
/// outcome.
#[derive(Clone)]
pub struct Failure {
  kind: FailureKind,
  message: Arc<str>,
  source: Option<Arc<SessionError>>,
  trace: Arc<str>,
}

impl Failure {
  pub(crate) fn session_setup(error: SessionError) -> Self {
    Self::from_session_error(FailureKind::SessionSetup, error)
  }

  pub(crate) fn request(error: SessionError) -> Self {
    Self::from_session_error(FailureKind::Request, error)
  }

  pub(crate) fn panicked(payload: &(dyn Any + Send)) -> Self {
    let message = if let Some(s) = payload.downcast_ref::<&str>() {
      (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
      s.clone()
    } else {
      "non-string panic payload".to_string()
    };
    Self::capture(FailureKind::Panicked, message, None)
  }

  fn from_session_error(kind: FailureKind, error: SessionError) -> Self {
    Self::capture(kind, error.to_string(), Some(Arc::new(error)))
  }

  fn capture(kind: FailureKind, message: String, source: Option<Arc<SessionError>>) -> Self {
    // Honours RUST_BACKTRACE; the header line is always present.
    let trace = format!("{}: {}\n{}", kind, message, Backtrace::capture());
    Self {
      kind,
      message: message.into(),
      source,
      trace: trace.into(),
    }
  }

  pub fn kind(&self) -> FailureKind {
    self.kind
  }

  pub fn message(&self) -> &str {
    &self.message
  }

  /// The session error behind this failure, if any.
  pub fn session_error(&self) -> Option<&SessionError> {
    self.source.as_deref()
  }

  /// Diagnostic trace captured when the failure was recorded.
  pub fn trace(&self) -> &str {
    &self.trace
  }

  pub fn is_timeout(&self) -> bool {
    self.session_error().is_some_and(SessionError::is_timeout)
  }
}

impl fmt::Debug for Failure {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Failure")
      .field("kind", &self.kind)
      .field("message", &self.message)
      .finish_non_exhaustive()
  }
}

impl fmt::Display for Failure {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}: {}", self.kind, self.message)
  }
}

impl std::error::Error for Failure {
  fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
    self
      .source
      .as_deref()
      .map(|e| e as &(dyn std::error::Error + 'static))
  }
}

impl PartialEq for Failure {
  fn eq(&self, other: &Self) -> bool {
    self.kind == other.kind && self.message == other.message
  }
}

/// The value reported to the caller for one task: the session's response or a
/// failure handed back by an exception handler.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<R> {
  Response(R),
  Failure(Failure),
}

impl<R> Outcome<R> {
  pub fn is_response(&self) -> bool {
    matches!(self, Outcome::Response(_))
  }

  pub fn as_response(&self) -> Option<&R> {
    match self {
      Outcome::Response(r) => Some(r),
      Outcome::Failure(_) => None,
    }
  }

  pub fn as_failure(&self) -> Option<&Failure> {
    match self {
      Outcome::Response(_) => None,
      Outcome::Failure(f) => Some(f),
    }
  }

  pub fn into_result(self) -> Result<R, Failure> {
    match self {
      Outcome::Response(r) => Ok(r),
      Outcome::Failure(f) => Err(f),
    }
  }
}

impl<R> From<Failure> for Outcome<R> {
  fn from(failure: Failure) -> Self {
    Outcome::Failure(failure)
  }
}
