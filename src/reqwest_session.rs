//! [`Session`] over a `reqwest::Client`.

use crate::error::SessionError;
use crate::session::{Request, Session};

use futures::future::BoxFuture;
use futures::FutureExt;
use reqwest::Client;
use tracing::trace;

/// A `reqwest` client as a dispatcher session.
///
/// Redirect policy is a property of the client; build the client with the
/// policy you need, `allow_redirects` on a request is not consulted. The body is
/// never consumed eagerly, so `stream` has no effect either.
#[derive(Debug, Clone, Default)]
pub struct ReqwestSession {
  client: Client,
}

impl ReqwestSession {
  pub fn new(client: Client) -> Self {
    Self { client }
  }

  pub fn client(&self) -> &Client {
    &self.client
  }
}

impl Session for ReqwestSession {
  type Response = reqwest::Response;

  fn open() -> Result<Self, SessionError> {
    Client::builder().build().map(Self::new).map_err(classify)
  }

  fn execute<'a>(&'a self, request: &'a Request) -> BoxFuture<'a, Result<Self::Response, SessionError>> {
    async move {
      let method = reqwest::Method::from_bytes(request.method().as_str().as_bytes())
        .map_err(|e| SessionError::InvalidRequest(e.to_string()))?;
      let options = request.options();

      let mut builder = self.client.request(method, request.url());
      for (name, value) in &options.headers {
        builder = builder.header(name.as_str(), value.as_str());
      }
      if !options.query.is_empty() {
        builder = builder.query(&options.query);
      }
      if let Some(body) = &options.body {
        builder = builder.body(body.clone());
      }
      if let Some(timeout) = options.timeout {
        builder = builder.timeout(timeout);
      }

      trace!(method = %request.method(), url = %request.url(), "Sending request.");
      builder.send().await.map_err(classify)
    }
    .boxed()
  }
}

fn classify(error: reqwest::Error) -> SessionError {
  if error.is_timeout() {
    SessionError::Timeout(error.to_string())
  } else if error.is_connect() {
    SessionError::Connection(error.to_string())
  } else if error.is_builder() {
    SessionError::InvalidRequest(error.to_string())
  } else {
    SessionError::Other(Box::new(error))
  }
}
