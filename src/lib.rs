//! A Tokio-based dispatcher that runs deferred HTTP requests with bounded
//! concurrency and collects their outcomes in input order (`map`), in
//! completion order (`imap`), or in completion order tagged with the input
//! position (`imap_enumerated`).
//!
//! The HTTP work itself is delegated to a [`Session`] implementation.

mod config;
mod dispatch;
mod error;
mod failure;
mod handle;
mod policy;
mod pool;
#[cfg(feature = "reqwest")]
mod reqwest_session;
mod runner;
mod session;
mod task;

pub use config::{DispatchConfig, PoolConfig, DEFAULT_STREAM_SIZE};
pub use dispatch::{imap, imap_enumerated, map, Dispatcher};
pub use error::{PoolError, SessionError};
pub use failure::{Failure, FailureKind, Outcome};
pub use handle::TaskHandle;
pub use policy::{exception_handler, ExceptionHandler};
pub use pool::{Pool, ShutdownMode};
#[cfg(feature = "reqwest")]
pub use reqwest_session::ReqwestSession;
pub use session::{Method, Request, RequestOptions, Session};
pub use task::{delete, get, head, options, patch, post, put, request, ResponseHook, Task, TaskState};
