//! Streaming client for the notebook knowledge-base "ask" endpoint.
//!
//! An ask call may run for minutes while the backend searches and generates.
//! [`Client::ask`] enforces its own deadline, injects the stored bearer token,
//! classifies failures into [`Error`] and hands back a live [`AskStream`].

use std::time::Duration;

/// Default API base URL.
pub const DEFAULT_BASE_URL: &str = "http://localhost:5055";

/// Relative path of the ask endpoint.
pub const ASK_PATH: &str = "/api/search/ask";

/// Client-side deadline for a single ask call (10 minutes).
pub const ASK_DEADLINE: Duration = Duration::from_millis(600_000);

/// Default connection timeout (5 seconds).
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Name of the persisted credential blob.
pub const DEFAULT_CREDENTIAL_KEY: &str = "auth-storage";

/// Message shown for both timeouts and transient network failures.
pub const CONNECTION_LOST_MESSAGE: &str =
    "Connection lost or request timed out. Please try again or check your network connection.";

/// HTTP header name for request ID tracing.
pub const REQUEST_ID_HEADER: &str = "X-Request-Id";

/// Default client identification header value.
pub(crate) const DEFAULT_CLIENT_HEADER: &str =
    concat!("notebook-ask/", env!("CARGO_PKG_VERSION"));

mod classify;
mod client;
mod credentials;
mod dispatch;
mod errors;
mod http;
mod stream;
mod telemetry;
mod timer;

#[doc(hidden)]
pub mod testing;

pub use classify::{classify, classify_transport_error};
pub use client::{AskRequest, Client, Config};
pub use credentials::{
    AuthExpiryReactor, CredentialProvider, CredentialSnapshot, CredentialState, CredentialStore,
    FileCredentialStore, MemoryCredentialStore, NavigateFn,
};
pub use dispatch::{Dispatcher, RawBody, RawOutcome, RawResponse};
pub use errors::{Error, ErrorKind, HttpError, Result};
pub use http::{AskOptions, HeaderEntry, HeaderList};
pub use stream::AskStream;
pub use telemetry::{AskRequestMetrics, MetricsCallbacks};
pub use timer::{CancellationHandle, CancellationTimer};
