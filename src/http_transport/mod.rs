//! HTTP batch delivery.
//!
//! This module defines [`FemtoTransport`], which serialises a batch of
//! records as a JSON array and POSTs it to a single endpoint over one
//! reusable connection, retrying transient failures with backoff.
//!
//! # Retry Semantics
//!
//! The transport classifies each attempt for retry decisions:
//!
//! - **< 400**: Success - return immediately.
//! - **429 (Too Many Requests)**: Retryable - apply backoff and retry.
//! - **5xx**: Retryable - apply backoff and retry.
//! - **4xx (except 429)**: Terminal - return the status without retrying.
//! - **Network errors**: Retryable - apply backoff and retry; reported as
//!   status `-1` only if the final attempt fails this way.

mod classify;
mod config;
mod headers;
mod transport;


pub use classify::{ResponseClass, classify_status};
pub use config::{
    AuthConfig, DEFAULT_LOG_TARGET, DEFAULT_OPEN_TIMEOUT, DEFAULT_READ_TIMEOUT, DEFAULT_RETRIES,
    DEFAULT_WRITE_TIMEOUT, Endpoint, Timeouts, TransportConfig,
};
pub use headers::{default_headers, merge_headers};
pub use transport::{FemtoTransport, TransportError};
