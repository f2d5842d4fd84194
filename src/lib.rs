//! Batching HTTP delivery client.
//!
//! Instrumentation code collects events locally and periodically hands a
//! batch to [`FemtoTransport::send_batch`], which POSTs it as a JSON array to
//! one configured endpoint. Transient failures (5xx, 429, network errors)
//! are retried with exponential backoff up to a fixed attempt budget; every
//! call resolves to a [`TransportResponse`] rather than an error.
//!
//! ```no_run
//! use femtobatch::TransportBuilder;
//!
//! let mut transport = TransportBuilder::from_env()?
//!     .with_url("https://collector.example.com/v1/batch")
//!     .with_retries(3)
//!     .build()?;
//! let mut batch = vec![serde_json::json!({"event": "page_view"})];
//! let response = transport.send_batch(&mut batch);
//! assert!(batch.is_empty());
//! if !response.is_success() {
//!     eprintln!("delivery failed: {response}");
//! }
//! transport.shutdown();
//! # Ok::<(), femtobatch::TransportBuildError>(())
//! ```

pub mod backoff;
pub mod builder;
pub mod env_config;
pub mod http_transport;
pub mod response;

pub use backoff::{BackoffPolicy, ExponentialBackoff};
pub use builder::{BackoffOverrides, TransportBuildError, TransportBuilder};
pub use env_config::EnvDefaults;
pub use http_transport::{
    AuthConfig, Endpoint, FemtoTransport, ResponseClass, Timeouts, TransportConfig,
    TransportError, classify_status,
};
pub use response::TransportResponse;
