//! Blocking delivery of batches with bounded retries.
//!
//! [`FemtoTransport`] owns a lazily opened `ureq::Agent` (capped at one idle
//! connection) and the backoff policy shared by every `send_batch` call.
//! Each call runs attempts sequentially on the calling thread, sleeping
//! between retryable failures, and always returns a [`TransportResponse`].

use std::{error::Error as _, fmt, io::Read as _, sync::Arc, thread, time::Duration};

use base64::{Engine, engine::general_purpose::STANDARD as BASE64_STANDARD};
use log::{Level, debug, error, info, log_enabled};
use native_tls::TlsConnector;
use serde::Serialize;
use thiserror::Error;
use ureq::{Agent, AgentBuilder};

use crate::{backoff::BackoffPolicy, builder::TransportBuildError, response::TransportResponse};

use super::{
    classify::{ResponseClass, classify_status},
    config::{AuthConfig, Endpoint, TransportConfig},
    headers::{default_headers, merge_headers},
};

/// Failure of a single attempt before an HTTP status was obtained.
///
/// Every variant is treated as retryable.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The batch could not be encoded as JSON.
    #[error("failed to serialise batch: {0}")]
    Serialise(#[from] serde_json::Error),
    /// Connecting, writing, or reading the response head failed.
    #[error(transparent)]
    Network(Box<ureq::Transport>),
}

/// Upper bound on the response body kept for logging.
const MAX_BODY_BYTES: u64 = 64 * 1024;

/// Characters of a client error body included in its log line.
const LOGGED_BODY_CHARS: usize = 512;

/// Status and body of a completed HTTP exchange.
#[derive(Debug)]
struct Exchange {
    status: u16,
    body: String,
}

impl Exchange {
    /// The status is final once the head has arrived. A body that cannot be
    /// read only loses its log detail.
    fn read(response: ureq::Response, target: &str) -> Self {
        let status = response.status();
        let mut raw = Vec::new();
        let body = match response
            .into_reader()
            .take(MAX_BODY_BYTES)
            .read_to_end(&mut raw)
        {
            Ok(_) => String::from_utf8_lossy(&raw).into_owned(),
            Err(err) => {
                debug!(target: target, "Failed to read response body: {err}");
                String::new()
            }
        };
        Self { status, body }
    }
}

/// Delivers batches of serialisable records to a single HTTP endpoint.
///
/// Concurrent `send_batch` calls need external synchronisation: the
/// connection and backoff state are plain owned fields and `send_batch`
/// takes `&mut self`.
pub struct FemtoTransport {
    config: TransportConfig,
    tls: Option<Arc<TlsConnector>>,
    connection: Option<Agent>,
    backoff: Box<dyn BackoffPolicy>,
}

impl FemtoTransport {
    /// Construct the transport from a resolved configuration.
    ///
    /// The connection is not opened until the first `send_batch` call.
    ///
    /// # Errors
    ///
    /// Returns [`TransportBuildError::Tls`] if the endpoint uses `https` and
    /// the platform TLS connector cannot be initialised.
    pub fn with_config(
        config: TransportConfig,
        backoff: Box<dyn BackoffPolicy>,
    ) -> Result<Self, TransportBuildError> {
        let tls = if config.endpoint.is_tls() {
            Some(Arc::new(TlsConnector::new()?))
        } else {
            None
        };
        Ok(Self {
            config,
            tls,
            connection: None,
            backoff,
        })
    }

    /// Serialise `batch` and POST it to the endpoint, retrying transient
    /// failures.
    ///
    /// Never fails: network errors are folded into a response with a
    /// negative status once the retry budget is spent. On return `batch` is
    /// empty and the backoff policy has been reset, whatever the outcome.
    pub fn send_batch<T: Serialize>(&mut self, batch: &mut Vec<T>) -> TransportResponse {
        debug!(target: self.target(), "Sending request for {} items", batch.len());
        let response = if self.config.stub {
            self.stubbed(batch)
        } else {
            self.deliver(batch)
        };
        self.backoff.reset();
        batch.clear();
        response
    }

    /// Close the connection if it is open. Safe to call repeatedly.
    pub fn shutdown(&mut self) {
        if self.connection.take().is_some() {
            debug!(
                target: self.target(),
                "Closed connection to {}:{}",
                self.config.endpoint.host(),
                self.config.endpoint.port()
            );
        }
    }

    /// Whether the connection handle is currently open.
    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.config.endpoint
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    fn target(&self) -> &str {
        &self.config.log_target
    }

    fn deliver<T: Serialize>(&mut self, batch: &[T]) -> TransportResponse {
        let mut remaining = self.config.retries;
        loop {
            let last = match self.attempt(batch) {
                Ok(exchange) => {
                    let response = TransportResponse::from_status(exchange.status);
                    if !self.should_retry(&exchange) {
                        return response;
                    }
                    Ok(response)
                }
                Err(err) => {
                    info!(target: self.target(), "Request attempt failed: {err}");
                    Err(err)
                }
            };

            if remaining <= 1 {
                return self.exhausted(last);
            }
            debug!(target: self.target(), "Retrying request, {remaining} retries left");
            let wait = self.backoff.next_interval();
            thread::sleep(Duration::from_millis(wait));
            remaining -= 1;
        }
    }

    fn attempt<T: Serialize>(&mut self, batch: &[T]) -> Result<Exchange, TransportError> {
        let body = serde_json::to_vec(batch)?;
        let mut headers = default_headers();
        if let Some(auth) = self.authorization() {
            headers.push(("Authorization".to_owned(), auth));
        }
        let headers = merge_headers(headers, &self.config.headers);

        let mut request = self
            .connection()
            .request_url("POST", self.config.endpoint.url());
        for (name, value) in &headers {
            request = request.set(name, value);
        }
        match request.send_bytes(&body) {
            Ok(response) | Err(ureq::Error::Status(_, response)) => {
                Ok(Exchange::read(response, self.target()))
            }
            Err(ureq::Error::Transport(err)) => Err(TransportError::Network(Box::new(err))),
        }
    }

    fn should_retry(&self, exchange: &Exchange) -> bool {
        let status = exchange.status;
        debug!(target: self.target(), "Response status code: {status}");
        if let Some(message) = response_error(&exchange.body) {
            debug!(target: self.target(), "Response error: {message}");
        }

        let class = classify_status(status);
        match class {
            ResponseClass::ServerError => {
                info!(target: self.target(), "Server error {status}, retrying");
            }
            ResponseClass::RateLimited => {
                info!(target: self.target(), "Rate limited (429), retrying");
            }
            ResponseClass::ClientError => {
                error!(
                    target: self.target(),
                    "Client error {status}: {}",
                    excerpt(&exchange.body)
                );
            }
            ResponseClass::Success => {}
        }
        class.should_retry()
    }

    fn exhausted(&self, last: Result<TransportResponse, TransportError>) -> TransportResponse {
        match last {
            Ok(response) => response,
            Err(err) => {
                error!(target: self.target(), "{err}");
                let mut source = err.source();
                while let Some(cause) = source {
                    error!(target: self.target(), "caused by: {cause}");
                    source = cause.source();
                }
                TransportResponse::transport_failure(err.to_string())
            }
        }
    }

    fn stubbed<T: Serialize>(&self, batch: &[T]) -> TransportResponse {
        if log_enabled!(target: self.target(), Level::Debug) {
            let payload = serde_json::to_string(batch)
                .unwrap_or_else(|err| format!("<unserialisable batch: {err}>"));
            debug!(
                target: self.target(),
                "Stubbed request to {}: {payload}",
                self.config.endpoint.url()
            );
        }
        TransportResponse::from_status(200)
    }

    fn connection(&mut self) -> Agent {
        if let Some(agent) = &self.connection {
            return agent.clone();
        }
        debug!(
            target: self.target(),
            "Opening connection to {}:{}",
            self.config.endpoint.host(),
            self.config.endpoint.port()
        );
        let agent = open_connection(&self.config, self.tls.as_ref());
        self.connection = Some(agent.clone());
        agent
    }

    fn authorization(&self) -> Option<String> {
        match &self.config.auth {
            AuthConfig::None => None,
            AuthConfig::Basic { username, password } => {
                let encoded = BASE64_STANDARD.encode(format!("{username}:{password}"));
                Some(format!("Basic {encoded}"))
            }
            AuthConfig::Bearer { token } => Some(format!("Bearer {token}")),
        }
    }
}

fn open_connection(config: &TransportConfig, tls: Option<&Arc<TlsConnector>>) -> Agent {
    let mut builder = AgentBuilder::new()
        .max_idle_connections(1)
        .max_idle_connections_per_host(1);
    if let Some(timeout) = config.timeouts.open {
        builder = builder.timeout_connect(timeout);
    }
    if let Some(timeout) = config.timeouts.read {
        builder = builder.timeout_read(timeout);
    }
    if let Some(timeout) = config.timeouts.write {
        builder = builder.timeout_write(timeout);
    }
    if let Some(connector) = tls {
        builder = builder.tls_connector(Arc::clone(connector));
    }
    builder.build()
}

/// Extract the `error` string from a JSON object body, if any.
fn response_error(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    value.get("error")?.as_str().map(ToOwned::to_owned)
}

/// Leading part of `body` short enough for a single log line.
fn excerpt(body: &str) -> &str {
    match body.char_indices().nth(LOGGED_BODY_CHARS) {
        Some((end, _)) => &body[..end],
        None => body,
    }
}

impl Drop for FemtoTransport {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl fmt::Debug for FemtoTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FemtoTransport")
            .field("endpoint", &self.config.endpoint.url().as_str())
            .field("retries", &self.config.retries)
            .field("connected", &self.is_connected())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_error_field_from_json_body() {
        assert_eq!(
            response_error(r#"{"error":"bad write key"}"#).as_deref(),
            Some("bad write key")
        );
        assert_eq!(response_error(r#"{"success":true}"#), None);
        assert_eq!(response_error("not json"), None);
        assert_eq!(response_error(""), None);
    }

    #[test]
    fn excerpt_bounds_long_bodies_on_char_boundaries() {
        assert_eq!(excerpt("short"), "short");
        let long = "é".repeat(LOGGED_BODY_CHARS + 10);
        let cut = excerpt(&long);
        assert_eq!(cut.chars().count(), LOGGED_BODY_CHARS);
        assert!(long.starts_with(cut));
    }

    #[test]
    fn serialisation_errors_are_prefixed() {
        let err = serde_json::from_str::<u8>("x").expect_err("invalid json");
        let wrapped = TransportError::from(err);
        assert!(wrapped.to_string().starts_with("failed to serialise batch"));
    }
}
