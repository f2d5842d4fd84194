//! Configuration structures consumed by the transport lifecycle.
//!
//! [`TransportBuilder`](crate::TransportBuilder) resolves and validates these
//! values before handing them to
//! [`FemtoTransport`](super::FemtoTransport) for runtime use.

use std::time::Duration;

use url::Url;

/// Default number of attempts per `send_batch` call.
pub const DEFAULT_RETRIES: u32 = 10;
/// Default timeout applied while opening a connection.
pub const DEFAULT_OPEN_TIMEOUT: Duration = Duration::from_secs(4);
/// Default timeout applied to each socket read.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(8);
/// Default timeout applied to each socket write.
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(8);
/// Log target used when none is configured.
pub const DEFAULT_LOG_TARGET: &str = "femtobatch";

/// Authentication configuration for delivery requests.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum AuthConfig {
    /// No authentication.
    #[default]
    None,
    /// HTTP Basic authentication. An empty password sends `user:`.
    Basic { username: String, password: String },
    /// Bearer token authentication.
    Bearer { token: String },
}

/// Connection timeouts. `None` disables the corresponding timeout.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Timeouts {
    pub open: Option<Duration>,
    pub read: Option<Duration>,
    pub write: Option<Duration>,
}

impl Timeouts {
    /// Convert a millisecond setting, treating zero as "no timeout".
    pub fn from_millis(ms: u64) -> Option<Duration> {
        (ms > 0).then(|| Duration::from_millis(ms))
    }
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            open: Some(DEFAULT_OPEN_TIMEOUT),
            read: Some(DEFAULT_READ_TIMEOUT),
            write: Some(DEFAULT_WRITE_TIMEOUT),
        }
    }
}

/// Validated delivery endpoint.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Endpoint {
    url: Url,
    host: String,
    port: u16,
}

impl Endpoint {
    /// Assemble an endpoint from a URL already checked for an `http` or
    /// `https` scheme and a host.
    pub(crate) fn new(mut url: Url, host: String, port: u16) -> Self {
        if url.path().is_empty() {
            url.set_path("/");
        }
        Self { url, host, port }
    }

    /// Full URL every attempt is posted to.
    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn scheme(&self) -> &str {
        self.url.scheme()
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Request path, never empty.
    pub fn path(&self) -> &str {
        self.url.path()
    }

    pub fn is_tls(&self) -> bool {
        self.url.scheme() == "https"
    }
}

/// Resolved configuration describing how to construct a
/// [`FemtoTransport`](super::FemtoTransport).
#[derive(Clone, Debug)]
pub struct TransportConfig {
    /// Target endpoint.
    pub endpoint: Endpoint,
    /// Caller headers in the order they were supplied.
    pub headers: Vec<(String, String)>,
    /// Attempt budget per `send_batch` call.
    pub retries: u32,
    /// Connection timeouts.
    pub timeouts: Timeouts,
    /// Authentication applied to every attempt.
    pub auth: AuthConfig,
    /// Skip network I/O and report success.
    pub stub: bool,
    /// Target passed to the `log` macros.
    pub log_target: String,
}

impl TransportConfig {
    /// Configuration with defaults for everything but the endpoint.
    pub fn new(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            headers: Vec::new(),
            retries: DEFAULT_RETRIES,
            timeouts: Timeouts::default(),
            auth: AuthConfig::default(),
            stub: false,
            log_target: DEFAULT_LOG_TARGET.to_owned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_exposes_host_port_and_path() {
        let url = Url::parse("https://collector.example.com/v1/batch").expect("url");
        let endpoint = Endpoint::new(url, "collector.example.com".into(), 443);
        assert_eq!(endpoint.host(), "collector.example.com");
        assert_eq!(endpoint.port(), 443);
        assert_eq!(endpoint.path(), "/v1/batch");
        assert!(endpoint.is_tls());
    }

    #[test]
    fn endpoint_without_path_posts_to_root() {
        let url = Url::parse("http://localhost:8080").expect("url");
        let endpoint = Endpoint::new(url, "localhost".into(), 8080);
        assert_eq!(endpoint.path(), "/");
        assert_eq!(endpoint.url().as_str(), "http://localhost:8080/");
    }

    #[test]
    fn zero_millis_disables_timeout() {
        assert_eq!(Timeouts::from_millis(0), None);
        assert_eq!(
            Timeouts::from_millis(250),
            Some(Duration::from_millis(250))
        );
    }
}
