//! Builder for [`FemtoTransport`](crate::FemtoTransport).
//!
//! Collects explicit options, layers them over [`EnvDefaults`] and the
//! hardcoded defaults, validates the result, and constructs the transport.
//! Every validation failure surfaces as a [`TransportBuildError`] from
//! [`TransportBuilder::build`]; nothing is retried.

use std::fmt;

use thiserror::Error;
use url::Url;

use crate::{
    backoff::{BackoffPolicy, ExponentialBackoff},
    env_config::{ENV_URL, EnvDefaults},
    http_transport::{
        AuthConfig, Endpoint, FemtoTransport, Timeouts, TransportConfig, merge_headers,
    },
};

/// Errors that may occur while building a transport.
#[derive(Debug, Error)]
pub enum TransportBuildError {
    /// Neither the builder nor the environment supplied a URL.
    #[error("no endpoint URL configured; pass one to the builder or set {}", ENV_URL)]
    MissingUrl,
    /// The URL could not be parsed.
    #[error("invalid endpoint URL {url:?}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
    /// The URL scheme is neither `http` nor `https`.
    #[error("unsupported URL scheme {0:?}; expected http or https")]
    UnsupportedScheme(String),
    /// Invalid user supplied configuration.
    #[error("invalid transport configuration: {0}")]
    InvalidConfig(String),
    /// The platform TLS connector could not be created.
    #[error("failed to initialise TLS: {0}")]
    Tls(#[from] native_tls::Error),
}

macro_rules! ensure_positive {
    ($value:expr, $field:expr) => {{
        if $value == 0 {
            Err(TransportBuildError::InvalidConfig(format!(
                "{} must be greater than zero",
                $field
            )))
        } else {
            Ok($value)
        }
    }};
}

macro_rules! option_setter {
    ($(#[$meta:meta])* $fn_name:ident, $field:ident, $ty:ty) => {
        $(#[$meta])*
        pub fn $fn_name(mut self, value: $ty) -> Self {
            self.$field = Some(value);
            self
        }
    };
}

/// Overrides for the default [`ExponentialBackoff`] parameters.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BackoffOverrides {
    min_timeout_ms: Option<u64>,
    max_timeout_ms: Option<u64>,
    multiplier: Option<f64>,
    randomization_factor: Option<f64>,
    seed: Option<u64>,
}

impl BackoffOverrides {
    /// Create overrides with no custom values.
    pub fn new() -> Self {
        Self::default()
    }

    option_setter!(
        #[doc = "Override the first retry wait in milliseconds."]
        with_min_timeout_ms,
        min_timeout_ms,
        u64
    );
    option_setter!(
        #[doc = "Override the wait cap in milliseconds."]
        with_max_timeout_ms,
        max_timeout_ms,
        u64
    );
    option_setter!(
        #[doc = "Override the per-attempt growth factor."]
        with_multiplier,
        multiplier,
        f64
    );
    option_setter!(
        #[doc = "Override the jitter fraction (0.0 disables jitter)."]
        with_randomization_factor,
        randomization_factor,
        f64
    );
    option_setter!(
        #[doc = "Seed the jitter generator for reproducible waits."]
        with_seed,
        seed,
        u64
    );

    fn build(&self) -> Result<ExponentialBackoff, TransportBuildError> {
        let defaults = ExponentialBackoff::default();
        let min = match self.min_timeout_ms {
            Some(ms) => ensure_positive!(ms, "backoff_min_timeout_ms")?,
            None => defaults.min_timeout_ms(),
        };
        let max = match self.max_timeout_ms {
            Some(ms) => ensure_positive!(ms, "backoff_max_timeout_ms")?,
            None => defaults.max_timeout_ms(),
        };
        if min > max {
            return Err(TransportBuildError::InvalidConfig(format!(
                "backoff_min_timeout_ms ({min}) exceeds backoff_max_timeout_ms ({max})"
            )));
        }
        let multiplier = self.multiplier.unwrap_or(defaults.multiplier());
        if !(multiplier.is_finite() && multiplier >= 1.0) {
            return Err(TransportBuildError::InvalidConfig(
                "backoff_multiplier must be at least 1.0".into(),
            ));
        }
        let factor = self
            .randomization_factor
            .unwrap_or(defaults.randomization_factor());
        if !(0.0..=1.0).contains(&factor) {
            return Err(TransportBuildError::InvalidConfig(
                "backoff_randomization_factor must be between 0.0 and 1.0".into(),
            ));
        }

        let policy = ExponentialBackoff::new(min, max, multiplier, factor);
        Ok(match self.seed {
            Some(seed) => policy.with_seed(seed),
            None => policy,
        })
    }
}

/// Builder for constructing [`FemtoTransport`] instances.
#[derive(Default)]
pub struct TransportBuilder {
    url: Option<String>,
    headers: Vec<(String, String)>,
    retries: Option<i64>,
    open_timeout_ms: Option<u64>,
    read_timeout_ms: Option<u64>,
    write_timeout_ms: Option<u64>,
    auth: Option<AuthConfig>,
    stub: Option<bool>,
    log_target: Option<String>,
    backoff: BackoffOverrides,
    backoff_policy: Option<Box<dyn BackoffPolicy>>,
    defaults: EnvDefaults,
}

impl TransportBuilder {
    /// Create a builder with no URL and no environment fallbacks.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a builder seeded from the process environment.
    ///
    /// # Errors
    ///
    /// Propagates parse failures from [`EnvDefaults::from_env`].
    pub fn from_env() -> Result<Self, TransportBuildError> {
        Ok(Self::new().with_defaults(EnvDefaults::from_env()?))
    }

    /// Use `defaults` for options not set explicitly.
    pub fn with_defaults(mut self, defaults: EnvDefaults) -> Self {
        self.defaults = defaults;
        self
    }

    /// Set the endpoint URL (`http` or `https`).
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Append a header sent with every request. Later values win.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Append several headers in iteration order.
    pub fn with_headers<I, K, V>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.headers
            .extend(headers.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    option_setter!(
        #[doc = "Set the attempt budget per `send_batch` call; must not be negative."]
        with_retries,
        retries,
        i64
    );
    option_setter!(
        #[doc = "Set the connection open timeout in milliseconds (0 disables it)."]
        with_open_timeout_ms,
        open_timeout_ms,
        u64
    );
    option_setter!(
        #[doc = "Set the socket read timeout in milliseconds (0 disables it)."]
        with_read_timeout_ms,
        read_timeout_ms,
        u64
    );
    option_setter!(
        #[doc = "Set the socket write timeout in milliseconds (0 disables it)."]
        with_write_timeout_ms,
        write_timeout_ms,
        u64
    );
    option_setter!(
        #[doc = "Skip network I/O and report success for every batch."]
        with_stub,
        stub,
        bool
    );

    /// Configure HTTP Basic authentication. `password` may be empty.
    pub fn with_basic_auth(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.auth = Some(AuthConfig::Basic {
            username: username.into(),
            password: password.into(),
        });
        self
    }

    /// Configure Bearer token authentication.
    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        self.auth = Some(AuthConfig::Bearer {
            token: token.into(),
        });
        self
    }

    /// Route this transport's log events to `target`.
    pub fn with_log_target(mut self, target: impl Into<String>) -> Self {
        self.log_target = Some(target.into());
        self
    }

    /// Tune the default exponential backoff.
    pub fn with_backoff(mut self, overrides: BackoffOverrides) -> Self {
        self.backoff = overrides;
        self
    }

    /// Replace the default backoff with a custom policy.
    pub fn with_backoff_policy(mut self, policy: impl BackoffPolicy + 'static) -> Self {
        let policy: Box<dyn BackoffPolicy> = Box::new(policy);
        self.backoff_policy = Some(policy);
        self
    }

    /// Validate the options and construct the transport.
    ///
    /// # Errors
    ///
    /// Returns [`TransportBuildError`] for a missing or invalid URL, an
    /// unsupported scheme, a negative retry count, invalid headers or
    /// backoff parameters, or a TLS initialisation failure.
    pub fn build(self) -> Result<FemtoTransport, TransportBuildError> {
        let config = self.build_config()?;
        let backoff: Box<dyn BackoffPolicy> = match self.backoff_policy {
            Some(policy) => policy,
            None => Box::new(self.backoff.build()?),
        };
        FemtoTransport::with_config(config, backoff)
    }

    /// Resolve and validate options without constructing a transport.
    ///
    /// # Errors
    ///
    /// See [`TransportBuilder::build`].
    pub fn build_config(&self) -> Result<TransportConfig, TransportBuildError> {
        let mut config = TransportConfig::new(self.resolve_endpoint()?);
        config.headers = self.resolve_headers()?;
        config.retries = self.resolve_retries()?;
        config.timeouts = self.resolve_timeouts();
        config.auth = self.auth.clone().unwrap_or_default();
        config.stub = self.stub.or(self.defaults.stub).unwrap_or(false);
        if let Some(target) = &self.log_target {
            config.log_target.clone_from(target);
        }
        Ok(config)
    }

    fn resolve_endpoint(&self) -> Result<Endpoint, TransportBuildError> {
        let raw = self
            .url
            .as_deref()
            .or(self.defaults.url.as_deref())
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .ok_or(TransportBuildError::MissingUrl)?;

        let url = Url::parse(raw).map_err(|source| TransportBuildError::InvalidUrl {
            url: raw.to_owned(),
            source,
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(TransportBuildError::UnsupportedScheme(
                url.scheme().to_owned(),
            ));
        }
        let host = url
            .host_str()
            .filter(|host| !host.is_empty())
            .ok_or_else(|| TransportBuildError::InvalidConfig("URL must include a host".into()))?
            .to_owned();
        let port = url.port_or_known_default().ok_or_else(|| {
            TransportBuildError::InvalidConfig("URL must resolve to a port".into())
        })?;
        Ok(Endpoint::new(url, host, port))
    }

    fn resolve_headers(&self) -> Result<Vec<(String, String)>, TransportBuildError> {
        let headers = merge_headers(self.defaults.headers.clone(), &self.headers);
        for (name, value) in &headers {
            validate_header(name, value)?;
        }
        Ok(headers)
    }

    fn resolve_retries(&self) -> Result<u32, TransportBuildError> {
        match self.retries.or(self.defaults.retries) {
            None => Ok(crate::http_transport::DEFAULT_RETRIES),
            Some(retries) if retries < 0 => Err(TransportBuildError::InvalidConfig(format!(
                "retries must not be negative, got {retries}"
            ))),
            Some(retries) => u32::try_from(retries).map_err(|_| {
                TransportBuildError::InvalidConfig(format!("retries {retries} is too large"))
            }),
        }
    }

    fn resolve_timeouts(&self) -> Timeouts {
        let defaults = Timeouts::default();
        let pick = |explicit: Option<u64>, env: Option<u64>, fallback| {
            explicit.or(env).map_or(fallback, Timeouts::from_millis)
        };
        Timeouts {
            open: pick(
                self.open_timeout_ms,
                self.defaults.open_timeout_ms,
                defaults.open,
            ),
            read: pick(
                self.read_timeout_ms,
                self.defaults.read_timeout_ms,
                defaults.read,
            ),
            write: pick(
                self.write_timeout_ms,
                self.defaults.write_timeout_ms,
                defaults.write,
            ),
        }
    }
}

fn validate_header(name: &str, value: &str) -> Result<(), TransportBuildError> {
    let valid_name = !name.is_empty()
        && name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&b));
    if !valid_name {
        return Err(TransportBuildError::InvalidConfig(format!(
            "invalid header name {name:?}"
        )));
    }
    if value.bytes().any(|b| b == b'\r' || b == b'\n') {
        return Err(TransportBuildError::InvalidConfig(format!(
            "header {name} contains a line break"
        )));
    }
    Ok(())
}

impl fmt::Debug for TransportBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportBuilder")
            .field("url", &self.url)
            .field("headers", &self.headers)
            .field("retries", &self.retries)
            .field("open_timeout_ms", &self.open_timeout_ms)
            .field("read_timeout_ms", &self.read_timeout_ms)
            .field("write_timeout_ms", &self.write_timeout_ms)
            .field("stub", &self.stub)
            .field("log_target", &self.log_target)
            .field("backoff", &self.backoff)
            .field("custom_backoff_policy", &self.backoff_policy.is_some())
            .field("defaults", &self.defaults)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use rstest::rstest;

    use super::*;
    use crate::http_transport::{DEFAULT_OPEN_TIMEOUT, DEFAULT_READ_TIMEOUT, DEFAULT_RETRIES};

    const URL: &str = "https://collector.example.com/v1/batch";

    #[rstest]
    fn missing_url_is_rejected() {
        let err = TransportBuilder::new().build().expect_err("no url");
        assert!(matches!(err, TransportBuildError::MissingUrl));
    }

    #[rstest]
    #[case("ftp://collector.example.com/batch", "ftp")]
    #[case("ws://collector.example.com/batch", "ws")]
    #[case("file:///tmp/batch", "file")]
    fn non_http_schemes_are_rejected(#[case] url: &str, #[case] scheme: &str) {
        let err = TransportBuilder::new()
            .with_url(url)
            .build()
            .expect_err("bad scheme");
        assert!(matches!(err, TransportBuildError::UnsupportedScheme(ref s) if s == scheme));
    }

    #[rstest]
    fn unparsable_url_is_rejected() {
        let err = TransportBuilder::new()
            .with_url("not a url")
            .build()
            .expect_err("bad url");
        assert!(matches!(err, TransportBuildError::InvalidUrl { .. }));
    }

    #[rstest]
    #[case(-1)]
    #[case(-10)]
    fn negative_retries_are_rejected(#[case] retries: i64) {
        let err = TransportBuilder::new()
            .with_url(URL)
            .with_retries(retries)
            .build_config()
            .expect_err("negative retries");
        assert!(matches!(err, TransportBuildError::InvalidConfig(ref msg) if msg.contains("negative")));
    }

    #[rstest]
    #[case(0)]
    #[case(1)]
    #[case(25)]
    fn non_negative_retries_are_accepted(#[case] retries: i64) {
        let config = TransportBuilder::new()
            .with_url(URL)
            .with_retries(retries)
            .build_config()
            .expect("config");
        assert_eq!(i64::from(config.retries), retries);
    }

    #[rstest]
    fn defaults_apply_when_nothing_is_set() {
        let config = TransportBuilder::new()
            .with_url(URL)
            .build_config()
            .expect("config");
        assert_eq!(config.retries, DEFAULT_RETRIES);
        assert_eq!(config.timeouts, Timeouts::default());
        assert_eq!(config.auth, AuthConfig::None);
        assert!(!config.stub);
        assert_eq!(config.log_target, "femtobatch");
        assert_eq!(config.endpoint.port(), 443);
    }

    #[rstest]
    fn explicit_values_beat_environment() {
        let env = EnvDefaults {
            url: Some("http://env.example.com/in".into()),
            retries: Some(2),
            read_timeout_ms: Some(100),
            stub: Some(true),
            ..EnvDefaults::default()
        };
        let config = TransportBuilder::new()
            .with_defaults(env)
            .with_url(URL)
            .with_retries(7)
            .with_stub(false)
            .build_config()
            .expect("config");
        assert_eq!(config.endpoint.host(), "collector.example.com");
        assert_eq!(config.retries, 7);
        assert!(!config.stub);
        assert_eq!(config.timeouts.read, Some(Duration::from_millis(100)));
        assert_eq!(config.timeouts.open, Some(DEFAULT_OPEN_TIMEOUT));
    }

    #[rstest]
    fn environment_fills_gaps() {
        let env = EnvDefaults {
            url: Some("http://env.example.com:8080".into()),
            retries: Some(-1),
            ..EnvDefaults::default()
        };
        let err = TransportBuilder::new()
            .with_defaults(env.clone())
            .build_config()
            .expect_err("negative env retries");
        assert!(matches!(err, TransportBuildError::InvalidConfig(_)));

        let config = TransportBuilder::new()
            .with_defaults(env)
            .with_retries(1)
            .build_config()
            .expect("config");
        assert_eq!(config.endpoint.port(), 8080);
        assert_eq!(config.endpoint.path(), "/");
        assert_eq!(config.timeouts.read, Some(DEFAULT_READ_TIMEOUT));
    }

    #[rstest]
    fn zero_timeout_disables_it() {
        let config = TransportBuilder::new()
            .with_url(URL)
            .with_write_timeout_ms(0)
            .build_config()
            .expect("config");
        assert_eq!(config.timeouts.write, None);
    }

    #[rstest]
    fn builder_headers_override_environment_headers() {
        let env = EnvDefaults {
            url: Some(URL.into()),
            headers: vec![("X-Env".into(), "env".into()), ("X-Team".into(), "env".into())],
            ..EnvDefaults::default()
        };
        let config = TransportBuilder::new()
            .with_defaults(env)
            .with_header("x-team", "builder")
            .with_headers([("X-Extra", "1")])
            .build_config()
            .expect("config");
        assert_eq!(
            config.headers,
            vec![
                ("X-Env".to_owned(), "env".to_owned()),
                ("X-Team".to_owned(), "builder".to_owned()),
                ("X-Extra".to_owned(), "1".to_owned()),
            ]
        );
    }

    #[rstest]
    #[case("Bad Header", "v")]
    #[case("", "v")]
    #[case("X-Split", "a\r\nInjected: yes")]
    fn invalid_headers_are_rejected(#[case] name: &str, #[case] value: &str) {
        let err = TransportBuilder::new()
            .with_url(URL)
            .with_header(name, value)
            .build_config()
            .expect_err("invalid header");
        assert!(matches!(err, TransportBuildError::InvalidConfig(_)));
    }

    #[rstest]
    #[case(BackoffOverrides::new().with_min_timeout_ms(0))]
    #[case(BackoffOverrides::new().with_max_timeout_ms(0))]
    #[case(BackoffOverrides::new().with_min_timeout_ms(500).with_max_timeout_ms(100))]
    #[case(BackoffOverrides::new().with_multiplier(0.5))]
    #[case(BackoffOverrides::new().with_randomization_factor(1.5))]
    fn invalid_backoff_overrides_are_rejected(#[case] overrides: BackoffOverrides) {
        let err = TransportBuilder::new()
            .with_url(URL)
            .with_backoff(overrides)
            .build()
            .expect_err("invalid backoff");
        assert!(matches!(err, TransportBuildError::InvalidConfig(_)));
    }

    #[rstest]
    fn backoff_overrides_shape_the_policy() {
        let mut policy = BackoffOverrides::new()
            .with_min_timeout_ms(20)
            .with_max_timeout_ms(50)
            .with_multiplier(2.0)
            .with_randomization_factor(0.0)
            .build()
            .expect("policy");
        let waits: Vec<u64> = (0..3).map(|_| policy.next_interval()).collect();
        assert_eq!(waits, vec![20, 40, 50]);
    }

    #[rstest]
    fn auth_and_log_target_are_carried() {
        let config = TransportBuilder::new()
            .with_url(URL)
            .with_basic_auth("write-key", "")
            .with_log_target("app::delivery")
            .build_config()
            .expect("config");
        assert_eq!(
            config.auth,
            AuthConfig::Basic {
                username: "write-key".into(),
                password: String::new(),
            }
        );
        assert_eq!(config.log_target, "app::delivery");
    }
}
