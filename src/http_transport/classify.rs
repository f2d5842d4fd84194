//! Classification of HTTP responses for retry decisions.

/// Classification of an HTTP status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseClass {
    /// Below 400: the exchange succeeded.
    Success,
    /// 429: rate limited, back off and retry.
    RateLimited,
    /// 5xx: transient server-side failure, back off and retry.
    ServerError,
    /// 4xx except 429: not recoverable by retrying.
    ClientError,
}

impl ResponseClass {
    /// Whether another attempt may succeed.
    pub fn should_retry(self) -> bool {
        matches!(self, Self::RateLimited | Self::ServerError)
    }
}

/// Classifies an HTTP status code.
///
/// # Classification rules
///
/// * **>= 500** → [`ResponseClass::ServerError`], retried
/// * **429** → [`ResponseClass::RateLimited`], retried
/// * **400..=499** → [`ResponseClass::ClientError`], terminal
/// * **< 400** → [`ResponseClass::Success`]
pub fn classify_status(status: u16) -> ResponseClass {
    match status {
        500..=u16::MAX => ResponseClass::ServerError,
        429 => ResponseClass::RateLimited,
        400..=499 => ResponseClass::ClientError,
        _ => ResponseClass::Success,
    }
}
