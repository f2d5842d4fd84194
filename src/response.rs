//! Outcome value returned by [`FemtoTransport::send_batch`](crate::FemtoTransport::send_batch).

use std::fmt;

/// Status reported when no HTTP response was obtained.
pub const TRANSPORT_FAILURE_STATUS: i32 = -1;

/// Immutable record of a delivery outcome.
///
/// A non-negative `status` means an HTTP exchange completed, whether it
/// succeeded or not; `error` is always `None` in that case. A negative
/// `status` means no response was received and `error` carries the message
/// of the failure that ended the final attempt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransportResponse {
    status: i32,
    error: Option<String>,
}

impl TransportResponse {
    /// Build a response from a completed HTTP exchange.
    pub fn from_status(status: u16) -> Self {
        Self {
            status: i32::from(status),
            error: None,
        }
    }

    /// Build a response describing a failure to obtain any HTTP response.
    pub fn transport_failure(error: impl Into<String>) -> Self {
        Self {
            status: TRANSPORT_FAILURE_STATUS,
            error: Some(error.into()),
        }
    }

    /// HTTP status code, or a negative value on transport failure.
    pub fn status(&self) -> i32 {
        self.status
    }

    /// Failure message when no HTTP response was obtained.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// `true` for a completed exchange with a status below 400.
    pub fn is_success(&self) -> bool {
        (0..400).contains(&self.status)
    }

    /// `true` when no HTTP response was obtained.
    pub fn is_transport_failure(&self) -> bool {
        self.status < 0
    }
}

impl fmt::Display for TransportResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.error {
            Some(error) => write!(f, "status {} ({error})", self.status),
            None => write!(f, "status {}", self.status),
        }
    }
}
