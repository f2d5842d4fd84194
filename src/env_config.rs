//! Environment-variable fallbacks for transport options.
//!
//! The environment is read once into an [`EnvDefaults`] value, which the
//! caller hands to [`TransportBuilder::with_defaults`](crate::TransportBuilder::with_defaults).
//! Explicit builder values always take precedence over these fallbacks.

use crate::builder::TransportBuildError;

pub const ENV_URL: &str = "FEMTOBATCH_URL";
pub const ENV_HEADERS: &str = "FEMTOBATCH_HEADERS";
pub const ENV_RETRIES: &str = "FEMTOBATCH_RETRIES";
pub const ENV_READ_TIMEOUT_MS: &str = "FEMTOBATCH_READ_TIMEOUT_MS";
pub const ENV_OPEN_TIMEOUT_MS: &str = "FEMTOBATCH_OPEN_TIMEOUT_MS";
pub const ENV_WRITE_TIMEOUT_MS: &str = "FEMTOBATCH_WRITE_TIMEOUT_MS";
pub const ENV_STUB: &str = "FEMTOBATCH_STUB";

/// Option values resolved from the environment. `None` means unset.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EnvDefaults {
    pub url: Option<String>,
    /// Parsed from `Name=value,Name2=value2`, in order.
    pub headers: Vec<(String, String)>,
    /// Kept signed so a negative value reaches validation.
    pub retries: Option<i64>,
    pub read_timeout_ms: Option<u64>,
    pub open_timeout_ms: Option<u64>,
    pub write_timeout_ms: Option<u64>,
    pub stub: Option<bool>,
}

impl EnvDefaults {
    /// Read the `FEMTOBATCH_*` variables from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`TransportBuildError::InvalidConfig`] if a variable is set
    /// to a value that cannot be parsed.
    pub fn from_env() -> Result<Self, TransportBuildError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Resolve the variables through `lookup`. Blank values count as unset.
    ///
    /// # Errors
    ///
    /// Returns [`TransportBuildError::InvalidConfig`] on a malformed value.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, TransportBuildError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_owned())
                .filter(|value| !value.is_empty())
        };

        Ok(Self {
            url: get(ENV_URL),
            headers: get(ENV_HEADERS)
                .map(|raw| parse_headers(&raw))
                .transpose()?
                .unwrap_or_default(),
            retries: get(ENV_RETRIES)
                .map(|raw| parse_number(ENV_RETRIES, &raw, "an integer"))
                .transpose()?,
            read_timeout_ms: parse_timeout(ENV_READ_TIMEOUT_MS, get(ENV_READ_TIMEOUT_MS))?,
            open_timeout_ms: parse_timeout(ENV_OPEN_TIMEOUT_MS, get(ENV_OPEN_TIMEOUT_MS))?,
            write_timeout_ms: parse_timeout(ENV_WRITE_TIMEOUT_MS, get(ENV_WRITE_TIMEOUT_MS))?,
            stub: get(ENV_STUB).map(|raw| parse_flag(&raw)).transpose()?,
        })
    }
}

fn parse_number<T: std::str::FromStr>(
    key: &str,
    raw: &str,
    expected: &str,
) -> Result<T, TransportBuildError> {
    raw.parse().map_err(|_| {
        TransportBuildError::InvalidConfig(format!("{key} must be {expected}, got {raw:?}"))
    })
}

fn parse_timeout(key: &str, raw: Option<String>) -> Result<Option<u64>, TransportBuildError> {
    raw.map(|raw| parse_number(key, &raw, "a non-negative integer"))
        .transpose()
}

fn parse_flag(raw: &str) -> Result<bool, TransportBuildError> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(TransportBuildError::InvalidConfig(format!(
            "{ENV_STUB} must be a boolean, got {raw:?}"
        ))),
    }
}

fn parse_headers(raw: &str) -> Result<Vec<(String, String)>, TransportBuildError> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            entry
                .split_once('=')
                .map(|(name, value)| (name.trim().to_owned(), value.trim().to_owned()))
                .ok_or_else(|| {
                    TransportBuildError::InvalidConfig(format!(
                        "{ENV_HEADERS} entry {entry:?} is not of the form Name=value"
                    ))
                })
        })
        .collect()
}
