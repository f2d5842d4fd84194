//! Request headers sent with every delivery attempt.
//!
//! Mandatory headers identify the client library, runtime, platform, host,
//! process, and calling thread. Caller headers are merged over them with
//! last-write-wins semantics; names compare case-insensitively and a replaced
//! header keeps its original position.

use std::thread;

use once_cell::sync::Lazy;

pub const ACCEPT: &str = "Accept";
pub const CONTENT_TYPE: &str = "Content-Type";
pub const USER_AGENT: &str = "User-Agent";
pub const CLIENT_VERSION: &str = "X-Femtobatch-Version";
pub const CLIENT_RUNTIME: &str = "X-Femtobatch-Runtime";
pub const CLIENT_PLATFORM: &str = "X-Femtobatch-Platform";
pub const CLIENT_HOSTNAME: &str = "X-Femtobatch-Hostname";
pub const CLIENT_PID: &str = "X-Femtobatch-Pid";
pub const CLIENT_THREAD: &str = "X-Femtobatch-Thread";

const JSON: &str = "application/json";
const UNKNOWN_HOST: &str = "unknown";
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Headers that do not change for the lifetime of the process.
static PROCESS_HEADERS: Lazy<Vec<(String, String)>> = Lazy::new(|| {
    let hostname = hostname::get()
        .map(|name| header_safe_hostname(&name.to_string_lossy()))
        .unwrap_or_else(|_| UNKNOWN_HOST.to_owned());
    vec![
        (ACCEPT.to_owned(), JSON.to_owned()),
        (CONTENT_TYPE.to_owned(), JSON.to_owned()),
        (USER_AGENT.to_owned(), format!("femtobatch/{VERSION}")),
        (CLIENT_VERSION.to_owned(), VERSION.to_owned()),
        (CLIENT_RUNTIME.to_owned(), "rust".to_owned()),
        (
            CLIENT_PLATFORM.to_owned(),
            format!("{}-{}", std::env::consts::OS, std::env::consts::ARCH),
        ),
        (CLIENT_HOSTNAME.to_owned(), hostname),
        (CLIENT_PID.to_owned(), std::process::id().to_string()),
    ]
});

/// Mandatory headers for a request issued from the current thread.
pub fn default_headers() -> Vec<(String, String)> {
    let mut headers = PROCESS_HEADERS.to_vec();
    headers.push((CLIENT_THREAD.to_owned(), current_thread_id()));
    headers
}

/// Merge `overrides` over `base` in order.
///
/// A name already present (ignoring ASCII case) has its value replaced in
/// place; new names are appended.
pub fn merge_headers<'a, I>(mut base: Vec<(String, String)>, overrides: I) -> Vec<(String, String)>
where
    I: IntoIterator<Item = &'a (String, String)>,
{
    for (name, value) in overrides {
        match base
            .iter_mut()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(name))
        {
            Some(slot) => slot.1.clone_from(value),
            None => base.push((name.clone(), value.clone())),
        }
    }
    base
}

/// `name` if it can travel in a header value, otherwise `unknown`.
fn header_safe_hostname(name: &str) -> String {
    if !name.is_empty() && name.bytes().all(|b| b.is_ascii_graphic()) {
        name.to_owned()
    } else {
        UNKNOWN_HOST.to_owned()
    }
}

/// Numeric part of the calling thread's identifier.
fn current_thread_id() -> String {
    let raw = format!("{:?}", thread::current().id());
    raw.trim_start_matches("ThreadId(")
        .trim_end_matches(')')
        .to_owned()
}
