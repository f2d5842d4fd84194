//! Minimal HTTP responder shared by the integration tests.

use std::io::{BufRead, BufReader, Read, Write};
use std::net::{SocketAddr, TcpListener};
use std::thread;
use std::time::Duration;

use femtobatch::{BackoffOverrides, TransportBuilder};

/// Answer successive connections with the given `(status, body)` pairs.
///
/// Requests are drained but not captured. The listener is dropped after the
/// last reply.
pub fn spawn_responder(replies: Vec<(u16, &'static str)>) -> SocketAddr {
    let listener = TcpListener::bind(("127.0.0.1", 0)).expect("bind ephemeral listener");
    let addr = listener.local_addr().expect("listener has address");

    thread::spawn(move || {
        for (status, body) in replies {
            let Ok((mut stream, _)) = listener.accept() else {
                break;
            };
            let _ = stream.set_read_timeout(Some(Duration::from_secs(5)));
            let mut reader = BufReader::new(stream.try_clone().expect("clone stream"));
            let mut content_length = 0usize;
            loop {
                let mut line = String::new();
                if reader.read_line(&mut line).unwrap_or(0) == 0 || line.trim().is_empty() {
                    break;
                }
                if let Some((key, value)) = line.split_once(':')
                    && key.trim().eq_ignore_ascii_case("content-length")
                {
                    content_length = value.trim().parse().unwrap_or(0);
                }
            }
            let mut request_body = vec![0u8; content_length];
            let _ = reader.read_exact(&mut request_body);

            let response = format!(
                "HTTP/1.1 {status} Status\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            let _ = stream.write_all(response.as_bytes());
        }
    });

    addr
}

/// Address with nothing listening on it.
pub fn refused_addr() -> SocketAddr {
    let listener = TcpListener::bind(("127.0.0.1", 0)).expect("bind ephemeral listener");
    listener.local_addr().expect("listener has address")
}

/// Builder aimed at `addr` with millisecond backoff and short timeouts.
pub fn fast_builder(addr: SocketAddr, retries: i64) -> TransportBuilder {
    TransportBuilder::new()
        .with_url(format!("http://{addr}/batch"))
        .with_retries(retries)
        .with_open_timeout_ms(2_000)
        .with_read_timeout_ms(2_000)
        .with_backoff(
            BackoffOverrides::new()
                .with_min_timeout_ms(1)
                .with_max_timeout_ms(2)
                .with_randomization_factor(0.0),
        )
}
