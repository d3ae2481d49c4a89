//! Byte-level HTTP executor for firmware that breaks HTTP framing.
//!
//! Legacy units answer with status lines missing the version, header lines
//! without colons, bare `\n` line endings, or no header block at all. This
//! executor writes an HTTP/1.0 request by hand and parses whatever comes back
//! as forgivingly as possible.

use std::io::{ErrorKind, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::{Duration, Instant};

use tracing::{debug, instrument, trace};

use super::traits::{HttpRequest, HttpResponse, Method, RequestExecutor, TransportError};
use crate::device::DeviceAddress;

const READ_CHUNK: usize = 4096;

/// Tolerant executor over a plain TCP socket.
#[derive(Debug, Default, Clone, Copy)]
pub struct LenientExecutor;

impl LenientExecutor {
    pub fn new() -> Self {
        Self
    }

    fn connect(address: &DeviceAddress, timeout: Duration) -> Result<TcpStream, TransportError> {
        let failed = |message: String| TransportError::ConnectionFailed {
            address: address.to_string(),
            message,
        };

        let addrs = (address.host.as_str(), address.port)
            .to_socket_addrs()
            .map_err(|e| failed(e.to_string()))?;

        let mut last_err = failed("no addresses resolved".into());
        for addr in addrs {
            match TcpStream::connect_timeout(&addr, timeout) {
                Ok(stream) => return Ok(stream),
                Err(e) if e.kind() == ErrorKind::TimedOut => {
                    last_err = TransportError::timeout(timeout)
                }
                Err(e) => last_err = failed(e.to_string()),
            }
        }
        Err(last_err)
    }
}

impl RequestExecutor for LenientExecutor {
    #[instrument(level = "debug", skip(self, request), fields(method = %request.method, path = %request.path))]
    fn execute(
        &self,
        address: &DeviceAddress,
        request: &HttpRequest,
        timeout: Duration,
    ) -> Result<HttpResponse, TransportError> {
        let deadline = Instant::now() + timeout;
        let mut stream = Self::connect(address, timeout)?;
        stream.set_write_timeout(Some(timeout))?;
        stream.write_all(&encode_request(address, request))?;
        stream.flush()?;

        let mut raw = Vec::new();
        let mut chunk = [0u8; READ_CHUNK];
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                if raw.is_empty() {
                    return Err(TransportError::timeout(timeout));
                }
                break;
            }
            stream.set_read_timeout(Some(remaining))?;

            match stream.read(&mut chunk) {
                Ok(0) => break,
                Ok(n) => {
                    raw.extend_from_slice(&chunk[..n]);
                    trace!(bytes = n, total = raw.len(), "Lenient read");
                    if is_complete(&raw, request.method) {
                        break;
                    }
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                // Some firmware never closes the socket; keep what arrived.
                Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                    if raw.is_empty() {
                        return Err(TransportError::timeout(timeout));
                    }
                    break;
                }
                Err(e) if !raw.is_empty() => {
                    debug!(error = %e, "Connection dropped after partial response");
                    break;
                }
                Err(e) => return Err(e.into()),
            }
        }

        let response = parse_raw_response(&raw)?;
        debug!(status = response.status, bytes = response.body.len(), "Lenient response");
        Ok(response)
    }

    fn name(&self) -> &'static str {
        "lenient"
    }
}

/// Serialize `request` as HTTP/1.0 bytes.
pub fn encode_request(address: &DeviceAddress, request: &HttpRequest) -> Vec<u8> {
    let mut head = format!(
        "{} {} HTTP/1.0\r\nHost: {}\r\nConnection: close\r\n",
        request.method, request.path, address
    );
    for (name, value) in &request.headers {
        if name.eq_ignore_ascii_case("host") || name.eq_ignore_ascii_case("connection") {
            continue;
        }
        head.push_str(&format!("{name}: {value}\r\n"));
    }
    if let Some(body) = &request.body
        && request.header_value("content-length").is_none()
    {
        head.push_str(&format!("Content-Length: {}\r\n", body.len()));
    }
    head.push_str("\r\n");

    let mut bytes = head.into_bytes();
    if let Some(body) = &request.body {
        bytes.extend_from_slice(body);
    }
    bytes
}

/// Offset of the blank line ending the header block and its length.
fn header_end(raw: &[u8]) -> Option<(usize, usize)> {
    let crlf = raw.windows(4).position(|w| w == b"\r\n\r\n").map(|p| (p, 4));
    let lf = raw.windows(2).position(|w| w == b"\n\n").map(|p| (p, 2));
    match (crlf, lf) {
        (Some(a), Some(b)) => Some(if a.0 <= b.0 { a } else { b }),
        (a, b) => a.or(b),
    }
}

/// `HTTP/1.1 200 OK`, `HTTP 200` and a version-less `200 OK` all count.
fn looks_like_status_line(raw: &[u8]) -> bool {
    let start = raw.iter().position(|b| !b.is_ascii_whitespace()).unwrap_or(0);
    let line = &raw[start..];
    if line.get(..4).is_some_and(|p| p.eq_ignore_ascii_case(b"HTTP")) {
        return true;
    }
    let token_len = line
        .iter()
        .position(|b| b.is_ascii_whitespace())
        .unwrap_or(line.len());
    token_len == 3 && line[..3].iter().all(u8::is_ascii_digit)
}

/// Whether enough has arrived to stop reading before EOF.
fn is_complete(raw: &[u8], method: Method) -> bool {
    let Some((pos, sep)) = header_end(raw) else {
        return false;
    };
    if method == Method::Head {
        return true;
    }
    match content_length(&String::from_utf8_lossy(&raw[..pos])) {
        Some(len) => raw.len() >= pos + sep + len,
        None => false,
    }
}

fn content_length(head: &str) -> Option<usize> {
    head.lines().find_map(|line| {
        let (name, value) = line.split_once(':')?;
        name.trim()
            .eq_ignore_ascii_case("content-length")
            .then(|| value.trim().parse().ok())
            .flatten()
    })
}

/// Parse a raw response, tolerating framing violations.
///
/// - no status line at all: the whole payload is a 200 body
/// - status = first three-digit token of the first line
/// - header lines without `:` are skipped
pub fn parse_raw_response(raw: &[u8]) -> Result<HttpResponse, TransportError> {
    if raw.is_empty() {
        return Err(TransportError::MalformedResponse("empty response".into()));
    }
    if !looks_like_status_line(raw) {
        return Ok(HttpResponse::ok(raw.to_vec()));
    }

    let (head, body) = match header_end(raw) {
        Some((pos, sep)) => (&raw[..pos], &raw[pos + sep..]),
        None => (raw, &[][..]),
    };
    let head = String::from_utf8_lossy(head);
    let mut lines = head.lines().map(|l| l.trim_end_matches('\r'));

    let status_line = lines.next().unwrap_or_default();
    let status = status_line
        .split(|c: char| !c.is_ascii_digit())
        .find(|tok| tok.len() == 3)
        .and_then(|tok| tok.parse::<u16>().ok())
        .ok_or_else(|| {
            TransportError::MalformedResponse(format!("no status code in '{status_line}'"))
        })?;

    let headers: Vec<(String, String)> = lines
        .filter_map(|line| {
            let (name, value) = line.split_once(':')?;
            let name = name.trim();
            (!name.is_empty()).then(|| (name.to_ascii_lowercase(), value.trim().to_string()))
        })
        .collect();

    let mut body = body.to_vec();
    if let Some(len) = headers
        .iter()
        .find(|(k, _)| k == "content-length")
        .and_then(|(_, v)| v.parse::<usize>().ok())
        && body.len() > len
    {
        body.truncate(len);
    }

    Ok(HttpResponse {
        status,
        headers,
        body,
    })
}
