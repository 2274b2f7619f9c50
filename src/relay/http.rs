//! Minimal HTTP/1.1 message handling for the relay.
//!
//! Requests arrive over non-blocking sockets in arbitrary chunks, so
//! parsing is incremental: feed the whole read buffer, get back either
//! a complete request plus the byte count to drain, or a signal to
//! wait for more data.  Only the small subset the relay pages use is
//! supported (no chunked bodies, no continuation lines).

use std::fmt::Write as _;

/// Upper bound on a request head or body.  Anything larger is a
/// protocol violation from a local client and the connection drops.
pub const MAX_REQUEST_SIZE: usize = 65536;

// ── Requests ───────────────────────────────────────────────

/// A parsed request.  Header names are lowercased; the query string
/// is stripped from the path.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub method: String,
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl Request {
    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        let name = name.to_ascii_lowercase();
        self.headers
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, v)| v.as_str())
    }
}

/// Result of one incremental parse attempt.
#[derive(Debug)]
pub enum ParseOutcome {
    /// A full request; `consumed` bytes must be drained from the buffer.
    Complete { request: Request, consumed: usize },
    /// Not enough data yet.
    Partial,
    /// The stream is not speaking our HTTP subset.
    Invalid(&'static str),
}

/// Try to parse one request from the front of `buf`.
pub fn parse_request(buf: &[u8]) -> ParseOutcome {
    let Some(head_end) = find_blank_line(buf) else {
        if buf.len() > MAX_REQUEST_SIZE {
            return ParseOutcome::Invalid("header block too large");
        }
        return ParseOutcome::Partial;
    };

    let Ok(head) = std::str::from_utf8(&buf[..head_end]) else {
        return ParseOutcome::Invalid("header block is not valid UTF-8");
    };
    let mut lines = head.split("\r\n");

    let Some(request_line) = lines.next() else {
        return ParseOutcome::Invalid("empty request head");
    };
    let mut parts = request_line.split_whitespace();
    let (Some(method), Some(target), Some(version)) = (parts.next(), parts.next(), parts.next())
    else {
        return ParseOutcome::Invalid("malformed request line");
    };
    if parts.next().is_some() || !version.starts_with("HTTP/") {
        return ParseOutcome::Invalid("malformed request line");
    }

    let mut headers = Vec::new();
    for line in lines {
        let Some((name, value)) = line.split_once(':') else {
            return ParseOutcome::Invalid("malformed header line");
        };
        headers.push((name.trim().to_ascii_lowercase(), value.trim().to_string()));
    }

    let body_len = match headers.iter().find(|(n, _)| n == "content-length") {
        Some((_, v)) => match v.parse::<usize>() {
            Ok(n) if n <= MAX_REQUEST_SIZE => n,
            Ok(_) => return ParseOutcome::Invalid("body too large"),
            Err(_) => return ParseOutcome::Invalid("bad content-length"),
        },
        None => 0,
    };

    let body_start = head_end + 4;
    if buf.len() < body_start + body_len {
        return ParseOutcome::Partial;
    }
    let body = buf[body_start..body_start + body_len].to_vec();

    // Query strings are accepted but never routed on.
    let path = match target.split_once('?') {
        Some((path, _)) => path,
        None => target,
    };

    ParseOutcome::Complete {
        request: Request {
            method: method.to_string(),
            path: path.to_string(),
            headers,
            body,
        },
        consumed: body_start + body_len,
    }
}

fn find_blank_line(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n")
}

// ── Responses ──────────────────────────────────────────────

/// An outgoing response, serialized lazily into the write buffer.
#[derive(Debug, Clone)]
pub struct Response {
    pub status: u16,
    pub headers: Vec<(&'static str, String)>,
    pub body: Vec<u8>,
}

impl Response {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    pub fn text(status: u16, body: &str) -> Self {
        Self::new(status)
            .header("Content-Type", "text/plain; charset=utf-8")
            .with_body(body.as_bytes().to_vec())
    }

    pub fn html(body: &str) -> Self {
        Self::new(200)
            .header("Content-Type", "text/html; charset=utf-8")
            .with_body(body.as_bytes().to_vec())
    }

    pub fn json(status: u16, body: String) -> Self {
        Self::new(status)
            .header("Content-Type", "application/json")
            .with_body(body.into_bytes())
    }

    pub fn png(bytes: Vec<u8>) -> Self {
        Self::new(200)
            .header("Content-Type", "image/png")
            .with_body(bytes)
            .no_cache()
    }

    pub fn header(mut self, name: &'static str, value: &str) -> Self {
        self.headers.push((name, value.to_string()));
        self
    }

    /// Browsers cache camera stills aggressively without this.
    pub fn no_cache(self) -> Self {
        self.header("Cache-Control", "no-cache, no-store, must-revalidate")
            .header("Pragma", "no-cache")
            .header("Expires", "0")
    }

    pub fn with_body(mut self, body: Vec<u8>) -> Self {
        self.body = body;
        self
    }

    pub fn into_bytes(self) -> Vec<u8> {
        let mut head = String::new();
        let _ = write!(
            head,
            "HTTP/1.1 {} {}\r\nContent-Length: {}\r\n",
            self.status,
            status_reason(self.status),
            self.body.len(),
        );
        for (name, value) in &self.headers {
            let _ = write!(head, "{}: {}\r\n", name, value);
        }
        head.push_str("\r\n");

        let mut out = head.into_bytes();
        out.extend_from_slice(&self.body);
        out
    }
}

pub fn status_reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        400 => "Bad Request",
        404 => "Not Found",
        405 => "Method Not Allowed",
        429 => "Too Many Requests",
        500 => "Internal Server Error",
        _ => "Unknown",
    }
}

// ── Tests ──────────────────────────────────────────────────
