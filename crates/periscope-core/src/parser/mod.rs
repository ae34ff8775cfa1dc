//! HTTP/1.1 request head reader and parser
//!
//! Only the request line and headers are read. Bodies are never consumed:
//! every connection serves a single request and is then closed.

mod decode;
mod method;

pub use decode::{decode_or_keep, percent_decode};
pub use method::Method;

use smallvec::SmallVec;
use std::io::{self, Read};

/// Maximum number of headers kept per request
pub const MAX_HEADERS: usize = 64;

const READ_CHUNK: usize = 1024;

/// Request line and headers before path normalization
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRequest {
    /// Verb exactly as sent
    pub method: String,
    /// Request target (path plus optional query)
    pub target: String,
    /// Headers, lowercase names and trimmed values
    pub headers: SmallVec<[(String, String); 16]>,
}

/// Read a request head
///
/// Stops at the first blank line (`\r\n\r\n` or `\n\n`), at EOF, or once
/// `limit` bytes are buffered. Hitting the limit is not an error: the
/// truncated head is returned and parsed best-effort.
pub fn read_head<R: Read>(reader: &mut R, limit: usize) -> io::Result<Vec<u8>> {
    let mut buf = Vec::with_capacity(READ_CHUNK.min(limit));
    let mut chunk = [0u8; READ_CHUNK];

    while buf.len() < limit {
        let want = READ_CHUNK.min(limit - buf.len());
        let n = match reader.read(&mut chunk[..want]) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };

        // Rescan a few bytes back so a terminator split across reads is found
        let scan_from = buf.len().saturating_sub(3);
        buf.extend_from_slice(&chunk[..n]);
        if let Some(end) = find_head_end(&buf[scan_from..]) {
            buf.truncate(scan_from + end);
            break;
        }
    }

    Ok(buf)
}

/// Offset just past the head terminator, if present
fn find_head_end(buf: &[u8]) -> Option<usize> {
    let mut i = 0;
    while i < buf.len() {
        if buf[i] == b'\n' {
            if buf.get(i + 1) == Some(&b'\n') {
                return Some(i + 2);
            }
            if buf.get(i + 1) == Some(&b'\r') && buf.get(i + 2) == Some(&b'\n') {
                return Some(i + 3);
            }
        }
        i += 1;
    }
    None
}

/// Parse a request head
///
/// Returns `None` when the request line does not carry at least a method
/// and a target.
pub fn parse_head(head: &[u8]) -> Option<RawRequest> {
    let text = String::from_utf8_lossy(head);
    let mut lines = text.lines();

    let mut parts = lines.next()?.split(' ').filter(|s| !s.is_empty());
    let method = parts.next()?.to_string();
    let target = parts.next()?.to_string();

    let mut headers = SmallVec::new();
    for line in lines {
        if headers.len() >= MAX_HEADERS {
            break;
        }
        match line.find(':') {
            Some(colon) if colon > 0 => {
                headers.push((
                    line[..colon].trim().to_ascii_lowercase(),
                    line[colon + 1..].trim().to_string(),
                ));
            }
            _ => {}
        }
    }

    Some(RawRequest {
        method,
        target,
        headers,
    })
}
