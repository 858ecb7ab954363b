use bytes::Bytes;

use crate::http::request::ParsedRequest;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SniffError {
    /// Unparseable request line or missing/empty Host header.
    MalformedRequest,
}

/// Classifies the first packet of a client connection.
///
/// Only the request line and the Host header are inspected; the buffer is
/// carried through unchanged so a plain-HTTP session can forward it
/// verbatim. Anything that does not yield a method, a target and a
/// non-empty host is `MalformedRequest` and the connection gets closed
/// without ever dialing upstream.
pub fn sniff(first: Bytes) -> Result<ParsedRequest, SniffError> {
    let header_end = first
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .map(|pos| pos + 2)
        .unwrap_or(first.len());

    let head =
        std::str::from_utf8(&first[..header_end]).map_err(|_| SniffError::MalformedRequest)?;

    let mut lines = head.split("\r\n");

    // Request line: method, target, protocol version.
    let request_line = lines.next().ok_or(SniffError::MalformedRequest)?;
    let mut parts = request_line.split_whitespace();
    let method = parts.next().ok_or(SniffError::MalformedRequest)?;
    let target = parts.next().ok_or(SniffError::MalformedRequest)?;
    let _version = parts.next().ok_or(SniffError::MalformedRequest)?;

    // Case-sensitive "Host:" marker, last match wins. Only the bare host
    // before any embedded port is kept; the port never overrides the
    // method-derived default below.
    let mut host = "";
    for line in lines {
        if line.contains("Host:") {
            if let Some((_, value)) = line.split_once(':') {
                host = value.split(':').next().unwrap_or("").trim();
            }
        }
    }

    if host.is_empty() {
        return Err(SniffError::MalformedRequest);
    }

    let is_tunnel = method.eq_ignore_ascii_case("CONNECT");
    let port = if is_tunnel { 443 } else { 80 };

    Ok(ParsedRequest {
        method: method.to_string(),
        target: target.to_string(),
        host: host.to_string(),
        port,
        is_tunnel,
        raw: first,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sniff_plain_get() {
        let first = Bytes::from_static(b"GET http://example.com/ HTTP/1.1\r\nHost: example.com\r\n\r\n");
        let parsed = sniff(first.clone()).unwrap();

        assert_eq!(parsed.host, "example.com");
        assert_eq!(parsed.port, 80);
        assert!(!parsed.is_tunnel);
        assert_eq!(parsed.raw, first);
    }
}
