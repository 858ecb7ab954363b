use bytes::Bytes;

/// The classified first request of a client connection.
///
/// Produced once per connection by the sniffer and consumed immediately to
/// open the matching proxy session.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedRequest {
    /// Request method as written by the client (e.g. "GET", "CONNECT").
    pub method: String,
    /// Request target from the request line, unused beyond logging.
    pub target: String,
    /// Bare host from the Host header. An explicit port in the header is
    /// dropped and never overrides `port`.
    pub host: String,
    /// 443 for CONNECT, 80 otherwise.
    pub port: u16,
    /// True for CONNECT: bytes after the handshake are opaque payload.
    pub is_tunnel: bool,
    /// The raw first packet, forwarded verbatim upstream for plain HTTP.
    pub raw: Bytes,
}

impl ParsedRequest {
    /// Dial target for the upstream leg.
    pub fn upstream_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
