//! First-packet inspection.
//!
//! The proxy never parses HTTP beyond the first packet of a connection.
//! That packet is enough to answer the only two questions the proxy has:
//! where to dial upstream (the `Host` header) and whether the client wants
//! a plain forward or an opaque CONNECT tunnel.
//!
//! - **`sniffer`**: classifies the first byte buffer of a connection
//! - **`request`**: the resulting [`request::ParsedRequest`]
//!
//! Everything after classification is relayed as opaque bytes by the
//! proxy session (see [`crate::proxy`]).

pub mod request;
pub mod sniffer;
