//! Portway - Transparent HTTP Forward Proxy
//!
//! Core library for request sniffing, proxy session management and
//! bidirectional byte relaying.

pub mod config;
pub mod fault;
pub mod http;
pub mod proxy;
pub mod server;
