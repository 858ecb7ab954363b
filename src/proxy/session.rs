//! Per-connection proxy state machine.
//!
//! The session is pure state: it receives reactor events and answers with
//! the ordered I/O actions the driver must perform. No sockets live here,
//! which keeps every transition unit-testable.

use bytes::{Bytes, BytesMut};

use crate::http::request::ParsedRequest;

/// Synthetic reply sent to the client once a tunnel's upstream leg is up.
pub const CONNECTION_ESTABLISHED: &[u8] = b"HTTP/1.1 200 Connection Established\r\n\r\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Upstream connect issued, not yet resolved.
    AwaitingUpstream,
    /// Both legs up; bytes flow unmodified in both directions.
    Relaying,
    /// Terminal. Every further event is a no-op.
    Closed,
}

/// Everything the reactor can tell a session about its two legs.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    UpstreamConnected,
    UpstreamConnectFailed,
    ClientBytes(Bytes),
    UpstreamBytes(Bytes),
    ClientClosed,
    UpstreamClosed,
    UpstreamFailed,
}

/// I/O the driver must perform after a transition, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionAction {
    SendClient(Bytes),
    SendUpstream(Bytes),
    CloseClient,
    CloseUpstream,
    /// The session is finished; drop its registry entry.
    Remove,
}

pub struct ProxySession {
    state: SessionState,
    is_tunnel: bool,
    host: String,
    port: u16,
    /// Client bytes queued while the upstream connect is in flight. For a
    /// forward session this starts as the raw first packet; the CONNECT
    /// line of a tunnel is never queued.
    pending: BytesMut,
    client_open: bool,
    upstream_open: bool,
}

impl ProxySession {
    pub fn new(request: &ParsedRequest) -> Self {
        let mut pending = BytesMut::new();
        if !request.is_tunnel {
            pending.extend_from_slice(&request.raw);
        }

        Self {
            state: SessionState::AwaitingUpstream,
            is_tunnel: request.is_tunnel,
            host: request.host.clone(),
            port: request.port,
            pending,
            client_open: true,
            upstream_open: false,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_tunnel(&self) -> bool {
        self.is_tunnel
    }

    /// Dial target for the upstream leg.
    pub fn upstream_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Applies one reactor event and returns the I/O to perform.
    pub fn on_event(&mut self, event: SessionEvent) -> Vec<SessionAction> {
        match self.state {
            SessionState::AwaitingUpstream => self.on_awaiting(event),
            SessionState::Relaying => self.on_relaying(event),
            SessionState::Closed => Vec::new(),
        }
    }

    fn on_awaiting(&mut self, event: SessionEvent) -> Vec<SessionAction> {
        match event {
            SessionEvent::UpstreamConnected => {
                self.upstream_open = true;
                self.state = SessionState::Relaying;

                let mut actions = Vec::new();
                if self.is_tunnel {
                    actions.push(SessionAction::SendClient(Bytes::from_static(
                        CONNECTION_ESTABLISHED,
                    )));
                }
                if !self.pending.is_empty() {
                    // Queued bytes go out exactly once, in arrival order.
                    actions.push(SessionAction::SendUpstream(self.pending.split().freeze()));
                }
                actions
            }

            SessionEvent::UpstreamConnectFailed => {
                // The source left the client dangling here; we close it.
                self.state = SessionState::Closed;
                self.client_open = false;
                vec![SessionAction::CloseClient, SessionAction::Remove]
            }

            SessionEvent::ClientBytes(bytes) => {
                self.pending.extend_from_slice(&bytes);
                Vec::new()
            }

            SessionEvent::ClientClosed => {
                self.state = SessionState::Closed;
                self.client_open = false;
                // No upstream leg exists yet; the driver abandons the
                // in-flight connect when the session goes away.
                vec![SessionAction::Remove]
            }

            SessionEvent::UpstreamClosed | SessionEvent::UpstreamFailed => {
                self.state = SessionState::Closed;
                if self.client_open {
                    self.client_open = false;
                    vec![SessionAction::CloseClient, SessionAction::Remove]
                } else {
                    vec![SessionAction::Remove]
                }
            }

            // No upstream bytes can exist before the connect resolves.
            SessionEvent::UpstreamBytes(_) => Vec::new(),
        }
    }

    fn on_relaying(&mut self, event: SessionEvent) -> Vec<SessionAction> {
        match event {
            SessionEvent::ClientBytes(bytes) => {
                if self.upstream_open {
                    vec![SessionAction::SendUpstream(bytes)]
                } else {
                    Vec::new()
                }
            }

            SessionEvent::UpstreamBytes(bytes) => {
                // A closed-but-not-yet-reaped client is a no-op, not a fault.
                if self.client_open {
                    vec![SessionAction::SendClient(bytes)]
                } else {
                    Vec::new()
                }
            }

            SessionEvent::ClientClosed => {
                self.state = SessionState::Closed;
                self.client_open = false;
                let mut actions = Vec::new();
                if self.upstream_open {
                    self.upstream_open = false;
                    actions.push(SessionAction::CloseUpstream);
                }
                actions.push(SessionAction::Remove);
                actions
            }

            SessionEvent::UpstreamClosed | SessionEvent::UpstreamFailed => {
                self.state = SessionState::Closed;
                self.upstream_open = false;
                let mut actions = Vec::new();
                if self.client_open {
                    self.client_open = false;
                    actions.push(SessionAction::CloseClient);
                }
                actions.push(SessionAction::Remove);
                actions
            }

            // Connect already settled; a duplicate resolution is a no-op.
            SessionEvent::UpstreamConnected | SessionEvent::UpstreamConnectFailed => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn forward_request(raw: &'static [u8]) -> ParsedRequest {
        ParsedRequest {
            method: "GET".to_string(),
            target: "http://example.com/".to_string(),
            host: "example.com".to_string(),
            port: 80,
            is_tunnel: false,
            raw: Bytes::from_static(raw),
        }
    }

    #[test]
    fn forward_session_flushes_raw_bytes_on_connect() {
        let raw = b"GET / HTTP/1.1\r\nHost: example.com\r\n\r\n";
        let mut session = ProxySession::new(&forward_request(raw));

        let actions = session.on_event(SessionEvent::UpstreamConnected);

        assert_eq!(
            actions,
            vec![SessionAction::SendUpstream(Bytes::from_static(raw))]
        );
        assert_eq!(session.state(), SessionState::Relaying);
    }
}
