//! Ownership of all live proxy sessions.
//!
//! One map, keyed by the reactor-assigned connection id, passed explicitly
//! to whoever handles events. A session exists iff its entry does: the
//! registry itself executes `Remove` actions against the map, so callers
//! can never leave a closed session behind.

use std::collections::HashMap;

use bytes::Bytes;

use crate::http::request::ParsedRequest;
use crate::http::sniffer::{self, SniffError};
use crate::proxy::session::{ProxySession, SessionAction, SessionEvent, SessionState};

/// Opaque client connection identity assigned by the listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnId(pub u64);

impl std::fmt::Display for ConnId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Outcome of routing a data event for a connection id.
#[derive(Debug)]
pub enum Admission {
    /// Unseen id, first packet classified; dial `upstream_addr` next.
    Created { upstream_addr: String, is_tunnel: bool },
    /// Established session; the bytes were routed straight to it,
    /// bypassing the sniffer.
    Existing(Vec<SessionAction>),
    /// Malformed first packet. The caller closes the client connection;
    /// no upstream is ever dialed and no session was stored.
    Rejected(SniffError),
}

#[derive(Default)]
pub struct SessionRegistry {
    sessions: HashMap<ConnId, ProxySession>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lookup-or-create for a data event. Only the first packet of an
    /// unseen id is sniffed; everything after that is relayed opaquely.
    pub fn admit(&mut self, id: ConnId, bytes: Bytes) -> Admission {
        if self.sessions.contains_key(&id) {
            return Admission::Existing(self.apply(id, SessionEvent::ClientBytes(bytes)));
        }

        match sniffer::sniff(bytes) {
            Ok(request) => self.open(id, &request),
            Err(e) => Admission::Rejected(e),
        }
    }

    /// Stores a session for an already-classified request. At most one
    /// session may exist per id; `admit` guarantees that by checking the
    /// map before sniffing.
    pub fn open(&mut self, id: ConnId, request: &ParsedRequest) -> Admission {
        debug_assert!(!self.sessions.contains_key(&id));

        let session = ProxySession::new(request);
        let upstream_addr = session.upstream_addr();
        let is_tunnel = session.is_tunnel();
        self.sessions.insert(id, session);
        Admission::Created {
            upstream_addr,
            is_tunnel,
        }
    }

    /// Applies one reactor event to the session for `id`, if any. A
    /// `Remove` among the returned actions has already been executed
    /// against the map. Events for unknown ids are no-ops.
    pub fn apply(&mut self, id: ConnId, event: SessionEvent) -> Vec<SessionAction> {
        let Some(session) = self.sessions.get_mut(&id) else {
            return Vec::new();
        };

        let actions = session.on_event(event);
        if actions.contains(&SessionAction::Remove) {
            self.sessions.remove(&id);
        }
        actions
    }

    /// Reactor-level close of the client connection.
    pub fn remove(&mut self, id: ConnId) -> Vec<SessionAction> {
        self.apply(id, SessionEvent::ClientClosed)
    }

    pub fn contains(&self, id: ConnId) -> bool {
        self.sessions.contains_key(&id)
    }

    pub fn state_of(&self, id: ConnId) -> Option<SessionState> {
        self.sessions.get(&id).map(|s| s.state())
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
