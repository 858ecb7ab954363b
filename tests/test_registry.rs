//! Tests for session registry admission and lifecycle invariants.

use bytes::Bytes;
use portway::http::sniffer::SniffError;
use portway::proxy::registry::{Admission, ConnId, SessionRegistry};
use portway::proxy::session::{SessionAction, SessionEvent, SessionState};

const FORWARD: &[u8] = b"GET http://example.com/ HTTP/1.1\r\nHost: example.com\r\n\r\n";
const TUNNEL: &[u8] = b"CONNECT example.com:443 HTTP/1.1\r\nHost: example.com\r\n\r\n";

#[test]
fn test_first_packet_creates_a_session() {
    let mut registry = SessionRegistry::new();

    let admission = registry.admit(ConnId(1), Bytes::from_static(FORWARD));

    match admission {
        Admission::Created {
            upstream_addr,
            is_tunnel,
        } => {
            assert_eq!(upstream_addr, "example.com:80");
            assert!(!is_tunnel);
        }
        other => panic!("expected Created, got {other:?}"),
    }
    assert!(registry.contains(ConnId(1)));
    assert_eq!(
        registry.state_of(ConnId(1)),
        Some(SessionState::AwaitingUpstream)
    );
}

#[test]
fn test_connect_packet_creates_a_tunnel_session() {
    let mut registry = SessionRegistry::new();

    match registry.admit(ConnId(1), Bytes::from_static(TUNNEL)) {
        Admission::Created {
            upstream_addr,
            is_tunnel,
        } => {
            assert_eq!(upstream_addr, "example.com:443");
            assert!(is_tunnel);
        }
        other => panic!("expected Created, got {other:?}"),
    }
}

#[test]
fn test_malformed_first_packet_is_rejected_without_a_session() {
    let mut registry = SessionRegistry::new();

    match registry.admit(ConnId(1), Bytes::from_static(b"BLAH\r\n\r\n")) {
        Admission::Rejected(e) => assert_eq!(e, SniffError::MalformedRequest),
        other => panic!("expected Rejected, got {other:?}"),
    }
    assert!(registry.is_empty());
}

#[test]
fn test_later_packets_bypass_the_sniffer() {
    let mut registry = SessionRegistry::new();
    registry.admit(ConnId(1), Bytes::from_static(TUNNEL));
    registry.apply(ConnId(1), SessionEvent::UpstreamConnected);

    // Arbitrary non-HTTP bytes on an established session relay straight
    // through instead of being re-classified.
    match registry.admit(ConnId(1), Bytes::from_static(b"\x16\x03\x01garbage")) {
        Admission::Existing(actions) => {
            assert_eq!(
                actions,
                vec![SessionAction::SendUpstream(Bytes::from_static(
                    b"\x16\x03\x01garbage"
                ))]
            );
        }
        other => panic!("expected Existing, got {other:?}"),
    }
}

#[test]
fn test_remove_action_deletes_the_entry() {
    let mut registry = SessionRegistry::new();
    registry.admit(ConnId(1), Bytes::from_static(FORWARD));
    registry.apply(ConnId(1), SessionEvent::UpstreamConnected);

    let actions = registry.apply(ConnId(1), SessionEvent::ClientClosed);

    assert!(actions.contains(&SessionAction::Remove));
    assert!(!registry.contains(ConnId(1)));
}

#[test]
fn test_connect_failure_deletes_the_entry() {
    let mut registry = SessionRegistry::new();
    registry.admit(ConnId(1), Bytes::from_static(FORWARD));

    let actions = registry.apply(ConnId(1), SessionEvent::UpstreamConnectFailed);

    assert_eq!(
        actions,
        vec![SessionAction::CloseClient, SessionAction::Remove]
    );
    assert!(registry.is_empty());
}

#[test]
fn test_events_for_unknown_ids_are_noops() {
    let mut registry = SessionRegistry::new();

    assert!(
        registry
            .apply(ConnId(42), SessionEvent::UpstreamClosed)
            .is_empty()
    );
    assert!(registry.remove(ConnId(42)).is_empty());
}

#[test]
fn test_close_is_idempotent() {
    let mut registry = SessionRegistry::new();
    registry.admit(ConnId(1), Bytes::from_static(FORWARD));
    registry.apply(ConnId(1), SessionEvent::UpstreamConnected);

    let first = registry.remove(ConnId(1));
    let second = registry.remove(ConnId(1));

    assert!(first.contains(&SessionAction::Remove));
    assert!(second.is_empty());
}

#[test]
fn test_sessions_on_distinct_ids_are_isolated() {
    let mut registry = SessionRegistry::new();
    registry.admit(ConnId(1), Bytes::from_static(FORWARD));
    registry.admit(ConnId(2), Bytes::from_static(TUNNEL));
    registry.apply(ConnId(1), SessionEvent::UpstreamConnected);
    registry.apply(ConnId(2), SessionEvent::UpstreamConnected);

    // Bytes on one session never leak into the other.
    let actions = registry.apply(ConnId(1), SessionEvent::ClientBytes(Bytes::from_static(b"one")));
    assert_eq!(
        actions,
        vec![SessionAction::SendUpstream(Bytes::from_static(b"one"))]
    );

    // Closing one leaves the other untouched.
    registry.remove(ConnId(1));
    assert!(!registry.contains(ConnId(1)));
    assert_eq!(registry.state_of(ConnId(2)), Some(SessionState::Relaying));
    assert_eq!(registry.len(), 1);
}
