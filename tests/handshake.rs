//! Handshake and peer lifecycle: version/verack exchange, timeouts,
//! self-connection and external address learning.

mod common;

use std::time::Duration;

use common::{public_addr, version_payload, Harness};
use peerwatch::config::NetworkConfig;
use peerwatch::network::{NetworkEvent, PoolEvent, SessionState, TimerEvent};
use peerwatch::wire::parse::parse_version;
use peerwatch::wire::Command;

#[tokio::test(start_paused = true)]
async fn test_connect_sends_version_first() {
    let mut h = Harness::new();
    let peer = h.connect(1);

    let sent = h.pool.sent_to(peer);
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, Command::Version);

    let version = parse_version(&sent[0].1).unwrap();
    assert_eq!(version.version, 70000);
    assert_eq!(version.nonce, h.session.nonce());
    assert_eq!(version.height, 0);
    assert!(version.client.starts_with("/peerwatch:"));
    assert_eq!(version.addr_recv.host, "10.0.0.1");
    assert_eq!(version.addr_recv.port, 8333);
    assert!(!h.session.peer(peer).unwrap().is_active());
}

#[tokio::test(start_paused = true)]
async fn test_full_handshake_runs_session_once() {
    let mut h = Harness::new();
    assert_eq!(h.session.state(), SessionState::Launching);

    let first = h.activate(1);
    let second = h.activate(2);

    assert_eq!(h.session.state(), SessionState::Running);
    assert_eq!(h.session.active_peer_count(), 2);
    assert_eq!(
        h.pool.commands_to(first),
        vec![Command::Version, Command::Verack]
    );
    assert_eq!(
        h.pool.commands_to(second),
        vec![Command::Version, Command::Verack]
    );

    let running = h
        .drain_events()
        .into_iter()
        .filter(|e| matches!(e, NetworkEvent::Running))
        .count();
    assert_eq!(running, 1);

    let remote = h.session.peer(first).unwrap().remote.clone().unwrap();
    assert_eq!(remote.client, "/Satoshi:0.21.0/");
    assert_eq!(remote.height, 700_000);
}

#[tokio::test(start_paused = true)]
async fn test_connected_to_self() {
    let mut h = Harness::new();
    let peer = h.connect(1);
    let nonce = h.session.nonce();
    h.drain_events();

    h.deliver(peer, Command::Version, version_payload(nonce, public_addr()));

    assert_eq!(h.pool.removal_reason(peer).as_deref(), Some("connected to self"));
    assert!(h.session.peer(peer).is_none());
    assert_eq!(h.session.state(), SessionState::Launching);
    // Neither the version nor a Running event is published.
    assert!(h.drain_events().is_empty());
    assert!(!h.pool.commands_to(peer).contains(&Command::Verack));
}

#[tokio::test(start_paused = true)]
async fn test_version_timeout_evicts() {
    let mut h = Harness::new();
    let peer = h.connect(1);
    let start = tokio::time::Instant::now();

    let event = h.session.next_timer().await.unwrap();
    assert_eq!(event, TimerEvent::VersionTimeout { peer });
    assert!(start.elapsed() >= Duration::from_secs(10));
    assert_eq!(
        h.pool.removal_reason(peer).as_deref(),
        Some("no version received")
    );
    assert!(h.session.peer(peer).is_none());
}

#[tokio::test(start_paused = true)]
async fn test_verack_timeout_evicts() {
    let mut h = Harness::new();
    let peer = h.connect(1);
    h.deliver(peer, Command::Version, version_payload([1; 8], public_addr()));

    let event = h.session.next_timer().await.unwrap();
    assert_eq!(event, TimerEvent::VerackTimeout { peer });
    assert_eq!(
        h.pool.removal_reason(peer).as_deref(),
        Some("no acknowledgment received")
    );
    assert_eq!(h.session.state(), SessionState::Launching);
}

#[tokio::test(start_paused = true)]
async fn test_stale_handshake_timers_are_noops() {
    let mut h = Harness::new();
    let peer = h.activate(1);

    h.session.handle_timer(TimerEvent::VersionTimeout { peer });
    h.session.handle_timer(TimerEvent::VerackTimeout { peer });
    assert!(h.pool.removal_reason(peer).is_none());
    assert!(h.session.peer(peer).unwrap().is_active());

    // Timers for a departed peer do nothing either.
    h.session.handle_pool_event(PoolEvent::PeerRemoved { peer });
    h.session.handle_timer(TimerEvent::VersionTimeout { peer });
    assert!(h.pool.recorded.lock().removed.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_verack_before_version() {
    let mut h = Harness::new();
    let peer = h.connect(1);

    h.deliver(peer, Command::Verack, Vec::new());
    assert!(!h.session.peer(peer).unwrap().is_active());

    h.deliver(peer, Command::Version, version_payload([1; 8], public_addr()));
    assert!(h.session.peer(peer).unwrap().is_active());
    assert_eq!(h.session.state(), SessionState::Running);
}

#[tokio::test(start_paused = true)]
async fn test_external_address_learned_once() {
    let mut h = Harness::new();
    h.activate(1);
    h.activate(2);

    let learned: Vec<String> = h
        .diagnostics()
        .into_iter()
        .filter(|m| m.starts_with("External address"))
        .collect();
    assert_eq!(learned, vec!["External address discovered to be 203.0.113.5"]);

    let expected = peerwatch::wire::address::host_bytes(public_addr().ip());
    assert_eq!(h.session.external_address(), Some(expected));

    // The next version we send advertises it.
    let peer = h.connect(3);
    let ours = parse_version(&h.pool.sent_to(peer)[0].1).unwrap();
    assert_eq!(ours.addr_from.host, "203.0.113.5");
}

#[tokio::test(start_paused = true)]
async fn test_unroutable_external_address_ignored() {
    let mut h = Harness::new();
    let peer = h.connect(1);
    h.deliver(
        peer,
        Command::Version,
        version_payload([1; 8], "127.0.0.1:8333".parse().unwrap()),
    );
    assert_eq!(h.session.external_address(), None);
}

#[tokio::test(start_paused = true)]
async fn test_configured_external_address_is_kept() {
    let config = NetworkConfig {
        external_address: Some("198.51.100.7".to_string()),
        ..NetworkConfig::default()
    };
    let mut h = Harness::with_config(config);
    h.activate(1);

    let configured = peerwatch::wire::address::host_bytes("198.51.100.7".parse().unwrap());
    assert_eq!(h.session.external_address(), Some(configured));
    assert!(!h
        .diagnostics()
        .iter()
        .any(|m| m.starts_with("External address")));
}

#[tokio::test(start_paused = true)]
async fn test_malformed_version_leaves_peer_waiting() {
    let mut h = Harness::new();
    let peer = h.connect(1);
    let mut payload = version_payload([1; 8], public_addr());
    payload.truncate(50);

    h.deliver(peer, Command::Version, payload);
    assert!(!h.session.peer(peer).unwrap().version_received());

    h.session.next_timer().await.unwrap();
    assert_eq!(
        h.pool.removal_reason(peer).as_deref(),
        Some("no version received")
    );
}
