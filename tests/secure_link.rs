//! Secure tunneling against an in-process KNXnet/IP server.
//!
//! Every test runs the full handshake: X25519 key exchange, mutual
//! authentication, then a wrapped tunnel connection.
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test --test secure_link
//! RUST_LOG=knx_link=debug cargo test --test secure_link -- --nocapture
//! ```

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{bus_telegram, credentials, open_link, secure_config, spawn_server, ServerOptions};
use knx_link::link::{DisconnectReason, LinkEvent};
use knx_link::protocol::cemi::GroupService;
use knx_link::secure::{SecretKey, SecureCredentials, SessionState, MAX_INTEGRITY_FAILURES};
use knx_link::{ga, KnxError, LinkConfig, NetworkLink};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Skip events until one matching `wanted` arrives
async fn wait_for_event(
    events: &mut tokio::sync::broadcast::Receiver<LinkEvent>,
    wanted: impl Fn(&LinkEvent) -> bool,
) -> LinkEvent {
    loop {
        let event = tokio::time::timeout(Duration::from_secs(600), events.recv())
            .await
            .expect("event in time")
            .expect("event channel open");
        if wanted(&event) {
            return event;
        }
    }
}

#[tokio::test]
async fn test_secure_session_established() {
    init_logging();
    let (link, _server) = open_link(ServerOptions::default(), &secure_config()).await;

    assert_eq!(link.session_state().await, Some(SessionState::Established));
    assert_eq!(link.individual_address(), common::tunnel_address());
    assert!(matches!(link.subscribe().recv().await.unwrap(), LinkEvent::Connected));
}

#[tokio::test]
async fn test_indications_arrive_decrypted() {
    init_logging();
    let (link, server) = open_link(ServerOptions::default(), &secure_config()).await;
    let mut events = link.subscribe();

    server.indicate(bus_telegram(GroupService::Write, ga!(1 / 0 / 3), &[1]));
    let event = wait_for_event(&mut events, |e| matches!(e, LinkEvent::Indication(_))).await;
    let LinkEvent::Indication(frame) = event else {
        unreachable!()
    };
    assert_eq!(frame.destination_group(), Some(ga!(1 / 0 / 3)));
    assert_eq!(frame.source, common::peer_address());
    assert_eq!(&frame.data[..], &[1]);
}

#[tokio::test(start_paused = true)]
async fn test_missed_keep_alive_expires_session() {
    init_logging();
    let options = ServerOptions {
        heartbeat_acks: 5,
        ..ServerOptions::default()
    };
    let config = LinkConfig::tunneling()
        .with_security(credentials())
        .with_keep_alive(Duration::from_secs(60), Duration::from_secs(10));
    let (link, server) = open_link(options, &config).await;
    let mut events = link.subscribe();

    let event = wait_for_event(&mut events, LinkEvent::is_disconnect).await;
    assert!(matches!(event, LinkEvent::Disconnected(DisconnectReason::SessionTimeout)));
    assert_eq!(server.heartbeats(), 6);
    assert_eq!(link.session_state().await, Some(SessionState::Closed));
    assert!(link.is_closed());
}

#[tokio::test(start_paused = true)]
async fn test_acknowledged_keep_alives_keep_link_open() {
    init_logging();
    let config = LinkConfig::tunneling()
        .with_security(credentials())
        .with_keep_alive(Duration::from_secs(60), Duration::from_secs(10));
    let (link, server) = open_link(ServerOptions::default(), &config).await;

    tokio::time::sleep(Duration::from_secs(60 * 5 + 30)).await;
    assert_eq!(server.heartbeats(), 5);
    assert!(!link.is_closed());
    assert_eq!(link.session_state().await, Some(SessionState::Established));
}

#[tokio::test]
async fn test_wrong_device_code_fails_authentication() {
    init_logging();
    let options = ServerOptions {
        device_code: [0xDB; 16],
        ..ServerOptions::default()
    };
    let (client, _server) = spawn_server(options);
    let err = NetworkLink::open(Arc::new(client), &secure_config()).await.unwrap_err();

    match err {
        KnxError::Link(ref link_err) => {
            assert!(link_err.is_handshake());
            assert!(link_err.cause().is_some_and(KnxError::is_authentication_error));
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[tokio::test]
async fn test_wrong_user_key_fails_authentication() {
    init_logging();
    let (client, _server) = spawn_server(ServerOptions::default());
    let credentials = SecureCredentials::new(
        common::USER_ID,
        SecretKey::from_bytes([0x24; 16]),
        SecretKey::from_bytes(common::DEVICE_CODE),
        common::SERIAL,
    )
    .unwrap();
    let config = LinkConfig::tunneling().with_security(credentials);
    let err = NetworkLink::open(Arc::new(client), &config).await.unwrap_err();
    assert!(matches!(err, KnxError::Link(ref e) if e.cause().is_some_and(KnxError::is_authentication_error)));
}

#[tokio::test]
async fn test_replayed_frame_is_rejected() {
    init_logging();
    let (link, server) = open_link(ServerOptions::default(), &secure_config()).await;
    let mut events = link.subscribe();

    server.indicate(bus_telegram(GroupService::Write, ga!(1 / 0 / 3), &[1]));
    wait_for_event(&mut events, |e| matches!(e, LinkEvent::Indication(_))).await;

    server.replay_last();
    let event = wait_for_event(&mut events, |e| !matches!(e, LinkEvent::Connected)).await;
    match event {
        LinkEvent::FrameDropped(err) => {
            assert!(matches!(*err, KnxError::Security(ref e) if e.is_replay()));
        }
        other => panic!("unexpected event {other:?}"),
    }
    assert!(!link.is_closed());

    // Fresh frames still get through
    server.indicate(bus_telegram(GroupService::Write, ga!(1 / 0 / 3), &[0]));
    let event = wait_for_event(&mut events, |e| matches!(e, LinkEvent::Indication(_))).await;
    assert!(matches!(event, LinkEvent::Indication(ref frame) if frame.data[..] == [0]));
}

#[tokio::test]
async fn test_close_ends_server_session() {
    init_logging();
    let (link, server) = open_link(ServerOptions::default(), &secure_config()).await;
    let mut events = link.subscribe();

    link.close().await;
    let event = wait_for_event(&mut events, LinkEvent::is_disconnect).await;
    assert!(matches!(event, LinkEvent::Disconnected(DisconnectReason::Requested)));
    assert_eq!(link.session_state().await, Some(SessionState::Closed));

    server.task.await.unwrap();
    let log = server.log.lock().unwrap();
    assert!(log.disconnect_requested);
    assert!(log.session_closed);
}

#[tokio::test]
async fn test_plain_tunnel_against_same_server() {
    init_logging();
    let options = ServerOptions {
        secure: false,
        ..ServerOptions::default()
    };
    let config = LinkConfig::tunneling().with_keep_alive(Duration::ZERO, Duration::ZERO);
    let (link, mut server) = open_link(options, &config).await;
    assert_eq!(link.session_state().await, None);

    let frame = bus_telegram(GroupService::Read, ga!(1 / 0 / 3), &[]);
    link.send(&frame).await.unwrap();
    let sent = server.next_telegram().await;
    assert_eq!(sent.group_service(), Some(GroupService::Read));
}

#[tokio::test]
async fn test_corrupted_frames_close_session() {
    init_logging();
    let (link, server) = open_link(ServerOptions::default(), &secure_config()).await;
    let mut events = link.subscribe();

    for _ in 0..MAX_INTEGRITY_FAILURES {
        server.corrupt(bus_telegram(GroupService::Write, ga!(1 / 0 / 3), &[1]));
    }
    let event = wait_for_event(&mut events, LinkEvent::is_disconnect).await;
    assert!(matches!(event, LinkEvent::Disconnected(DisconnectReason::SessionClosed)));
    assert_eq!(link.session_state().await, Some(SessionState::Closed));
    assert!(link.is_closed());

    let frame = bus_telegram(GroupService::Read, ga!(1 / 0 / 3), &[]);
    assert!(link.send(&frame).await.unwrap_err().is_link_closed());
}

#[tokio::test]
async fn test_single_corrupted_frame_is_dropped() {
    init_logging();
    let (link, server) = open_link(ServerOptions::default(), &secure_config()).await;
    let mut events = link.subscribe();

    server.corrupt(bus_telegram(GroupService::Write, ga!(1 / 0 / 3), &[1]));
    let event = wait_for_event(&mut events, |e| !matches!(e, LinkEvent::Connected)).await;
    assert!(matches!(event, LinkEvent::FrameDropped(ref err) if err.is_integrity_error()));
    assert!(!link.is_closed());
    assert_eq!(link.session_state().await, Some(SessionState::Established));
}

#[tokio::test]
async fn test_server_close_ends_link() {
    init_logging();
    let (link, server) = open_link(ServerOptions::default(), &secure_config()).await;
    let mut events = link.subscribe();

    server.close_session();
    let event = wait_for_event(&mut events, LinkEvent::is_disconnect).await;
    assert!(matches!(event, LinkEvent::Disconnected(DisconnectReason::SessionClosed)));
    assert_eq!(link.session_state().await, Some(SessionState::Closed));
    assert!(link.is_closed());
}
