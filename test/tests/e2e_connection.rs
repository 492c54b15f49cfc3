//! Handshake, disconnection, messaging and the notify channel between a
//! server and its clients

use std::{
    collections::BTreeSet,
    net::SocketAddr,
    sync::{Arc, Mutex},
    time::Duration,
};

use meridian_client::{self as client, ClientConfig, ClientError};
use meridian_server::{
    self as server, AuthEvent, ConnectEvent, DisconnectEvent, ErrorEvent, MessageEvent,
    ServerConfig, ServerError,
};
use meridian_shared::{ConnectionConfig, DisconnectReason, NetId, NotifyKey, ObjectDestroyMessage};
use meridian_test::{
    client_address, open_server_config, server_address, Chat, LinkConditioner, TestHarness,
};

fn init_logging() {
    env_logger::builder()
        .filter_level(log::LevelFilter::Debug)
        .is_test(true)
        .try_init()
        .ok();
}

fn short_timeouts() -> ConnectionConfig {
    ConnectionConfig {
        disconnection_timeout: Duration::from_secs(1),
        heartbeat_interval: Duration::from_millis(250),
        ..ConnectionConfig::default()
    }
}

fn client_disconnects(harness: &mut TestHarness, index: usize) -> Vec<DisconnectReason> {
    harness.clients[index]
        .take_events()
        .read::<client::DisconnectEvent>()
        .map(|(_, reason)| reason)
        .collect()
}

// ========== Handshake ==========

#[test]
fn open_server_accepts_without_auth() {
    init_logging();
    let mut harness = TestHarness::new(2);

    let connected_to = Arc::new(Mutex::new(Vec::new()));
    let listener = connected_to.clone();
    harness.clients[0].on_connected(move |address: &SocketAddr| listener.lock().unwrap().push(*address));

    harness.connect_all();
    assert_eq!(harness.server.users_count(), 2);
    assert_eq!(*connected_to.lock().unwrap(), vec![server_address()]);

    let mut events = harness.server.take_events();
    assert_eq!(events.read::<ConnectEvent>().count(), 2);
    assert!(!events.has::<AuthEvent>());

    let mut events = harness.clients[0].take_events();
    assert_eq!(
        events.read::<client::ConnectEvent>().collect::<Vec<_>>(),
        vec![server_address()]
    );
}

#[test]
fn auth_payload_is_accepted_or_rejected() {
    init_logging();
    let server_config = ServerConfig {
        require_auth: true,
        ..ServerConfig::default()
    };
    let client_config = ClientConfig {
        auth_payload: Some(b"let me in".to_vec()),
        ..ClientConfig::default()
    };
    let mut harness = TestHarness::with_config(server_config, client_config, 2);
    let now = harness.now;
    for client in harness.clients.iter_mut() {
        client.connect(server_address(), now).unwrap();
    }
    harness.tick();

    let auths: Vec<_> = harness.server.take_events().read::<AuthEvent>().collect();
    assert_eq!(auths.len(), 2);
    for (_, payload) in &auths {
        assert_eq!(&payload[..], b"let me in");
    }
    assert_eq!(harness.server.users_count(), 0);

    // retransmitted requests while waiting do not raise a second auth
    harness.tick_n(80);
    assert!(!harness.server.take_events().has::<AuthEvent>());

    let (accepted, rejected) = {
        let first_address = harness.server.user(&auths[0].0).unwrap().address();
        if first_address == client_address(0) {
            (auths[0].0, auths[1].0)
        } else {
            (auths[1].0, auths[0].0)
        }
    };
    let now = harness.now;
    harness.server.accept_connection(&accepted, now).unwrap();
    harness.server.reject_connection(&rejected).unwrap();
    assert_eq!(
        harness.server.accept_connection(&accepted, now),
        Err(ServerError::NoPendingAuth { user_key: accepted })
    );
    harness.tick_until(|harness| harness.clients[0].is_connected() && harness.clients[1].server_address().is_none());

    assert!(!harness.clients[1].is_connected());
    assert_eq!(client_disconnects(&mut harness, 1), vec![DisconnectReason::AuthRejected]);
    assert_eq!(harness.server.users_count(), 1);
    assert!(harness.server.user(&rejected).is_none());
}

#[test]
fn unanswered_auth_times_out() {
    init_logging();
    let server_config = ServerConfig {
        require_auth: true,
        auth_timeout: Duration::from_millis(500),
        ..ServerConfig::default()
    };
    let mut harness = TestHarness::with_config(server_config, ClientConfig::default(), 1);
    let now = harness.now;
    harness.clients[0].connect(server_address(), now).unwrap();
    harness.tick();

    let auths: Vec<_> = harness.server.take_events().read::<AuthEvent>().collect();
    assert_eq!(auths.len(), 1);
    let user_key = auths[0].0;

    harness.tick_until(|harness| harness.clients[0].server_address().is_none());
    assert_eq!(client_disconnects(&mut harness, 0), vec![DisconnectReason::Timeout]);
    assert!(harness.server.user(&user_key).is_none());
    let now = harness.now;
    assert_eq!(
        harness.server.accept_connection(&user_key, now),
        Err(ServerError::UserNotFound { user_key })
    );

    // the client stopped asking, so nothing new is waiting
    harness.tick_n(20);
    assert!(!harness.server.take_events().has::<AuthEvent>());
    assert!(harness.server.user_keys().is_empty());
}

#[test]
fn lost_connect_request_is_repeated() {
    init_logging();
    let mut harness = TestHarness::new(1);
    let now = harness.now;
    harness.clients[0].connect(server_address(), now).unwrap();
    harness.clients[0].send_all_packets(now);
    assert_eq!(harness.network.drain(&server_address()).len(), 1);

    harness.tick_until(|harness| harness.clients[0].is_connected());
    assert_eq!(harness.server.users_count(), 1);
}

#[test]
fn connect_twice_or_send_before_connecting_fails() {
    init_logging();
    let mut harness = TestHarness::new(1);

    assert!(matches!(
        harness.clients[0].send_message(&Chat::new("too early")),
        Err(ClientError::NotConnected)
    ));

    harness.connect_all();
    let now = harness.now;
    assert!(matches!(
        harness.clients[0].connect(server_address(), now),
        Err(ClientError::AlreadyConnected { .. })
    ));
}

// ========== Disconnection ==========

#[test]
fn client_disconnect_reaches_server() {
    init_logging();
    let mut harness = TestHarness::new(2);
    harness.connect_all_ready();
    let leaving = harness.user_key(0);

    let now = harness.now;
    harness.clients[0].disconnect(now).unwrap();
    assert_eq!(client_disconnects(&mut harness, 0), vec![DisconnectReason::Requested]);
    harness.tick_until(|harness| !harness.server.is_connected(&leaving));

    let disconnects: Vec<_> = harness.server.take_events().read::<DisconnectEvent>().collect();
    assert_eq!(
        disconnects,
        vec![(leaving, client_address(0), DisconnectReason::Requested)]
    );
    assert!(harness.clients[1].is_connected());
}

#[test]
fn server_disconnect_reaches_client() {
    init_logging();
    let mut harness = TestHarness::new(1);
    harness.connect_all_ready();

    let now = harness.now;
    let user_key = harness.user_key(0);
    harness.server.disconnect_user(&user_key, now).unwrap();
    harness.tick_until(|harness| !harness.clients[0].is_connected());

    assert_eq!(client_disconnects(&mut harness, 0), vec![DisconnectReason::Requested]);
    assert_eq!(
        harness.server.disconnect_user(&user_key, now),
        Err(ServerError::UserNotFound { user_key })
    );
}

#[test]
fn silent_peer_times_out() {
    init_logging();
    let server_config = ServerConfig {
        connection: short_timeouts(),
        ..open_server_config()
    };
    let client_config = ClientConfig {
        connection: short_timeouts(),
        ..ClientConfig::default()
    };
    let mut harness = TestHarness::with_config(server_config, client_config, 2);
    harness.connect_all_ready();

    // keepalives hold an idle connection open past the timeout
    harness.tick_n(100);
    assert_eq!(harness.server.users_count(), 2);

    let silent = harness.user_key(0);
    harness.clients[0].transport_mut().close();
    harness.tick_until(|harness| !harness.server.is_connected(&silent) && !harness.clients[0].is_connected());

    let disconnects: Vec<_> = harness.server.take_events().read::<DisconnectEvent>().collect();
    assert_eq!(disconnects, vec![(silent, client_address(0), DisconnectReason::Timeout)]);
    assert_eq!(client_disconnects(&mut harness, 0), vec![DisconnectReason::Timeout]);
    assert!(harness.clients[1].is_connected());
}

#[test]
fn shutdown_disconnects_everyone() {
    init_logging();
    let mut harness = TestHarness::new(3);
    harness.connect_all_ready();

    let now = harness.now;
    harness.server.shutdown(now);
    assert_eq!(harness.server.users_count(), 0);
    harness.tick_until(|harness| harness.clients.iter().all(|client| !client.is_connected()));

    for index in 0..3 {
        assert_eq!(
            client_disconnects(&mut harness, index),
            vec![DisconnectReason::ServerShutdown]
        );
    }
    let reasons: Vec<DisconnectReason> = harness
        .server
        .take_events()
        .read::<DisconnectEvent>()
        .map(|(_, _, reason)| reason)
        .collect();
    assert_eq!(reasons, vec![DisconnectReason::ServerShutdown; 3]);
}

// ========== Protocol violations ==========

#[test]
fn malformed_packet_disconnects_the_sender() {
    init_logging();
    let mut harness = TestHarness::new(2);
    harness.connect_all_ready();
    let offender = harness.user_key(0);

    harness
        .network
        .inject(client_address(0), server_address(), &[0xFF, 0x12, 0x34]);
    harness.tick_until(|harness| !harness.clients[0].is_connected());

    assert_eq!(
        client_disconnects(&mut harness, 0),
        vec![DisconnectReason::ProtocolViolation]
    );
    let mut events = harness.server.take_events();
    assert!(events
        .read::<ErrorEvent>()
        .any(|error| matches!(error, ServerError::Connection { address, .. } if address == client_address(0))));
    assert_eq!(
        events.read::<DisconnectEvent>().collect::<Vec<_>>(),
        vec![(offender, client_address(0), DisconnectReason::ProtocolViolation)]
    );
    assert!(harness.clients[1].is_connected());
}

#[test]
fn garbage_from_unknown_address_is_ignored() {
    init_logging();
    let mut harness = TestHarness::new(1);
    harness.connect_all_ready();

    let stranger = SocketAddr::from(([10, 0, 0, 9], 4000));
    harness.network.inject(stranger, server_address(), &[0xFF]);
    harness.network.inject(stranger, server_address(), &[2, 0xAA, 0xBB]);
    harness.tick_n(3);

    assert_eq!(harness.server.users_count(), 1);
    assert!(harness.clients[0].is_connected());
    assert!(!harness.server.take_events().has::<ErrorEvent>());
}

#[test]
fn client_sending_server_only_message_is_disconnected() {
    init_logging();
    let mut harness = TestHarness::new(1);
    harness.connect_all_ready();
    let offender = harness.user_key(0);

    harness.clients[0]
        .send_message(&ObjectDestroyMessage { net_id: NetId(1) })
        .unwrap();
    harness.tick_until(|harness| !harness.clients[0].is_connected());

    let errors: Vec<ServerError> = harness.server.take_events().read::<ErrorEvent>().collect();
    assert!(matches!(
        errors.as_slice(),
        [ServerError::UnexpectedMessage { user_key, .. }] if *user_key == offender
    ));
}

// ========== Messages ==========

#[test]
fn messages_flow_both_ways() {
    init_logging();
    let mut harness = TestHarness::new(2);
    harness.connect_all_ready();
    let sender = harness.user_key(0);

    harness.clients[0].send_message(&Chat::new("hello")).unwrap();
    harness.clients[0].send_message(&Chat::new("again")).unwrap();
    harness.tick();

    let received: Vec<_> = harness.server.take_events().read::<MessageEvent<Chat>>().collect();
    assert_eq!(
        received,
        vec![(sender, Chat::new("hello")), (sender, Chat::new("again"))]
    );

    let listener = harness.user_key(1);
    harness.server.broadcast_message(&Chat::new("welcome")).unwrap();
    harness
        .server
        .send_message(&listener, &Chat::new("just you"))
        .unwrap();
    harness.tick();

    let first: Vec<Chat> = harness.clients[0]
        .take_events()
        .read::<client::MessageEvent<Chat>>()
        .collect();
    assert_eq!(first, vec![Chat::new("welcome")]);
    let second: Vec<Chat> = harness.clients[1]
        .take_events()
        .read::<client::MessageEvent<Chat>>()
        .collect();
    assert_eq!(second, vec![Chat::new("welcome"), Chat::new("just you")]);
}

#[test]
fn notify_delivery_is_reported() {
    init_logging();
    let mut harness = TestHarness::new(1);
    harness.connect_all_ready();

    let now = harness.now;
    let key = harness.clients[0].send_notify(&Chat::new("ping"), now).unwrap();

    let mut delivered = Vec::new();
    let mut received = Vec::new();
    for _ in 0..200 {
        harness.tick();
        delivered.extend(harness.clients[0].take_events().read::<client::NotifyDeliveredEvent>());
        received.extend(harness.server.take_events().read::<MessageEvent<Chat>>());
        if !delivered.is_empty() {
            break;
        }
    }
    assert_eq!(delivered, vec![key]);
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].1, Chat::new("ping"));
}

#[test]
fn round_trip_time_is_measured() {
    init_logging();
    let mut harness = TestHarness::new(1);
    assert_eq!(harness.clients[0].rtt(), None);

    harness.connect_all_ready();
    harness.tick_until(|harness| harness.clients[0].rtt().is_some());
    assert!(harness.clients[0].rtt().unwrap() < Duration::from_secs(1));
}

#[test]
fn every_notify_is_delivered_or_lost_exactly_once() {
    init_logging();
    let mut harness = TestHarness::new(1);
    harness.connect_all_ready();
    harness
        .network
        .set_conditioner(Some(LinkConditioner::lossy(0.2)));
    let user_key = harness.user_key(0);

    let mut sent = Vec::new();
    let mut delivered: Vec<NotifyKey> = Vec::new();
    let mut lost: Vec<NotifyKey> = Vec::new();
    let mut collect = |events: &mut server::Events| {
        for (key_user, key) in events.read::<server::NotifyDeliveredEvent>() {
            assert_eq!(key_user, user_key);
            delivered.push(key);
        }
        for (_, key) in events.read::<server::NotifyLostEvent>() {
            lost.push(key);
        }
    };

    for index in 0..80 {
        let now = harness.now;
        sent.push(
            harness
                .server
                .send_notify(&user_key, &Chat::new(&format!("tick {}", index)), now)
                .unwrap(),
        );
        harness.tick();
        collect(&mut harness.server.take_events());
    }
    harness.tick_n(30);
    collect(&mut harness.server.take_events());

    let now = harness.now;
    harness.server.disconnect_user(&user_key, now).unwrap();
    collect(&mut harness.server.take_events());

    assert!(harness.network.dropped() > 0);
    assert!(!delivered.is_empty());

    let delivered_set: BTreeSet<NotifyKey> = delivered.iter().copied().collect();
    let lost_set: BTreeSet<NotifyKey> = lost.iter().copied().collect();
    assert_eq!(delivered_set.len(), delivered.len(), "a key was delivered twice");
    assert_eq!(lost_set.len(), lost.len(), "a key was lost twice");
    assert!(delivered_set.is_disjoint(&lost_set));

    let all: BTreeSet<NotifyKey> = delivered_set.union(&lost_set).copied().collect();
    assert_eq!(all, sent.into_iter().collect::<BTreeSet<_>>());
}
