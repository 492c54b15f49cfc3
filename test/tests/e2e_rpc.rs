//! Remote calls in both directions, with and without replies

use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use meridian_client::{ClientConfig, DisconnectEvent};
use meridian_server::{ErrorEvent, RpcRecipient, ServerConfig, ServerError, SpawnOptions};
use meridian_shared::{
    ConnectionConfig, DisconnectReason, NetId, RpcDispatchError, RpcReplyError, RpcTarget,
};
use meridian_test::{
    open_server_config, player_components, rpc, Health, Position, TestHarness, PLAYER_PREFAB,
};

fn init_logging() {
    env_logger::builder()
        .filter_level(log::LevelFilter::Debug)
        .is_test(true)
        .try_init()
        .ok();
}

const POSITION: u8 = 0;
const HEALTH: u8 = 1;

type ReplySlot<R> = Arc<Mutex<Option<Result<R, RpcReplyError>>>>;

/// A slot and a continuation that fills it
fn reply_slot<R: Send + 'static>() -> (ReplySlot<R>, impl FnOnce(Result<R, RpcReplyError>) + Send + 'static) {
    let slot: ReplySlot<R> = Arc::new(Mutex::new(None));
    let filled = slot.clone();
    (slot, move |result| *filled.lock().unwrap() = Some(result))
}

fn target(net_id: NetId, component_index: u8, function_index: u16) -> RpcTarget {
    RpcTarget {
        net_id,
        component_index,
        function_index,
    }
}

fn harness_with_player(server_config: ServerConfig) -> (TestHarness, NetId) {
    let mut harness = TestHarness::with_config(server_config, ClientConfig::default(), 2);
    harness.connect_all_ready();
    let owner = harness.user_key(0);
    let net_id = harness
        .server
        .spawn(PLAYER_PREFAB, player_components(), SpawnOptions::owned_by(owner))
        .unwrap();
    harness.tick_until(|harness| harness.clients.iter().all(|client| client.object(&net_id).is_some()));
    harness.server.take_events();
    (harness, net_id)
}

fn server_health(harness: &TestHarness, net_id: &NetId) -> i32 {
    *harness
        .server
        .object(net_id)
        .and_then(|object| object.component::<Health>())
        .unwrap()
        .value
}

// ========== Client to server ==========

#[test]
fn server_rpc_replies_with_handler_result() {
    init_logging();
    let (mut harness, net_id) = harness_with_player(open_server_config());

    let (slot, continuation) = reply_slot::<i32>();
    let now = harness.now;
    harness.clients[0]
        .call_server_rpc_with_reply::<i32, i32, _>(target(net_id, HEALTH, rpc::DAMAGE), &30, continuation, now)
        .unwrap();
    harness.tick_until(|_| slot.lock().unwrap().is_some());

    assert_eq!(*slot.lock().unwrap(), Some(Ok(70)));
    assert_eq!(server_health(&harness, &net_id), 70);

    // the handler's write replicates to the owner like any other change
    harness.tick_until(|harness| {
        harness.clients[0]
            .object(&net_id)
            .and_then(|object| object.component::<Health>())
            .is_some_and(|health| *health.value == 70)
    });
}

#[test]
fn authority_rpc_from_owner_runs() {
    init_logging();
    let (mut harness, net_id) = harness_with_player(open_server_config());

    harness.clients[0]
        .call_server_rpc(target(net_id, HEALTH, rpc::HEAL), &5i32)
        .unwrap();
    harness.tick_until(|harness| server_health(harness, &net_id) == 105);
}

#[test]
fn authority_rpc_from_non_owner_is_dropped() {
    init_logging();
    let (mut harness, net_id) = harness_with_player(open_server_config());

    let (slot, continuation) = reply_slot::<()>();
    let now = harness.now;
    harness.clients[1]
        .call_server_rpc_with_reply::<i32, (), _>(target(net_id, HEALTH, rpc::HEAL), &50, continuation, now)
        .unwrap();
    harness.tick_until(|_| slot.lock().unwrap().is_some());

    assert!(matches!(
        *slot.lock().unwrap(),
        Some(Err(RpcReplyError::Failed { .. }))
    ));
    assert_eq!(server_health(&harness, &net_id), 100);
    // a non-owner call is an expected race, not a violation
    assert!(harness.clients[1].is_connected());
    assert!(!harness.server.take_events().has::<ErrorEvent>());
}

#[test]
fn failing_handler_reports_its_reason() {
    init_logging();
    let (mut harness, net_id) = harness_with_player(open_server_config());

    let (slot, continuation) = reply_slot::<()>();
    let now = harness.now;
    harness.clients[0]
        .call_server_rpc_with_reply::<(), (), _>(target(net_id, HEALTH, rpc::REFUSE), &(), continuation, now)
        .unwrap();
    harness.tick_until(|_| slot.lock().unwrap().is_some());

    assert_eq!(
        *slot.lock().unwrap(),
        Some(Err(RpcReplyError::Failed {
            reason: "not today".to_string()
        }))
    );
    let errors: Vec<ServerError> = harness.server.take_events().read::<ErrorEvent>().collect();
    assert!(matches!(
        errors.as_slice(),
        [ServerError::Rpc {
            error: RpcDispatchError::HandlerFailed { .. },
            ..
        }]
    ));
    assert!(harness.clients[0].is_connected());
}

#[test]
fn unknown_function_disconnects_the_caller() {
    init_logging();
    let (mut harness, net_id) = harness_with_player(open_server_config());
    let caller = harness.user_key(0);
    harness.clients[0].take_events();

    harness.clients[0]
        .call_server_rpc(target(net_id, HEALTH, 9), &0i32)
        .unwrap();
    harness.tick_until(|harness| !harness.clients[0].is_connected());

    let disconnects: Vec<DisconnectReason> = harness.clients[0]
        .take_events()
        .read::<DisconnectEvent>()
        .map(|(_, reason)| reason)
        .collect();
    assert_eq!(disconnects, vec![DisconnectReason::ProtocolViolation]);

    let errors: Vec<ServerError> = harness.server.take_events().read::<ErrorEvent>().collect();
    assert!(errors.iter().any(|error| matches!(
        error,
        ServerError::Rpc {
            user_key,
            error: RpcDispatchError::UnknownFunction { function_index: 9, .. },
        } if *user_key == caller
    )));
    assert!(!harness.server.is_connected(&caller));
}

// ========== Server to client ==========

#[test]
fn client_rpc_reaches_every_observer() {
    init_logging();
    let (mut harness, net_id) = harness_with_player(open_server_config());

    harness
        .server
        .call_client_rpc(target(net_id, POSITION, rpc::FLASH), RpcRecipient::Observers, &())
        .unwrap();
    harness.tick_until(|harness| {
        harness.clients.iter().all(|client| {
            client
                .object(&net_id)
                .and_then(|object| object.component::<Position>())
                .is_some_and(|position| position.flashes == 1)
        })
    });
}

#[test]
fn client_rpc_to_owner_only() {
    init_logging();
    let (mut harness, net_id) = harness_with_player(open_server_config());

    harness
        .server
        .call_client_rpc(target(net_id, POSITION, rpc::FLASH), RpcRecipient::Owner, &())
        .unwrap();
    harness.tick_n(3);

    let flashes: Vec<u32> = harness
        .clients
        .iter()
        .map(|client| client.object(&net_id).unwrap().component::<Position>().unwrap().flashes)
        .collect();
    assert_eq!(flashes, vec![1, 0]);
}

#[test]
fn client_rpc_with_reply() {
    init_logging();
    let (mut harness, net_id) = harness_with_player(open_server_config());
    let user_key = harness.user_key(1);

    for expected in 1..=2u32 {
        let (slot, continuation) = reply_slot::<u32>();
        let now = harness.now;
        harness
            .server
            .call_client_rpc_with_reply::<(), u32, _>(
                target(net_id, POSITION, rpc::FLASH),
                &user_key,
                &(),
                continuation,
                now,
            )
            .unwrap();
        harness.tick_until(|_| slot.lock().unwrap().is_some());
        assert_eq!(*slot.lock().unwrap(), Some(Ok(expected)));
    }
}

#[test]
fn unanswered_call_times_out() {
    init_logging();
    let server_config = ServerConfig {
        connection: ConnectionConfig {
            reply_timeout: Duration::from_secs(1),
            ..ConnectionConfig::default()
        },
        ..open_server_config()
    };
    let (mut harness, net_id) = harness_with_player(server_config);
    let user_key = harness.user_key(1);
    harness.clients[1].transport_mut().close();

    let (slot, continuation) = reply_slot::<u32>();
    let now = harness.now;
    harness
        .server
        .call_client_rpc_with_reply::<(), u32, _>(
            target(net_id, POSITION, rpc::FLASH),
            &user_key,
            &(),
            continuation,
            now,
        )
        .unwrap();
    harness.tick_until(|_| slot.lock().unwrap().is_some());

    assert_eq!(*slot.lock().unwrap(), Some(Err(RpcReplyError::TimedOut)));
    assert!(harness.now - now >= Duration::from_secs(1));
}

#[test]
fn pending_call_fails_when_connection_closes() {
    init_logging();
    let (mut harness, net_id) = harness_with_player(open_server_config());
    let user_key = harness.user_key(1);
    harness.clients[1].transport_mut().close();

    let (slot, continuation) = reply_slot::<u32>();
    let now = harness.now;
    harness
        .server
        .call_client_rpc_with_reply::<(), u32, _>(
            target(net_id, POSITION, rpc::FLASH),
            &user_key,
            &(),
            continuation,
            now,
        )
        .unwrap();
    harness.server.disconnect_user(&user_key, now).unwrap();

    assert_eq!(*slot.lock().unwrap(), Some(Err(RpcReplyError::Disconnected)));
}
