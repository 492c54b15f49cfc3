//! Component changes flowing from the server to observers and from owners
//! back to the server

use meridian_client::{ClientConfig, UpdateEvent};
use meridian_server::{BatchConfig, ErrorEvent, ServerConfig, ServerError, SpawnOptions};
use meridian_shared::{BatchError, NetId};
use meridian_test::{
    crate_components, open_server_config, player_components, Aim, Health, PlayerInput, Position,
    TestHarness, CRATE_PREFAB, PLAYER_PREFAB,
};

fn init_logging() {
    env_logger::builder()
        .filter_level(log::LevelFilter::Debug)
        .is_test(true)
        .try_init()
        .ok();
}

/// Two ready clients and a player owned by client 0, spawned everywhere
fn harness_with_player() -> (TestHarness, NetId) {
    let mut harness = TestHarness::new(2);
    harness.connect_all_ready();
    let owner = harness.user_key(0);
    let net_id = harness
        .server
        .spawn(PLAYER_PREFAB, player_components(), SpawnOptions::owned_by(owner))
        .unwrap();
    harness.tick_until(|harness| harness.clients.iter().all(|client| client.object(&net_id).is_some()));
    for client in harness.clients.iter_mut() {
        client.take_events();
    }
    (harness, net_id)
}

fn client_x(harness: &TestHarness, index: usize, net_id: &NetId) -> f32 {
    *harness.clients[index]
        .object(net_id)
        .and_then(|object| object.component::<Position>())
        .expect("object has a position")
        .x
}

// ========== Server to clients ==========

#[test]
fn server_change_reaches_every_observer() {
    init_logging();
    let mut harness = TestHarness::new(2);
    harness.connect_all_ready();

    let net_id = harness
        .server
        .spawn(CRATE_PREFAB, crate_components(), SpawnOptions::default())
        .unwrap();
    harness.tick_until(|harness| harness.clients.iter().all(|client| client.object(&net_id).is_some()));
    for client in harness.clients.iter_mut() {
        client.take_events();
    }

    harness
        .server
        .object_mut(&net_id)
        .and_then(|object| object.component_mut::<Position>())
        .unwrap()
        .x
        .set(5.0);
    harness.tick_until(|harness| (0..2).all(|index| client_x(harness, index, &net_id) == 5.0));

    for client in harness.clients.iter_mut() {
        let updates: Vec<(NetId, u8)> = client.take_events().read::<UpdateEvent>().collect();
        assert_eq!(updates, vec![(net_id, 0)]);
    }
}

#[test]
fn changes_inside_the_sync_interval_are_coalesced() {
    init_logging();
    let mut harness = TestHarness::new(1);
    harness.connect_all_ready();

    let net_id = harness
        .server
        .spawn(CRATE_PREFAB, crate_components(), SpawnOptions::default())
        .unwrap();
    harness.tick_until(|harness| harness.clients[0].object(&net_id).is_some());
    harness.clients[0].take_events();

    let mut updates = 0;
    for step in 1..=12 {
        let position = harness
            .server
            .object_mut(&net_id)
            .and_then(|object| object.component_mut::<Position>())
            .unwrap();
        *position.x = step as f32;
        harness.tick();
        updates += harness.clients[0].take_events().read::<UpdateEvent>().count();
    }
    harness.tick_until(|harness| client_x(harness, 0, &net_id) == 12.0);
    updates += harness.clients[0].take_events().read::<UpdateEvent>().count();

    // twelve writes over ~200ms with a 100ms interval
    assert!(updates < 12, "{} updates were sent", updates);
    assert!(updates >= 2);
}

#[test]
fn owner_only_component_skips_other_observers() {
    init_logging();
    let (mut harness, net_id) = harness_with_player();

    harness
        .server
        .object_mut(&net_id)
        .and_then(|object| object.component_mut::<Health>())
        .unwrap()
        .value
        .set(42);
    harness.tick_until(|harness| {
        harness.clients[0]
            .object(&net_id)
            .and_then(|object| object.component::<Health>())
            .is_some_and(|health| *health.value == 42)
    });
    harness.tick_n(10);

    let observed_health = harness.clients[1]
        .object(&net_id)
        .and_then(|object| object.component::<Health>())
        .unwrap();
    assert_eq!(*observed_health.value, 100);
    assert!(!harness.clients[1].take_events().has::<UpdateEvent>());
}

#[test]
fn batched_and_unbatched_updates_arrive_alike() {
    init_logging();
    for enabled in [true, false] {
        let server_config = ServerConfig {
            batch: BatchConfig {
                enabled,
                ..BatchConfig::default()
            },
            ..open_server_config()
        };
        let mut harness = TestHarness::with_config(server_config, ClientConfig::default(), 1);
        harness.connect_all_ready();

        let net_ids: Vec<NetId> = (0..10)
            .map(|_| {
                harness
                    .server
                    .spawn(CRATE_PREFAB, crate_components(), SpawnOptions::default())
                    .unwrap()
            })
            .collect();
        harness.tick_until(|harness| {
            net_ids
                .iter()
                .all(|net_id| harness.clients[0].object(net_id).is_some())
        });

        for (offset, net_id) in net_ids.iter().enumerate() {
            let position = harness
                .server
                .object_mut(net_id)
                .and_then(|object| object.component_mut::<Position>())
                .unwrap();
            position.y.set(offset as f32 * 10.0);
        }
        harness.tick_until(|harness| {
            net_ids.iter().enumerate().all(|(offset, net_id)| {
                harness.clients[0]
                    .object(net_id)
                    .and_then(|object| object.component::<Position>())
                    .is_some_and(|position| *position.y == offset as f32 * 10.0)
            })
        });
    }
}

#[test]
fn update_over_the_batch_limit_is_reported_and_not_sent() {
    init_logging();
    let server_config = ServerConfig {
        batch: BatchConfig {
            enabled: true,
            max_batch_bytes: 2,
        },
        ..open_server_config()
    };
    let mut harness = TestHarness::with_config(server_config, ClientConfig::default(), 1);
    harness.connect_all_ready();

    let net_id = harness
        .server
        .spawn(CRATE_PREFAB, crate_components(), SpawnOptions::default())
        .unwrap();
    harness.tick_until(|harness| harness.clients[0].object(&net_id).is_some());
    harness.server.take_events();

    harness
        .server
        .object_mut(&net_id)
        .and_then(|object| object.component_mut::<Position>())
        .unwrap()
        .x
        .set(42.0);
    harness.tick_n(10);

    let errors: Vec<ServerError> = harness.server.take_events().read::<ErrorEvent>().collect();
    assert_eq!(errors.len(), 1);
    assert!(matches!(
        &errors[0],
        ServerError::Batch {
            net_id: failed,
            error: BatchError::PayloadTooLarge { max_bytes: 2, .. },
        } if *failed == net_id
    ));
    assert_eq!(client_x(&harness, 0, &net_id), 0.0);
    assert!(harness.clients[0].is_connected());
}

// ========== Owner to server ==========

#[test]
fn owner_change_reaches_server_and_other_observers() {
    init_logging();
    let (mut harness, net_id) = harness_with_player();

    {
        let input = harness.clients[0]
            .object_mut(&net_id)
            .and_then(|object| object.component_mut::<PlayerInput>())
            .unwrap();
        input.sequence.set(7);
        input.label.set("jump".to_string());
    }

    harness.tick_until(|harness| {
        harness
            .server
            .object(&net_id)
            .and_then(|object| object.component::<PlayerInput>())
            .is_some_and(|input| *input.sequence == 7)
    });
    harness.tick_until(|harness| {
        harness.clients[1]
            .object(&net_id)
            .and_then(|object| object.component::<PlayerInput>())
            .is_some_and(|input| *input.sequence == 7 && input.label.as_str() == "jump")
    });

    let relayed: Vec<(NetId, u8)> = harness.clients[1].take_events().read::<UpdateEvent>().collect();
    assert_eq!(relayed, vec![(net_id, 2)]);
    // the owner's own change is not echoed back
    assert!(!harness.clients[0].take_events().has::<UpdateEvent>());
}

#[test]
fn owner_list_changes_are_relayed_to_other_observers() {
    init_logging();
    let (mut harness, net_id) = harness_with_player();

    {
        let input = harness.clients[0]
            .object_mut(&net_id)
            .and_then(|object| object.component_mut::<PlayerInput>())
            .unwrap();
        input.emotes.push(3);
        input.emotes.push(7);
        input.emotes.remove(0);
    }

    harness.tick_until(|harness| {
        harness.clients[1]
            .object(&net_id)
            .and_then(|object| object.component::<PlayerInput>())
            .is_some_and(|input| input.emotes.as_slice() == [7])
    });
    let server_input = harness
        .server
        .object(&net_id)
        .and_then(|object| object.component::<PlayerInput>())
        .unwrap();
    assert_eq!(server_input.emotes.as_slice(), &[7]);
    // the log was flushed once it went out
    assert_eq!(server_input.emotes.pending_changes(), 0);

    harness.clients[0]
        .object_mut(&net_id)
        .and_then(|object| object.component_mut::<PlayerInput>())
        .unwrap()
        .emotes
        .set(0, 9);
    harness.tick_until(|harness| {
        harness.clients[1]
            .object(&net_id)
            .and_then(|object| object.component::<PlayerInput>())
            .is_some_and(|input| input.emotes.as_slice() == [9])
    });
}

#[test]
fn owner_to_server_component_stays_on_the_server() {
    init_logging();
    let (mut harness, net_id) = harness_with_player();

    harness.clients[0]
        .object_mut(&net_id)
        .and_then(|object| object.component_mut::<Aim>())
        .unwrap()
        .yaw
        .set(90.0);
    harness.tick_until(|harness| {
        harness
            .server
            .object(&net_id)
            .and_then(|object| object.component::<Aim>())
            .is_some_and(|aim| *aim.yaw == 90.0)
    });
    harness.tick_n(5);
    assert!(!harness.server.object(&net_id).unwrap().is_dirty());
    assert!(!harness.clients[1].take_events().has::<UpdateEvent>());

    // a server-side write has nowhere to go and leaves nothing pending
    harness
        .server
        .object_mut(&net_id)
        .and_then(|object| object.component_mut::<Aim>())
        .unwrap()
        .yaw
        .set(45.0);
    harness.tick();
    assert!(!harness.server.object(&net_id).unwrap().is_dirty());
    harness.tick_n(5);
    assert!(harness.clients.iter_mut().all(|client| !client.take_events().has::<UpdateEvent>()));
    assert_eq!(
        *harness.clients[0]
            .object(&net_id)
            .and_then(|object| object.component::<Aim>())
            .unwrap()
            .yaw,
        90.0
    );
}

#[test]
fn non_owner_writes_stay_local() {
    init_logging();
    let (mut harness, net_id) = harness_with_player();

    harness.clients[1]
        .object_mut(&net_id)
        .and_then(|object| object.component_mut::<PlayerInput>())
        .unwrap()
        .sequence
        .set(99);
    // the owner may not write server-driven components either
    harness.clients[0]
        .object_mut(&net_id)
        .and_then(|object| object.component_mut::<Position>())
        .unwrap()
        .x
        .set(99.0);
    harness.tick_n(20);

    let object = harness.server.object(&net_id).unwrap();
    assert_eq!(*object.component::<PlayerInput>().unwrap().sequence, 0);
    assert_eq!(*object.component::<Position>().unwrap().x, 0.0);
    assert_eq!(client_x(&harness, 1, &net_id), 0.0);
    assert!(harness.clients.iter().all(|client| client.is_connected()));
}
