//! Spawning, hiding and destroying objects, seen from the clients

use glam::{Quat, Vec3};

use meridian_client::{ClientError, DespawnEvent, DisconnectEvent, ErrorEvent, HideEvent, SpawnEvent};
use meridian_server::{DormantObject, ServerError, SpawnOptions, TransformSync};
use meridian_shared::{
    DisconnectReason, NetId, ObjectIdentity, Replicate, SceneId, SpawnMessage, SpawnValues,
};
use meridian_test::{
    crate_components, player_components, Position, TestHarness, CRATE_PREFAB, PLAYER_PREFAB,
};

fn init_logging() {
    env_logger::builder()
        .filter_level(log::LevelFilter::Debug)
        .is_test(true)
        .try_init()
        .ok();
}

const CRATE_SCENE_ID: SceneId = SceneId(7);

// ========== Prefab spawns ==========

#[test]
fn owned_player_spawns_on_every_ready_client() {
    init_logging();
    let mut harness = TestHarness::new(2);
    harness.connect_all_ready();
    let owner = harness.user_key(0);

    let spawn_values = SpawnValues {
        position: Some(Vec3::new(1.0, 2.0, 3.0)),
        ..Default::default()
    };
    let net_id = harness
        .server
        .spawn(
            PLAYER_PREFAB,
            player_components(),
            SpawnOptions::owned_by(owner)
                .with_spawn_values(spawn_values)
                .as_local_player(),
        )
        .expect("owner is connected");
    assert_eq!(net_id, NetId(1));

    harness.tick_until(|harness| harness.clients.iter().all(|client| client.object(&net_id).is_some()));

    let owned = harness.clients[0].object(&net_id).unwrap();
    assert_eq!(owned.identity(), ObjectIdentity::Prefab(PLAYER_PREFAB));
    assert_eq!(owned.spawn_values().position, Some(Vec3::new(1.0, 2.0, 3.0)));
    assert!(owned.has_authority());
    assert!(owned.is_local_player());
    assert_eq!(owned.component_count(), 4);

    let observed = harness.clients[1].object(&net_id).unwrap();
    assert!(!observed.has_authority());
    assert!(!observed.is_local_player());

    for client in harness.clients.iter_mut() {
        let spawned: Vec<NetId> = client.take_events().read::<SpawnEvent>().collect();
        assert_eq!(spawned, vec![net_id]);
    }
}

#[test]
fn spawn_with_disconnected_owner_fails() {
    init_logging();
    let mut harness = TestHarness::new(2);
    harness.connect_all_ready();

    let departed = harness.user_key(1);
    let now = harness.now;
    harness.clients[1].disconnect(now).unwrap();
    harness.tick_until(|harness| harness.server.users_count() == 1);

    let result = harness.server.spawn(
        PLAYER_PREFAB,
        player_components(),
        SpawnOptions::owned_by(departed),
    );
    assert_eq!(
        result,
        Err(ServerError::UserNotConnected { user_key: departed })
    );
    assert_eq!(harness.server.objects().count(), 0);
}

#[test]
fn client_that_becomes_ready_late_receives_existing_objects() {
    init_logging();
    let mut harness = TestHarness::new(1);
    harness.connect_all();

    let net_id = harness
        .server
        .spawn(CRATE_PREFAB, crate_components(), SpawnOptions::default())
        .unwrap();
    harness.tick_n(5);
    assert!(harness.clients[0].object(&net_id).is_none());

    harness.clients[0].scene_ready().unwrap();
    harness.tick_until(|harness| harness.clients[0].object(&net_id).is_some());
    assert!(harness.server.object(&net_id).unwrap().is_observed_by(&harness.user_key(0)));
}

#[test]
fn transform_sync_filters_spawn_values() {
    init_logging();
    let mut harness = TestHarness::new(1);
    harness.connect_all_ready();

    let options = SpawnOptions {
        spawn_values: SpawnValues {
            position: Some(Vec3::new(4.0, 0.0, -4.0)),
            rotation: Some(Quat::from_rotation_y(1.0)),
            scale: Some(Vec3::splat(2.0)),
            name: Some("crate".to_string()),
            self_active: Some(true),
        },
        transform_sync: TransformSync {
            position: true,
            rotation: false,
            scale: false,
        },
        ..Default::default()
    };
    let net_id = harness
        .server
        .spawn(CRATE_PREFAB, crate_components(), options)
        .unwrap();
    harness.tick_until(|harness| harness.clients[0].object(&net_id).is_some());

    let values = harness.clients[0].object(&net_id).unwrap().spawn_values();
    assert_eq!(values.position, Some(Vec3::new(4.0, 0.0, -4.0)));
    assert_eq!(values.rotation, None);
    assert_eq!(values.scale, None);
    assert_eq!(values.name.as_deref(), Some("crate"));
    assert_eq!(values.self_active, Some(true));
}

#[test]
fn spawn_snapshot_carries_current_component_state() {
    init_logging();
    let mut harness = TestHarness::new(1);
    harness.connect_all_ready();

    let net_id = harness
        .server
        .spawn(
            CRATE_PREFAB,
            vec![Box::new(Position::new(9.0, 8.0, 7.0)) as Box<dyn Replicate>],
            SpawnOptions::default(),
        )
        .unwrap();
    harness.tick_until(|harness| harness.clients[0].object(&net_id).is_some());

    let position = harness.clients[0]
        .object(&net_id)
        .unwrap()
        .component::<Position>()
        .unwrap();
    assert_eq!((*position.x, *position.y, *position.z), (9.0, 8.0, 7.0));
}

// ========== Destroy & unspawn ==========

#[test]
fn destroy_reaches_every_observer() {
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

    harness.server.destroy(&net_id).unwrap();
    assert!(harness.server.object(&net_id).is_none());
    harness.tick_until(|harness| harness.clients.iter().all(|client| client.object(&net_id).is_none()));

    for client in harness.clients.iter_mut() {
        let despawned: Vec<NetId> = client.take_events().read::<DespawnEvent>().collect();
        assert_eq!(despawned, vec![net_id]);
    }
    assert_eq!(
        harness.server.destroy(&net_id),
        Err(ServerError::ObjectNotFound { net_id })
    );
}

#[test]
fn unspawned_prefab_object_is_handed_back_and_hidden() {
    init_logging();
    let mut harness = TestHarness::new(1);
    harness.connect_all_ready();

    let net_id = harness
        .server
        .spawn(CRATE_PREFAB, crate_components(), SpawnOptions::default())
        .unwrap();
    harness.tick_until(|harness| harness.clients[0].object(&net_id).is_some());
    harness.clients[0].take_events();

    let dormant = harness
        .server
        .unspawn(&net_id)
        .unwrap()
        .expect("prefab objects are handed back");
    assert_eq!(dormant.components.len(), 1);

    harness.tick_until(|harness| harness.clients[0].object(&net_id).is_none());
    let mut events = harness.clients[0].take_events();
    assert_eq!(events.read::<HideEvent>().collect::<Vec<_>>(), vec![net_id]);
    assert!(!events.has::<DespawnEvent>());
}

#[test]
fn scene_object_returns_to_the_pool_and_respawns() {
    init_logging();
    let mut harness = TestHarness::new(1);
    harness.connect_all_ready();

    let spawn_values = SpawnValues {
        position: Some(Vec3::new(0.0, 1.0, 0.0)),
        ..Default::default()
    };
    harness
        .server
        .register_scene_object(
            CRATE_SCENE_ID,
            DormantObject::new(crate_components()).with_spawn_values(spawn_values.clone()),
        )
        .unwrap();
    harness.clients[0]
        .register_scene_object(CRATE_SCENE_ID, crate_components())
        .unwrap();

    let first = harness
        .server
        .spawn_scene_object(CRATE_SCENE_ID, SpawnOptions::default())
        .unwrap();
    harness.tick_until(|harness| harness.clients[0].object(&first).is_some());
    let object = harness.clients[0].object(&first).unwrap();
    assert_eq!(object.identity(), ObjectIdentity::Scene(CRATE_SCENE_ID));
    assert_eq!(object.spawn_values(), &spawn_values);

    assert!(harness.server.unspawn(&first).unwrap().is_none());
    harness.tick_until(|harness| harness.clients[0].object(&first).is_none());

    // the pooled components are reused under a fresh net id
    let second = harness
        .server
        .spawn_scene_object(CRATE_SCENE_ID, SpawnOptions::default())
        .unwrap();
    assert_ne!(first, second);
    harness.tick_until(|harness| harness.clients[0].object(&second).is_some());

    let mut events = harness.clients[0].take_events();
    assert_eq!(events.read::<SpawnEvent>().collect::<Vec<_>>(), vec![first, second]);
    assert_eq!(events.read::<HideEvent>().collect::<Vec<_>>(), vec![first]);
}

#[test]
fn scene_object_must_be_registered_once() {
    init_logging();
    let mut harness = TestHarness::new(0);

    harness
        .server
        .register_scene_object(CRATE_SCENE_ID, DormantObject::new(crate_components()))
        .unwrap();
    assert_eq!(
        harness
            .server
            .register_scene_object(CRATE_SCENE_ID, DormantObject::new(crate_components())),
        Err(ServerError::SceneObjectAlreadyRegistered {
            scene_id: CRATE_SCENE_ID
        })
    );
    assert_eq!(
        harness
            .server
            .spawn_scene_object(SceneId(8), SpawnOptions::default()),
        Err(ServerError::SceneObjectNotFound {
            scene_id: SceneId(8)
        })
    );
}

#[test]
fn spawn_naming_both_scene_and_prefab_is_a_protocol_violation() {
    init_logging();
    let mut harness = TestHarness::new(1);
    harness.connect_all_ready();
    harness.clients[0]
        .register_scene_object(CRATE_SCENE_ID, crate_components())
        .unwrap();

    let net_id = NetId(900);
    let user_key = harness.user_key(0);
    harness
        .server
        .send_message(
            &user_key,
            &SpawnMessage {
                net_id,
                is_local_player: false,
                is_owner: false,
                scene_id: Some(CRATE_SCENE_ID),
                prefab_hash: Some(CRATE_PREFAB),
                spawn_values: SpawnValues::default(),
                payload: Box::default(),
            },
        )
        .unwrap();
    harness.tick_until(|harness| !harness.clients[0].is_connected());

    let mut events = harness.clients[0].take_events();
    assert_eq!(
        events.read::<ErrorEvent>().collect::<Vec<_>>(),
        vec![ClientError::UnresolvableSpawn { net_id }]
    );
    let reasons: Vec<DisconnectReason> = events
        .read::<DisconnectEvent>()
        .map(|(_, reason)| reason)
        .collect();
    assert_eq!(reasons, vec![DisconnectReason::ProtocolViolation]);
    assert!(harness.clients[0].object(&net_id).is_none());
}
