use std::{
    collections::HashMap,
    net::SocketAddr,
    time::{Duration, Instant},
};

use log::{debug, info, warn};

use meridian_shared::{
    attach_mutator, deserialize_payload, dispatch_rpc, read_batch, serialize_delta, BitReader,
    ComponentMutator, ComponentSlot, DirtySet, DisconnectReason, InvokeType, LatchedEvent,
    Message, MessageContainer, NetId, NetworkPingMessage, NetworkPongMessage, NotifyKey,
    ObjectDestroyMessage, ObjectHideMessage, ObjectIdentity, PacketType, PrefabHash,
    PropertyMutator, Protocol, ReadMode, RemoveAuthorityMessage, Replicate, RpcDispatchError,
    RpcMessage, RpcReply, RpcReplyError, RpcTarget, RpcWithReplyMessage, SceneId,
    SceneNotReadyMessage, SceneReadyMessage, Serde, SpawnMessage, StreamWriter, SyncContext,
    Transport, UpdateBatchMessage, UpdateVarsMessage,
};

use crate::{
    connection::connection::Connection,
    events::Events,
    world::{client_object::ClientObject, prefabs::Prefabs},
    ClientConfig, ClientError,
};

/// Connects to a server over a `Transport`, keeps the objects the server
/// spawns for it in sync, and sends back the changes it makes to objects
/// it has authority over.
///
/// Driven by the application loop: `receive_all_packets`, `update`,
/// `send_all_packets`, then `take_events`.
pub struct Client<T: Transport> {
    config: ClientConfig,
    protocol: Protocol,
    transport: T,
    epoch: Instant,
    connection: Option<Connection>,
    on_connected: LatchedEvent<SocketAddr>,
    prefabs: Prefabs,
    objects: HashMap<NetId, ClientObject>,
    dirty_set: DirtySet,
    events: Events,
}

impl<T: Transport> Client<T> {
    /// Create a new Client. Locks the protocol.
    ///
    /// # Panics
    ///
    /// Panics if the protocol is already locked.
    pub fn new(
        client_config: ClientConfig,
        mut protocol: Protocol,
        transport: T,
    ) -> Result<Self, ClientError> {
        client_config.connection.validate()?;
        protocol.lock();

        Ok(Self {
            config: client_config,
            protocol,
            transport,
            epoch: Instant::now(),
            connection: None,
            on_connected: LatchedEvent::new(),
            prefabs: Prefabs::new(),
            objects: HashMap::new(),
            dirty_set: DirtySet::new(),
            events: Events::new(),
        })
    }

    pub fn protocol(&self) -> &Protocol {
        &self.protocol
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Everything that happened since the last call
    pub fn take_events(&mut self) -> Events {
        std::mem::take(&mut self.events)
    }

    // Connection

    /// Starts connecting. The request is repeated until the server answers
    /// or the disconnection timeout passes.
    pub fn connect(&mut self, server_address: SocketAddr, now: Instant) -> Result<(), ClientError> {
        if let Some(connection) = &self.connection {
            return Err(ClientError::AlreadyConnected {
                address: connection.address(),
            });
        }

        let auth_payload = self
            .config
            .auth_payload
            .clone()
            .unwrap_or_default()
            .into_boxed_slice();
        let mut connection =
            Connection::new(&self.config.connection, server_address, auth_payload, now)?;
        connection.queue_connect_request(now);
        self.connection = Some(connection);

        info!("connecting to {}", server_address);
        Ok(())
    }

    /// Tells the server and tears the connection down
    pub fn disconnect(&mut self, now: Instant) -> Result<(), ClientError> {
        if self.connection.is_none() {
            return Err(ClientError::NotConnected);
        }
        self.teardown(DisconnectReason::Requested, true, now);
        Ok(())
    }

    /// Whether the server accepted the connection
    pub fn is_connected(&self) -> bool {
        self.connection
            .as_ref()
            .is_some_and(Connection::is_accepted)
    }

    pub fn server_address(&self) -> Option<SocketAddr> {
        self.connection.as_ref().map(Connection::address)
    }

    /// Called once the server accepts the connection. A listener added
    /// while connected is called right away.
    pub fn on_connected<F: FnMut(&SocketAddr) + Send + 'static>(&mut self, listener: F) {
        self.on_connected.add_listener(listener);
    }

    /// Smoothed round-trip time to the server
    pub fn rtt(&self) -> Option<Duration> {
        self.connection
            .as_ref()
            .and_then(|connection| connection.rtt.get())
    }

    fn teardown(&mut self, reason: DisconnectReason, notify_server: bool, now: Instant) {
        let Some(mut connection) = self.connection.take() else {
            return;
        };
        let address = connection.address();

        if notify_server {
            connection.base.queue_disconnect(reason);
            connection.base.send_packets(&mut self.transport, now);
        }

        connection.base.reply_table.fail_all();
        let outcomes = connection.base.take_notify_outcomes();
        for key in outcomes.delivered {
            self.events.push_delivered(key);
        }
        for key in outcomes.lost.into_iter().chain(connection.base.drain_in_flight()) {
            self.events.push_lost(key);
        }

        let net_ids: Vec<NetId> = self.objects.keys().copied().collect();
        for net_id in net_ids {
            self.hide_object(&net_id);
        }
        self.dirty_set.take_marks();
        self.dirty_set.take_objects();
        self.on_connected.reset();

        info!("disconnected from {}: {:?}", address, reason);
        self.events.push_disconnection(address, reason);
    }

    // Scene

    /// Registers how to build an object spawned from `prefab_hash`
    ///
    /// # Panics
    ///
    /// Panics if the prefab hash is already registered.
    pub fn register_prefab<F>(&mut self, prefab_hash: PrefabHash, factory: F)
    where
        F: Fn() -> Vec<Box<dyn Replicate>> + Send + 'static,
    {
        if let Err(error) = self.try_register_prefab(prefab_hash, factory) {
            panic!("{}", error);
        }
    }

    pub fn try_register_prefab<F>(
        &mut self,
        prefab_hash: PrefabHash,
        factory: F,
    ) -> Result<(), ClientError>
    where
        F: Fn() -> Vec<Box<dyn Replicate>> + Send + 'static,
    {
        self.prefabs.add_prefab(prefab_hash, factory)
    }

    /// Places a scene object in the dormant pool until the server spawns it
    pub fn register_scene_object(
        &mut self,
        scene_id: SceneId,
        components: Vec<Box<dyn Replicate>>,
    ) -> Result<(), ClientError> {
        self.prefabs.add_scene_object(scene_id, components)
    }

    /// Tells the server the scene is loaded and objects may be spawned here
    pub fn scene_ready(&mut self) -> Result<(), ClientError> {
        self.send_message(&SceneReadyMessage)
    }

    // Objects

    pub fn object(&self, net_id: &NetId) -> Option<&ClientObject> {
        self.objects.get(net_id)
    }

    pub fn object_mut(&mut self, net_id: &NetId) -> Option<&mut ClientObject> {
        self.objects.get_mut(net_id)
    }

    pub fn objects(&self) -> impl Iterator<Item = &ClientObject> {
        self.objects.values()
    }

    // Messages

    /// Queues a message on the reliable channel
    pub fn send_message<M: Message>(&mut self, message: &M) -> Result<(), ClientError> {
        let connection = accepted(&mut self.connection)?;
        connection
            .base
            .queue_message(&self.protocol.message_kinds, message)
            .map_err(|error| ClientError::Connection {
                address: connection.address(),
                error,
            })
    }

    /// Sends a message on the notify channel. Its delivery or loss comes
    /// back as a `NotifyDeliveredEvent` or `NotifyLostEvent` with the
    /// returned key.
    pub fn send_notify<M: Message>(&mut self, message: &M, now: Instant) -> Result<NotifyKey, ClientError> {
        let connection = accepted(&mut self.connection)?;
        connection
            .base
            .queue_notify(&self.protocol.message_kinds, message, now)
            .map_err(|error| ClientError::Connection {
                address: connection.address(),
                error,
            })
    }

    // Remote calls

    /// Invokes a server handler on a component of a spawned object
    pub fn call_server_rpc<A: Serde>(&mut self, target: RpcTarget, args: &A) -> Result<(), ClientError> {
        if !self.objects.contains_key(&target.net_id) {
            return Err(ClientError::ObjectNotFound {
                net_id: target.net_id,
            });
        }
        self.send_message(&RpcMessage {
            net_id: target.net_id,
            component_index: target.component_index,
            function_index: target.function_index,
            payload: encode(args),
        })
    }

    /// Invokes a server handler and hands its reply, a failure, or a
    /// timeout to `continuation`
    pub fn call_server_rpc_with_reply<A, R, F>(
        &mut self,
        target: RpcTarget,
        args: &A,
        continuation: F,
        now: Instant,
    ) -> Result<(), ClientError>
    where
        A: Serde,
        R: Serde + 'static,
        F: FnOnce(Result<R, RpcReplyError>) + Send + 'static,
    {
        if !self.objects.contains_key(&target.net_id) {
            return Err(ClientError::ObjectNotFound {
                net_id: target.net_id,
            });
        }
        let connection = accepted(&mut self.connection)?;
        let reply_id = connection
            .base
            .reply_table
            .register_typed::<R, F>(continuation, now);
        let message = RpcWithReplyMessage {
            net_id: target.net_id,
            component_index: target.component_index,
            function_index: target.function_index,
            reply_id,
            payload: encode(args),
        };
        self.send_message(&message)
    }

    // Packets

    /// Pulls every pending datagram from the transport and interprets it.
    /// Malformed input tears the connection down and never panics.
    pub fn receive_all_packets(&mut self, now: Instant) {
        loop {
            match self.transport.receive() {
                Ok(Some((address, payload))) => self.process_packet(address, &payload, now),
                Ok(None) => break,
                Err(error) => {
                    self.events.push_error(error.into());
                    break;
                }
            }
        }
        self.collect_notify_outcomes();
    }

    fn process_packet(&mut self, address: SocketAddr, payload: &[u8], now: Instant) {
        let Some(connection) = self.connection.as_mut() else {
            debug!("dropping packet from {}, not connected", address);
            return;
        };
        if connection.address() != address {
            warn!("dropping packet from {}, which is not the server", address);
            return;
        }

        let mut reader = BitReader::new(payload);
        let packet_type = match PacketType::de(&mut reader) {
            Ok(packet_type) => packet_type,
            Err(error) => {
                return self.handle_error(
                    ClientError::Connection {
                        address,
                        error: error.into(),
                    },
                    now,
                );
            }
        };

        match packet_type {
            PacketType::ConnectAccept => {
                connection.base.mark_heard(now);
                if !connection.is_accepted() {
                    connection.accept(now);
                    info!("connected to {}", address);
                    self.events.push_connection(address);
                    self.on_connected.invoke(address);
                }
            }
            PacketType::Disconnect => {
                let reason = DisconnectReason::de(&mut reader)
                    .unwrap_or(DisconnectReason::ProtocolViolation);
                self.teardown(reason, false, now);
            }
            packet_type => {
                if !connection.is_accepted() {
                    warn!("dropping {:?} packet received before the connection was accepted", packet_type);
                    return;
                }
                match connection.base.read_packet(
                    packet_type,
                    &mut reader,
                    &self.protocol.message_kinds,
                    now,
                ) {
                    Ok(Some(message)) => {
                        if let Err(error) = self.receive_message(message, now) {
                            self.handle_error(error, now);
                        }
                    }
                    Ok(None) => {}
                    Err(error) => self.handle_error(ClientError::Connection { address, error }, now),
                }
            }
        }
    }

    fn handle_error(&mut self, error: ClientError, now: Instant) {
        if error.is_protocol_violation() {
            warn!("protocol violation from the server: {}", error);
            self.events.push_error(error);
            self.teardown(DisconnectReason::ProtocolViolation, true, now);
        } else {
            self.events.push_error(error);
        }
    }

    fn receive_message(&mut self, message: MessageContainer, now: Instant) -> Result<(), ClientError> {
        let message = match message.downcast::<SpawnMessage>() {
            Ok(message) => return self.receive_spawn(message),
            Err(message) => message,
        };
        let message = match message.downcast::<UpdateVarsMessage>() {
            Ok(message) => return self.receive_update(message.net_id, &message.payload),
            Err(message) => message,
        };
        let message = match message.downcast::<UpdateBatchMessage>() {
            Ok(message) => {
                for (net_id, payload) in read_batch(&message.payload)? {
                    self.receive_update(net_id, &payload)?;
                }
                return Ok(());
            }
            Err(message) => message,
        };
        let message = match message.downcast::<ObjectDestroyMessage>() {
            Ok(message) => {
                self.destroy_object(&message.net_id);
                return Ok(());
            }
            Err(message) => message,
        };
        let message = match message.downcast::<ObjectHideMessage>() {
            Ok(message) => {
                self.hide_object(&message.net_id);
                return Ok(());
            }
            Err(message) => message,
        };
        let message = match message.downcast::<RemoveAuthorityMessage>() {
            Ok(message) => {
                match self.objects.get_mut(&message.net_id) {
                    Some(object) => {
                        if object.set_authority(false) {
                            self.events.push_authority(message.net_id, false);
                        }
                    }
                    None => warn!("authority removed from unknown object {}", message.net_id),
                }
                return Ok(());
            }
            Err(message) => message,
        };
        let message = match message.downcast::<RpcMessage>() {
            Ok(message) => {
                let target = RpcTarget {
                    net_id: message.net_id,
                    component_index: message.component_index,
                    function_index: message.function_index,
                };
                return self.receive_rpc(target, &message.payload, None);
            }
            Err(message) => message,
        };
        let message = match message.downcast::<RpcWithReplyMessage>() {
            Ok(message) => {
                let target = RpcTarget {
                    net_id: message.net_id,
                    component_index: message.component_index,
                    function_index: message.function_index,
                };
                return self.receive_rpc(target, &message.payload, Some(message.reply_id));
            }
            Err(message) => message,
        };
        let message = match message.downcast::<RpcReply>() {
            Ok(reply) => {
                if let Some(connection) = self.connection.as_mut() {
                    let reply_id = reply.reply_id;
                    if !connection.base.reply_table.resolve(reply) {
                        warn!("server replied to unknown call {}, dropping it", reply_id);
                    }
                }
                return Ok(());
            }
            Err(message) => message,
        };
        let message = match message.downcast::<NetworkPongMessage>() {
            Ok(pong) => {
                let sent_at = pong.client_time;
                let received_at = now.saturating_duration_since(self.epoch).as_secs_f64();
                if let Some(connection) = self.connection.as_mut() {
                    connection.rtt.record(received_at - sent_at);
                }
                return Ok(());
            }
            Err(message) => message,
        };

        if message.is::<SceneNotReadyMessage>() {
            let net_ids: Vec<NetId> = self.objects.keys().copied().collect();
            for net_id in net_ids {
                self.hide_object(&net_id);
            }
            return Ok(());
        }
        if message.is::<SceneReadyMessage>() || message.is::<NetworkPingMessage>() {
            return Err(ClientError::UnexpectedMessage {
                name: message.name(),
            });
        }

        self.events.push_message(message);
        Ok(())
    }

    /// Resolves the object a spawn refers to: an object already present
    /// (the server re-sends spawns when authority moves), a dormant scene
    /// object, or a new instance of a registered prefab
    fn receive_spawn(&mut self, message: SpawnMessage) -> Result<(), ClientError> {
        let net_id = message.net_id;

        if let Some(object) = self.objects.get_mut(&net_id) {
            deserialize_payload(&mut object.slots, ReadMode::Snapshot, &message.payload)
                .map_err(|error| ClientError::Serializer { net_id, error })?;
            object.spawn_values = message.spawn_values;
            object.is_local_player = message.is_local_player;
            if object.set_authority(message.is_owner) {
                self.events.push_authority(net_id, message.is_owner);
            }
            return Ok(());
        }

        let (identity, components) = match (message.scene_id, message.prefab_hash) {
            (Some(scene_id), None) => {
                let Some(components) = self.prefabs.take_scene_object(&scene_id) else {
                    return Err(ClientError::SceneObjectNotFound { net_id, scene_id });
                };
                (ObjectIdentity::Scene(scene_id), components)
            }
            (None, Some(prefab_hash)) => {
                let Some(components) = self.prefabs.instantiate(&prefab_hash) else {
                    return Err(ClientError::PrefabNotFound {
                        net_id,
                        prefab_hash,
                    });
                };
                (ObjectIdentity::Prefab(prefab_hash), components)
            }
            (None, None) | (Some(_), Some(_)) => {
                return Err(ClientError::UnresolvableSpawn { net_id })
            }
        };

        let mut slots = Vec::with_capacity(components.len());
        for (index, mut component) in components.into_iter().enumerate() {
            let mutator = PropertyMutator::new(ComponentMutator::new(
                net_id,
                index as u8,
                self.dirty_set.clone(),
            ));
            if let Err(error) = attach_mutator(component.as_mut(), &mutator) {
                return Err(ClientError::Serializer { net_id, error });
            }
            slots.push(ComponentSlot::new(component));
        }

        let mut object = ClientObject::new(net_id, identity, slots);
        if let Err(error) = deserialize_payload(&mut object.slots, ReadMode::Snapshot, &message.payload) {
            if let ObjectIdentity::Scene(scene_id) = identity {
                self.prefabs
                    .return_scene_object(scene_id, object.into_components());
            }
            return Err(ClientError::Serializer { net_id, error });
        }
        object.spawn_values = message.spawn_values;
        object.is_local_player = message.is_local_player;
        let has_authority = message.is_owner;
        object.set_authority(has_authority);

        debug!("spawned object {} as {:?}", net_id, identity);
        self.objects.insert(net_id, object);
        self.events.push_spawn(net_id);
        if has_authority {
            self.events.push_authority(net_id, true);
        }
        Ok(())
    }

    fn receive_update(&mut self, net_id: NetId, payload: &[u8]) -> Result<(), ClientError> {
        let Some(object) = self.objects.get_mut(&net_id) else {
            warn!("dropping update for unknown object {}", net_id);
            return Ok(());
        };
        let updates = deserialize_payload(&mut object.slots, ReadMode::Delta, payload)
            .map_err(|error| ClientError::Serializer { net_id, error })?;
        for update in updates {
            self.events.push_update(net_id, update.component_index);
        }
        Ok(())
    }

    fn destroy_object(&mut self, net_id: &NetId) {
        if self.objects.remove(net_id).is_none() {
            warn!("server destroyed unknown object {}", net_id);
            return;
        }
        self.dirty_set.remove(net_id);
        debug!("destroyed object {}", net_id);
        self.events.push_despawn(*net_id);
    }

    /// Scene objects go back to the dormant pool, prefab instances are
    /// dropped
    fn hide_object(&mut self, net_id: &NetId) {
        let Some(object) = self.objects.remove(net_id) else {
            warn!("server hid unknown object {}", net_id);
            return;
        };
        self.dirty_set.remove(net_id);
        if let ObjectIdentity::Scene(scene_id) = object.identity() {
            self.prefabs
                .return_scene_object(scene_id, object.into_components());
        }
        self.events.push_hide(*net_id);
    }

    fn receive_rpc(
        &mut self,
        target: RpcTarget,
        args: &[u8],
        reply_id: Option<u32>,
    ) -> Result<(), ClientError> {
        let slots = self
            .objects
            .get_mut(&target.net_id)
            .map(|object| &mut object.slots[..]);

        let mut reader = BitReader::new(args);
        let mut reply = StreamWriter::new();
        let result = dispatch_rpc(
            &self.protocol.rpc_registry,
            InvokeType::ClientRpc,
            slots,
            target,
            false,
            &mut reader,
            &mut reply,
        );

        let reply = match result {
            Ok(()) => RpcReply {
                reply_id: reply_id.unwrap_or_default(),
                success: true,
                payload: reply.to_bytes(),
            },
            Err(error) if error.is_protocol_violation() => return Err(error.into()),
            Err(error) => {
                if error.is_transient() {
                    warn!("dropping remote call from the server: {}", error);
                } else {
                    self.events.push_error(error.clone().into());
                }
                RpcReply {
                    reply_id: reply_id.unwrap_or_default(),
                    success: false,
                    payload: encode(&failure_reason(&error)),
                }
            }
        };

        if reply_id.is_some() {
            self.send_message(&reply)?;
        }
        Ok(())
    }

    // Update

    /// Handles timeouts and handshake retries, pings the server, expires
    /// pending replies, and sends the changes made to owned objects
    pub fn update(&mut self, now: Instant) {
        let Some(connection) = self.connection.as_mut() else {
            return;
        };
        if connection.base.should_drop(now) {
            self.teardown(DisconnectReason::Timeout, false, now);
            return;
        }
        if connection.should_resend_connect(now) {
            debug!("resending connect request to {}", connection.address());
            connection.queue_connect_request(now);
        }
        if !connection.is_accepted() {
            return;
        }

        let expired = connection
            .base
            .reply_table
            .sweep(now, self.config.connection.reply_timeout);
        if expired > 0 {
            debug!("{} calls to the server timed out", expired);
        }

        if connection.should_ping(now) {
            let ping = NetworkPingMessage {
                client_time: now.saturating_duration_since(self.epoch).as_secs_f64(),
            };
            if let Err(error) = connection
                .base
                .queue_message(&self.protocol.message_kinds, &ping)
            {
                self.events.push_error(ClientError::Connection {
                    address: connection.address(),
                    error,
                });
            }
            connection.mark_pinged(now);
        }

        self.sync_owned_objects(now);
        self.collect_notify_outcomes();
    }

    fn sync_owned_objects(&mut self, now: Instant) {
        let context = SyncContext::client(true);

        for ((net_id, component_index), bits) in self.dirty_set.take_marks() {
            let Some(object) = self.objects.get_mut(&net_id) else {
                continue;
            };
            if !object.has_authority() {
                continue;
            }
            if let Some(slot) = object.slots.get_mut(component_index as usize) {
                if slot.component.sync_settings().should_sync_from(&context) {
                    slot.state.set_dirty_bits(bits);
                }
            }
        }

        let Some(connection) = self.connection.as_mut() else {
            return;
        };
        for net_id in self.dirty_set.take_objects() {
            let Some(object) = self.objects.get_mut(&net_id) else {
                continue;
            };
            if !object.has_authority() {
                continue;
            }

            match serialize_delta(&mut object.slots, &context, now) {
                Ok(serialized) => {
                    if let Some(payload) = serialized.owner {
                        let message = UpdateVarsMessage { net_id, payload };
                        if let Err(error) = connection
                            .base
                            .queue_message(&self.protocol.message_kinds, &message)
                        {
                            self.events.push_error(ClientError::Connection {
                                address: connection.address(),
                                error,
                            });
                        }
                    }
                }
                Err(error) => self
                    .events
                    .push_error(ClientError::Serializer { net_id, error }),
            }

            if object.has_pending_changes(&context) {
                self.dirty_set.insert(net_id);
            }
        }
    }

    fn collect_notify_outcomes(&mut self) {
        let Some(connection) = self.connection.as_mut() else {
            return;
        };
        let outcomes = connection.base.take_notify_outcomes();
        for key in outcomes.delivered {
            self.events.push_delivered(key);
        }
        for key in outcomes.lost {
            self.events.push_lost(key);
        }
    }

    /// Queues acks and heartbeats that are due and hands every queued
    /// packet to the transport
    pub fn send_all_packets(&mut self, now: Instant) {
        let Some(connection) = self.connection.as_mut() else {
            return;
        };
        if connection.is_accepted() {
            connection.base.queue_keepalive(now);
        }
        connection.base.send_packets(&mut self.transport, now);
    }
}

fn accepted(connection: &mut Option<Connection>) -> Result<&mut Connection, ClientError> {
    match connection.as_mut() {
        Some(connection) if connection.is_accepted() => Ok(connection),
        _ => Err(ClientError::NotConnected),
    }
}

fn encode<A: Serde>(value: &A) -> Box<[u8]> {
    let mut writer = StreamWriter::new();
    value.ser(&mut writer);
    writer.to_bytes()
}

fn failure_reason(error: &RpcDispatchError) -> String {
    match error {
        RpcDispatchError::HandlerFailed { reason, .. } => reason.clone(),
        error => error.to_string(),
    }
}
