use std::{
    collections::{HashMap, HashSet, VecDeque},
    net::SocketAddr,
    time::Instant,
};

use log::{debug, info, trace, warn};

use meridian_shared::{
    attach_mutator, deserialize_payload, dispatch_rpc, serialize_delta, serialize_snapshot,
    write_packet, BitReader, ComponentMutator, ComponentSlot, ConnectionError, DirtySet,
    DisconnectReason, InvokeType, Message, MessageContainer, NetId,
    NetworkPingMessage, NetworkPongMessage, NotifyKey, ObjectDestroyMessage, ObjectHideMessage,
    ObjectIdentity, PacketType, PrefabHash, PropertyMutator, Protocol, ReadMode,
    RemoveAuthorityMessage, Replicate, RpcDispatchError, RpcMessage, RpcReply, RpcReplyError,
    RpcTarget, RpcWithReplyMessage, SceneId, SceneNotReadyMessage, SceneReadyMessage, Serde,
    SerializedComponents, SerializerError, SpawnMessage, StreamWriter, SyncContext, Transport,
    TransportChannel, UpdateBatchMessage, UpdateVarsMessage, MAX_COMPONENTS,
};

use crate::{
    connection::connection::Connection,
    events::Events,
    user::{User, UserKey},
    world::{
        server_object::{DormantObject, ServerObject, SpawnOptions},
        visibility::{AllVisible, VisibilityPolicy},
    },
    ServerConfig, ServerError,
};

/// Who receives a server to client call
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RpcRecipient {
    /// Every observer of the object
    Observers,
    /// The object's owner, if it observes the object
    Owner,
    /// One user, which must observe the object
    User(UserKey),
}

/// An authoritative server: accepts clients over a `Transport`, spawns
/// replicated objects, keeps each object's observers up to date and routes
/// remote calls.
///
/// Driven by the application loop: `receive_all_packets`,
/// `process_all_packets`, `update`, `send_all_packets`, then
/// `take_events`. Every time-dependent call takes `now` explicitly.
pub struct Server<T: Transport> {
    config: ServerConfig,
    protocol: Protocol,
    transport: T,
    epoch: Instant,
    // users
    next_user_key: u64,
    users: HashMap<UserKey, User>,
    user_addresses: HashMap<SocketAddr, UserKey>,
    user_connections: HashMap<UserKey, Connection>,
    // objects
    next_net_id: u32,
    objects: HashMap<NetId, ServerObject>,
    scene_objects: HashMap<SceneId, DormantObject>,
    dirty_set: DirtySet,
    visibility: Box<dyn VisibilityPolicy>,
    // io
    incoming_packets: VecDeque<(SocketAddr, Box<[u8]>)>,
    events: Events,
}

impl<T: Transport> Server<T> {
    /// Create a new Server. Locks the protocol.
    ///
    /// # Panics
    ///
    /// Panics if the protocol is already locked.
    pub fn new(
        server_config: ServerConfig,
        mut protocol: Protocol,
        transport: T,
    ) -> Result<Self, ServerError> {
        server_config.connection.validate()?;
        protocol.lock();

        Ok(Self {
            config: server_config,
            protocol,
            transport,
            epoch: Instant::now(),
            next_user_key: 0,
            users: HashMap::new(),
            user_addresses: HashMap::new(),
            user_connections: HashMap::new(),
            next_net_id: 1,
            objects: HashMap::new(),
            scene_objects: HashMap::new(),
            dirty_set: DirtySet::new(),
            visibility: Box::new(AllVisible),
            incoming_packets: VecDeque::new(),
            events: Events::new(),
        })
    }

    pub fn protocol(&self) -> &Protocol {
        &self.protocol
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn set_visibility_policy<V: VisibilityPolicy + 'static>(&mut self, policy: V) {
        self.visibility = Box::new(policy);
    }

    /// Everything that happened since the last call
    pub fn take_events(&mut self) -> Events {
        std::mem::take(&mut self.events)
    }

    // Users

    pub fn user(&self, user_key: &UserKey) -> Option<&User> {
        self.users.get(user_key)
    }

    /// Keys of every accepted user
    pub fn user_keys(&self) -> Vec<UserKey> {
        self.user_connections.keys().copied().collect()
    }

    pub fn users_count(&self) -> usize {
        self.user_connections.len()
    }

    pub fn is_connected(&self, user_key: &UserKey) -> bool {
        self.user_connections.contains_key(user_key)
    }

    /// Accepts a user waiting for authentication
    pub fn accept_connection(&mut self, user_key: &UserKey, now: Instant) -> Result<(), ServerError> {
        let Some(user) = self.users.get(user_key) else {
            return Err(ServerError::UserNotFound {
                user_key: *user_key,
            });
        };
        if self.user_connections.contains_key(user_key) {
            return Err(ServerError::NoPendingAuth {
                user_key: *user_key,
            });
        }

        let address = user.address();
        let mut connection = Connection::new(
            &self.config.connection,
            &self.config.batch,
            address,
            user_key,
            now,
        )?;
        connection.base.queue_packet(
            TransportChannel::Reliable,
            write_packet(PacketType::ConnectAccept, |_| {}),
        );
        self.user_connections.insert(*user_key, connection);

        info!("accepted connection from {} as {}", address, user_key);
        self.events.push_connection(user_key);
        Ok(())
    }

    /// Refuses a user waiting for authentication. The client is told why.
    pub fn reject_connection(&mut self, user_key: &UserKey) -> Result<(), ServerError> {
        self.refuse_pending(user_key, DisconnectReason::AuthRejected)
    }

    fn refuse_pending(&mut self, user_key: &UserKey, reason: DisconnectReason) -> Result<(), ServerError> {
        if self.user_connections.contains_key(user_key) {
            return Err(ServerError::NoPendingAuth {
                user_key: *user_key,
            });
        }
        let Some(user) = self.users.remove(user_key) else {
            return Err(ServerError::UserNotFound {
                user_key: *user_key,
            });
        };
        self.user_addresses.remove(&user.address());

        info!("refused connection from {}: {:?}", user.address(), reason);
        let packet = write_packet(PacketType::Disconnect, |writer| reason.ser(writer));
        self.transport
            .send(&user.address(), TransportChannel::Unreliable, &packet)?;
        Ok(())
    }

    /// Tells the client to disconnect and tears the connection down
    pub fn disconnect_user(&mut self, user_key: &UserKey, now: Instant) -> Result<(), ServerError> {
        if !self.user_connections.contains_key(user_key) {
            return Err(ServerError::UserNotFound {
                user_key: *user_key,
            });
        }
        self.teardown(user_key, DisconnectReason::Requested, now);
        Ok(())
    }

    /// Disconnects every user with `ServerShutdown`
    pub fn shutdown(&mut self, now: Instant) {
        let user_keys: Vec<UserKey> = self.user_connections.keys().copied().collect();
        for user_key in user_keys {
            self.teardown(&user_key, DisconnectReason::ServerShutdown, now);
        }
    }

    fn teardown(&mut self, user_key: &UserKey, reason: DisconnectReason, now: Instant) {
        let Some(mut connection) = self.user_connections.remove(user_key) else {
            return;
        };
        let address = connection.address();

        if reason != DisconnectReason::Timeout {
            connection.base.queue_disconnect(reason);
            connection.base.send_packets(&mut self.transport, now);
        }

        connection.base.reply_table.fail_all();
        let outcomes = connection.base.take_notify_outcomes();
        for key in outcomes.delivered {
            self.events.push_delivered(user_key, key);
        }
        for key in outcomes.lost.into_iter().chain(connection.base.drain_in_flight()) {
            self.events.push_lost(user_key, key);
        }

        self.users.remove(user_key);
        self.user_addresses.remove(&address);

        let owned: Vec<NetId> = self
            .objects
            .values()
            .filter(|object| object.owner == Some(*user_key))
            .map(|object| object.net_id())
            .collect();
        for net_id in owned {
            if let Err(error) = self.destroy(&net_id) {
                self.events.push_error(error);
            }
        }
        for object in self.objects.values_mut() {
            object.observers.remove(user_key);
        }

        info!("{} at {} disconnected: {:?}", user_key, address, reason);
        self.events.push_disconnection(user_key, address, reason);
    }

    // Scene readiness

    /// Marks the user ready to observe objects and spawns everything
    /// visible to it
    pub fn set_scene_ready(&mut self, user_key: &UserKey) -> Result<(), ServerError> {
        if !self.user_connections.contains_key(user_key) {
            return Err(ServerError::UserNotConnected {
                user_key: *user_key,
            });
        }
        let Some(user) = self.users.get_mut(user_key) else {
            return Err(ServerError::UserNotFound {
                user_key: *user_key,
            });
        };
        if user.is_scene_ready() {
            return Ok(());
        }
        user.set_scene_ready(true);
        self.events.push_scene_ready(user_key);

        self.rebuild_all_observers()
    }

    /// Removes the user from every observer set. It keeps its connection.
    pub fn set_scene_not_ready(&mut self, user_key: &UserKey) -> Result<(), ServerError> {
        let Some(user) = self.users.get_mut(user_key) else {
            return Err(ServerError::UserNotFound {
                user_key: *user_key,
            });
        };
        user.set_scene_ready(false);

        for object in self.objects.values_mut() {
            object.observers.remove(user_key);
        }
        self.send_message(user_key, &SceneNotReadyMessage)
    }

    // Objects

    pub fn object(&self, net_id: &NetId) -> Option<&ServerObject> {
        self.objects.get(net_id)
    }

    pub fn object_mut(&mut self, net_id: &NetId) -> Option<&mut ServerObject> {
        self.objects.get_mut(net_id)
    }

    pub fn objects(&self) -> impl Iterator<Item = &ServerObject> {
        self.objects.values()
    }

    /// Places a scene object in the dormant pool until
    /// `spawn_scene_object` is called for it
    pub fn register_scene_object(
        &mut self,
        scene_id: SceneId,
        object: DormantObject,
    ) -> Result<(), ServerError> {
        if self.scene_objects.contains_key(&scene_id) {
            return Err(ServerError::SceneObjectAlreadyRegistered { scene_id });
        }
        self.scene_objects.insert(scene_id, object);
        Ok(())
    }

    /// Spawns an object instantiated from a prefab
    pub fn spawn(
        &mut self,
        prefab_hash: PrefabHash,
        components: Vec<Box<dyn Replicate>>,
        options: SpawnOptions,
    ) -> Result<NetId, ServerError> {
        self.spawn_object(ObjectIdentity::Prefab(prefab_hash), components, options)
    }

    /// Spawns a dormant scene object. The spawn values registered with the
    /// object are used unless `options` carries its own.
    pub fn spawn_scene_object(
        &mut self,
        scene_id: SceneId,
        mut options: SpawnOptions,
    ) -> Result<NetId, ServerError> {
        let Some(dormant) = self.scene_objects.remove(&scene_id) else {
            return Err(ServerError::SceneObjectNotFound { scene_id });
        };
        if options.spawn_values == Default::default() {
            options.spawn_values = dormant.spawn_values;
        }
        self.spawn_object(ObjectIdentity::Scene(scene_id), dormant.components, options)
    }

    fn spawn_object(
        &mut self,
        identity: ObjectIdentity,
        mut components: Vec<Box<dyn Replicate>>,
        options: SpawnOptions,
    ) -> Result<NetId, ServerError> {
        if components.len() > MAX_COMPONENTS {
            return Err(ServerError::Serializer {
                net_id: NetId::UNSPAWNED,
                error: SerializerError::TooManyComponents {
                    count: components.len(),
                },
            });
        }
        for component in &components {
            component.sync_settings().validate()?;
        }
        if let Some(owner) = options.owner {
            if !self.user_connections.contains_key(&owner) {
                return Err(ServerError::UserNotConnected { user_key: owner });
            }
        }

        let net_id = self.next_net_id();
        let mut slots = Vec::with_capacity(components.len());
        for (index, mut component) in components.drain(..).enumerate() {
            let mutator = PropertyMutator::new(ComponentMutator::new(
                net_id,
                index as u8,
                self.dirty_set.clone(),
            ));
            attach_mutator(component.as_mut(), &mutator)
                .map_err(|error| ServerError::Serializer { net_id, error })?;
            slots.push(ComponentSlot::new(component));
        }

        debug!("spawning object {} as {:?}", net_id, identity);
        self.objects
            .insert(net_id, ServerObject::new(net_id, identity, slots, options));
        self.rebuild_observers(&net_id)?;
        Ok(net_id)
    }

    fn next_net_id(&mut self) -> NetId {
        loop {
            let net_id = NetId(self.next_net_id);
            self.next_net_id = self.next_net_id.wrapping_add(1);
            if net_id.is_spawned() && !self.objects.contains_key(&net_id) {
                return net_id;
            }
        }
    }

    /// Destroys an object on every observer and on the server
    pub fn destroy(&mut self, net_id: &NetId) -> Result<(), ServerError> {
        self.remove_object(net_id, false).map(|_| ())
    }

    /// Hides an object from every observer but keeps its components.
    ///
    /// A scene object goes back to the dormant pool on the server and on
    /// its observers, and `None` is returned. A prefab object is handed
    /// back to the caller.
    pub fn unspawn(&mut self, net_id: &NetId) -> Result<Option<DormantObject>, ServerError> {
        let object = self.remove_object(net_id, true)?;
        match object.identity() {
            ObjectIdentity::Scene(scene_id) => {
                self.scene_objects.insert(scene_id, object.into_dormant());
                Ok(None)
            }
            ObjectIdentity::Prefab(_) => Ok(Some(object.into_dormant())),
        }
    }

    fn remove_object(&mut self, net_id: &NetId, hide: bool) -> Result<ServerObject, ServerError> {
        let Some(object) = self.objects.remove(net_id) else {
            return Err(ServerError::ObjectNotFound { net_id: *net_id });
        };
        self.dirty_set.remove(net_id);

        let message_kinds = &self.protocol.message_kinds;
        for user_key in object.observers() {
            let Some(connection) = self.user_connections.get_mut(user_key) else {
                continue;
            };
            let result = if hide {
                connection
                    .base
                    .queue_message(message_kinds, &ObjectHideMessage { net_id: *net_id })
            } else {
                connection
                    .base
                    .queue_message(message_kinds, &ObjectDestroyMessage { net_id: *net_id })
            };
            if let Err(error) = result {
                self.events.push_error(connection.error(error));
            }
        }
        debug!("removed object {}", net_id);
        Ok(object)
    }

    // Authority

    /// Makes `user_key` the owner of the object. The new owner receives a
    /// fresh spawn with `is_owner` set, the previous owner loses authority.
    pub fn assign_authority(&mut self, net_id: &NetId, user_key: &UserKey) -> Result<(), ServerError> {
        if !self.user_connections.contains_key(user_key) {
            return Err(ServerError::UserNotConnected {
                user_key: *user_key,
            });
        }
        let Some(object) = self.objects.get(net_id) else {
            return Err(ServerError::ObjectNotFound { net_id: *net_id });
        };
        match object.owner {
            Some(owner) if owner == *user_key => return Ok(()),
            Some(_) => self.remove_authority(net_id)?,
            None => {}
        }

        let Some(object) = self.objects.get_mut(net_id) else {
            return Err(ServerError::ObjectNotFound { net_id: *net_id });
        };
        object.owner = Some(*user_key);
        if object.observers.contains(user_key) {
            let snapshot = serialize_snapshot(&object.slots)
                .map_err(|error| ServerError::Serializer { net_id: *net_id, error })?;
            let message = spawn_message(object, user_key, &snapshot);
            if let Some(connection) = self.user_connections.get_mut(user_key) {
                connection
                    .base
                    .queue_message(&self.protocol.message_kinds, &message)
                    .map_err(|error| connection.error(error))?;
            }
        }
        self.rebuild_observers(net_id)
    }

    /// Takes authority away from the object's owner
    pub fn remove_authority(&mut self, net_id: &NetId) -> Result<(), ServerError> {
        let Some(object) = self.objects.get_mut(net_id) else {
            return Err(ServerError::ObjectNotFound { net_id: *net_id });
        };
        let Some(owner) = object.owner.take() else {
            return Ok(());
        };
        object.is_local_player = false;

        if object.observers.contains(&owner) {
            if let Some(connection) = self.user_connections.get_mut(&owner) {
                connection
                    .base
                    .queue_message(
                        &self.protocol.message_kinds,
                        &RemoveAuthorityMessage { net_id: *net_id },
                    )
                    .map_err(|error| connection.error(error))?;
            }
        }
        self.rebuild_observers(net_id)
    }

    // Observers

    /// Recomputes who observes the object. New observers get a spawn with
    /// a snapshot, users that can no longer see it get a hide.
    pub fn rebuild_observers(&mut self, net_id: &NetId) -> Result<(), ServerError> {
        let Some(object) = self.objects.get_mut(net_id) else {
            return Err(ServerError::ObjectNotFound { net_id: *net_id });
        };

        let candidates: HashSet<UserKey> = self
            .users
            .iter()
            .filter(|(user_key, user)| {
                user.is_scene_ready()
                    && self.user_connections.contains_key(user_key)
                    && self.visibility.is_visible(net_id, user_key)
            })
            .map(|(user_key, _)| *user_key)
            .collect();
        let ready_owner = object.owner.filter(|owner| {
            self.users.get(owner).is_some_and(User::is_scene_ready)
                && self.user_connections.contains_key(owner)
        });

        let diff = object.observers.rebuild(candidates, ready_owner);
        if diff.is_empty() {
            return Ok(());
        }

        let message_kinds = &self.protocol.message_kinds;
        for user_key in &diff.removed {
            if let Some(connection) = self.user_connections.get_mut(user_key) {
                connection
                    .base
                    .queue_message(message_kinds, &ObjectHideMessage { net_id: *net_id })
                    .map_err(|error| connection.error(error))?;
            }
        }

        if diff.added.is_empty() {
            return Ok(());
        }
        let snapshot = serialize_snapshot(&object.slots)
            .map_err(|error| ServerError::Serializer { net_id: *net_id, error })?;
        for user_key in &diff.added {
            let message = spawn_message(object, user_key, &snapshot);
            if let Some(connection) = self.user_connections.get_mut(user_key) {
                connection
                    .base
                    .queue_message(message_kinds, &message)
                    .map_err(|error| connection.error(error))?;
            }
        }
        Ok(())
    }

    fn rebuild_all_observers(&mut self) -> Result<(), ServerError> {
        let net_ids: Vec<NetId> = self.objects.keys().copied().collect();
        for net_id in net_ids {
            self.rebuild_observers(&net_id)?;
        }
        Ok(())
    }

    // Messages

    /// Queues a message on the reliable channel
    pub fn send_message<M: Message>(&mut self, user_key: &UserKey, message: &M) -> Result<(), ServerError> {
        let Some(connection) = self.user_connections.get_mut(user_key) else {
            warn!("cannot send {} to unknown user {}", M::name(), user_key);
            return Err(ServerError::UserNotConnected {
                user_key: *user_key,
            });
        };
        connection
            .base
            .queue_message(&self.protocol.message_kinds, message)
            .map_err(|error| connection.error(error))
    }

    /// Sends a message to every accepted user
    pub fn broadcast_message<M: Message>(&mut self, message: &M) -> Result<(), ServerError> {
        for connection in self.user_connections.values_mut() {
            connection
                .base
                .queue_message(&self.protocol.message_kinds, message)
                .map_err(|error| connection.error(error))?;
        }
        Ok(())
    }

    /// Sends a message on the notify channel. Its delivery or loss comes
    /// back as a `NotifyDeliveredEvent` or `NotifyLostEvent` with the
    /// returned key.
    pub fn send_notify<M: Message>(
        &mut self,
        user_key: &UserKey,
        message: &M,
        now: Instant,
    ) -> Result<NotifyKey, ServerError> {
        let Some(connection) = self.user_connections.get_mut(user_key) else {
            warn!("cannot send {} to unknown user {}", M::name(), user_key);
            return Err(ServerError::UserNotConnected {
                user_key: *user_key,
            });
        };
        connection
            .base
            .queue_notify(&self.protocol.message_kinds, message, now)
            .map_err(|error| connection.error(error))
    }

    // Remote calls

    /// Invokes a client handler on every recipient that observes the object
    pub fn call_client_rpc<A: Serde>(
        &mut self,
        target: RpcTarget,
        recipient: RpcRecipient,
        args: &A,
    ) -> Result<(), ServerError> {
        let Some(object) = self.objects.get(&target.net_id) else {
            return Err(ServerError::ObjectNotFound {
                net_id: target.net_id,
            });
        };
        let recipients: Vec<UserKey> = match recipient {
            RpcRecipient::Observers => object.observers().copied().collect(),
            RpcRecipient::Owner => object
                .owner
                .filter(|owner| object.is_observed_by(owner))
                .into_iter()
                .collect(),
            RpcRecipient::User(user_key) => {
                if !object.is_observed_by(&user_key) {
                    warn!("{} does not observe object {}, dropping call", user_key, target.net_id);
                    return Ok(());
                }
                vec![user_key]
            }
        };

        let message = RpcMessage {
            net_id: target.net_id,
            component_index: target.component_index,
            function_index: target.function_index,
            payload: encode(args),
        };
        for user_key in recipients {
            self.send_message(&user_key, &message)?;
        }
        Ok(())
    }

    /// Invokes a client handler on one observer and hands its reply, a
    /// failure, or a timeout to `continuation`
    pub fn call_client_rpc_with_reply<A, R, F>(
        &mut self,
        target: RpcTarget,
        user_key: &UserKey,
        args: &A,
        continuation: F,
        now: Instant,
    ) -> Result<(), ServerError>
    where
        A: Serde,
        R: Serde + 'static,
        F: FnOnce(Result<R, RpcReplyError>) + Send + 'static,
    {
        let Some(object) = self.objects.get(&target.net_id) else {
            return Err(ServerError::ObjectNotFound {
                net_id: target.net_id,
            });
        };
        if !object.is_observed_by(user_key) {
            return Err(ServerError::UserNotConnected {
                user_key: *user_key,
            });
        }
        let Some(connection) = self.user_connections.get_mut(user_key) else {
            return Err(ServerError::UserNotConnected {
                user_key: *user_key,
            });
        };

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
        connection
            .base
            .queue_message(&self.protocol.message_kinds, &message)
            .map_err(|error| connection.error(error))
    }

    // Packets

    /// Pulls every pending datagram from the transport
    pub fn receive_all_packets(&mut self) {
        loop {
            match self.transport.receive() {
                Ok(Some(packet)) => self.incoming_packets.push_back(packet),
                Ok(None) => break,
                Err(error) => {
                    self.events.push_error(error.into());
                    break;
                }
            }
        }
    }

    /// Interprets the received datagrams. Malformed input tears down the
    /// offending connection and never panics.
    pub fn process_all_packets(&mut self, now: Instant) {
        while let Some((address, payload)) = self.incoming_packets.pop_front() {
            self.process_packet(address, &payload, now);
        }
        self.collect_notify_outcomes();
    }

    fn process_packet(&mut self, address: SocketAddr, payload: &[u8], now: Instant) {
        let mut reader = BitReader::new(payload);
        let user_key = self.user_addresses.get(&address).copied();
        let connected = user_key.is_some_and(|user_key| self.user_connections.contains_key(&user_key));

        let packet_type = match PacketType::de(&mut reader) {
            Ok(packet_type) => packet_type,
            Err(error) => {
                match user_key.filter(|_| connected) {
                    Some(user_key) => self.protocol_violation(&user_key, address, error.into(), now),
                    None => warn!("dropping malformed packet from {}", address),
                }
                return;
            }
        };

        match packet_type {
            PacketType::Connect => self.receive_connect(address, &mut reader, now),
            PacketType::Disconnect => {
                if let Some(user_key) = user_key {
                    if connected {
                        self.teardown(&user_key, DisconnectReason::Requested, now);
                    } else {
                        self.users.remove(&user_key);
                        self.user_addresses.remove(&address);
                    }
                }
            }
            packet_type => {
                let Some(user_key) = user_key.filter(|_| connected) else {
                    warn!("dropping {:?} packet from unknown address {}", packet_type, address);
                    return;
                };
                let Some(connection) = self.user_connections.get_mut(&user_key) else {
                    return;
                };
                match connection.base.read_packet(
                    packet_type,
                    &mut reader,
                    &self.protocol.message_kinds,
                    now,
                ) {
                    Ok(Some(message)) => self.receive_message(&user_key, message, now),
                    Ok(None) => {}
                    Err(error) => self.handle_connection_error(&user_key, address, error, now),
                }
            }
        }
    }

    fn receive_connect(&mut self, address: SocketAddr, reader: &mut BitReader, now: Instant) {
        if let Some(user_key) = self.user_addresses.get(&address) {
            // a retransmitted request, answer again if already accepted
            if let Some(connection) = self.user_connections.get_mut(user_key) {
                connection.base.queue_packet(
                    TransportChannel::Reliable,
                    write_packet(PacketType::ConnectAccept, |_| {}),
                );
            }
            return;
        }

        let auth_payload = match Box::<[u8]>::de(reader) {
            Ok(payload) => payload,
            Err(error) => {
                warn!("dropping malformed connect request from {}: {}", address, error);
                return;
            }
        };

        let user_key = UserKey::new(self.next_user_key);
        self.next_user_key += 1;
        self.users.insert(user_key, User::new(address, now));
        self.user_addresses.insert(address, user_key);

        if self.config.require_auth {
            debug!("connect request from {} waiting for auth", address);
            self.events.push_auth(&user_key, auth_payload);
        } else if let Err(error) = self.accept_connection(&user_key, now) {
            self.events.push_error(error);
        }
    }

    fn handle_connection_error(
        &mut self,
        user_key: &UserKey,
        address: SocketAddr,
        error: ConnectionError,
        now: Instant,
    ) {
        if error.is_protocol_violation() {
            self.protocol_violation(user_key, address, error, now);
        } else {
            self.events
                .push_error(ServerError::Connection { address, error });
        }
    }

    fn protocol_violation(
        &mut self,
        user_key: &UserKey,
        address: SocketAddr,
        error: ConnectionError,
        now: Instant,
    ) {
        warn!("protocol violation from {}: {}", address, error);
        self.events
            .push_error(ServerError::Connection { address, error });
        self.teardown(user_key, DisconnectReason::ProtocolViolation, now);
    }

    fn receive_message(&mut self, user_key: &UserKey, message: MessageContainer, now: Instant) {
        let message = match message.downcast::<UpdateVarsMessage>() {
            Ok(message) => return self.receive_owner_update(user_key, message, now),
            Err(message) => message,
        };
        let message = match message.downcast::<RpcMessage>() {
            Ok(message) => {
                let target = RpcTarget {
                    net_id: message.net_id,
                    component_index: message.component_index,
                    function_index: message.function_index,
                };
                return self.receive_rpc(user_key, target, &message.payload, None, now);
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
                return self.receive_rpc(user_key, target, &message.payload, Some(message.reply_id), now);
            }
            Err(message) => message,
        };
        let message = match message.downcast::<RpcReply>() {
            Ok(reply) => {
                if let Some(connection) = self.user_connections.get_mut(user_key) {
                    let reply_id = reply.reply_id;
                    if !connection.base.reply_table.resolve(reply) {
                        warn!("{} replied to unknown call {}, dropping it", user_key, reply_id);
                    }
                }
                return;
            }
            Err(message) => message,
        };
        let message = match message.downcast::<NetworkPingMessage>() {
            Ok(ping) => {
                let pong = NetworkPongMessage {
                    client_time: ping.client_time,
                    server_time: now.saturating_duration_since(self.epoch).as_secs_f64(),
                };
                if let Err(error) = self.send_message(user_key, &pong) {
                    self.events.push_error(error);
                }
                return;
            }
            Err(message) => message,
        };

        if message.is::<SceneReadyMessage>() {
            if let Err(error) = self.set_scene_ready(user_key) {
                self.events.push_error(error);
            }
            return;
        }
        if message.is::<SceneNotReadyMessage>() {
            if let Err(error) = self.set_scene_not_ready(user_key) {
                self.events.push_error(error);
            }
            return;
        }
        if is_server_to_client(&message) {
            warn!("{} sent {}, which only flows to clients", user_key, message.name());
            self.events.push_error(ServerError::UnexpectedMessage {
                user_key: *user_key,
                name: message.name(),
            });
            self.teardown(user_key, DisconnectReason::ProtocolViolation, now);
            return;
        }

        self.events.push_message(user_key, message);
    }

    /// Applies changes the owning client made to its owner-synced components
    fn receive_owner_update(&mut self, user_key: &UserKey, message: UpdateVarsMessage, now: Instant) {
        let net_id = message.net_id;
        let Some(object) = self.objects.get_mut(&net_id) else {
            warn!("{} sent an update for unknown object {}", user_key, net_id);
            return;
        };
        if object.owner != Some(*user_key) {
            warn!("{} sent an update for object {} it does not own", user_key, net_id);
            return;
        }

        match deserialize_payload(&mut object.slots, ReadMode::OwnerDelta, &message.payload) {
            Ok(updates) => {
                let mut relay = false;
                for update in updates {
                    let slot = &mut object.slots[update.component_index as usize];
                    if slot.component.sync_settings().relays_owner_changes() {
                        slot.state.set_dirty_bits(update.dirty_bits);
                        relay = true;
                    }
                }
                if relay {
                    self.dirty_set.insert(net_id);
                }
            }
            Err(error) => {
                warn!("bad update for object {} from {}: {}", net_id, user_key, error);
                self.events
                    .push_error(ServerError::Serializer { net_id, error });
                self.teardown(user_key, DisconnectReason::ProtocolViolation, now);
            }
        }
    }

    fn receive_rpc(
        &mut self,
        user_key: &UserKey,
        target: RpcTarget,
        args: &[u8],
        reply_id: Option<u32>,
        now: Instant,
    ) {
        let object = self.objects.get_mut(&target.net_id);
        let caller_is_owner = object
            .as_ref()
            .is_some_and(|object| object.owner == Some(*user_key));
        let slots = object.map(|object| &mut object.slots[..]);

        let mut reader = BitReader::new(args);
        let mut reply = StreamWriter::new();
        let result = dispatch_rpc(
            &self.protocol.rpc_registry,
            InvokeType::ServerRpc,
            slots,
            target,
            caller_is_owner,
            &mut reader,
            &mut reply,
        );

        let reply = match result {
            Ok(()) => RpcReply {
                reply_id: reply_id.unwrap_or_default(),
                success: true,
                payload: reply.to_bytes(),
            },
            Err(error) if error.is_protocol_violation() => {
                warn!("bad remote call from {}: {}", user_key, error);
                self.events.push_error(ServerError::Rpc {
                    user_key: *user_key,
                    error,
                });
                self.teardown(user_key, DisconnectReason::ProtocolViolation, now);
                return;
            }
            Err(error) => {
                if error.is_transient() {
                    warn!("dropping remote call from {}: {}", user_key, error);
                } else {
                    self.events.push_error(ServerError::Rpc {
                        user_key: *user_key,
                        error: error.clone(),
                    });
                }
                RpcReply {
                    reply_id: reply_id.unwrap_or_default(),
                    success: false,
                    payload: encode(&failure_reason(&error)),
                }
            }
        };

        if reply_id.is_some() {
            if let Err(error) = self.send_message(user_key, &reply) {
                self.events.push_error(error);
            }
        }
    }

    // Update

    /// Drops silent connections and users left waiting for authentication,
    /// expires pending replies, and sends the changes of every dirty object
    /// to its observers
    pub fn update(&mut self, now: Instant) {
        let timed_out: Vec<UserKey> = self
            .user_connections
            .iter()
            .filter(|(_, connection)| connection.base.should_drop(now))
            .map(|(user_key, _)| *user_key)
            .collect();
        for user_key in timed_out {
            self.teardown(&user_key, DisconnectReason::Timeout, now);
        }

        let auth_timeout = self.config.auth_timeout;
        let unanswered: Vec<UserKey> = self
            .users
            .iter()
            .filter(|(user_key, user)| {
                !self.user_connections.contains_key(user_key)
                    && now.saturating_duration_since(user.requested_at()) >= auth_timeout
            })
            .map(|(user_key, _)| *user_key)
            .collect();
        for user_key in unanswered {
            if let Err(error) = self.refuse_pending(&user_key, DisconnectReason::Timeout) {
                self.events.push_error(error);
            }
        }

        let reply_timeout = self.config.connection.reply_timeout;
        for connection in self.user_connections.values_mut() {
            let expired = connection.base.reply_table.sweep(now, reply_timeout);
            if expired > 0 {
                debug!("{} calls to {} timed out", expired, connection.user_key);
            }
        }

        self.sync_objects(now);
        self.collect_notify_outcomes();
    }

    fn sync_objects(&mut self, now: Instant) {
        for ((net_id, component_index), bits) in self.dirty_set.take_marks() {
            let Some(object) = self.objects.get_mut(&net_id) else {
                continue;
            };
            let context = SyncContext::server(object.owner.is_some());
            let Some(slot) = object.slots.get_mut(component_index as usize) else {
                continue;
            };
            // the server never sends these, so the bits would never clear
            if !slot.component.sync_settings().should_sync_from(&context) {
                trace!(
                    "ignoring server-side write to component {} of object {}",
                    component_index,
                    net_id
                );
                continue;
            }
            slot.state.set_dirty_bits(bits);
        }

        let message_kinds = &self.protocol.message_kinds;
        for net_id in self.dirty_set.take_objects() {
            let Some(object) = self.objects.get_mut(&net_id) else {
                continue;
            };
            let context = SyncContext::server(object.owner.is_some());
            let serialized = match serialize_delta(&mut object.slots, &context, now) {
                Ok(serialized) => serialized,
                Err(error) => {
                    self.events
                        .push_error(ServerError::Serializer { net_id, error });
                    continue;
                }
            };

            if let (Some(payload), Some(owner)) = (&serialized.owner, object.owner) {
                if object.observers.contains(&owner) {
                    if let Some(connection) = self.user_connections.get_mut(&owner) {
                        if let Err(error) = connection.queue_update(message_kinds, net_id, payload) {
                            self.events.push_error(error);
                        }
                    }
                }
            }
            if let Some(payload) = &serialized.observers {
                for user_key in object.observers.iter() {
                    if object.owner == Some(*user_key) {
                        continue;
                    }
                    if let Some(connection) = self.user_connections.get_mut(user_key) {
                        if let Err(error) = connection.queue_update(message_kinds, net_id, payload) {
                            self.events.push_error(error);
                        }
                    }
                }
            }

            if object.has_pending_changes(&context) {
                self.dirty_set.insert(net_id);
            }
        }

        for connection in self.user_connections.values_mut() {
            if let Err(error) = connection.flush_updates(message_kinds) {
                self.events.push_error(error);
            }
        }
    }

    fn collect_notify_outcomes(&mut self) {
        for (user_key, connection) in self.user_connections.iter_mut() {
            let outcomes = connection.base.take_notify_outcomes();
            for key in outcomes.delivered {
                self.events.push_delivered(user_key, key);
            }
            for key in outcomes.lost {
                self.events.push_lost(user_key, key);
            }
        }
    }

    /// Queues acks and heartbeats that are due and hands every queued
    /// packet to the transport
    pub fn send_all_packets(&mut self, now: Instant) {
        for connection in self.user_connections.values_mut() {
            connection.base.queue_keepalive(now);
            connection.base.send_packets(&mut self.transport, now);
        }
    }
}

fn spawn_message(
    object: &ServerObject,
    user_key: &UserKey,
    snapshot: &SerializedComponents,
) -> SpawnMessage {
    let is_owner = object.owner == Some(*user_key);
    let payload = if is_owner {
        snapshot.owner.clone()
    } else {
        snapshot.observers.clone()
    };
    SpawnMessage {
        net_id: object.net_id(),
        is_local_player: is_owner && object.is_local_player,
        is_owner,
        scene_id: object.identity().scene_id(),
        prefab_hash: object.identity().prefab_hash(),
        spawn_values: object.transform_sync.filter(&object.spawn_values),
        payload: payload.unwrap_or_default(),
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

fn is_server_to_client(message: &MessageContainer) -> bool {
    message.is::<SpawnMessage>()
        || message.is::<ObjectDestroyMessage>()
        || message.is::<ObjectHideMessage>()
        || message.is::<RemoveAuthorityMessage>()
        || message.is::<UpdateBatchMessage>()
        || message.is::<NetworkPongMessage>()
}
