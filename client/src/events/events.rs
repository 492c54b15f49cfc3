use std::{collections::HashMap, marker::PhantomData, mem, net::SocketAddr, vec::IntoIter};

use log::warn;

use meridian_shared::{DisconnectReason, Message, MessageContainer, MessageKind, NetId, NotifyKey};

use crate::ClientError;

/// Everything that happened since the last `Client::take_events`
pub struct Events {
    connections: Vec<SocketAddr>,
    disconnections: Vec<(SocketAddr, DisconnectReason)>,
    spawns: Vec<NetId>,
    despawns: Vec<NetId>,
    hides: Vec<NetId>,
    updates: Vec<(NetId, u8)>,
    authority: Vec<(NetId, bool)>,
    messages: HashMap<MessageKind, Vec<MessageContainer>>,
    delivered: Vec<NotifyKey>,
    lost: Vec<NotifyKey>,
    errors: Vec<ClientError>,

    empty: bool,
}

impl Default for Events {
    fn default() -> Self {
        Self::new()
    }
}

impl Events {
    pub(crate) fn new() -> Self {
        Self {
            connections: Vec::new(),
            disconnections: Vec::new(),
            spawns: Vec::new(),
            despawns: Vec::new(),
            hides: Vec::new(),
            updates: Vec::new(),
            authority: Vec::new(),
            messages: HashMap::new(),
            delivered: Vec::new(),
            lost: Vec::new(),
            errors: Vec::new(),

            empty: true,
        }
    }

    // Public

    pub fn is_empty(&self) -> bool {
        self.empty
    }

    pub fn read<V: Event>(&mut self) -> V::Iter {
        V::iter(self)
    }

    pub fn has<V: Event>(&self) -> bool {
        V::has(self)
    }

    // Crate-public

    pub(crate) fn push_connection(&mut self, address: SocketAddr) {
        self.connections.push(address);
        self.empty = false;
    }

    pub(crate) fn push_disconnection(&mut self, address: SocketAddr, reason: DisconnectReason) {
        self.disconnections.push((address, reason));
        self.empty = false;
    }

    pub(crate) fn push_spawn(&mut self, net_id: NetId) {
        self.spawns.push(net_id);
        self.empty = false;
    }

    pub(crate) fn push_despawn(&mut self, net_id: NetId) {
        self.despawns.push(net_id);
        self.empty = false;
    }

    pub(crate) fn push_hide(&mut self, net_id: NetId) {
        self.hides.push(net_id);
        self.empty = false;
    }

    pub(crate) fn push_update(&mut self, net_id: NetId, component_index: u8) {
        self.updates.push((net_id, component_index));
        self.empty = false;
    }

    pub(crate) fn push_authority(&mut self, net_id: NetId, has_authority: bool) {
        self.authority.push((net_id, has_authority));
        self.empty = false;
    }

    pub(crate) fn push_message(&mut self, message: MessageContainer) {
        self.messages.entry(message.kind()).or_default().push(message);
        self.empty = false;
    }

    pub(crate) fn push_delivered(&mut self, key: NotifyKey) {
        self.delivered.push(key);
        self.empty = false;
    }

    pub(crate) fn push_lost(&mut self, key: NotifyKey) {
        self.lost.push(key);
        self.empty = false;
    }

    pub(crate) fn push_error(&mut self, error: ClientError) {
        self.errors.push(error);
        self.empty = false;
    }
}

// Event Trait
pub trait Event {
    type Iter;

    fn iter(events: &mut Events) -> Self::Iter;

    fn has(events: &Events) -> bool;
}

// ConnectEvent
pub struct ConnectEvent;
impl Event for ConnectEvent {
    type Iter = IntoIter<SocketAddr>;

    fn iter(events: &mut Events) -> Self::Iter {
        mem::take(&mut events.connections).into_iter()
    }

    fn has(events: &Events) -> bool {
        !events.connections.is_empty()
    }
}

// DisconnectEvent
pub struct DisconnectEvent;
impl Event for DisconnectEvent {
    type Iter = IntoIter<(SocketAddr, DisconnectReason)>;

    fn iter(events: &mut Events) -> Self::Iter {
        mem::take(&mut events.disconnections).into_iter()
    }

    fn has(events: &Events) -> bool {
        !events.disconnections.is_empty()
    }
}

// SpawnEvent
pub struct SpawnEvent;
impl Event for SpawnEvent {
    type Iter = IntoIter<NetId>;

    fn iter(events: &mut Events) -> Self::Iter {
        mem::take(&mut events.spawns).into_iter()
    }

    fn has(events: &Events) -> bool {
        !events.spawns.is_empty()
    }
}

// DespawnEvent
/// Objects the server destroyed. Their state is gone.
pub struct DespawnEvent;
impl Event for DespawnEvent {
    type Iter = IntoIter<NetId>;

    fn iter(events: &mut Events) -> Self::Iter {
        mem::take(&mut events.despawns).into_iter()
    }

    fn has(events: &Events) -> bool {
        !events.despawns.is_empty()
    }
}

// HideEvent
/// Objects that left this client's view. Scene objects went back to the
/// dormant pool.
pub struct HideEvent;
impl Event for HideEvent {
    type Iter = IntoIter<NetId>;

    fn iter(events: &mut Events) -> Self::Iter {
        mem::take(&mut events.hides).into_iter()
    }

    fn has(events: &Events) -> bool {
        !events.hides.is_empty()
    }
}

// UpdateEvent
/// A component received new state from the server
pub struct UpdateEvent;
impl Event for UpdateEvent {
    type Iter = IntoIter<(NetId, u8)>;

    fn iter(events: &mut Events) -> Self::Iter {
        mem::take(&mut events.updates).into_iter()
    }

    fn has(events: &Events) -> bool {
        !events.updates.is_empty()
    }
}

// AuthorityEvent
pub struct AuthorityEvent;
impl Event for AuthorityEvent {
    type Iter = IntoIter<(NetId, bool)>;

    fn iter(events: &mut Events) -> Self::Iter {
        mem::take(&mut events.authority).into_iter()
    }

    fn has(events: &Events) -> bool {
        !events.authority.is_empty()
    }
}

// MessageEvent
pub struct MessageEvent<M: Message> {
    phantom_m: PhantomData<M>,
}
impl<M: Message> Event for MessageEvent<M> {
    type Iter = IntoIter<M>;

    fn iter(events: &mut Events) -> Self::Iter {
        let Some(containers) = events.messages.remove(&MessageKind::of::<M>()) else {
            return Vec::new().into_iter();
        };
        let mut output = Vec::new();
        for container in containers {
            match container.downcast::<M>() {
                Ok(message) => output.push(message),
                Err(container) => warn!(
                    "message {} filed under the wrong kind, dropping it",
                    container.name()
                ),
            }
        }
        output.into_iter()
    }

    fn has(events: &Events) -> bool {
        events.messages.contains_key(&MessageKind::of::<M>())
    }
}

// NotifyDeliveredEvent
pub struct NotifyDeliveredEvent;
impl Event for NotifyDeliveredEvent {
    type Iter = IntoIter<NotifyKey>;

    fn iter(events: &mut Events) -> Self::Iter {
        mem::take(&mut events.delivered).into_iter()
    }

    fn has(events: &Events) -> bool {
        !events.delivered.is_empty()
    }
}

// NotifyLostEvent
pub struct NotifyLostEvent;
impl Event for NotifyLostEvent {
    type Iter = IntoIter<NotifyKey>;

    fn iter(events: &mut Events) -> Self::Iter {
        mem::take(&mut events.lost).into_iter()
    }

    fn has(events: &Events) -> bool {
        !events.lost.is_empty()
    }
}

// ErrorEvent
pub struct ErrorEvent;
impl Event for ErrorEvent {
    type Iter = IntoIter<ClientError>;

    fn iter(events: &mut Events) -> Self::Iter {
        mem::take(&mut events.errors).into_iter()
    }

    fn has(events: &Events) -> bool {
        !events.errors.is_empty()
    }
}
