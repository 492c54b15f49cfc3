use std::{collections::HashMap, marker::PhantomData, mem, net::SocketAddr, vec::IntoIter};

use log::warn;

use meridian_shared::{DisconnectReason, Message, MessageContainer, MessageKind, NotifyKey};

use crate::{user::UserKey, ServerError};

/// Everything that happened since the last `Server::take_events`
pub struct Events {
    connections: Vec<UserKey>,
    disconnections: Vec<(UserKey, SocketAddr, DisconnectReason)>,
    auths: Vec<(UserKey, Box<[u8]>)>,
    scene_ready: Vec<UserKey>,
    messages: HashMap<MessageKind, Vec<(UserKey, MessageContainer)>>,
    delivered: Vec<(UserKey, NotifyKey)>,
    lost: Vec<(UserKey, NotifyKey)>,
    errors: Vec<ServerError>,

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
            auths: Vec::new(),
            scene_ready: Vec::new(),
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

    pub(crate) fn push_connection(&mut self, user_key: &UserKey) {
        self.connections.push(*user_key);
        self.empty = false;
    }

    pub(crate) fn push_disconnection(
        &mut self,
        user_key: &UserKey,
        address: SocketAddr,
        reason: DisconnectReason,
    ) {
        self.disconnections.push((*user_key, address, reason));
        self.empty = false;
    }

    pub(crate) fn push_auth(&mut self, user_key: &UserKey, payload: Box<[u8]>) {
        self.auths.push((*user_key, payload));
        self.empty = false;
    }

    pub(crate) fn push_scene_ready(&mut self, user_key: &UserKey) {
        self.scene_ready.push(*user_key);
        self.empty = false;
    }

    pub(crate) fn push_message(&mut self, user_key: &UserKey, message: MessageContainer) {
        self.messages
            .entry(message.kind())
            .or_default()
            .push((*user_key, message));
        self.empty = false;
    }

    pub(crate) fn push_delivered(&mut self, user_key: &UserKey, key: NotifyKey) {
        self.delivered.push((*user_key, key));
        self.empty = false;
    }

    pub(crate) fn push_lost(&mut self, user_key: &UserKey, key: NotifyKey) {
        self.lost.push((*user_key, key));
        self.empty = false;
    }

    pub(crate) fn push_error(&mut self, error: ServerError) {
        self.errors.push(error);
        self.empty = false;
    }
}

pub(crate) fn read_messages<M: Message>(
    messages: Vec<(UserKey, MessageContainer)>,
) -> Vec<(UserKey, M)> {
    let mut output = Vec::new();
    for (user_key, container) in messages {
        match container.downcast::<M>() {
            Ok(message) => output.push((user_key, message)),
            Err(container) => warn!(
                "message {} filed under the wrong kind, dropping it",
                container.name()
            ),
        }
    }
    output
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
    type Iter = IntoIter<UserKey>;

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
    type Iter = IntoIter<(UserKey, SocketAddr, DisconnectReason)>;

    fn iter(events: &mut Events) -> Self::Iter {
        mem::take(&mut events.disconnections).into_iter()
    }

    fn has(events: &Events) -> bool {
        !events.disconnections.is_empty()
    }
}

// AuthEvent
/// A connect request waiting for `accept_connection` or
/// `reject_connection`, with the auth payload the client sent
pub struct AuthEvent;
impl Event for AuthEvent {
    type Iter = IntoIter<(UserKey, Box<[u8]>)>;

    fn iter(events: &mut Events) -> Self::Iter {
        mem::take(&mut events.auths).into_iter()
    }

    fn has(events: &Events) -> bool {
        !events.auths.is_empty()
    }
}

// SceneReadyEvent
pub struct SceneReadyEvent;
impl Event for SceneReadyEvent {
    type Iter = IntoIter<UserKey>;

    fn iter(events: &mut Events) -> Self::Iter {
        mem::take(&mut events.scene_ready).into_iter()
    }

    fn has(events: &Events) -> bool {
        !events.scene_ready.is_empty()
    }
}

// MessageEvent
pub struct MessageEvent<M: Message> {
    phantom_m: PhantomData<M>,
}
impl<M: Message> Event for MessageEvent<M> {
    type Iter = IntoIter<(UserKey, M)>;

    fn iter(events: &mut Events) -> Self::Iter {
        let message_kind = MessageKind::of::<M>();
        match events.messages.remove(&message_kind) {
            Some(messages) => read_messages(messages).into_iter(),
            None => Vec::new().into_iter(),
        }
    }

    fn has(events: &Events) -> bool {
        events.messages.contains_key(&MessageKind::of::<M>())
    }
}

// NotifyDeliveredEvent
pub struct NotifyDeliveredEvent;
impl Event for NotifyDeliveredEvent {
    type Iter = IntoIter<(UserKey, NotifyKey)>;

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
    type Iter = IntoIter<(UserKey, NotifyKey)>;

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
    type Iter = IntoIter<ServerError>;

    fn iter(events: &mut Events) -> Self::Iter {
        mem::take(&mut events.errors).into_iter()
    }

    fn has(events: &Events) -> bool {
        !events.errors.is_empty()
    }
}
