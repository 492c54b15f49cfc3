use meridian_shared::{
    ComponentSlot, LatchedEvent, NetId, ObjectIdentity, Replicate, SpawnValues, SyncContext,
};

/// A replicated object as this client sees it
pub struct ClientObject {
    net_id: NetId,
    identity: ObjectIdentity,
    pub(crate) is_owner: bool,
    pub(crate) is_local_player: bool,
    pub(crate) spawn_values: SpawnValues,
    pub(crate) slots: Vec<ComponentSlot>,
    authority_changed: LatchedEvent<bool>,
}

impl ClientObject {
    pub(crate) fn new(net_id: NetId, identity: ObjectIdentity, slots: Vec<ComponentSlot>) -> Self {
        Self {
            net_id,
            identity,
            is_owner: false,
            is_local_player: false,
            spawn_values: SpawnValues::default(),
            slots,
            authority_changed: LatchedEvent::new(),
        }
    }

    pub fn net_id(&self) -> NetId {
        self.net_id
    }

    pub fn identity(&self) -> ObjectIdentity {
        self.identity
    }

    /// Whether this client owns the object and syncs its owner components
    pub fn has_authority(&self) -> bool {
        self.is_owner
    }

    pub fn is_local_player(&self) -> bool {
        self.is_local_player
    }

    /// Transform, name and active state sent with the spawn
    pub fn spawn_values(&self) -> &SpawnValues {
        &self.spawn_values
    }

    pub fn component_count(&self) -> usize {
        self.slots.len()
    }

    pub fn component<C: Replicate>(&self) -> Option<&C> {
        self.slots
            .iter()
            .find_map(|slot| slot.component.as_any().downcast_ref::<C>())
    }

    /// Changes to owner-synced components are sent to the server by the
    /// next `Client::update`, when this client has authority
    pub fn component_mut<C: Replicate>(&mut self) -> Option<&mut C> {
        self.slots
            .iter_mut()
            .find_map(|slot| slot.component.as_any_mut().downcast_mut::<C>())
    }

    /// Called with the authority state whenever it changes. A listener added
    /// after a change is called right away with the latest state.
    pub fn on_authority_changed<F: FnMut(&bool) + Send + 'static>(&mut self, listener: F) {
        self.authority_changed.add_listener(listener);
    }

    /// Returns whether the authority state changed
    pub(crate) fn set_authority(&mut self, is_owner: bool) -> bool {
        if self.is_owner == is_owner && self.authority_changed.has_fired() {
            return false;
        }
        let changed = self.is_owner != is_owner;
        self.is_owner = is_owner;
        if !is_owner {
            self.is_local_player = false;
        }
        self.authority_changed.invoke(is_owner);
        changed
    }

    pub(crate) fn has_pending_changes(&self, context: &SyncContext) -> bool {
        self.slots.iter().any(|slot| {
            slot.state.is_dirty() && slot.component.sync_settings().should_sync_from(context)
        })
    }

    pub(crate) fn into_components(self) -> Vec<Box<dyn Replicate>> {
        self.slots.into_iter().map(|slot| slot.component).collect()
    }
}
