use meridian_shared::{
    ComponentSlot, NetId, ObjectIdentity, ObserverSet, Replicate, SpawnValues, SyncContext,
};

use crate::user::UserKey;

/// Which transform fields of the spawn values reach clients
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TransformSync {
    pub position: bool,
    pub rotation: bool,
    pub scale: bool,
}

impl Default for TransformSync {
    fn default() -> Self {
        Self {
            position: true,
            rotation: true,
            scale: true,
        }
    }
}

impl TransformSync {
    pub fn none() -> Self {
        Self {
            position: false,
            rotation: false,
            scale: false,
        }
    }

    pub fn filter(&self, values: &SpawnValues) -> SpawnValues {
        SpawnValues {
            position: values.position.filter(|_| self.position),
            rotation: values.rotation.filter(|_| self.rotation),
            scale: values.scale.filter(|_| self.scale),
            name: values.name.clone(),
            self_active: values.self_active,
        }
    }
}

/// How an object is spawned
#[derive(Clone, Debug, Default)]
pub struct SpawnOptions {
    pub owner: Option<UserKey>,
    /// Marks the object as the owner's player object
    pub is_local_player: bool,
    pub spawn_values: SpawnValues,
    pub transform_sync: TransformSync,
}

impl SpawnOptions {
    pub fn owned_by(owner: UserKey) -> Self {
        Self {
            owner: Some(owner),
            ..Self::default()
        }
    }

    pub fn with_spawn_values(mut self, spawn_values: SpawnValues) -> Self {
        self.spawn_values = spawn_values;
        self
    }

    pub fn as_local_player(mut self) -> Self {
        self.is_local_player = true;
        self
    }
}

/// Components of an object that is not spawned: a scene object waiting in
/// the pool, or a prefab object handed back by `unspawn`
pub struct DormantObject {
    pub components: Vec<Box<dyn Replicate>>,
    pub spawn_values: SpawnValues,
}

impl DormantObject {
    pub fn new(components: Vec<Box<dyn Replicate>>) -> Self {
        Self {
            components,
            spawn_values: SpawnValues::default(),
        }
    }

    pub fn with_spawn_values(mut self, spawn_values: SpawnValues) -> Self {
        self.spawn_values = spawn_values;
        self
    }
}

/// A spawned object as the server sees it
pub struct ServerObject {
    net_id: NetId,
    identity: ObjectIdentity,
    pub(crate) owner: Option<UserKey>,
    pub(crate) is_local_player: bool,
    pub(crate) spawn_values: SpawnValues,
    pub(crate) transform_sync: TransformSync,
    pub(crate) slots: Vec<ComponentSlot>,
    pub(crate) observers: ObserverSet<UserKey>,
}

impl ServerObject {
    pub(crate) fn new(
        net_id: NetId,
        identity: ObjectIdentity,
        slots: Vec<ComponentSlot>,
        options: SpawnOptions,
    ) -> Self {
        Self {
            net_id,
            identity,
            owner: options.owner,
            is_local_player: options.is_local_player,
            spawn_values: options.spawn_values,
            transform_sync: options.transform_sync,
            slots,
            observers: ObserverSet::new(),
        }
    }

    pub fn net_id(&self) -> NetId {
        self.net_id
    }

    pub fn identity(&self) -> ObjectIdentity {
        self.identity
    }

    pub fn owner(&self) -> Option<UserKey> {
        self.owner
    }

    pub fn spawn_values(&self) -> &SpawnValues {
        &self.spawn_values
    }

    pub fn is_observed_by(&self, user_key: &UserKey) -> bool {
        self.observers.contains(user_key)
    }

    pub fn observers(&self) -> impl Iterator<Item = &UserKey> {
        self.observers.iter()
    }

    pub fn component_count(&self) -> usize {
        self.slots.len()
    }

    /// The first component of type `C`
    pub fn component<C: Replicate>(&self) -> Option<&C> {
        self.slots
            .iter()
            .find_map(|slot| slot.component.as_any().downcast_ref::<C>())
    }

    /// Changes made through the returned reference are picked up by the
    /// next `Server::update`
    pub fn component_mut<C: Replicate>(&mut self) -> Option<&mut C> {
        self.slots
            .iter_mut()
            .find_map(|slot| slot.component.as_any_mut().downcast_mut::<C>())
    }

    /// Whether any component holds changes not yet sent
    pub fn is_dirty(&self) -> bool {
        self.slots.iter().any(|slot| slot.state.is_dirty())
    }

    /// Whether a dirty component is still waiting for its sync interval
    pub(crate) fn has_pending_changes(&self, context: &SyncContext) -> bool {
        self.slots.iter().any(|slot| {
            slot.state.is_dirty() && slot.component.sync_settings().should_sync_from(context)
        })
    }

    pub(crate) fn into_dormant(self) -> DormantObject {
        DormantObject {
            components: self.slots.into_iter().map(|slot| slot.component).collect(),
            spawn_values: self.spawn_values,
        }
    }
}
