use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, RwLock},
    time::Instant,
};

use log::warn;

use crate::replication::identity::NetId;

/// Dirty bit shared by every sync object (lists) of a component. Properties
/// use bits `0..63`.
pub const SYNC_OBJECT_BIT: u64 = 1 << 63;

/// Number of dirty bits available to properties
pub const MAX_PROPERTIES: usize = 63;

/// Change tracking state of one component on one side
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SyncState {
    dirty_bits: u64,
    next_sync_time: Option<Instant>,
}

impl SyncState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_dirty_bits(&mut self, bits: u64) {
        self.dirty_bits |= bits;
    }

    pub fn dirty_bits(&self) -> u64 {
        self.dirty_bits
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty_bits != 0
    }

    /// Dirty and past the next eligible sync time
    pub fn is_time_to_sync(&self, now: Instant) -> bool {
        self.is_dirty() && self.next_sync_time.map_or(true, |next| now >= next)
    }

    pub fn next_sync_time(&self) -> Option<Instant> {
        self.next_sync_time
    }

    pub fn next_sync_time_mut(&mut self) -> &mut Option<Instant> {
        &mut self.next_sync_time
    }

    /// Clears the dirty bits. Timing is untouched, see
    /// `SyncSettings::update_time`.
    pub fn clear(&mut self) {
        self.dirty_bits = 0;
    }
}

#[derive(Default)]
struct DirtyMarks {
    objects: HashSet<NetId>,
    marks: HashMap<(NetId, u8), u64>,
}

/// Objects with pending changes, shared between every mutator of one side.
///
/// Mutators record which component bits changed. The sync sweep takes the
/// marks, folds them into each component's `SyncState`, and considers only
/// the objects recorded here.
#[derive(Clone, Default)]
pub struct DirtySet {
    inner: Arc<RwLock<DirtyMarks>>,
}

impl DirtySet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `bits` as changed on a component and registers its object
    pub fn mark(&self, net_id: NetId, component_index: u8, bits: u64) {
        let Ok(mut inner) = self.inner.write() else {
            warn!("dirty set lock poisoned, dropping mark for object {}", net_id);
            return;
        };
        *inner.marks.entry((net_id, component_index)).or_insert(0) |= bits;
        inner.objects.insert(net_id);
    }

    /// Registers an object for consideration. Adding an object that is
    /// already present does nothing.
    pub fn insert(&self, net_id: NetId) {
        if let Ok(mut inner) = self.inner.write() {
            inner.objects.insert(net_id);
        }
    }

    pub fn contains(&self, net_id: &NetId) -> bool {
        self.inner
            .read()
            .map(|inner| inner.objects.contains(net_id))
            .unwrap_or(false)
    }

    pub fn take_objects(&self) -> HashSet<NetId> {
        self.inner
            .write()
            .map(|mut inner| std::mem::take(&mut inner.objects))
            .unwrap_or_default()
    }

    pub fn take_marks(&self) -> HashMap<(NetId, u8), u64> {
        self.inner
            .write()
            .map(|mut inner| std::mem::take(&mut inner.marks))
            .unwrap_or_default()
    }

    /// Forgets everything recorded for an object, used when it despawns
    pub fn remove(&self, net_id: &NetId) {
        if let Ok(mut inner) = self.inner.write() {
            inner.objects.remove(net_id);
            inner.marks.retain(|(id, _), _| id != net_id);
        }
    }
}

/// Receives the dirty bits of a tracked field when it changes
pub trait PropertyMutate: Send + Sync + 'static {
    fn mutate(&mut self, bits: u64);
}

/// Handle given to each tracked field so it can report mutations
#[derive(Clone)]
pub struct PropertyMutator {
    inner: Arc<RwLock<dyn PropertyMutate>>,
}

impl PropertyMutator {
    pub fn new<M: PropertyMutate>(mutator: M) -> Self {
        Self {
            inner: Arc::new(RwLock::new(mutator)),
        }
    }

    pub fn mutate(&self, bits: u64) {
        if let Ok(mut inner) = self.inner.write() {
            inner.mutate(bits);
        }
    }
}

/// Mutator of one component slot of one object
pub struct ComponentMutator {
    net_id: NetId,
    component_index: u8,
    dirty_set: DirtySet,
}

impl ComponentMutator {
    pub fn new(net_id: NetId, component_index: u8, dirty_set: DirtySet) -> Self {
        Self {
            net_id,
            component_index,
            dirty_set,
        }
    }
}

impl PropertyMutate for ComponentMutator {
    fn mutate(&mut self, bits: u64) {
        self.dirty_set.mark(self.net_id, self.component_index, bits);
    }
}
