use std::{collections::HashSet, hash::Hash};

/// Connections that joined and left an object's observers in one rebuild
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObserverDiff<K> {
    pub added: Vec<K>,
    pub removed: Vec<K>,
}

impl<K> Default for ObserverDiff<K> {
    fn default() -> Self {
        Self {
            added: Vec::new(),
            removed: Vec::new(),
        }
    }
}

impl<K> ObserverDiff<K> {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// Connections currently receiving an object's spawn, update and destroy
/// traffic
#[derive(Clone, Debug)]
pub struct ObserverSet<K: Copy + Eq + Hash> {
    observers: HashSet<K>,
    built: bool,
}

impl<K: Copy + Eq + Hash> Default for ObserverSet<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Copy + Eq + Hash> ObserverSet<K> {
    pub fn new() -> Self {
        Self {
            observers: HashSet::new(),
            built: false,
        }
    }

    /// Replaces the observers with `candidates`.
    ///
    /// `ready_owner` is always kept, whatever produced `candidates`. Only
    /// connections whose membership changed are reported, except on the
    /// first rebuild where every observer counts as added.
    pub fn rebuild(
        &mut self,
        mut candidates: HashSet<K>,
        ready_owner: Option<K>,
    ) -> ObserverDiff<K> {
        if let Some(owner) = ready_owner {
            candidates.insert(owner);
        }

        let mut diff = ObserverDiff::default();
        if !self.built {
            diff.added.extend(candidates.iter().copied());
        } else {
            diff.added
                .extend(candidates.difference(&self.observers).copied());
            diff.removed
                .extend(self.observers.difference(&candidates).copied());
        }

        self.observers = candidates;
        self.built = true;
        diff
    }

    /// Adds one observer, returning whether it was new
    pub fn add(&mut self, key: K) -> bool {
        self.observers.insert(key)
    }

    /// Removes one observer, returning whether it was present
    pub fn remove(&mut self, key: &K) -> bool {
        self.observers.remove(key)
    }

    pub fn contains(&self, key: &K) -> bool {
        self.observers.contains(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = &K> {
        self.observers.iter()
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }

    /// Drops every observer and forgets that a rebuild happened
    pub fn clear(&mut self) -> Vec<K> {
        self.built = false;
        self.observers.drain().collect()
    }
}
