use std::ops::Index;

use meridian_serde::{read_packed_u64, write_packed_u64, BitReader, BitWrite, Serde};

use crate::replication::{
    dirty::PropertyMutator, error::SerializerError, replicate::ReplicatedField,
};

#[derive(Clone, Debug, PartialEq)]
enum ListChange<T> {
    Push(T),
    Clear,
    Insert(usize, T),
    Remove(usize),
    Set(usize, T),
}

impl<T> ListChange<T> {
    fn op(&self) -> u8 {
        match self {
            ListChange::Push(_) => 0,
            ListChange::Clear => 1,
            ListChange::Insert(..) => 2,
            ListChange::Remove(_) => 3,
            ListChange::Set(..) => 4,
        }
    }
}

/// A replicated list. The sender sends its operation log, the receiver
/// replays it.
///
/// A full write also records how many logged operations are already folded
/// into it, so a receiver initialized from a snapshot skips them when the
/// next delta arrives.
#[derive(Clone)]
pub struct SyncList<T: Serde> {
    items: Vec<T>,
    changes: Vec<ListChange<T>>,
    changes_ahead: u64,
    mutator: Option<PropertyMutator>,
    bit: u64,
}

impl<T: Serde> Default for SyncList<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Serde> SyncList<T> {
    pub fn new() -> Self {
        Self {
            items: Vec::new(),
            changes: Vec::new(),
            changes_ahead: 0,
            mutator: None,
            bit: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&T> {
        self.items.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }

    pub fn as_slice(&self) -> &[T] {
        &self.items
    }

    /// Number of logged operations not yet flushed by a send
    pub fn pending_changes(&self) -> usize {
        self.changes.len()
    }

    pub fn push(&mut self, item: T) {
        self.items.push(item.clone());
        self.record(ListChange::Push(item));
    }

    /// # Panics
    ///
    /// Panics if `index > len`.
    pub fn insert(&mut self, index: usize, item: T) {
        self.items.insert(index, item.clone());
        self.record(ListChange::Insert(index, item));
    }

    /// # Panics
    ///
    /// Panics if `index >= len`.
    pub fn set(&mut self, index: usize, item: T) {
        self.items[index] = item.clone();
        self.record(ListChange::Set(index, item));
    }

    /// # Panics
    ///
    /// Panics if `index >= len`.
    pub fn remove(&mut self, index: usize) -> T {
        let item = self.items.remove(index);
        self.record(ListChange::Remove(index));
        item
    }

    pub fn clear(&mut self) {
        self.items.clear();
        self.record(ListChange::Clear);
    }

    fn record(&mut self, change: ListChange<T>) {
        self.changes.push(change);
        if let Some(mutator) = &self.mutator {
            mutator.mutate(self.bit);
        }
    }

    fn apply(&mut self, change: ListChange<T>) -> Result<(), SerializerError> {
        let len = self.items.len();
        let out_of_range = |index: usize| SerializerError::ListIndexOutOfRange {
            index: index as u64,
            len,
        };
        match change {
            ListChange::Push(item) => self.items.push(item),
            ListChange::Clear => self.items.clear(),
            ListChange::Insert(index, item) => {
                if index > len {
                    return Err(out_of_range(index));
                }
                self.items.insert(index, item);
            }
            ListChange::Remove(index) => {
                if index >= len {
                    return Err(out_of_range(index));
                }
                self.items.remove(index);
            }
            ListChange::Set(index, item) => {
                let slot = self.items.get_mut(index).ok_or(out_of_range(index))?;
                *slot = item;
            }
        }
        Ok(())
    }

    /// Applies a received operation log. With `keep` the applied
    /// operations are logged again for the next delta, without marking the
    /// list dirty.
    fn replay(&mut self, reader: &mut BitReader, keep: bool) -> Result<(), SerializerError> {
        let count = read_packed_u64(reader)?;
        for _ in 0..count {
            let op = u8::de(reader)?;
            let change = match op {
                0 => ListChange::Push(T::de(reader)?),
                1 => ListChange::Clear,
                2 => {
                    let index = read_index(reader)?;
                    ListChange::Insert(index, T::de(reader)?)
                }
                3 => ListChange::Remove(read_index(reader)?),
                4 => {
                    let index = read_index(reader)?;
                    ListChange::Set(index, T::de(reader)?)
                }
                op => return Err(SerializerError::InvalidListOperation { op }),
            };

            // already part of the snapshot this list was initialized from
            if self.changes_ahead > 0 {
                self.changes_ahead -= 1;
                continue;
            }
            if keep {
                self.apply(change.clone())?;
                self.changes.push(change);
            } else {
                self.apply(change)?;
            }
        }
        Ok(())
    }
}

fn read_index(reader: &mut BitReader) -> Result<usize, SerializerError> {
    let index = read_packed_u64(reader)?;
    usize::try_from(index).map_err(|_| SerializerError::ListIndexOutOfRange {
        index,
        len: 0,
    })
}

impl<T: Serde> Index<usize> for SyncList<T> {
    type Output = T;

    fn index(&self, index: usize) -> &T {
        &self.items[index]
    }
}

impl<T: Serde + std::fmt::Debug> std::fmt::Debug for SyncList<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.items.iter()).finish()
    }
}

impl<T: Serde + Send + 'static> ReplicatedField for SyncList<T> {
    fn set_mutator(&mut self, mutator: &PropertyMutator, bit: u64) {
        self.mutator = Some(mutator.clone());
        self.bit = bit;
    }

    fn is_sync_object(&self) -> bool {
        true
    }

    fn write_full(&self, writer: &mut dyn BitWrite) {
        self.items.ser(writer);
        write_packed_u64(writer, self.changes.len() as u64);
    }

    fn read_full(&mut self, reader: &mut BitReader) -> Result<(), SerializerError> {
        self.items = Vec::<T>::de(reader)?;
        self.changes.clear();
        self.changes_ahead = read_packed_u64(reader)?;
        Ok(())
    }

    fn write_delta(&self, writer: &mut dyn BitWrite) {
        write_packed_u64(writer, self.changes.len() as u64);
        for change in &self.changes {
            change.op().ser(writer);
            match change {
                ListChange::Push(item) => item.ser(writer),
                ListChange::Clear => {}
                ListChange::Remove(index) => write_packed_u64(writer, *index as u64),
                ListChange::Insert(index, item) | ListChange::Set(index, item) => {
                    write_packed_u64(writer, *index as u64);
                    item.ser(writer);
                }
            }
        }
    }

    fn read_delta(&mut self, reader: &mut BitReader) -> Result<(), SerializerError> {
        self.replay(reader, false)
    }

    fn relay_delta(&mut self, reader: &mut BitReader) -> Result<(), SerializerError> {
        self.replay(reader, true)
    }

    fn flush_changes(&mut self) {
        self.changes.clear();
    }
}
