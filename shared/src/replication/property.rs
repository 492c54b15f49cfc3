use std::ops::{Deref, DerefMut};

use meridian_serde::{BitReader, BitWrite, Serde};

use crate::replication::{
    dirty::PropertyMutator, error::SerializerError, replicate::ReplicatedField,
};

/// A field of a component that reports its own changes.
///
/// Writes through `set` or `DerefMut` mark the field dirty once a mutator
/// is attached. Values applied from the network never do.
#[derive(Clone)]
pub struct Property<T: Serde> {
    value: T,
    mutator: Option<PropertyMutator>,
    bit: u64,
}

impl<T: Serde> Property<T> {
    pub fn new(value: T) -> Self {
        Self {
            value,
            mutator: None,
            bit: 0,
        }
    }

    pub fn get(&self) -> &T {
        &self.value
    }

    pub fn set(&mut self, value: T) {
        self.value = value;
        self.mutate();
    }

    /// Replaces the value without marking the field dirty
    pub fn mirror(&mut self, value: T) {
        self.value = value;
    }

    pub fn bit(&self) -> u64 {
        self.bit
    }

    fn mutate(&self) {
        if let Some(mutator) = &self.mutator {
            mutator.mutate(self.bit);
        }
    }
}

impl<T: Serde + Default> Default for Property<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: Serde + std::fmt::Debug> std::fmt::Debug for Property<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.value.fmt(f)
    }
}

impl<T: Serde> PartialEq<T> for Property<T> {
    fn eq(&self, other: &T) -> bool {
        self.value == *other
    }
}

impl<T: Serde> Deref for Property<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.value
    }
}

impl<T: Serde> DerefMut for Property<T> {
    fn deref_mut(&mut self) -> &mut T {
        self.mutate();
        &mut self.value
    }
}

impl<T: Serde + Send + 'static> ReplicatedField for Property<T> {
    fn set_mutator(&mut self, mutator: &PropertyMutator, bit: u64) {
        self.mutator = Some(mutator.clone());
        self.bit = bit;
    }

    fn write_full(&self, writer: &mut dyn BitWrite) {
        self.value.ser(writer);
    }

    fn read_full(&mut self, reader: &mut BitReader) -> Result<(), SerializerError> {
        self.value = T::de(reader)?;
        Ok(())
    }
}
