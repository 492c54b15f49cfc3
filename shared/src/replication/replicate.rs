use std::any::Any;

use meridian_serde::{read_packed_u64, write_packed_u64, BitReader, BitWrite};

use crate::replication::{
    dirty::{PropertyMutator, MAX_PROPERTIES, SYNC_OBJECT_BIT},
    error::SerializerError,
    sync_settings::SyncSettings,
};

/// A field of a component whose changes are tracked and replicated
pub trait ReplicatedField: Send + 'static {
    /// Hands the field the mutator and the dirty bit it reports with
    fn set_mutator(&mut self, mutator: &PropertyMutator, bit: u64);

    /// Sync objects share the component's `SYNC_OBJECT_BIT`
    fn is_sync_object(&self) -> bool {
        false
    }

    fn write_full(&self, writer: &mut dyn BitWrite);

    fn read_full(&mut self, reader: &mut BitReader) -> Result<(), SerializerError>;

    fn write_delta(&self, writer: &mut dyn BitWrite) {
        self.write_full(writer);
    }

    fn read_delta(&mut self, reader: &mut BitReader) -> Result<(), SerializerError> {
        self.read_full(reader)
    }

    /// Applies a delta that this side passes on to its own observers.
    /// Fields whose delta is an operation log keep the applied operations
    /// so the next `write_delta` carries them.
    fn relay_delta(&mut self, reader: &mut BitReader) -> Result<(), SerializerError> {
        self.read_delta(reader)
    }

    /// Called once the pending changes have been serialized
    fn flush_changes(&mut self) {}
}

/// A replicable component attached to a networked object
pub trait Replicate: Any + Send {
    fn sync_settings(&self) -> SyncSettings {
        SyncSettings::default()
    }

    /// Tracked fields in a stable order both sides agree on
    fn fields(&self) -> Vec<&dyn ReplicatedField>;

    fn fields_mut(&mut self) -> Vec<&mut dyn ReplicatedField>;

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Gives every field of `component` the mutator, assigning property bits in
/// field order
pub fn attach_mutator(
    component: &mut dyn Replicate,
    mutator: &PropertyMutator,
) -> Result<(), SerializerError> {
    let mut property_bit = 0usize;
    for field in component.fields_mut() {
        if field.is_sync_object() {
            field.set_mutator(mutator, SYNC_OBJECT_BIT);
            continue;
        }
        if property_bit >= MAX_PROPERTIES {
            return Err(SerializerError::TooManyProperties {
                count: property_bit + 1,
            });
        }
        field.set_mutator(mutator, 1 << property_bit);
        property_bit += 1;
    }
    Ok(())
}

/// Writes a component's complete state
pub fn write_full(component: &dyn Replicate, writer: &mut dyn BitWrite) {
    for field in component.fields() {
        field.write_full(writer);
    }
}

/// Writes the fields whose bits are set in `dirty_bits`, preceded by the
/// mask itself
pub fn write_delta(component: &dyn Replicate, dirty_bits: u64, writer: &mut dyn BitWrite) {
    write_packed_u64(writer, dirty_bits);
    let mut property_bit = 0u32;
    for field in component.fields() {
        if field.is_sync_object() {
            if dirty_bits & SYNC_OBJECT_BIT != 0 {
                field.write_delta(writer);
            }
            continue;
        }
        if dirty_bits & (1 << property_bit) != 0 {
            field.write_delta(writer);
        }
        property_bit += 1;
    }
}

pub fn read_full(
    component: &mut dyn Replicate,
    reader: &mut BitReader,
) -> Result<(), SerializerError> {
    for field in component.fields_mut() {
        field.read_full(reader)?;
    }
    Ok(())
}

/// Applies a delta written by `write_delta` and returns its mask
pub fn read_delta(
    component: &mut dyn Replicate,
    reader: &mut BitReader,
) -> Result<u64, SerializerError> {
    apply_delta(component, reader, false)
}

/// Like `read_delta`, for changes that will be relayed onwards
pub fn relay_delta(
    component: &mut dyn Replicate,
    reader: &mut BitReader,
) -> Result<u64, SerializerError> {
    apply_delta(component, reader, true)
}

fn apply_delta(
    component: &mut dyn Replicate,
    reader: &mut BitReader,
    relay: bool,
) -> Result<u64, SerializerError> {
    let dirty_bits = read_packed_u64(reader)?;
    let mut property_bit = 0u32;
    for field in component.fields_mut() {
        let selected = if field.is_sync_object() {
            dirty_bits & SYNC_OBJECT_BIT != 0
        } else {
            property_bit += 1;
            dirty_bits & (1 << (property_bit - 1)) != 0
        };
        if !selected {
            continue;
        }
        if relay {
            field.relay_delta(reader)?;
        } else {
            field.read_delta(reader)?;
        }
    }
    Ok(dirty_bits)
}

pub fn flush_changes(component: &mut dyn Replicate) {
    for field in component.fields_mut() {
        field.flush_changes();
    }
}
