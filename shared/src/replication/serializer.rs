use std::time::Instant;

use log::trace;

use meridian_serde::{read_packed_u64, write_packed_u64, BitReader, Serde, StreamWriter};

use crate::replication::{
    dirty::SyncState,
    error::SerializerError,
    replicate::{self, Replicate},
    sync_settings::{SyncContext, SyncFrom, SyncTo},
};

/// Written after every component's payload. A reader that finds anything
/// else knows it consumed the wrong number of bits.
pub const BARRIER: u8 = 171;

/// Components per object that fit in the component mask
pub const MAX_COMPONENTS: usize = 64;

/// A component together with its change tracking state
pub struct ComponentSlot {
    pub component: Box<dyn Replicate>,
    pub state: SyncState,
}

impl ComponentSlot {
    pub fn new(component: Box<dyn Replicate>) -> Self {
        Self {
            component,
            state: SyncState::new(),
        }
    }
}

/// Output of one serialization pass. A buffer is `None` when no component
/// was written for that audience.
#[derive(Debug, Default, PartialEq)]
pub struct SerializedComponents {
    /// Bytes for the owning connection, or for the server when a client
    /// serializes its owned components
    pub owner: Option<Box<[u8]>>,
    /// Bytes for every observer that is not the owner
    pub observers: Option<Box<[u8]>>,
}

impl SerializedComponents {
    pub fn is_empty(&self) -> bool {
        self.owner.is_none() && self.observers.is_none()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReadMode {
    /// Complete state of every listed component
    Snapshot,
    /// Changed fields only
    Delta,
    /// Changed fields sent by the owning client. Components that may not
    /// originate on the owner are rejected.
    OwnerDelta,
}

/// One component applied by `deserialize_components`
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ComponentUpdate {
    pub component_index: u8,
    /// Fields that were applied. All bits for a snapshot.
    pub dirty_bits: u64,
}

fn check_component_count(count: usize) -> Result<(), SerializerError> {
    if count > MAX_COMPONENTS {
        return Err(SerializerError::TooManyComponents { count });
    }
    Ok(())
}

fn write_component(
    writer: &mut StreamWriter,
    index: u8,
    component: &dyn Replicate,
    delta_bits: Option<u64>,
) {
    index.ser(writer);
    match delta_bits {
        Some(bits) => replicate::write_delta(component, bits, writer),
        None => replicate::write_full(component, writer),
    }
    BARRIER.ser(writer);
}

/// Writes the complete state of every component for a new observer.
///
/// The owner gets every component. Other observers get the components
/// whose `to` includes observers. Dirty state is left alone since the
/// regular sweep still has to deliver pending changes to everyone else.
pub fn serialize_snapshot(
    slots: &[ComponentSlot],
) -> Result<SerializedComponents, SerializerError> {
    check_component_count(slots.len())?;

    let mut owner_mask = 0u64;
    let mut observer_mask = 0u64;
    for (index, slot) in slots.iter().enumerate() {
        owner_mask |= 1 << index;
        if slot.component.sync_settings().to.contains(SyncTo::OBSERVERS_ONLY) {
            observer_mask |= 1 << index;
        }
    }

    let mut owner_writer = StreamWriter::new();
    let mut observer_writer = StreamWriter::new();
    write_packed_u64(&mut owner_writer, owner_mask);
    write_packed_u64(&mut observer_writer, observer_mask);

    for (index, slot) in slots.iter().enumerate() {
        let start = owner_writer.bits_written();
        write_component(&mut owner_writer, index as u8, slot.component.as_ref(), None);
        if observer_mask & (1 << index) != 0 {
            let length = owner_writer.bits_written() - start;
            observer_writer.copy_bits_from(&owner_writer, start, length);
        }
    }

    Ok(SerializedComponents {
        owner: (owner_mask != 0).then(|| owner_writer.to_bytes()),
        observers: (observer_mask != 0).then(|| observer_writer.to_bytes()),
    })
}

/// Writes the changed fields of every component that is dirty, allowed to
/// sync from this side, and past its next sync time.
///
/// Each component is serialized once. When both audiences get the same
/// bytes the span is copied from the owner buffer into the observer
/// buffer. Only serialized components have their dirty bits cleared and
/// their next sync time advanced. The rest stay dirty for the next pass.
pub fn serialize_delta(
    slots: &mut [ComponentSlot],
    context: &SyncContext,
    now: Instant,
) -> Result<SerializedComponents, SerializerError> {
    check_component_count(slots.len())?;

    let mut owner_mask = 0u64;
    let mut observer_mask = 0u64;
    for (index, slot) in slots.iter().enumerate() {
        let settings = slot.component.sync_settings();
        if !settings.should_sync_from(context) || !slot.state.is_time_to_sync(now) {
            continue;
        }
        if settings.to_observer_writer_only(context) {
            observer_mask |= 1 << index;
            continue;
        }
        owner_mask |= 1 << index;
        if settings.copy_to_observers(context) {
            observer_mask |= 1 << index;
        }
    }

    if owner_mask == 0 && observer_mask == 0 {
        return Ok(SerializedComponents::default());
    }

    let mut owner_writer = StreamWriter::new();
    let mut observer_writer = StreamWriter::new();
    write_packed_u64(&mut owner_writer, owner_mask);
    write_packed_u64(&mut observer_writer, observer_mask);

    for (index, slot) in slots.iter_mut().enumerate() {
        let bit = 1u64 << index;
        if (owner_mask | observer_mask) & bit == 0 {
            continue;
        }

        let dirty_bits = slot.state.dirty_bits();
        trace!("serializing component {} with dirty bits {:#x}", index, dirty_bits);

        if owner_mask & bit != 0 {
            let start = owner_writer.bits_written();
            write_component(&mut owner_writer, index as u8, slot.component.as_ref(), Some(dirty_bits));
            if observer_mask & bit != 0 {
                let length = owner_writer.bits_written() - start;
                observer_writer.copy_bits_from(&owner_writer, start, length);
            }
        } else {
            write_component(&mut observer_writer, index as u8, slot.component.as_ref(), Some(dirty_bits));
        }

        replicate::flush_changes(slot.component.as_mut());
        slot.state.clear();
        let settings = slot.component.sync_settings();
        settings.update_time(slot.state.next_sync_time_mut(), now);
    }

    Ok(SerializedComponents {
        owner: (owner_mask != 0).then(|| owner_writer.to_bytes()),
        observers: (observer_mask != 0).then(|| observer_writer.to_bytes()),
    })
}

/// Snapshot for a new observer, delta otherwise
pub fn serialize_components(
    slots: &mut [ComponentSlot],
    initial_state: bool,
    context: &SyncContext,
    now: Instant,
) -> Result<SerializedComponents, SerializerError> {
    if initial_state {
        serialize_snapshot(slots)
    } else {
        serialize_delta(slots, context, now)
    }
}

/// Applies a payload written by `serialize_snapshot` or `serialize_delta`.
///
/// Every component must be followed by the barrier byte. A wrong barrier is
/// reported as `BarrierMismatch`. Corruption that happens to keep the
/// lengths intact goes unnoticed, so this is a misalignment check and not
/// an integrity check.
pub fn deserialize_components(
    slots: &mut [ComponentSlot],
    mode: ReadMode,
    reader: &mut BitReader,
) -> Result<Vec<ComponentUpdate>, SerializerError> {
    let mask = read_packed_u64(reader)?;
    let mut updates = Vec::new();

    for expected in 0..MAX_COMPONENTS as u8 {
        if mask & (1u64 << expected) == 0 {
            continue;
        }

        let found = u8::de(reader)?;
        if found != expected {
            return Err(SerializerError::ComponentIndexMismatch { expected, found });
        }
        let count = slots.len();
        let slot = slots
            .get_mut(expected as usize)
            .ok_or(SerializerError::ComponentIndexOutOfRange {
                index: expected,
                count,
            })?;

        let dirty_bits = match mode {
            ReadMode::Snapshot => {
                replicate::read_full(slot.component.as_mut(), reader)?;
                u64::MAX
            }
            ReadMode::Delta => replicate::read_delta(slot.component.as_mut(), reader)?,
            ReadMode::OwnerDelta => {
                if !slot.component.sync_settings().from.contains(SyncFrom::OWNER) {
                    return Err(SerializerError::NotOwnerSynced {
                        component_index: expected,
                    });
                }
                if slot.component.sync_settings().relays_owner_changes() {
                    replicate::relay_delta(slot.component.as_mut(), reader)?
                } else {
                    replicate::read_delta(slot.component.as_mut(), reader)?
                }
            }
        };

        let barrier = u8::de(reader)?;
        if barrier != BARRIER {
            return Err(SerializerError::BarrierMismatch {
                component_index: expected,
                expected: BARRIER,
                found: barrier,
            });
        }

        updates.push(ComponentUpdate {
            component_index: expected,
            dirty_bits,
        });
    }

    Ok(updates)
}

/// Convenience for reading a standalone payload buffer
pub fn deserialize_payload(
    slots: &mut [ComponentSlot],
    mode: ReadMode,
    payload: &[u8],
) -> Result<Vec<ComponentUpdate>, SerializerError> {
    if payload.is_empty() {
        return Ok(Vec::new());
    }
    let mut reader = BitReader::new(payload);
    deserialize_components(slots, mode, &mut reader)
}
