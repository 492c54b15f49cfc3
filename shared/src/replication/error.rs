use thiserror::Error;

use meridian_serde::SerdeErr;

use crate::replication::{identity::NetId, sync_settings::SyncFrom, sync_settings::SyncTo};

/// Errors raised while writing or reading component state
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SerializerError {
    /// The byte after a component's payload was not the barrier. The
    /// writer and reader disagree about how many bits the component uses.
    #[error("Component {component_index} is misaligned: expected barrier byte {expected:#04x}, found {found:#04x}")]
    BarrierMismatch {
        component_index: u8,
        expected: u8,
        found: u8,
    },

    /// The index byte in front of a component does not match the mask
    #[error("Expected component index {expected} but the payload names component {found}")]
    ComponentIndexMismatch { expected: u8, found: u8 },

    /// The mask names a component the object does not have
    #[error("Component index {index} is out of range for an object with {count} components")]
    ComponentIndexOutOfRange { index: u8, count: usize },

    /// The owner sent changes for a component that only the server may change
    #[error("Component {component_index} does not accept changes from its owner")]
    NotOwnerSynced { component_index: u8 },

    /// A component mask only has room for 64 components
    #[error("Object has {count} components, but at most 64 can be replicated")]
    TooManyComponents { count: usize },

    /// A component has more tracked properties than bits in its dirty mask
    #[error("Component has {count} properties, but at most 63 can be tracked")]
    TooManyProperties { count: usize },

    /// A list operation referred to an element that does not exist
    #[error("List operation index {index} is out of range for a list of length {len}")]
    ListIndexOutOfRange { index: u64, len: usize },

    /// Unknown list operation code
    #[error("Unknown list operation {op}")]
    InvalidListOperation { op: u8 },

    #[error("Malformed component payload: {0}")]
    Malformed(#[from] SerdeErr),
}

/// A sync direction combination that cannot be honored
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid sync direction from {from:?} to {to:?}: {reason}")]
pub struct SyncSettingsError {
    pub from: SyncFrom,
    pub to: SyncTo,
    pub reason: &'static str,
}

/// Errors raised while framing several objects into one batch message
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BatchError {
    /// A single object's update is larger than the whole batch budget
    #[error("Update for object {net_id} is {bytes} bytes, which exceeds the batch limit of {max_bytes} bytes. Split the object's state into several objects")]
    PayloadTooLarge {
        net_id: NetId,
        bytes: usize,
        max_bytes: usize,
    },

    #[error("Malformed batch: {0}")]
    Malformed(#[from] SerdeErr),
}
