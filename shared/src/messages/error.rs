use thiserror::Error;

use meridian_serde::SerdeErr;

/// Errors that can occur during message kind operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MessageKindsError {
    /// Two different message types hash to the same wire id
    #[error("Message {incoming} hashes to wire id {id}, which is already used by {existing}. Rename one of the types or override Message::name()")]
    HashCollision {
        id: u16,
        existing: &'static str,
        incoming: &'static str,
    },

    /// Message kind not found in registry
    #[error("Message {name} is not registered. Message type must be registered with Protocol via add_message()")]
    MessageKindNotFound { name: &'static str },

    /// Wire id not found in registry
    #[error("Wire id {id} not found in message registry")]
    NetIdNotFound { id: u64 },

    /// A registered message failed to parse
    #[error("Failed to read message {name}: {error}")]
    Decode {
        name: &'static str,
        error: SerdeErr,
    },

    /// The type id prefix itself could not be read
    #[error("Failed to read message type id: {0}")]
    MalformedId(SerdeErr),
}

impl MessageKindsError {
    pub fn is_protocol_violation(&self) -> bool {
        match self {
            MessageKindsError::HashCollision { .. }
            | MessageKindsError::MessageKindNotFound { .. } => false,
            MessageKindsError::NetIdNotFound { .. }
            | MessageKindsError::Decode { .. }
            | MessageKindsError::MalformedId(_) => true,
        }
    }
}
