use thiserror::Error;

use crate::{messages::error::MessageKindsError, rpc::error::RpcRegistryError};

/// Errors that can occur during protocol operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// Protocol is locked and cannot be modified
    #[error("Protocol is already locked and cannot be modified. Protocol.lock() has been called and no further changes are allowed")]
    AlreadyLocked,

    #[error("Message registration failed: {0}")]
    MessageKinds(#[from] MessageKindsError),

    #[error("Rpc registration failed: {0}")]
    Rpc(#[from] RpcRegistryError),
}
