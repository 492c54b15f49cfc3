use std::net::SocketAddr;

use thiserror::Error;

/// Errors reported by a `Transport` implementation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The datagram could not be handed to the given address
    #[error("Failed to send a packet to {address}")]
    SendFailed { address: SocketAddr },

    /// The transport has shut down and will not deliver anything else
    #[error("Transport is closed")]
    Closed,
}
