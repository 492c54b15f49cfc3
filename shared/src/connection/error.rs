use thiserror::Error;

use meridian_serde::SerdeErr;

use crate::{connection::packet_type::PacketType, messages::error::MessageKindsError};

/// Errors raised by the notify ack window when interpreting peer headers
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NotifyError {
    /// The incoming sequence is further from our receive position than the
    /// window can represent. The two sides can no longer agree on ordering.
    #[error("Notify sequence {sequence} is {distance} away from last received {receive_sequence}, outside the window of {capacity}")]
    SequenceOutOfWindow {
        sequence: u16,
        receive_sequence: u16,
        distance: i64,
        capacity: usize,
    },

    /// The peer acknowledged a sequence we have not sent yet
    #[error("Peer acknowledged sequence {latest_ack} which is ahead of the last sent sequence {last_sent}")]
    AckAhead { latest_ack: u16, last_sent: u16 },
}

/// Errors that can occur during packet type serialization/deserialization
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PacketTypeError {
    /// Invalid packet type index received (SECURITY: potentially malicious packet)
    #[error("Invalid packet type index {index} received (valid range: 0-6). This may indicate a malformed or malicious packet")]
    InvalidPacketTypeIndex { index: u8 },
}

/// Errors found when validating a ConnectionConfig
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("Sequence width {bits} is out of range, the notify header holds between 1 and 16 bits")]
    InvalidSequenceBits { bits: u8 },

    #[error("Notify window capacity {capacity} must be non-zero and smaller than half the sequence range ({half_range})")]
    InvalidWindowCapacity { capacity: usize, half_range: usize },

    #[error("Ack timeout must be greater than zero")]
    ZeroAckTimeout,
}

/// Errors raised while reading from or writing to a connection
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectionError {
    #[error(transparent)]
    Notify(#[from] NotifyError),

    #[error("Malformed packet: {0}")]
    Malformed(#[from] SerdeErr),

    #[error(transparent)]
    MessageKinds(#[from] MessageKindsError),

    #[error("Received a {packet_type:?} packet which is not valid in the current connection state")]
    UnexpectedPacket { packet_type: PacketType },

    #[error("Outgoing packet needs {bits} bits but the maximum is {max_bits}")]
    PacketTooLarge { bits: u32, max_bits: u32 },
}

impl ConnectionError {
    /// Whether this error came from interpreting the peer's bytes, in which
    /// case the connection must be torn down.
    pub fn is_protocol_violation(&self) -> bool {
        match self {
            ConnectionError::Notify(_)
            | ConnectionError::Malformed(_)
            | ConnectionError::UnexpectedPacket { .. } => true,
            ConnectionError::MessageKinds(error) => error.is_protocol_violation(),
            ConnectionError::PacketTooLarge { .. } => false,
        }
    }
}
