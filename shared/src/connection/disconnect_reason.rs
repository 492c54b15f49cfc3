use meridian_serde::{BitReader, BitWrite, ConstBitLength, Serde, SerdeErr};

/// Why a connection ended, surfaced to the application with every
/// disconnect event so it can decide whether to reconnect.
#[derive(Copy, Debug, Clone, Eq, PartialEq, Hash)]
pub enum DisconnectReason {
    /// No packet was received within the disconnection timeout
    Timeout,
    /// The peer sent data that could not be interpreted safely
    ProtocolViolation,
    /// Either side asked to close the connection
    Requested,
    /// The server refused the connection's authentication payload
    AuthRejected,
    /// The server is shutting down
    ServerShutdown,
}

impl DisconnectReason {
    fn to_byte(self) -> u8 {
        match self {
            DisconnectReason::Timeout => 0,
            DisconnectReason::ProtocolViolation => 1,
            DisconnectReason::Requested => 2,
            DisconnectReason::AuthRejected => 3,
            DisconnectReason::ServerShutdown => 4,
        }
    }
}

impl Serde for DisconnectReason {
    fn ser(&self, writer: &mut dyn BitWrite) {
        writer.write_byte(self.to_byte());
    }

    fn de(reader: &mut BitReader) -> Result<Self, SerdeErr> {
        match reader.read_byte()? {
            0 => Ok(DisconnectReason::Timeout),
            1 => Ok(DisconnectReason::ProtocolViolation),
            2 => Ok(DisconnectReason::Requested),
            3 => Ok(DisconnectReason::AuthRejected),
            4 => Ok(DisconnectReason::ServerShutdown),
            value => Err(SerdeErr::InvalidDiscriminant {
                value,
                type_name: "DisconnectReason",
            }),
        }
    }

    fn bit_length(&self) -> u32 {
        8
    }
}

impl ConstBitLength for DisconnectReason {
    fn const_bit_length() -> u32 {
        8
    }
}
