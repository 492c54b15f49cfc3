// An enum representing the different types of packets that can be
// sent/received

use meridian_serde::{BitReader, BitWrite, ConstBitLength, Serde, SerdeErr};

use crate::connection::error::PacketTypeError;

#[derive(Copy, Debug, Clone, Eq, PartialEq, Hash)]
pub enum PacketType {
    // Sent by the client to request a connection, carries the auth payload
    Connect,
    // Sent by the server once the connection has been accepted
    ConnectAccept,
    // A single message on the reliable transport channel
    Data,
    // A single message wrapped in a notify header, on the unreliable channel
    Notify,
    // A notify header with no payload, keeps the peer's ack window moving
    Ack,
    // Sent to keep the connection from timing out
    Heartbeat,
    // Sent before closing a connection, carries the reason
    Disconnect,
}

impl PacketType {
    pub fn to_byte(self) -> u8 {
        match self {
            PacketType::Connect => 0,
            PacketType::ConnectAccept => 1,
            PacketType::Data => 2,
            PacketType::Notify => 3,
            PacketType::Ack => 4,
            PacketType::Heartbeat => 5,
            PacketType::Disconnect => 6,
        }
    }
}

impl TryFrom<u8> for PacketType {
    type Error = PacketTypeError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(PacketType::Connect),
            1 => Ok(PacketType::ConnectAccept),
            2 => Ok(PacketType::Data),
            3 => Ok(PacketType::Notify),
            4 => Ok(PacketType::Ack),
            5 => Ok(PacketType::Heartbeat),
            6 => Ok(PacketType::Disconnect),
            index => Err(PacketTypeError::InvalidPacketTypeIndex { index }),
        }
    }
}

impl Serde for PacketType {
    fn ser(&self, writer: &mut dyn BitWrite) {
        writer.write_byte(self.to_byte());
    }

    fn de(reader: &mut BitReader) -> Result<Self, SerdeErr> {
        let value = reader.read_byte()?;
        PacketType::try_from(value).map_err(|_| SerdeErr::InvalidDiscriminant {
            value,
            type_name: "PacketType",
        })
    }

    fn bit_length(&self) -> u32 {
        <Self as ConstBitLength>::const_bit_length()
    }
}

impl ConstBitLength for PacketType {
    fn const_bit_length() -> u32 {
        8
    }
}
