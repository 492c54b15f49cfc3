use std::{any::Any, any::TypeId, collections::HashMap};

use meridian_serde::{
    read_packed_u64, write_packed_u64, BitReader, BitWrite, SerdeErr, StreamWriter,
};

use crate::messages::{
    error::MessageKindsError,
    message::{Message, MessageContainer},
};

/// MessageKind - should be one unique value for each type of Message
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct MessageKind {
    type_id: TypeId,
}

impl MessageKind {
    pub fn of<M: Message>() -> Self {
        Self {
            type_id: TypeId::of::<M>(),
        }
    }
}

/// FNV-1a over the bytes of `name`. Stable across builds and platforms.
pub fn stable_hash(name: &str) -> u32 {
    let mut hash: u32 = 0x811C_9DC5;
    for byte in name.bytes() {
        hash ^= byte as u32;
        hash = hash.wrapping_mul(0x0100_0193);
    }
    hash
}

fn wire_id(name: &str) -> u16 {
    let hash = stable_hash(name);
    ((hash >> 16) ^ (hash & 0xFFFF)) as u16
}

type DecodeFn = fn(&mut BitReader) -> Result<Box<dyn Any + Send>, SerdeErr>;

fn decode_message<M: Message>(reader: &mut BitReader) -> Result<Box<dyn Any + Send>, SerdeErr> {
    Ok(Box::new(M::de(reader)?))
}

struct MessageEntry {
    kind: MessageKind,
    name: &'static str,
    decode: DecodeFn,
}

/// Maps message types to the wire ids both ends agree on
pub struct MessageKinds {
    kind_map: HashMap<MessageKind, u16>,
    id_map: HashMap<u16, MessageEntry>,
}

impl Default for MessageKinds {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageKinds {
    pub fn new() -> Self {
        Self {
            kind_map: HashMap::new(),
            id_map: HashMap::new(),
        }
    }

    /// Registers `M`.
    ///
    /// # Panics
    ///
    /// Panics if `M`'s wire id collides with another registered type.
    pub fn add_message<M: Message>(&mut self) {
        if let Err(error) = self.try_add_message::<M>() {
            panic!("{}", error);
        }
    }

    /// Registers `M`. Registering the same type twice is a no-op.
    pub fn try_add_message<M: Message>(&mut self) -> Result<(), MessageKindsError> {
        let kind = MessageKind::of::<M>();
        if self.kind_map.contains_key(&kind) {
            return Ok(());
        }

        let id = wire_id(M::name());
        if let Some(existing) = self.id_map.get(&id) {
            return Err(MessageKindsError::HashCollision {
                id,
                existing: existing.name,
                incoming: M::name(),
            });
        }

        self.kind_map.insert(kind, id);
        self.id_map.insert(
            id,
            MessageEntry {
                kind,
                name: M::name(),
                decode: decode_message::<M>,
            },
        );
        Ok(())
    }

    pub fn is_registered<M: Message>(&self) -> bool {
        self.kind_map.contains_key(&MessageKind::of::<M>())
    }

    pub fn wire_id_of<M: Message>(&self) -> Option<u16> {
        self.kind_map.get(&MessageKind::of::<M>()).copied()
    }

    /// Writes the type id prefix followed by the message body.
    pub fn write<M: Message>(
        &self,
        message: &M,
        writer: &mut dyn BitWrite,
    ) -> Result<(), MessageKindsError> {
        let id = self
            .wire_id_of::<M>()
            .ok_or(MessageKindsError::MessageKindNotFound { name: M::name() })?;
        write_packed_u64(writer, id as u64);
        message.ser(writer);
        Ok(())
    }

    /// Encodes a message into a standalone byte buffer.
    pub fn encode<M: Message>(&self, message: &M) -> Result<Box<[u8]>, MessageKindsError> {
        let mut writer = StreamWriter::new();
        self.write(message, &mut writer)?;
        Ok(writer.to_bytes())
    }

    pub fn read(&self, reader: &mut BitReader) -> Result<MessageContainer, MessageKindsError> {
        let id = read_packed_u64(reader).map_err(MessageKindsError::MalformedId)?;
        let entry = u16::try_from(id)
            .ok()
            .and_then(|id| self.id_map.get(&id))
            .ok_or(MessageKindsError::NetIdNotFound { id })?;
        let inner = (entry.decode)(reader).map_err(|error| MessageKindsError::Decode {
            name: entry.name,
            error,
        })?;
        Ok(MessageContainer::new(entry.kind, entry.name, inner))
    }
}
