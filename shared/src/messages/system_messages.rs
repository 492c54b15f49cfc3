//! Messages the server and client exchange to drive replication and remote
//! calls. They are registered with every Protocol by default.

use glam::{Quat, Vec3};

use meridian_serde::{
    read_packed_u32, read_packed_u64, write_packed_u64, BitReader, BitWrite, Serde, SerdeErr,
};

use crate::{
    messages::message::Message,
    replication::identity::{NetId, PrefabHash, SceneId},
};

macro_rules! system_message {
    ($type:ident, $name:expr) => {
        impl Message for $type {
            fn name() -> &'static str {
                $name
            }
        }
    };
}

macro_rules! empty_system_message {
    ($type:ident, $name:expr) => {
        #[derive(Clone, Debug, Default, PartialEq)]
        pub struct $type;

        impl Serde for $type {
            fn ser(&self, _: &mut dyn BitWrite) {}

            fn de(_: &mut BitReader) -> Result<Self, SerdeErr> {
                Ok(Self)
            }

            fn bit_length(&self) -> u32 {
                0
            }
        }

        system_message!($type, $name);
    };
}

// Scene readiness

empty_system_message!(SceneReadyMessage, "meridian::SceneReadyMessage");
empty_system_message!(SceneNotReadyMessage, "meridian::SceneNotReadyMessage");

// Spawn

/// Initial transform and activation values sent with a spawn. Each field is
/// only present when the object's transform sync includes it.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SpawnValues {
    pub position: Option<Vec3>,
    pub rotation: Option<Quat>,
    pub scale: Option<Vec3>,
    pub name: Option<String>,
    pub self_active: Option<bool>,
}

impl Serde for SpawnValues {
    fn ser(&self, writer: &mut dyn BitWrite) {
        self.position.ser(writer);
        self.rotation.ser(writer);
        self.scale.ser(writer);
        self.name.ser(writer);
        self.self_active.ser(writer);
    }

    fn de(reader: &mut BitReader) -> Result<Self, SerdeErr> {
        Ok(Self {
            position: Option::de(reader)?,
            rotation: Option::de(reader)?,
            scale: Option::de(reader)?,
            name: Option::de(reader)?,
            self_active: Option::de(reader)?,
        })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct SpawnMessage {
    pub net_id: NetId,
    pub is_local_player: bool,
    pub is_owner: bool,
    pub scene_id: Option<SceneId>,
    pub prefab_hash: Option<PrefabHash>,
    pub spawn_values: SpawnValues,
    pub payload: Box<[u8]>,
}

impl Serde for SpawnMessage {
    fn ser(&self, writer: &mut dyn BitWrite) {
        self.net_id.ser(writer);
        self.is_local_player.ser(writer);
        self.is_owner.ser(writer);
        self.scene_id.ser(writer);
        self.prefab_hash.ser(writer);
        self.spawn_values.ser(writer);
        self.payload.ser(writer);
    }

    fn de(reader: &mut BitReader) -> Result<Self, SerdeErr> {
        Ok(Self {
            net_id: NetId::de(reader)?,
            is_local_player: bool::de(reader)?,
            is_owner: bool::de(reader)?,
            scene_id: Option::de(reader)?,
            prefab_hash: Option::de(reader)?,
            spawn_values: SpawnValues::de(reader)?,
            payload: Box::<[u8]>::de(reader)?,
        })
    }
}

system_message!(SpawnMessage, "meridian::SpawnMessage");

// Messages that only carry a NetId

macro_rules! net_id_message {
    ($type:ident, $name:expr) => {
        #[derive(Clone, Copy, Debug, PartialEq)]
        pub struct $type {
            pub net_id: NetId,
        }

        impl Serde for $type {
            fn ser(&self, writer: &mut dyn BitWrite) {
                self.net_id.ser(writer);
            }

            fn de(reader: &mut BitReader) -> Result<Self, SerdeErr> {
                Ok(Self {
                    net_id: NetId::de(reader)?,
                })
            }
        }

        system_message!($type, $name);
    };
}

net_id_message!(ObjectDestroyMessage, "meridian::ObjectDestroyMessage");
net_id_message!(ObjectHideMessage, "meridian::ObjectHideMessage");
net_id_message!(RemoveAuthorityMessage, "meridian::RemoveAuthorityMessage");

// State updates

#[derive(Clone, Debug, PartialEq)]
pub struct UpdateVarsMessage {
    pub net_id: NetId,
    pub payload: Box<[u8]>,
}

impl Serde for UpdateVarsMessage {
    fn ser(&self, writer: &mut dyn BitWrite) {
        self.net_id.ser(writer);
        self.payload.ser(writer);
    }

    fn de(reader: &mut BitReader) -> Result<Self, SerdeErr> {
        Ok(Self {
            net_id: NetId::de(reader)?,
            payload: Box::<[u8]>::de(reader)?,
        })
    }
}

system_message!(UpdateVarsMessage, "meridian::UpdateVarsMessage");

/// Several objects' updates framed back to back, see `UpdateBatcher`
#[derive(Clone, Debug, PartialEq)]
pub struct UpdateBatchMessage {
    pub payload: Box<[u8]>,
}

impl Serde for UpdateBatchMessage {
    fn ser(&self, writer: &mut dyn BitWrite) {
        self.payload.ser(writer);
    }

    fn de(reader: &mut BitReader) -> Result<Self, SerdeErr> {
        Ok(Self {
            payload: Box::<[u8]>::de(reader)?,
        })
    }
}

system_message!(UpdateBatchMessage, "meridian::UpdateBatchMessage");

// Remote calls

#[derive(Clone, Debug, PartialEq)]
pub struct RpcMessage {
    pub net_id: NetId,
    pub component_index: u8,
    pub function_index: u16,
    pub payload: Box<[u8]>,
}

impl Serde for RpcMessage {
    fn ser(&self, writer: &mut dyn BitWrite) {
        self.net_id.ser(writer);
        self.component_index.ser(writer);
        write_packed_u64(writer, self.function_index as u64);
        self.payload.ser(writer);
    }

    fn de(reader: &mut BitReader) -> Result<Self, SerdeErr> {
        let net_id = NetId::de(reader)?;
        let component_index = u8::de(reader)?;
        let function_index = read_function_index(reader)?;
        let payload = Box::<[u8]>::de(reader)?;
        Ok(Self {
            net_id,
            component_index,
            function_index,
            payload,
        })
    }
}

system_message!(RpcMessage, "meridian::RpcMessage");

#[derive(Clone, Debug, PartialEq)]
pub struct RpcWithReplyMessage {
    pub net_id: NetId,
    pub component_index: u8,
    pub function_index: u16,
    pub reply_id: u32,
    pub payload: Box<[u8]>,
}

impl Serde for RpcWithReplyMessage {
    fn ser(&self, writer: &mut dyn BitWrite) {
        self.net_id.ser(writer);
        self.component_index.ser(writer);
        write_packed_u64(writer, self.function_index as u64);
        write_packed_u64(writer, self.reply_id as u64);
        self.payload.ser(writer);
    }

    fn de(reader: &mut BitReader) -> Result<Self, SerdeErr> {
        let net_id = NetId::de(reader)?;
        let component_index = u8::de(reader)?;
        let function_index = read_function_index(reader)?;
        let reply_id = read_packed_u32(reader)?;
        let payload = Box::<[u8]>::de(reader)?;
        Ok(Self {
            net_id,
            component_index,
            function_index,
            reply_id,
            payload,
        })
    }
}

system_message!(RpcWithReplyMessage, "meridian::RpcWithReplyMessage");

fn read_function_index(reader: &mut BitReader) -> Result<u16, SerdeErr> {
    let value = read_packed_u64(reader)?;
    u16::try_from(value).map_err(|_| SerdeErr::PackedOverflow {
        value,
        target: "u16",
    })
}

#[derive(Clone, Debug, PartialEq)]
pub struct RpcReply {
    pub reply_id: u32,
    pub success: bool,
    pub payload: Box<[u8]>,
}

impl Serde for RpcReply {
    fn ser(&self, writer: &mut dyn BitWrite) {
        write_packed_u64(writer, self.reply_id as u64);
        self.success.ser(writer);
        self.payload.ser(writer);
    }

    fn de(reader: &mut BitReader) -> Result<Self, SerdeErr> {
        Ok(Self {
            reply_id: read_packed_u32(reader)?,
            success: bool::de(reader)?,
            payload: Box::<[u8]>::de(reader)?,
        })
    }
}

system_message!(RpcReply, "meridian::RpcReply");

// Round trip time

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NetworkPingMessage {
    pub client_time: f64,
}

impl Serde for NetworkPingMessage {
    fn ser(&self, writer: &mut dyn BitWrite) {
        self.client_time.ser(writer);
    }

    fn de(reader: &mut BitReader) -> Result<Self, SerdeErr> {
        Ok(Self {
            client_time: f64::de(reader)?,
        })
    }
}

system_message!(NetworkPingMessage, "meridian::NetworkPingMessage");

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NetworkPongMessage {
    pub client_time: f64,
    pub server_time: f64,
}

impl Serde for NetworkPongMessage {
    fn ser(&self, writer: &mut dyn BitWrite) {
        self.client_time.ser(writer);
        self.server_time.ser(writer);
    }

    fn de(reader: &mut BitReader) -> Result<Self, SerdeErr> {
        Ok(Self {
            client_time: f64::de(reader)?,
            server_time: f64::de(reader)?,
        })
    }
}

system_message!(NetworkPongMessage, "meridian::NetworkPongMessage");
