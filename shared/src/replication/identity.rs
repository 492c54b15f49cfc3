use std::fmt;

use meridian_serde::{read_packed_u32, write_packed_u64, BitReader, BitWrite, Serde, SerdeErr};

/// Server-assigned identifier of a spawned replicated object.
/// Zero means the object is not spawned.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NetId(pub u32);

impl NetId {
    pub const UNSPAWNED: NetId = NetId(0);

    pub fn is_spawned(&self) -> bool {
        self.0 != 0
    }
}

impl fmt::Display for NetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serde for NetId {
    fn ser(&self, writer: &mut dyn BitWrite) {
        write_packed_u64(writer, self.0 as u64);
    }

    fn de(reader: &mut BitReader) -> Result<Self, SerdeErr> {
        Ok(NetId(read_packed_u32(reader)?))
    }
}

/// Stable identifier of an object placed in a scene rather than spawned
/// from a prefab
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SceneId(pub u64);

impl fmt::Display for SceneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#X}", self.0)
    }
}

impl Serde for SceneId {
    fn ser(&self, writer: &mut dyn BitWrite) {
        self.0.ser(writer);
    }

    fn de(reader: &mut BitReader) -> Result<Self, SerdeErr> {
        Ok(SceneId(u64::de(reader)?))
    }

    fn bit_length(&self) -> u32 {
        64
    }
}

/// Hash of the prefab template an object was instantiated from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PrefabHash(pub i32);

impl fmt::Display for PrefabHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#X}", self.0)
    }
}

impl Serde for PrefabHash {
    fn ser(&self, writer: &mut dyn BitWrite) {
        self.0.ser(writer);
    }

    fn de(reader: &mut BitReader) -> Result<Self, SerdeErr> {
        Ok(PrefabHash(i32::de(reader)?))
    }

    fn bit_length(&self) -> u32 {
        32
    }
}

/// Which template both sides resolve an object to
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ObjectIdentity {
    Scene(SceneId),
    Prefab(PrefabHash),
}

impl ObjectIdentity {
    pub fn scene_id(&self) -> Option<SceneId> {
        match self {
            ObjectIdentity::Scene(scene_id) => Some(*scene_id),
            ObjectIdentity::Prefab(_) => None,
        }
    }

    pub fn prefab_hash(&self) -> Option<PrefabHash> {
        match self {
            ObjectIdentity::Scene(_) => None,
            ObjectIdentity::Prefab(prefab_hash) => Some(*prefab_hash),
        }
    }
}
