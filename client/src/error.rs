use std::net::SocketAddr;

use thiserror::Error;

use meridian_shared::{
    BatchError, ConfigError, ConnectionError, NetId, PrefabHash, RpcDispatchError, SceneId,
    SerializerError, TransportError,
};

/// Errors raised by the client, either returned from an operation or
/// surfaced as an `ErrorEvent` when they come from the server
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    #[error("Connection config is invalid: {0}")]
    Config(#[from] ConfigError),

    #[error("Transport failed: {0}")]
    Transport(#[from] TransportError),

    #[error("Connection to {address} failed: {error}")]
    Connection {
        address: SocketAddr,
        error: ConnectionError,
    },

    #[error("Malformed update batch: {0}")]
    Batch(#[from] BatchError),

    #[error("Replicating object {net_id} failed: {error}")]
    Serializer {
        net_id: NetId,
        error: SerializerError,
    },

    #[error("Remote call from the server failed: {0}")]
    Rpc(#[from] RpcDispatchError),

    #[error("Already connected or connecting to {address}")]
    AlreadyConnected { address: SocketAddr },

    #[error("Not connected to a server")]
    NotConnected,

    #[error("A prefab with hash {prefab_hash} is already registered")]
    PrefabAlreadyRegistered { prefab_hash: PrefabHash },

    #[error("No prefab registered for hash {prefab_hash}, cannot spawn object {net_id}")]
    PrefabNotFound {
        net_id: NetId,
        prefab_hash: PrefabHash,
    },

    #[error("A scene object with scene id {scene_id} is already registered")]
    SceneObjectAlreadyRegistered { scene_id: SceneId },

    #[error("No dormant scene object with scene id {scene_id}, cannot spawn object {net_id}")]
    SceneObjectNotFound { net_id: NetId, scene_id: SceneId },

    #[error("Spawn of object {net_id} must name either a scene id or a prefab hash, not both or neither")]
    UnresolvableSpawn { net_id: NetId },

    #[error("No spawned object with net id {net_id}")]
    ObjectNotFound { net_id: NetId },

    #[error("The server sent {name}, which only clients may send")]
    UnexpectedMessage { name: &'static str },
}

impl ClientError {
    /// Whether the error came from bytes the server sent that cannot be
    /// interpreted, in which case the connection is torn down
    pub fn is_protocol_violation(&self) -> bool {
        match self {
            ClientError::Connection { error, .. } => error.is_protocol_violation(),
            ClientError::Rpc(error) => error.is_protocol_violation(),
            ClientError::Batch(_)
            | ClientError::Serializer { .. }
            | ClientError::UnresolvableSpawn { .. }
            | ClientError::UnexpectedMessage { .. } => true,
            _ => false,
        }
    }
}
