use std::net::SocketAddr;

use thiserror::Error;

use meridian_shared::{
    BatchError, ConfigError, ConnectionError, MessageKindsError, NetId, RpcDispatchError, SceneId,
    SerializerError, SyncSettingsError, TransportError,
};

use crate::user::UserKey;

/// Errors raised by the server, either returned from an operation or
/// surfaced as an `ErrorEvent` when they come from a remote host
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServerError {
    #[error("Connection config is invalid: {0}")]
    Config(#[from] ConfigError),

    #[error("Transport failed: {0}")]
    Transport(#[from] TransportError),

    #[error("Connection to {address} failed: {error}")]
    Connection {
        address: SocketAddr,
        error: ConnectionError,
    },

    #[error(transparent)]
    MessageKinds(#[from] MessageKindsError),

    #[error("Replicating object {net_id} failed: {error}")]
    Serializer {
        net_id: NetId,
        error: SerializerError,
    },

    #[error("Update for object {net_id} was not sent: {error}")]
    Batch { net_id: NetId, error: BatchError },

    #[error("Remote call from {user_key} failed: {error}")]
    Rpc {
        user_key: UserKey,
        error: RpcDispatchError,
    },

    #[error(transparent)]
    SyncSettings(#[from] SyncSettingsError),

    #[error("No user with key {user_key}")]
    UserNotFound { user_key: UserKey },

    #[error("User {user_key} has not been accepted yet")]
    UserNotConnected { user_key: UserKey },

    #[error("User {user_key} is not waiting for authentication")]
    NoPendingAuth { user_key: UserKey },

    #[error("No spawned object with net id {net_id}")]
    ObjectNotFound { net_id: NetId },

    #[error("No dormant scene object registered with scene id {scene_id}")]
    SceneObjectNotFound { scene_id: SceneId },

    #[error("A scene object with scene id {scene_id} is already registered")]
    SceneObjectAlreadyRegistered { scene_id: SceneId },

    #[error("User {user_key} sent {name}, which only the server may send")]
    UnexpectedMessage {
        user_key: UserKey,
        name: &'static str,
    },
}
