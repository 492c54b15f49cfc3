//! # Meridian Server
//! An authoritative server that accepts clients over any `Transport`,
//! replicates the state of spawned objects to the clients observing them,
//! and routes remote calls in both directions.

#![deny(
    trivial_casts,
    trivial_numeric_casts,
    unstable_features,
    unused_import_braces
)]

pub mod shared {
    pub use meridian_shared::{
        BitReader, BitWrite, BitWriter, ConnectionConfig, ConstBitLength, DisconnectReason,
        Message, NetId, NotifyKey, PrefabHash, Protocol, Replicate, RpcTarget, SceneId, Serde,
        SerdeErr, SpawnValues, Transport, TransportChannel, TransportError,
    };
}

mod connection;
mod error;
mod events;
mod server;
mod user;
mod world;

pub use error::ServerError;
pub use events::{
    AuthEvent, ConnectEvent, DisconnectEvent, ErrorEvent, Event, Events, MessageEvent,
    NotifyDeliveredEvent, NotifyLostEvent, SceneReadyEvent,
};
pub use server::{BatchConfig, RpcRecipient, Server, ServerConfig};
pub use user::{User, UserKey};
pub use world::{
    server_object::{DormantObject, ServerObject, SpawnOptions, TransformSync},
    visibility::{AllVisible, VisibilityPolicy},
};
