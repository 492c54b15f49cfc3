//! # Meridian Client
//! A client that connects to a meridian server over any `Transport`, keeps
//! the objects the server spawns for it in sync, and invokes remote calls
//! on the server.

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

mod client;
mod connection;
mod error;
mod events;
mod world;

pub use client::{Client, ClientConfig};
pub use error::ClientError;
pub use events::{
    AuthorityEvent, ConnectEvent, DespawnEvent, DisconnectEvent, ErrorEvent, Event, Events,
    HideEvent, MessageEvent, NotifyDeliveredEvent, NotifyLostEvent, SpawnEvent, UpdateEvent,
};
pub use world::client_object::ClientObject;
