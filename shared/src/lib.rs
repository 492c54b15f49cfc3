//! # Meridian Shared
//! Common functionality shared between meridian-server & meridian-client
//! crates: the notify channel, message registry, replication model and
//! remote calls.
//!
//! Reliable messages are not retransmitted here. They are written on
//! `TransportChannel::Reliable`, and the `Transport` implementation is
//! what guarantees they arrive once and in order. Only the notify channel
//! tracks delivery itself.

#![deny(trivial_numeric_casts, unstable_features, unused_import_braces)]

pub use meridian_serde::{
    packed_u64_len, read_packed_i64, read_packed_u32, read_packed_u64, write_packed_i64,
    write_packed_u64, zigzag_decode, zigzag_encode, BitCounter, BitReader, BitWrite, BitWriter,
    CompressedQuat, ConstBitLength, PackedI64, PackedU64, Serde, SerdeErr, StreamWriter,
    MTU_SIZE_BITS, MTU_SIZE_BYTES,
};

mod connection;
mod latched_event;
mod messages;
mod protocol;
mod replication;
mod rpc;
mod sequencer;
mod timer;
mod transport;

pub use connection::{
    ack_window::{AckWindow, NotifyCallback, NotifyOutcomes, ReceiveVerdict, ACK_MASK_BITS},
    base_connection::{write_packet, BaseConnection, NotifyKey},
    connection_config::ConnectionConfig,
    disconnect_reason::DisconnectReason,
    error::{ConfigError, ConnectionError, NotifyError, PacketTypeError},
    notify_channel::{AckHeader, NotifyChannel, NotifyHeader},
    packet_type::PacketType,
};
pub use latched_event::LatchedEvent;
pub use messages::{
    error::MessageKindsError,
    message::{Message, MessageContainer},
    message_kinds::{stable_hash, MessageKind, MessageKinds},
    system_messages::{
        NetworkPingMessage, NetworkPongMessage, ObjectDestroyMessage, ObjectHideMessage,
        RemoveAuthorityMessage, RpcMessage, RpcReply, RpcWithReplyMessage, SceneNotReadyMessage,
        SceneReadyMessage, SpawnMessage, SpawnValues, UpdateBatchMessage, UpdateVarsMessage,
    },
};
pub use protocol::{Protocol, ProtocolError, ProtocolPlugin};
pub use replication::{
    batch::{read_batch, UpdateBatcher},
    dirty::{
        ComponentMutator, DirtySet, PropertyMutate, PropertyMutator, SyncState, MAX_PROPERTIES,
        SYNC_OBJECT_BIT,
    },
    error::{BatchError, SerializerError, SyncSettingsError},
    identity::{NetId, ObjectIdentity, PrefabHash, SceneId},
    observer_set::{ObserverDiff, ObserverSet},
    property::Property,
    replicate::{
        attach_mutator, flush_changes, read_delta, read_full, relay_delta, write_delta, write_full,
        Replicate, ReplicatedField,
    },
    serializer::{
        deserialize_components, deserialize_payload, serialize_components, serialize_delta,
        serialize_snapshot, ComponentSlot, ComponentUpdate, ReadMode, SerializedComponents, BARRIER,
        MAX_COMPONENTS,
    },
    sync_list::SyncList,
    sync_settings::{SyncContext, SyncFrom, SyncSettings, SyncSide, SyncTiming, SyncTo},
};
pub use rpc::{
    error::{RpcDispatchError, RpcHandlerError, RpcRegistryError, RpcReplyError},
    registry::{dispatch_rpc, InvokeType, RpcContext, RpcRegistry, RpcTarget},
    reply_table::ReplyTable,
};
pub use sequencer::{Sequencer, SequencerError};
pub use timer::Timer;
pub use transport::{Transport, TransportChannel, TransportError};
