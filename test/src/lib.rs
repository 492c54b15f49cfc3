//! Test support for meridian: an in-memory transport with a link
//! conditioner, a shared test protocol, and a harness that steps a server
//! and its clients together.

pub mod harness;
pub mod local_socket;
pub mod test_protocol;

pub use harness::{client_address, open_server_config, server_address, TestHarness, TICK};
pub use local_socket::{LinkConditioner, LocalNetwork, LocalSocket};
pub use test_protocol::{
    crate_components, player_components, protocol, rpc, Aim, Chat, Health, PlayerInput,
    Position, TestPlugin, CRATE_PREFAB, PLAYER_PREFAB,
};
