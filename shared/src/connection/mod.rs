pub mod ack_window;
pub mod base_connection;
pub mod connection_config;
pub mod disconnect_reason;
pub mod error;
pub mod notify_channel;
pub mod packet_type;
