mod server;
pub use server::{RpcRecipient, Server};

mod server_config;
pub use server_config::{BatchConfig, ServerConfig};
