mod client;
pub use client::Client;

mod client_config;
pub use client_config::ClientConfig;
