use std::{default::Default, time::Duration};

use meridian_shared::ConnectionConfig;

/// Contains Config properties which will be used by the Server
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Determines whether to require that the Client send some auth payload
    /// in order to connect. When set, every connect request surfaces as an
    /// `AuthEvent` and waits for `accept_connection` or `reject_connection`.
    pub require_auth: bool,
    /// How long a user may wait for `accept_connection` before it is
    /// refused with `DisconnectReason::Timeout`
    pub auth_timeout: Duration,
    /// Used to configure the connections with Clients
    pub connection: ConnectionConfig,
    /// Controls how per-object updates are packed for each user
    pub batch: BatchConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            require_auth: true,
            auth_timeout: Duration::from_secs(10),
            connection: ConnectionConfig::default(),
            batch: BatchConfig::default(),
        }
    }
}

/// Update batching: when enabled, the per-object updates a user receives
/// during one `update` are packed into `UpdateBatchMessage`s instead of one
/// `UpdateVarsMessage` each
#[derive(Clone, Debug)]
pub struct BatchConfig {
    pub enabled: bool,
    /// Upper bound for one batch payload. An update that does not fit in an
    /// empty batch is dropped and reported as `ServerError::Batch`.
    pub max_batch_bytes: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_batch_bytes: 1100,
        }
    }
}
