use std::default::Default;

use meridian_shared::ConnectionConfig;

/// Contains Config properties which will be used by the Client
#[derive(Clone, Debug, Default)]
pub struct ClientConfig {
    /// Used to configure the connection with the Server
    pub connection: ConnectionConfig,
    /// Sent with the connect request. The server hands it to the
    /// application in an `AuthEvent` when it requires authentication.
    pub auth_payload: Option<Vec<u8>>,
}
