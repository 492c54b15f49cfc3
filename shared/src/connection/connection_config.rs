use std::{default::Default, time::Duration};

use crate::connection::error::ConfigError;

/// Contains Config properties which will be used by a Server or Client
#[derive(Clone, Debug)]
pub struct ConnectionConfig {
    /// The duration to wait for communication from a remote host before
    /// initiating a disconnect
    pub disconnection_timeout: Duration,
    /// The duration to wait before sending a heartbeat message to a remote
    /// host, if the host has not already sent another message within that time
    pub heartbeat_interval: Duration,
    /// How long the notify channel may go without sending before it sends an
    /// ack-only packet, provided there is something new to acknowledge
    pub ack_timeout: Duration,
    /// Maximum number of notify messages awaiting a delivered/lost verdict.
    /// Further sends are reported lost immediately.
    pub notify_window_capacity: usize,
    /// Width of notify sequence numbers. The wire header holds 16 bits.
    pub sequence_bits: u8,
    /// How long an RPC reply may be outstanding before its continuation is
    /// failed with a timeout
    pub reply_timeout: Duration,
    /// The duration between round-trip-time probes
    pub ping_interval: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            disconnection_timeout: Duration::from_secs(10),
            heartbeat_interval: Duration::from_secs(4),
            ack_timeout: Duration::from_millis(300),
            notify_window_capacity: 512,
            sequence_bits: 16,
            reply_timeout: Duration::from_secs(30),
            ping_interval: Duration::from_secs(1),
        }
    }
}

impl ConnectionConfig {
    /// Checks the values that the notify protocol depends on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sequence_bits == 0 || self.sequence_bits > 16 {
            return Err(ConfigError::InvalidSequenceBits {
                bits: self.sequence_bits,
            });
        }
        let half_range = 1usize << (self.sequence_bits - 1);
        if self.notify_window_capacity == 0 || self.notify_window_capacity >= half_range {
            return Err(ConfigError::InvalidWindowCapacity {
                capacity: self.notify_window_capacity,
                half_range,
            });
        }
        if self.ack_timeout.is_zero() {
            return Err(ConfigError::ZeroAckTimeout);
        }
        Ok(())
    }
}
