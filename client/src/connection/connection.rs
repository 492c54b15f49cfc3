use std::{net::SocketAddr, time::Instant};

use meridian_shared::{
    write_packet, BaseConnection, ConfigError, ConnectionConfig, PacketType, Serde, Timer,
    TransportChannel,
};

use crate::connection::rtt::RttEstimator;

/// The client's connection to the server, from the first connect request
/// until teardown
pub struct Connection {
    pub base: BaseConnection,
    accepted: bool,
    auth_payload: Box<[u8]>,
    handshake_timer: Timer,
    ping_timer: Timer,
    pub rtt: RttEstimator,
}

impl Connection {
    pub fn new(
        connection_config: &ConnectionConfig,
        address: SocketAddr,
        auth_payload: Box<[u8]>,
        now: Instant,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            base: BaseConnection::new(address, connection_config, now)?,
            accepted: false,
            auth_payload,
            handshake_timer: Timer::new(connection_config.ping_interval, now),
            ping_timer: Timer::new(connection_config.ping_interval, now),
            rtt: RttEstimator::new(),
        })
    }

    pub fn address(&self) -> SocketAddr {
        self.base.address()
    }

    pub fn is_accepted(&self) -> bool {
        self.accepted
    }

    pub fn accept(&mut self, now: Instant) {
        self.accepted = true;
        self.ping_timer.reset(now);
    }

    // Handshake

    pub fn queue_connect_request(&mut self, now: Instant) {
        let auth_payload = self.auth_payload.clone();
        self.base.queue_packet(
            TransportChannel::Reliable,
            write_packet(PacketType::Connect, |writer| auth_payload.ser(writer)),
        );
        self.handshake_timer.reset(now);
    }

    /// The connect request is sent again until the server answers
    pub fn should_resend_connect(&self, now: Instant) -> bool {
        !self.accepted && self.handshake_timer.ringing(now)
    }

    // Ping

    pub fn should_ping(&self, now: Instant) -> bool {
        self.accepted && self.ping_timer.ringing(now)
    }

    pub fn mark_pinged(&mut self, now: Instant) {
        self.ping_timer.reset(now);
    }
}
