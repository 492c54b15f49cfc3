use std::{net::SocketAddr, time::Instant};

// UserKey
#[derive(PartialEq, Eq, Hash, Clone, Copy, Debug, PartialOrd, Ord)]
pub struct UserKey(u64);

impl UserKey {
    pub(crate) fn new(value: u64) -> Self {
        UserKey(value)
    }

    pub fn to_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for UserKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "user#{}", self.0)
    }
}

// User

/// A remote host known to the server. Users awaiting authentication have no
/// connection yet.
#[derive(Clone, Debug)]
pub struct User {
    address: SocketAddr,
    requested_at: Instant,
    scene_ready: bool,
}

impl User {
    pub(crate) fn new(address: SocketAddr, requested_at: Instant) -> Self {
        Self {
            address,
            requested_at,
            scene_ready: false,
        }
    }

    pub fn address(&self) -> SocketAddr {
        self.address
    }

    /// When the connect request arrived
    pub fn requested_at(&self) -> Instant {
        self.requested_at
    }

    /// Whether the user finished loading the scene and may observe objects
    pub fn is_scene_ready(&self) -> bool {
        self.scene_ready
    }

    pub(crate) fn set_scene_ready(&mut self, ready: bool) {
        self.scene_ready = ready;
    }
}
