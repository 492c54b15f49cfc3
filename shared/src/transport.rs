use std::net::SocketAddr;

pub mod error;
pub use error::TransportError;

/// Delivery class requested for an outgoing datagram
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransportChannel {
    /// Delivered once and in order. The transport owns that promise.
    Reliable,
    /// May be dropped, duplicated or reordered
    Unreliable,
}

/// Moves raw datagrams between endpoints. Polled, never blocks.
///
/// Transports that receive on other threads must queue datagrams
/// internally; `receive` is only called from the event loop.
pub trait Transport {
    fn send(
        &mut self,
        address: &SocketAddr,
        channel: TransportChannel,
        payload: &[u8],
    ) -> Result<(), TransportError>;

    /// Returns the next pending datagram, or `None` when none is waiting
    fn receive(&mut self) -> Result<Option<(SocketAddr, Box<[u8]>)>, TransportError>;
}
