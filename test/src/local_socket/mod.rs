//! In-memory transport for end-to-end tests. Every endpoint of a
//! `LocalNetwork` gets an inbox; sending pushes into the peer's inbox.

use std::{
    collections::{HashMap, VecDeque},
    net::SocketAddr,
    sync::{Arc, Mutex},
};

use log::trace;

use meridian_shared::{Transport, TransportChannel, TransportError};

type Inbox = VecDeque<(SocketAddr, Box<[u8]>)>;

/// Drops unreliable datagrams with probability `loss`
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LinkConditioner {
    pub loss: f32,
}

impl LinkConditioner {
    pub fn lossy(loss: f32) -> Self {
        Self { loss }
    }
}

struct Link {
    inboxes: HashMap<SocketAddr, Inbox>,
    conditioner: Option<LinkConditioner>,
    rng: fastrand::Rng,
    dropped: usize,
}

/// A set of endpoints that can reach each other
#[derive(Clone)]
pub struct LocalNetwork {
    link: Arc<Mutex<Link>>,
}

impl Default for LocalNetwork {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalNetwork {
    pub fn new() -> Self {
        Self::with_seed(0x5EED)
    }

    /// The seed drives the link conditioner, so lossy runs repeat exactly
    pub fn with_seed(seed: u64) -> Self {
        Self {
            link: Arc::new(Mutex::new(Link {
                inboxes: HashMap::new(),
                conditioner: None,
                rng: fastrand::Rng::with_seed(seed),
                dropped: 0,
            })),
        }
    }

    /// Binds a new endpoint
    pub fn socket(&self, address: SocketAddr) -> LocalSocket {
        self.link
            .lock()
            .unwrap()
            .inboxes
            .insert(address, VecDeque::new());
        LocalSocket {
            address,
            link: self.link.clone(),
            closed: false,
        }
    }

    pub fn set_conditioner(&self, conditioner: Option<LinkConditioner>) {
        self.link.lock().unwrap().conditioner = conditioner;
    }

    /// Unreliable datagrams the conditioner dropped so far
    pub fn dropped(&self) -> usize {
        self.link.lock().unwrap().dropped
    }

    /// Puts a raw datagram in `to`'s inbox as if `from` had sent it
    pub fn inject(&self, from: SocketAddr, to: SocketAddr, payload: &[u8]) {
        if let Some(inbox) = self.link.lock().unwrap().inboxes.get_mut(&to) {
            inbox.push_back((from, payload.into()));
        }
    }

    /// Removes everything waiting for `address`
    pub fn drain(&self, address: &SocketAddr) -> Vec<(SocketAddr, Box<[u8]>)> {
        self.link
            .lock()
            .unwrap()
            .inboxes
            .get_mut(address)
            .map(|inbox| inbox.drain(..).collect())
            .unwrap_or_default()
    }
}

/// One endpoint of a `LocalNetwork`
pub struct LocalSocket {
    address: SocketAddr,
    link: Arc<Mutex<Link>>,
    closed: bool,
}

impl LocalSocket {
    pub fn address(&self) -> SocketAddr {
        self.address
    }

    /// Stops sending and receiving, as if the process had gone away
    pub fn close(&mut self) {
        self.closed = true;
        if let Some(inbox) = self.link.lock().unwrap().inboxes.get_mut(&self.address) {
            inbox.clear();
        }
    }

    pub fn reopen(&mut self) {
        self.closed = false;
    }
}

impl Transport for LocalSocket {
    fn send(
        &mut self,
        address: &SocketAddr,
        channel: TransportChannel,
        payload: &[u8],
    ) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }

        let mut link = self.link.lock().unwrap();
        if channel == TransportChannel::Unreliable {
            if let Some(conditioner) = link.conditioner {
                if link.rng.f32() < conditioner.loss {
                    trace!("dropping {} byte datagram to {}", payload.len(), address);
                    link.dropped += 1;
                    return Ok(());
                }
            }
        }

        let Some(inbox) = link.inboxes.get_mut(address) else {
            return Err(TransportError::SendFailed { address: *address });
        };
        inbox.push_back((self.address, payload.into()));
        Ok(())
    }

    fn receive(&mut self) -> Result<Option<(SocketAddr, Box<[u8]>)>, TransportError> {
        if self.closed {
            return Ok(None);
        }
        let mut link = self.link.lock().unwrap();
        Ok(link
            .inboxes
            .get_mut(&self.address)
            .and_then(VecDeque::pop_front))
    }
}
