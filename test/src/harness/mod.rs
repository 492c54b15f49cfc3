//! A server and a set of clients on one `LocalNetwork`, stepped together on
//! a simulated clock

use std::{
    net::SocketAddr,
    time::{Duration, Instant},
};

use meridian_client::{Client, ClientConfig};
use meridian_server::{Server, ServerConfig, UserKey};

use crate::{
    local_socket::{LocalNetwork, LocalSocket},
    test_protocol::{crate_components, player_components, protocol, CRATE_PREFAB, PLAYER_PREFAB},
};

pub const TICK: Duration = Duration::from_millis(16);

pub fn server_address() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 14191))
}

pub fn client_address(index: usize) -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 20000 + index as u16))
}

/// Accepts every connection without an auth round trip
pub fn open_server_config() -> ServerConfig {
    ServerConfig {
        require_auth: false,
        ..ServerConfig::default()
    }
}

pub struct TestHarness {
    pub network: LocalNetwork,
    pub server: Server<LocalSocket>,
    pub clients: Vec<Client<LocalSocket>>,
    pub now: Instant,
}

impl TestHarness {
    pub fn new(client_count: usize) -> Self {
        Self::with_config(open_server_config(), ClientConfig::default(), client_count)
    }

    pub fn with_config(
        server_config: ServerConfig,
        client_config: ClientConfig,
        client_count: usize,
    ) -> Self {
        let network = LocalNetwork::new();
        let server = Server::new(
            server_config,
            protocol(),
            network.socket(server_address()),
        )
        .expect("server config is valid");

        let clients = (0..client_count)
            .map(|index| {
                let mut client = Client::new(
                    client_config.clone(),
                    protocol(),
                    network.socket(client_address(index)),
                )
                .expect("client config is valid");
                client.register_prefab(PLAYER_PREFAB, player_components);
                client.register_prefab(CRATE_PREFAB, crate_components);
                client
            })
            .collect();

        Self {
            network,
            server,
            clients,
            now: Instant::now(),
        }
    }

    /// Connects every client and waits until the server accepted them all
    pub fn connect_all(&mut self) {
        for client in self.clients.iter_mut() {
            client
                .connect(server_address(), self.now)
                .expect("client starts disconnected");
        }
        self.tick_until(|harness| harness.clients.iter().all(Client::is_connected));
    }

    /// Connects every client, marks them scene-ready, and drops the events
    /// that produced
    pub fn connect_all_ready(&mut self) {
        self.connect_all();
        for client in self.clients.iter_mut() {
            client.scene_ready().expect("client is connected");
        }
        self.tick_n(2);
        self.server.take_events();
        for client in self.clients.iter_mut() {
            client.take_events();
        }
    }

    /// The server's key for client `index`
    pub fn user_key(&self, index: usize) -> UserKey {
        let address = client_address(index);
        self.server
            .user_keys()
            .into_iter()
            .find(|user_key| {
                self.server
                    .user(user_key)
                    .is_some_and(|user| user.address() == address)
            })
            .expect("client is connected")
    }

    /// Advances the clock one tick and runs one full exchange: clients send,
    /// the server processes and answers, clients receive
    pub fn tick(&mut self) {
        self.now += TICK;
        let now = self.now;

        for client in self.clients.iter_mut() {
            client.update(now);
            client.send_all_packets(now);
        }

        self.server.receive_all_packets();
        self.server.process_all_packets(now);
        self.server.update(now);
        self.server.send_all_packets(now);

        for client in self.clients.iter_mut() {
            client.receive_all_packets(now);
        }
    }

    pub fn tick_n(&mut self, ticks: usize) {
        for _ in 0..ticks {
            self.tick();
        }
    }

    /// Ticks until `done` holds
    ///
    /// # Panics
    ///
    /// Panics after 200 ticks.
    pub fn tick_until(&mut self, done: impl Fn(&Self) -> bool) {
        for _ in 0..200 {
            if done(self) {
                return;
            }
            self.tick();
        }
        panic!("condition not reached after 200 ticks");
    }
}
