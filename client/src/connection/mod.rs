pub mod connection;
pub mod rtt;
