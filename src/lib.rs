pub mod config;
pub mod dns;
pub mod error;
pub mod http_server;
pub mod plugin;
pub mod server;
pub mod store;
pub mod synth;
pub mod transfer;
pub mod zone;
pub mod zone_cache;

pub use dns::DNSPacket;
