use thiserror::Error;

use crate::dns::ParseError;

#[derive(Error, Debug)]
pub enum DnsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid DNS packet: {0}")]
    Parse(#[from] ParseError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("No next handler after {0}")]
    NoNextHandler(&'static str),
}

/// Errors raised by a record store backend.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Failed to decode record set for {location} in {zone}: {source}")]
    Decode {
        zone: String,
        location: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Unable to load zones to cache: {0}")]
    InitialLoad(#[source] StoreError),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid bind address: {0}")]
    InvalidBindAddress(String),

    #[error("Invalid HTTP bind address: {0}")]
    InvalidHttpBindAddress(String),

    #[error("Invalid interval: {0}")]
    InvalidInterval(String),

    #[error("Invalid transfer length: {0}")]
    InvalidTransferLength(String),

    #[error("Invalid EDNS payload size: {0}")]
    InvalidPayloadSize(String),

    #[error("Invalid transfer ACL entry: {0}")]
    InvalidAclEntry(String),

    #[error("Configuration parse error: {0}")]
    ParseError(String),
}

pub type Result<T> = std::result::Result<T, DnsError>;
