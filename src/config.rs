use crate::dns::edns::{MAX_UDP_PAYLOAD_SIZE, MIN_UDP_PAYLOAD_SIZE};
use crate::error::ConfigError;
use crate::plugin::PluginSettings;
use crate::store::RedisConfig;
use crate::transfer::TransferAcl;
use std::net::SocketAddr;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    /// Address to bind the DNS server to (UDP and TCP)
    pub bind_addr: SocketAddr,

    /// Address for the health endpoints, `None` to disable them
    pub http_bind_addr: Option<SocketAddr>,

    /// Record store connection and key layout
    pub redis: RedisConfig,

    /// How often the zone name list is reloaded
    pub zone_refresh_interval: Duration,

    /// Byte budget of one zone transfer message
    pub max_transfer_length: usize,

    /// EDNS0 payload size advertised in responses
    pub edns_udp_payload_size: u16,

    /// Idle TCP connections are closed after this long
    pub tcp_idle_timeout: Duration,

    /// Whether AXFR is served at all
    pub transfers_enabled: bool,

    /// Clients allowed to transfer zones
    pub transfer_acl: TransferAcl,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 1053)),
            http_bind_addr: Some(SocketAddr::from(([127, 0, 0, 1], 8080))),
            redis: RedisConfig::default(),
            zone_refresh_interval: Duration::from_secs(60),
            max_transfer_length: 1000,
            edns_udp_payload_size: 1232,
            tcp_idle_timeout: Duration::from_secs(10),
            transfers_enabled: true,
            transfer_acl: TransferAcl::allow_all(),
        }
    }
}

impl Config {
    /// Create a Config from environment variables
    /// Returns Err if critical configuration is invalid
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(bind_addr) = std::env::var("REDZONE_BIND_ADDR") {
            config.bind_addr = bind_addr
                .parse()
                .map_err(|_| ConfigError::InvalidBindAddress(bind_addr))?;
        }

        if let Ok(http_bind_addr) = std::env::var("REDZONE_HTTP_BIND_ADDR") {
            config.http_bind_addr = parse_http_bind_addr(&http_bind_addr)?;
        }

        // Record store
        if let Ok(url) = std::env::var("REDZONE_REDIS_URL") {
            config.redis.url = url;
        }

        if let Ok(prefix) = std::env::var("REDZONE_REDIS_KEY_PREFIX") {
            config.redis.key_prefix = prefix;
        }

        if let Ok(suffix) = std::env::var("REDZONE_REDIS_KEY_SUFFIX") {
            config.redis.key_suffix = suffix;
        }

        if let Ok(timeout) = std::env::var("REDZONE_REDIS_CONNECT_TIMEOUT") {
            config.redis.connection_timeout = parse_seconds(&timeout)?;
        }

        if let Ok(retries) = std::env::var("REDZONE_REDIS_CONNECT_RETRIES") {
            config.redis.max_retries = retries.parse().map_err(|_| {
                ConfigError::ParseError(format!("Invalid connect retries: {}", retries))
            })?;
        }

        if let Ok(default_ttl) = std::env::var("REDZONE_DEFAULT_TTL") {
            config.redis.default_ttl = default_ttl.parse().map_err(|_| {
                ConfigError::ParseError(format!("Invalid default TTL: {}", default_ttl))
            })?;
        }

        if let Ok(interval) = std::env::var("REDZONE_ZONE_REFRESH_INTERVAL") {
            config.zone_refresh_interval = parse_seconds(&interval)?;
        }

        // Zone transfers
        if let Ok(length) = std::env::var("REDZONE_MAX_TRANSFER_LENGTH") {
            config.max_transfer_length = length
                .parse()
                .map_err(|_| ConfigError::InvalidTransferLength(length))?;
        }

        if let Ok(enabled) = std::env::var("REDZONE_TRANSFER_ENABLED") {
            config.transfers_enabled = parse_bool(&enabled, true);
        }

        if let Ok(acl) = std::env::var("REDZONE_TRANSFER_ALLOW") {
            config.transfer_acl = TransferAcl::parse(&acl)?;
        }

        if let Ok(payload_size) = std::env::var("REDZONE_EDNS_UDP_PAYLOAD_SIZE") {
            config.edns_udp_payload_size = payload_size
                .parse()
                .map_err(|_| ConfigError::InvalidPayloadSize(payload_size))?;
        }

        if let Ok(timeout) = std::env::var("REDZONE_TCP_IDLE_TIMEOUT") {
            config.tcp_idle_timeout = parse_seconds(&timeout)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.zone_refresh_interval.is_zero() {
            return Err(ConfigError::InvalidInterval(
                "Zone refresh interval must be greater than 0".to_string(),
            ));
        }

        if self.tcp_idle_timeout.is_zero() {
            return Err(ConfigError::InvalidInterval(
                "TCP idle timeout must be greater than 0".to_string(),
            ));
        }

        if self.redis.connection_timeout.is_zero() {
            return Err(ConfigError::InvalidInterval(
                "Redis connect timeout must be greater than 0".to_string(),
            ));
        }

        if self.max_transfer_length == 0 {
            return Err(ConfigError::InvalidTransferLength(
                "Transfer length must be greater than 0".to_string(),
            ));
        }

        if !(MIN_UDP_PAYLOAD_SIZE..=MAX_UDP_PAYLOAD_SIZE).contains(&self.edns_udp_payload_size) {
            return Err(ConfigError::InvalidPayloadSize(format!(
                "EDNS payload size must be between {} and {}, got {}",
                MIN_UDP_PAYLOAD_SIZE, MAX_UDP_PAYLOAD_SIZE, self.edns_udp_payload_size
            )));
        }

        Ok(())
    }

    pub fn plugin_settings(&self) -> PluginSettings {
        PluginSettings {
            edns_payload_size: self.edns_udp_payload_size,
            max_transfer_length: self.max_transfer_length,
            transfers_enabled: self.transfers_enabled,
            transfer_acl: self.transfer_acl.clone(),
        }
    }
}

/// `off`, `disabled` or an empty value turn the HTTP endpoints off.
pub fn parse_http_bind_addr(raw: &str) -> Result<Option<SocketAddr>, ConfigError> {
    match raw.trim().to_lowercase().as_str() {
        "" | "off" | "disabled" => Ok(None),
        addr => addr
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidHttpBindAddress(raw.to_string())),
    }
}

/// Durations are given in whole seconds.
fn parse_seconds(raw: &str) -> Result<Duration, ConfigError> {
    raw.trim()
        .parse::<u64>()
        .map(Duration::from_secs)
        .map_err(|_| ConfigError::InvalidInterval(raw.to_string()))
}

fn parse_bool(s: &str, default: bool) -> bool {
    match s.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => true,
        "false" | "0" | "no" | "off" => false,
        _ => default,
    }
}
