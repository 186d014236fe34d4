use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use tracing::{debug, info, warn};

use super::{RecordStore, StoreSession};
use crate::dns::common::fqdn;
use crate::error::StoreError;
use crate::zone::{APEX, RecordSet, Zone};

/// Keys that a single SCAN round asks Redis for.
const SCAN_COUNT: usize = 1000;

/// Redis connection and key layout settings
#[derive(Debug, Clone)]
pub struct RedisConfig {
    /// Redis URL (e.g., redis://localhost:6379)
    pub url: String,
    /// Prepended to the zone name to form the hash key
    pub key_prefix: String,
    /// Appended to the zone name to form the hash key
    pub key_suffix: String,
    /// Connection timeout
    pub connection_timeout: Duration,
    /// Retry attempts for connection
    pub max_retries: u32,
    /// TTL for records stored with a TTL of 0
    pub default_ttl: u32,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379".to_string(),
            key_prefix: "_dns:".to_string(),
            key_suffix: String::new(),
            connection_timeout: Duration::from_secs(5),
            max_retries: 3,
            default_ttl: crate::zone::constants::DEFAULT_TTL,
        }
    }
}

impl RedisConfig {
    /// Connect to Redis, retrying with a linear backoff
    pub async fn connect(&self) -> Result<RedisStore, StoreError> {
        let mut retries = 0;

        loop {
            match RedisStore::new(self.clone()).await {
                Ok(store) => {
                    info!("Successfully connected to Redis at {}", self.url);
                    return Ok(store);
                }
                Err(e) => {
                    retries += 1;
                    if retries > self.max_retries {
                        warn!(
                            "Failed to connect to Redis after {} attempts: {}",
                            self.max_retries, e
                        );
                        return Err(e);
                    }
                    warn!(
                        "Failed to connect to Redis (attempt {}/{}): {}",
                        retries, self.max_retries, e
                    );
                    tokio::time::sleep(Duration::from_secs(retries as u64)).await;
                }
            }
        }
    }

    fn zone_key(&self, zone: &str) -> String {
        format!("{}{}{}", self.key_prefix, zone, self.key_suffix)
    }

    /// Recovers the zone name from a hash key, if the key is one of ours.
    fn zone_from_key(&self, key: &str) -> Option<String> {
        let name = key
            .strip_prefix(&self.key_prefix)?
            .strip_suffix(&self.key_suffix)?;
        if name.is_empty() {
            None
        } else {
            Some(fqdn(name))
        }
    }

    /// Maps each zone name to the key it is stored under. Names are
    /// normalized, keys are kept as found; when two keys name the same zone
    /// the one in canonical form wins.
    fn index_keys<I, S>(&self, keys: I) -> HashMap<String, String>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut index = HashMap::new();
        for key in keys {
            let key = key.into();
            let Some(zone) = self.zone_from_key(&key) else {
                continue;
            };
            let canonical = self.zone_key(&zone) == key;
            match index.entry(zone) {
                Entry::Vacant(entry) => {
                    entry.insert(key);
                }
                Entry::Occupied(mut entry) if canonical => {
                    entry.insert(key);
                }
                Entry::Occupied(entry) => {
                    debug!("Ignoring duplicate key {} for zone {}", key, entry.key());
                }
            }
        }
        index
    }

    /// The stored key for `zone`, falling back to the canonical layout for
    /// zones not seen by the last listing.
    fn key_for(&self, index: &HashMap<String, String>, zone: &str) -> String {
        index
            .get(zone)
            .cloned()
            .unwrap_or_else(|| self.zone_key(zone))
    }

    fn scan_pattern(&self) -> String {
        format!(
            "{}*{}",
            escape_glob(&self.key_prefix),
            escape_glob(&self.key_suffix)
        )
    }
}

fn escape_glob(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Record store backed by one Redis hash per zone: fields are locations,
/// values are JSON record sets.
pub struct RedisStore {
    client: ConnectionManager,
    config: RedisConfig,
    /// Zone name to stored key, rebuilt on every listing
    keys: Arc<RwLock<HashMap<String, String>>>,
}

impl RedisStore {
    /// Open a single connection attempt, bounded by the configured timeout
    pub async fn new(config: RedisConfig) -> Result<Self, StoreError> {
        let client = redis::Client::open(config.url.as_str())?;

        let connection_manager =
            tokio::time::timeout(config.connection_timeout, ConnectionManager::new(client))
                .await
                .map_err(|_| {
                    StoreError::Unavailable(format!(
                        "connection to {} timed out after {:?}",
                        config.url, config.connection_timeout
                    ))
                })??;

        Ok(Self {
            client: connection_manager,
            config,
            keys: Arc::new(RwLock::new(HashMap::new())),
        })
    }
}

#[async_trait]
impl RecordStore for RedisStore {
    async fn ping(&self) -> Result<(), StoreError> {
        let mut conn = self.client.clone();
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }

    async fn load_all_zone_names(&self) -> Result<Vec<String>, StoreError> {
        let pattern = self.config.scan_pattern();
        let mut conn = self.client.clone();
        let mut found = Vec::new();
        let mut cursor: u64 = 0;

        loop {
            let (next_cursor, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_COUNT)
                .query_async(&mut conn)
                .await?;

            found.extend(keys);
            cursor = next_cursor;
            if cursor == 0 {
                break;
            }
        }

        let index = self.config.index_keys(found);
        let mut zones: Vec<String> = index.keys().cloned().collect();
        zones.sort();
        *self.keys.write() = index;

        debug!("Found {} zones in Redis", zones.len());
        Ok(zones)
    }

    async fn session(&self) -> Result<Box<dyn StoreSession>, StoreError> {
        Ok(Box::new(RedisSession {
            conn: self.client.clone(),
            config: self.config.clone(),
            keys: Arc::clone(&self.keys),
        }))
    }
}

/// Per-query handle; owns its own clone of the connection manager.
pub struct RedisSession {
    conn: ConnectionManager,
    config: RedisConfig,
    keys: Arc<RwLock<HashMap<String, String>>>,
}

impl RedisSession {
    fn key(&self, zone: &str) -> String {
        self.config.key_for(&self.keys.read(), zone)
    }

    async fn fetch(&mut self, zone: &str, location: &str) -> Result<Option<RecordSet>, StoreError> {
        let key = self.key(zone);
        let raw: Option<String> = self.conn.hget(&key, location).await?;
        raw.map(|json| decode(zone, location, &json)).transpose()
    }
}

fn decode(zone: &str, location: &str, json: &str) -> Result<RecordSet, StoreError> {
    serde_json::from_str(json).map_err(|source| StoreError::Decode {
        zone: zone.to_string(),
        location: location.to_string(),
        source,
    })
}

#[async_trait]
impl StoreSession for RedisSession {
    async fn load_zone(&mut self, name: &str) -> Result<Option<Zone>, StoreError> {
        let name = fqdn(name);
        let key = self.key(&name);
        let locations: Vec<String> = self.conn.hkeys(&key).await?;
        if locations.is_empty() {
            debug!("No locations stored for zone {}", name);
            return Ok(None);
        }

        let soa = self.fetch(&name, APEX).await?.and_then(|mut apex| {
            apex.make_fqdn(&name);
            apex.soa
        });

        Ok(Some(Zone::new(
            &name,
            self.config.default_ttl,
            soa,
            locations.into_iter().collect(),
        )))
    }

    async fn load_record_set(
        &mut self,
        location: &str,
        zone: &Zone,
    ) -> Result<RecordSet, StoreError> {
        Ok(self.fetch(&zone.name, location).await?.unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zone_key_layout() {
        let config = RedisConfig::default();
        assert_eq!(config.zone_key("example.com."), "_dns:example.com.");
        assert_eq!(
            config.zone_from_key("_dns:Example.com."),
            Some("example.com.".to_string())
        );
        assert_eq!(config.zone_from_key("other:example.com."), None);
        assert_eq!(config.zone_from_key("_dns:"), None);
    }

    #[test]
    fn test_listed_zones_load_from_their_stored_keys() {
        let config = RedisConfig::default();
        let index = config.index_keys([
            "_dns:example.com",
            "_dns:Example.org.",
            "_dns:example.net",
            "_dns:example.net.",
            "unrelated",
        ]);

        assert_eq!(index.len(), 3);
        assert_eq!(config.key_for(&index, "example.com."), "_dns:example.com");
        assert_eq!(config.key_for(&index, "example.org."), "_dns:Example.org.");
        assert_eq!(config.key_for(&index, "example.net."), "_dns:example.net.");
        assert_eq!(config.key_for(&index, "example.edu."), "_dns:example.edu.");
    }

    #[test]
    fn test_suffix_and_pattern() {
        let config = RedisConfig {
            key_prefix: "dns[1]:".to_string(),
            key_suffix: ":zone".to_string(),
            ..Default::default()
        };
        assert_eq!(config.scan_pattern(), "dns\\[1\\]:*:zone");
        assert_eq!(
            config.zone_from_key("dns[1]:example.org.:zone"),
            Some("example.org.".to_string())
        );
    }

    #[test]
    fn test_decode_error_names_location() {
        let err = decode("example.com.", "www", "{not json").unwrap_err();
        assert!(err.to_string().contains("www"));
        assert!(err.to_string().contains("example.com."));
    }
}
