use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;

use super::{RecordStore, StoreSession};
use crate::dns::common::fqdn;
use crate::error::StoreError;
use crate::zone::{APEX, RecordSet, Zone};

type ZoneData = BTreeMap<String, RecordSet>;

/// In-process record store with the same contract as the Redis backend.
/// Clones share state.
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

struct Inner {
    zones: RwLock<BTreeMap<String, ZoneData>>,
    /// Names reported by the zone listing without any stored data.
    listed_only: RwLock<BTreeSet<String>>,
    default_ttl: u32,
    available: AtomicBool,
    fail_listing: AtomicBool,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(crate::zone::constants::DEFAULT_TTL)
    }
}

impl MemoryStore {
    pub fn new(default_ttl: u32) -> Self {
        Self {
            inner: Arc::new(Inner {
                zones: RwLock::new(BTreeMap::new()),
                listed_only: RwLock::new(BTreeSet::new()),
                default_ttl,
                available: AtomicBool::new(true),
                fail_listing: AtomicBool::new(false),
            }),
        }
    }

    pub fn insert(&self, zone: &str, location: &str, set: RecordSet) {
        self.inner
            .zones
            .write()
            .entry(fqdn(zone))
            .or_default()
            .insert(location.to_string(), set);
    }

    /// Stores a record set given in its JSON form.
    pub fn insert_json(&self, zone: &str, location: &str, json: &str) -> Result<(), StoreError> {
        let set = serde_json::from_str(json).map_err(|source| StoreError::Decode {
            zone: fqdn(zone),
            location: location.to_string(),
            source,
        })?;
        self.insert(zone, location, set);
        Ok(())
    }

    pub fn remove_zone(&self, zone: &str) {
        let zone = fqdn(zone);
        self.inner.zones.write().remove(&zone);
        self.inner.listed_only.write().remove(&zone);
    }

    /// Makes `zone` appear in the zone listing while holding no data.
    pub fn list_without_data(&self, zone: &str) {
        self.inner.listed_only.write().insert(fqdn(zone));
    }

    /// When unavailable, pings and session acquisition fail.
    pub fn set_available(&self, available: bool) {
        self.inner.available.store(available, Ordering::SeqCst);
    }

    /// Makes `load_all_zone_names` fail.
    pub fn set_fail_listing(&self, fail: bool) {
        self.inner.fail_listing.store(fail, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.inner.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::Unavailable("memory store offline".to_string()))
        }
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn ping(&self) -> Result<(), StoreError> {
        self.check_available()
    }

    async fn load_all_zone_names(&self) -> Result<Vec<String>, StoreError> {
        self.check_available()?;
        if self.inner.fail_listing.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("zone listing failed".to_string()));
        }

        let mut names: BTreeSet<String> = self.inner.zones.read().keys().cloned().collect();
        names.extend(self.inner.listed_only.read().iter().cloned());
        Ok(names.into_iter().collect())
    }

    async fn session(&self) -> Result<Box<dyn StoreSession>, StoreError> {
        self.check_available()?;
        Ok(Box::new(MemorySession {
            inner: Arc::clone(&self.inner),
        }))
    }
}

pub struct MemorySession {
    inner: Arc<Inner>,
}

#[async_trait]
impl StoreSession for MemorySession {
    async fn load_zone(&mut self, name: &str) -> Result<Option<Zone>, StoreError> {
        let name = fqdn(name);
        let zones = self.inner.zones.read();
        let Some(data) = zones.get(&name).filter(|data| !data.is_empty()) else {
            return Ok(None);
        };

        let soa = data.get(APEX).and_then(|apex| {
            let mut apex = apex.clone();
            apex.make_fqdn(&name);
            apex.soa
        });

        Ok(Some(Zone::new(
            &name,
            self.inner.default_ttl,
            soa,
            data.keys().cloned().collect(),
        )))
    }

    async fn load_record_set(
        &mut self,
        location: &str,
        zone: &Zone,
    ) -> Result<RecordSet, StoreError> {
        Ok(self
            .inner
            .zones
            .read()
            .get(&zone.name)
            .and_then(|data| data.get(location))
            .cloned()
            .unwrap_or_default())
    }
}
