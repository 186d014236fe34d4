//! Names of the zones this server is authoritative for.
//!
//! The list is loaded once at startup and then replaced wholesale by a
//! background task. Readers only ever see a complete list.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::dns::common::{fqdn, is_subdomain};
use crate::error::{CacheError, StoreError};
use crate::store::RecordStore;

/// Longest zone in `zones` that `qname` equals or sits below, matching
/// whole labels without regard to case.
pub fn zone_matches(zones: &[String], qname: &str) -> Option<String> {
    let qname = fqdn(qname);
    zones
        .iter()
        .filter(|zone| is_subdomain(&qname, zone))
        .max_by_key(|zone| zone.len())
        .map(|zone| fqdn(zone))
}

pub struct ZoneNameCache {
    store: Arc<dyn RecordStore>,
    zones: Mutex<Arc<Vec<String>>>,
}

impl ZoneNameCache {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self {
            store,
            zones: Mutex::new(Arc::new(Vec::new())),
        }
    }

    /// Fetches the current zone list from the store.
    pub async fn load(&self) -> Result<Vec<String>, StoreError> {
        let mut zones: Vec<String> = self
            .store
            .load_all_zone_names()
            .await?
            .iter()
            .map(|zone| fqdn(zone))
            .collect();
        zones.sort();
        zones.dedup();
        Ok(zones)
    }

    /// Initial load. Without a zone list the server cannot answer anything.
    pub async fn start(&self) -> Result<(), CacheError> {
        let zones = self.load().await.map_err(CacheError::InitialLoad)?;
        info!("Loaded {} zones", zones.len());
        self.replace(zones);
        Ok(())
    }

    /// Refreshes the list every `interval` until the handle is aborted. A
    /// failed refresh keeps the previous list.
    pub fn spawn_refresh(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let cache = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // the first tick completes immediately
            ticker.tick().await;

            loop {
                ticker.tick().await;
                cache.refresh().await;
            }
        })
    }

    /// One refresh round.
    pub async fn refresh(&self) {
        match self.load().await {
            Ok(zones) => {
                info!("Refreshed zone list: {} zones", zones.len());
                self.replace(zones);
            }
            Err(e) => {
                warn!("Failed to refresh zone list, keeping previous one: {}", e);
            }
        }
    }

    fn replace(&self, zones: Vec<String>) {
        *self.zones.lock() = Arc::new(zones);
    }

    pub fn snapshot(&self) -> Arc<Vec<String>> {
        Arc::clone(&self.zones.lock())
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot().is_empty()
    }

    /// The zone `qname` belongs to, if it is one of ours.
    pub fn matches(&self, qname: &str) -> Option<String> {
        let zones = self.snapshot();
        let zone = zone_matches(&zones, qname);
        debug!("Zone match for {}: {:?}", qname, zone);
        zone
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn zones(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn test_longest_suffix_wins() {
        let list = zones(&["example.com.", "sub.example.com.", "com."]);
        assert_eq!(
            zone_matches(&list, "host.sub.example.com."),
            Some("sub.example.com.".to_string())
        );
        assert_eq!(
            zone_matches(&list, "www.example.com"),
            Some("example.com.".to_string())
        );
        assert_eq!(zone_matches(&list, "other.org."), None);
    }

    #[test]
    fn test_match_is_label_aligned() {
        let list = zones(&["example.com."]);
        assert_eq!(zone_matches(&list, "badexample.com."), None);
        assert_eq!(
            zone_matches(&list, "EXAMPLE.COM."),
            Some("example.com.".to_string())
        );
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_previous_list() {
        let store = MemoryStore::new(300);
        store.insert_json("example.com.", "@", "{}").unwrap();
        let cache = ZoneNameCache::new(Arc::new(store.clone()));
        cache.start().await.unwrap();
        assert_eq!(cache.len(), 1);

        store.set_fail_listing(true);
        cache.refresh().await;
        assert_eq!(*cache.snapshot(), vec!["example.com.".to_string()]);

        store.set_fail_listing(false);
        store.insert_json("example.org.", "@", "{}").unwrap();
        cache.refresh().await;
        assert_eq!(cache.len(), 2);
    }

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_task_follows_store() {
        let interval = Duration::from_secs(60);
        let store = MemoryStore::new(300);
        store.insert_json("example.com.", "@", "{}").unwrap();
        let cache = Arc::new(ZoneNameCache::new(Arc::new(store.clone())));
        cache.start().await.unwrap();

        let handle = cache.spawn_refresh(interval);
        settle().await;

        store.insert_json("example.org.", "@", "{}").unwrap();
        assert_eq!(cache.len(), 1);
        tokio::time::advance(interval).await;
        settle().await;
        assert_eq!(
            *cache.snapshot(),
            zones(&["example.com.", "example.org."])
        );

        store.set_fail_listing(true);
        store.insert_json("example.net.", "@", "{}").unwrap();
        tokio::time::advance(interval).await;
        settle().await;
        assert_eq!(cache.len(), 2);

        store.set_fail_listing(false);
        tokio::time::advance(interval).await;
        settle().await;
        assert_eq!(cache.len(), 3);

        handle.abort();
    }

    #[tokio::test]
    async fn test_start_fails_without_store() {
        let store = MemoryStore::new(300);
        store.set_available(false);
        let cache = ZoneNameCache::new(Arc::new(store));
        assert!(matches!(cache.start().await, Err(CacheError::InitialLoad(_))));
        assert!(cache.is_empty());
    }
}
