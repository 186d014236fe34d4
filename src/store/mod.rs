//! Record stores: where zones and their record sets live.
//!
//! A [`RecordStore`] is shared by the whole server; every query opens its
//! own [`StoreSession`] and drops it when the query is done.

pub mod memory_backend;
pub mod redis_backend;

use std::collections::BTreeSet;

use async_trait::async_trait;
use tracing::{debug, trace};

use crate::dns::common::is_subdomain;
use crate::dns::enums::DNSResourceType;
use crate::dns::resource::DNSResource;
use crate::error::StoreError;
use crate::zone::{APEX, RecordSet, Zone};
use crate::zone_cache::zone_matches;

pub use memory_backend::MemoryStore;
pub use redis_backend::{RedisConfig, RedisStore};

#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Checks that the backend is reachable.
    async fn ping(&self) -> Result<(), StoreError>;

    /// Names of every zone the store holds, fully qualified.
    async fn load_all_zone_names(&self) -> Result<Vec<String>, StoreError>;

    /// Opens a session for a single query.
    async fn session(&self) -> Result<Box<dyn StoreSession>, StoreError>;
}

#[async_trait]
pub trait StoreSession: Send {
    /// Loads zone metadata. `None` when the store has no data for `name`.
    async fn load_zone(&mut self, name: &str) -> Result<Option<Zone>, StoreError>;

    /// Loads the records at `location`. A location without data yields an
    /// empty set.
    async fn load_record_set(&mut self, location: &str, zone: &Zone)
    -> Result<RecordSet, StoreError>;

    /// A/AAAA records for `host` when it lies in one of `zone_names`.
    async fn glue(
        &mut self,
        host: &str,
        zone_names: &[String],
    ) -> Result<Vec<DNSResource>, StoreError> {
        let Some(zone_name) = zone_matches(zone_names, host) else {
            trace!("No served zone for glue host {}", host);
            return Ok(Vec::new());
        };
        let Some(zone) = self.load_zone(&zone_name).await? else {
            return Ok(Vec::new());
        };
        let Some(location) = zone.find_location(host) else {
            debug!("Glue host {} not found in zone {}", host, zone.name);
            return Ok(Vec::new());
        };

        let set = self.load_record_set(&location, &zone).await?;
        let mut glue = set.records(DNSResourceType::A, host, zone.default_ttl);
        glue.extend(set.records(DNSResourceType::AAAA, host, zone.default_ttl));
        Ok(glue)
    }

    /// Every record of `zone` in transfer order: the SOA, the apex and
    /// then all other locations sorted, glue for name servers delegated to
    /// child zones served here, and the SOA again.
    async fn load_axfr_records(
        &mut self,
        zone: &Zone,
        zone_names: &[String],
    ) -> Result<Vec<DNSResource>, StoreError> {
        let soa = zone.soa_record();
        let mut records = vec![soa.clone()];

        let locations = std::iter::once(APEX)
            .filter(|apex| zone.has_location(apex))
            .chain(
                zone.locations
                    .iter()
                    .map(String::as_str)
                    .filter(|location| *location != APEX),
            );

        let mut ns_hosts = BTreeSet::new();
        for location in locations {
            let mut set = self.load_record_set(location, zone).await?;
            set.make_fqdn(&zone.name);
            ns_hosts.extend(set.ns.iter().map(|ns| ns.host.clone()));
            records.extend(set.all_records(&zone.owner_name(location), zone.default_ttl));
        }

        for host in ns_hosts {
            if !is_subdomain(&host, &zone.name) {
                continue;
            }
            match zone_matches(zone_names, &host) {
                Some(owner) if owner != zone.name => {
                    records.extend(self.glue(&host, zone_names).await?);
                }
                _ => {}
            }
        }

        records.push(soa);
        debug!("Zone {} has {} records to transfer", zone.name, records.len());
        Ok(records)
    }
}

