use std::collections::BTreeSet;

use chrono::Utc;

use super::record::SoaRecord;
use crate::dns::common::{fqdn, is_subdomain};
use crate::dns::resource::{DNSResource, DNSResourceData};

/// Location of the zone apex.
pub const APEX: &str = "@";

/// A zone loaded from the record store for the duration of one query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Zone {
    /// Fully qualified, lower-case zone name.
    pub name: String,
    pub default_ttl: u32,
    pub soa: SoaRecord,
    /// Owner names relative to the zone, `@` for the apex.
    pub locations: BTreeSet<String>,
}

impl Zone {
    pub fn new(name: &str, default_ttl: u32, soa: Option<SoaRecord>, locations: BTreeSet<String>) -> Self {
        let name = fqdn(name);
        let soa = soa.unwrap_or_else(|| default_soa(&name, default_ttl));
        Self {
            name,
            default_ttl,
            soa,
            locations,
        }
    }

    pub fn has_location(&self, location: &str) -> bool {
        self.locations.contains(location)
    }

    /// Reduces `qname` to the location holding its records.
    ///
    /// Exact matches win. Otherwise the closest encloser is searched label
    /// by label towards the apex; once it exists, the answer is the
    /// wildcard directly below it (`*.<encloser>`), or nothing when there
    /// is no such wildcard.
    pub fn find_location(&self, qname: &str) -> Option<String> {
        let qname = fqdn(qname);
        if qname == self.name {
            return Some(APEX.to_string());
        }
        if !is_subdomain(&qname, &self.name) {
            return None;
        }

        let relative = if self.name == "." {
            qname.trim_end_matches('.').to_string()
        } else {
            qname[..qname.len() - self.name.len() - 1].to_string()
        };
        if self.has_location(&relative) {
            return Some(relative);
        }

        let mut current = relative.as_str();
        loop {
            let encloser = match current.split_once('.') {
                Some((_, rest)) => rest,
                None => APEX,
            };
            let wildcard = if encloser == APEX {
                "*".to_string()
            } else {
                format!("*.{}", encloser)
            };

            if self.encloser_exists(encloser) {
                return self.has_location(&wildcard).then_some(wildcard);
            }
            if encloser == APEX {
                return None;
            }
            current = encloser;
        }
    }

    /// A name exists when it holds records or has descendants that do.
    fn encloser_exists(&self, location: &str) -> bool {
        if location == APEX {
            return true;
        }
        let suffix = format!(".{}", location);
        self.locations
            .iter()
            .any(|l| l == location || l.ends_with(&suffix))
    }

    /// The absolute owner name of `location`.
    pub fn owner_name(&self, location: &str) -> String {
        if location == APEX {
            self.name.clone()
        } else {
            format!("{}.{}", location, self.name)
        }
    }

    pub fn soa_record(&self) -> DNSResource {
        let ttl = if self.soa.ttl == 0 {
            self.default_ttl
        } else {
            self.soa.ttl
        };
        DNSResource::new(
            &self.name,
            ttl,
            DNSResourceData::SOA {
                mname: self.soa.ns.clone(),
                rname: self.soa.mbox.clone(),
                serial: self.soa.serial,
                refresh: self.soa.refresh,
                retry: self.soa.retry,
                expire: self.soa.expire,
                minimum: self.soa.minttl,
            },
        )
    }
}

/// SOA used for zones whose apex carries none.
pub fn default_soa(zone: &str, default_ttl: u32) -> SoaRecord {
    SoaRecord {
        ttl: default_ttl,
        ns: format!("ns1.{}", zone),
        mbox: format!("hostmaster.{}", zone),
        serial: Utc::now().timestamp() as u32,
        refresh: 86400,
        retry: 7200,
        expire: 3600000,
        minttl: default_ttl,
    }
}
