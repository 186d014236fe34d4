//! Record sets as they are stored per location, and their conversion to
//! wire records.

use std::net::{Ipv4Addr, Ipv6Addr};

use serde::{Deserialize, Serialize};

use crate::dns::common::fqdn;
use crate::dns::enums::DNSResourceType;
use crate::dns::resource::{DNSResource, DNSResourceData};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SoaRecord {
    #[serde(default)]
    pub ttl: u32,
    pub ns: String,
    pub mbox: String,
    #[serde(default)]
    pub serial: u32,
    #[serde(default)]
    pub refresh: u32,
    #[serde(default)]
    pub retry: u32,
    #[serde(default)]
    pub expire: u32,
    #[serde(default)]
    pub minttl: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ARecord {
    #[serde(default)]
    pub ttl: u32,
    pub ip: Ipv4Addr,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AaaaRecord {
    #[serde(default)]
    pub ttl: u32,
    pub ip: Ipv6Addr,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CnameRecord {
    #[serde(default)]
    pub ttl: u32,
    pub host: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxtRecord {
    #[serde(default)]
    pub ttl: u32,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NsRecord {
    #[serde(default)]
    pub ttl: u32,
    pub host: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MxRecord {
    #[serde(default)]
    pub ttl: u32,
    pub host: String,
    pub preference: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SrvRecord {
    #[serde(default)]
    pub ttl: u32,
    pub priority: u16,
    pub weight: u16,
    pub port: u16,
    pub target: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PtrRecord {
    #[serde(default)]
    pub ttl: u32,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaaRecord {
    #[serde(default)]
    pub ttl: u32,
    #[serde(default)]
    pub flag: u8,
    pub tag: String,
    pub value: String,
}

/// All records stored at one location of a zone.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordSet {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub soa: Option<SoaRecord>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub a: Vec<ARecord>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aaaa: Vec<AaaaRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cname: Option<CnameRecord>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub txt: Vec<TxtRecord>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ns: Vec<NsRecord>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mx: Vec<MxRecord>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub srv: Vec<SrvRecord>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ptr: Vec<PtrRecord>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub caa: Vec<CaaRecord>,
}

/// Order in which a location's records are emitted during a transfer.
pub const TRANSFER_ORDER: [DNSResourceType; 9] = [
    DNSResourceType::NS,
    DNSResourceType::A,
    DNSResourceType::AAAA,
    DNSResourceType::CNAME,
    DNSResourceType::TXT,
    DNSResourceType::MX,
    DNSResourceType::SRV,
    DNSResourceType::PTR,
    DNSResourceType::CAA,
];

/// Qualifies `name` against `zone`: `@` is the apex, names ending in a dot
/// are already absolute, everything else is relative to the zone.
pub fn qualify(name: &str, zone: &str) -> String {
    let name = name.trim();
    if name.is_empty() || name == "@" {
        fqdn(zone)
    } else if name.ends_with('.') {
        fqdn(name)
    } else {
        fqdn(&format!("{}.{}", name, zone.trim_end_matches('.')))
    }
}

fn ttl_or(ttl: u32, default_ttl: u32) -> u32 {
    if ttl == 0 { default_ttl } else { ttl }
}

impl RecordSet {
    pub fn is_empty(&self) -> bool {
        *self == RecordSet::default()
    }

    /// Rewrites every relative host name in the set to a fully qualified
    /// one below `zone`.
    pub fn make_fqdn(&mut self, zone: &str) {
        if let Some(soa) = &mut self.soa {
            soa.ns = qualify(&soa.ns, zone);
            soa.mbox = qualify(&soa.mbox, zone);
        }
        if let Some(cname) = &mut self.cname {
            cname.host = qualify(&cname.host, zone);
        }
        for ns in &mut self.ns {
            ns.host = qualify(&ns.host, zone);
        }
        for mx in &mut self.mx {
            mx.host = qualify(&mx.host, zone);
        }
        for srv in &mut self.srv {
            srv.target = qualify(&srv.target, zone);
        }
        for ptr in &mut self.ptr {
            ptr.name = qualify(&ptr.name, zone);
        }
    }

    /// Wire records of one type, owned by `owner`. SOA is not handled
    /// here; it belongs to the zone, see [`super::Zone::soa_record`].
    pub fn records(&self, rtype: DNSResourceType, owner: &str, default_ttl: u32) -> Vec<DNSResource> {
        let rr = |ttl: u32, rdata: DNSResourceData| {
            DNSResource::new(owner, ttl_or(ttl, default_ttl), rdata)
        };

        match rtype {
            DNSResourceType::A => self
                .a
                .iter()
                .map(|r| rr(r.ttl, DNSResourceData::A(r.ip)))
                .collect(),
            DNSResourceType::AAAA => self
                .aaaa
                .iter()
                .map(|r| rr(r.ttl, DNSResourceData::AAAA(r.ip)))
                .collect(),
            DNSResourceType::CNAME => self
                .cname
                .iter()
                .map(|r| rr(r.ttl, DNSResourceData::CNAME(r.host.clone())))
                .collect(),
            DNSResourceType::TXT => self
                .txt
                .iter()
                .map(|r| rr(r.ttl, DNSResourceData::TXT(vec![r.text.clone()])))
                .collect(),
            DNSResourceType::NS => self
                .ns
                .iter()
                .map(|r| rr(r.ttl, DNSResourceData::NS(r.host.clone())))
                .collect(),
            DNSResourceType::MX => self
                .mx
                .iter()
                .map(|r| {
                    rr(
                        r.ttl,
                        DNSResourceData::MX {
                            preference: r.preference,
                            exchange: r.host.clone(),
                        },
                    )
                })
                .collect(),
            DNSResourceType::SRV => self
                .srv
                .iter()
                .map(|r| {
                    rr(
                        r.ttl,
                        DNSResourceData::SRV {
                            priority: r.priority,
                            weight: r.weight,
                            port: r.port,
                            target: r.target.clone(),
                        },
                    )
                })
                .collect(),
            DNSResourceType::PTR => self
                .ptr
                .iter()
                .map(|r| rr(r.ttl, DNSResourceData::PTR(r.name.clone())))
                .collect(),
            DNSResourceType::CAA => self
                .caa
                .iter()
                .map(|r| {
                    rr(
                        r.ttl,
                        DNSResourceData::CAA {
                            flags: r.flag,
                            tag: r.tag.clone(),
                            value: r.value.as_bytes().to_vec(),
                        },
                    )
                })
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Every non-SOA record of the set in [`TRANSFER_ORDER`].
    pub fn all_records(&self, owner: &str, default_ttl: u32) -> Vec<DNSResource> {
        TRANSFER_ORDER
            .iter()
            .flat_map(|rtype| self.records(*rtype, owner, default_ttl))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_qualify() {
        assert_eq!(qualify("@", "example.com."), "example.com.");
        assert_eq!(qualify("ns1", "example.com."), "ns1.example.com.");
        assert_eq!(qualify("ns1.other.net.", "example.com."), "ns1.other.net.");
        assert_eq!(qualify("Mail.Example.com.", "example.com."), "mail.example.com.");
    }

    #[test]
    fn test_make_fqdn_qualifies_targets() {
        let mut set: RecordSet = serde_json::from_str(
            r#"{
                "ns": [{"host": "ns1"}, {"host": "ns.other.net."}],
                "mx": [{"host": "mail", "preference": 10}],
                "srv": [{"priority": 1, "weight": 1, "port": 443, "target": "web"}],
                "cname": {"host": "@"}
            }"#,
        )
        .unwrap();
        set.make_fqdn("example.com.");

        assert_eq!(set.ns[0].host, "ns1.example.com.");
        assert_eq!(set.ns[1].host, "ns.other.net.");
        assert_eq!(set.mx[0].host, "mail.example.com.");
        assert_eq!(set.srv[0].target, "web.example.com.");
        assert_eq!(set.cname.unwrap().host, "example.com.");
    }

    #[test]
    fn test_zero_ttl_uses_default() {
        let set: RecordSet = serde_json::from_str(
            r#"{"a": [{"ip": "192.0.2.1"}, {"ttl": 60, "ip": "192.0.2.2"}]}"#,
        )
        .unwrap();
        let records = set.records(DNSResourceType::A, "www.example.com.", 3600);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].ttl, 3600);
        assert_eq!(records[1].ttl, 60);
        assert_eq!(records[0].name, "www.example.com.");
    }

    #[test]
    fn test_all_records_order() {
        let set: RecordSet = serde_json::from_str(
            r#"{
                "txt": [{"text": "v=spf1 -all"}],
                "a": [{"ip": "192.0.2.1"}],
                "ns": [{"host": "ns1.example.com."}]
            }"#,
        )
        .unwrap();
        let types: Vec<_> = set
            .all_records("example.com.", 300)
            .iter()
            .map(|r| r.rtype)
            .collect();
        assert_eq!(
            types,
            vec![DNSResourceType::NS, DNSResourceType::A, DNSResourceType::TXT]
        );
    }

    #[test]
    fn test_empty_set() {
        assert!(RecordSet::default().is_empty());
        let set: RecordSet = serde_json::from_str(r#"{"a": []}"#).unwrap();
        assert!(set.is_empty());
    }
}
