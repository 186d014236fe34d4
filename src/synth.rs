//! Builds the answer and additional sections for a located query.

use tracing::debug;

use crate::dns::enums::DNSResourceType;
use crate::dns::resource::DNSResource;
use crate::store::StoreSession;
use crate::zone::{RecordSet, Zone};

/// Query types answered from a record set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryKind {
    Soa,
    A,
    Aaaa,
    Cname,
    Txt,
    Ns,
    Mx,
    Srv,
    Ptr,
    Caa,
}

impl QueryKind {
    pub fn from_type(qtype: DNSResourceType) -> Option<Self> {
        match qtype {
            DNSResourceType::SOA => Some(QueryKind::Soa),
            DNSResourceType::A => Some(QueryKind::A),
            DNSResourceType::AAAA => Some(QueryKind::Aaaa),
            DNSResourceType::CNAME => Some(QueryKind::Cname),
            DNSResourceType::TXT => Some(QueryKind::Txt),
            DNSResourceType::NS => Some(QueryKind::Ns),
            DNSResourceType::MX => Some(QueryKind::Mx),
            DNSResourceType::SRV => Some(QueryKind::Srv),
            DNSResourceType::PTR => Some(QueryKind::Ptr),
            DNSResourceType::CAA => Some(QueryKind::Caa),
            _ => None,
        }
    }

    pub fn rtype(self) -> DNSResourceType {
        match self {
            QueryKind::Soa => DNSResourceType::SOA,
            QueryKind::A => DNSResourceType::A,
            QueryKind::Aaaa => DNSResourceType::AAAA,
            QueryKind::Cname => DNSResourceType::CNAME,
            QueryKind::Txt => DNSResourceType::TXT,
            QueryKind::Ns => DNSResourceType::NS,
            QueryKind::Mx => DNSResourceType::MX,
            QueryKind::Srv => DNSResourceType::SRV,
            QueryKind::Ptr => DNSResourceType::PTR,
            QueryKind::Caa => DNSResourceType::CAA,
        }
    }

    /// Kinds whose targets get address records in the additional section.
    fn wants_glue(self) -> bool {
        matches!(
            self,
            QueryKind::Ns | QueryKind::Mx | QueryKind::Srv | QueryKind::Ptr
        )
    }
}

/// Returns `(answers, extras)` for `kind` at `qname`.
///
/// `set` must already be fully qualified against `zone`.
pub async fn synthesize(
    kind: QueryKind,
    qname: &str,
    zone: &Zone,
    set: &RecordSet,
    zone_names: &[String],
    session: &mut dyn StoreSession,
) -> (Vec<DNSResource>, Vec<DNSResource>) {
    if kind == QueryKind::Soa {
        return (vec![zone.soa_record()], Vec::new());
    }

    let answers = set.records(kind.rtype(), qname, zone.default_ttl);
    if !kind.wants_glue() {
        return (answers, Vec::new());
    }

    let mut extras = Vec::new();
    for host in answers.iter().filter_map(DNSResource::target_host) {
        match session.glue(host, zone_names).await {
            Ok(glue) => extras.extend(glue),
            Err(e) => debug!("Skipping glue for {}: {}", host, e),
        }
    }

    (answers, extras)
}
