//! Outgoing full zone transfers (AXFR, RFC 5936).
//!
//! The record sequence is split into envelopes that each fit a byte budget,
//! produced on a background task and written to the requester one message
//! per envelope.

use std::net::IpAddr;

use ipnetwork::IpNetwork;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::dns::DNSPacket;
use crate::dns::enums::ResponseCode;
use crate::dns::resource::DNSResource;
use crate::error::{ConfigError, Result};
use crate::plugin::{PluginSettings, ResponseWriter, Transport};
use crate::store::StoreSession;
use crate::zone::Zone;

/// One message worth of transfer records.
pub type Envelope = Vec<DNSResource>;

#[derive(Debug, Clone, PartialEq, Eq)]
enum AclEntry {
    Any,
    Network(IpNetwork),
}

impl AclEntry {
    /// `*`, a bare address or a CIDR network.
    fn parse(raw: &str) -> std::result::Result<Self, ConfigError> {
        if raw == "*" {
            return Ok(AclEntry::Any);
        }
        raw.parse::<IpNetwork>()
            .map(AclEntry::Network)
            .map_err(|_| ConfigError::InvalidAclEntry(raw.to_string()))
    }

    fn contains(&self, ip: IpAddr) -> bool {
        match self {
            AclEntry::Any => true,
            AclEntry::Network(network) => network.contains(ip),
        }
    }
}

/// Clients allowed to transfer zones. An empty list allows everyone.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransferAcl {
    entries: Vec<AclEntry>,
}

impl TransferAcl {
    pub fn allow_all() -> Self {
        Self::default()
    }

    /// Parses a comma separated list of addresses, CIDR networks or `*`.
    pub fn parse(raw: &str) -> std::result::Result<Self, ConfigError> {
        let entries = raw
            .split(',')
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .map(AclEntry::parse)
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(Self { entries })
    }

    pub fn permits(&self, ip: IpAddr) -> bool {
        self.entries.is_empty() || self.entries.iter().any(|entry| entry.contains(ip))
    }
}

/// Single-pass envelope partitioner. A record that does not fit the
/// current envelope closes it and starts the next one.
struct EnvelopeBuilder {
    max_len: usize,
    current: Envelope,
    current_len: usize,
}

impl EnvelopeBuilder {
    fn new(max_len: usize) -> Self {
        Self {
            max_len,
            current: Vec::new(),
            current_len: 0,
        }
    }

    /// Adds `record`, returning the envelope it closed, if any.
    fn push(&mut self, record: DNSResource) -> Option<Envelope> {
        let len = record.wire_len();
        let closed = if !self.current.is_empty() && self.current_len + len > self.max_len {
            self.current_len = 0;
            Some(std::mem::take(&mut self.current))
        } else {
            None
        };
        self.current_len += len;
        self.current.push(record);
        closed
    }

    fn finish(self) -> Option<Envelope> {
        (!self.current.is_empty()).then_some(self.current)
    }
}

/// Splits `records` into envelopes of at most `max_len` wire octets,
/// keeping order and never splitting a record. A record that is larger
/// than `max_len` on its own travels alone.
pub fn chunk_envelopes(records: Vec<DNSResource>, max_len: usize) -> Vec<Envelope> {
    let mut builder = EnvelopeBuilder::new(max_len);
    let mut envelopes: Vec<Envelope> = records
        .into_iter()
        .filter_map(|record| builder.push(record))
        .collect();
    envelopes.extend(builder.finish());
    envelopes
}

/// Partitions `records` on a background task, handing over each envelope
/// as soon as it is closed. The channel holds a single envelope, so the
/// producer waits for the writer. It closes after the last envelope.
pub fn stream_envelopes(records: Vec<DNSResource>, max_len: usize) -> mpsc::Receiver<Envelope> {
    let (tx, rx) = mpsc::channel(1);
    tokio::spawn(async move {
        let mut builder = EnvelopeBuilder::new(max_len);
        for record in records {
            if let Some(envelope) = builder.push(record) {
                if tx.send(envelope).await.is_err() {
                    debug!("Transfer receiver went away, stopping");
                    return;
                }
            }
        }
        if let Some(envelope) = builder.finish() {
            if tx.send(envelope).await.is_err() {
                debug!("Transfer receiver went away before the last envelope");
            }
        }
    });
    rx
}

/// Writes every envelope from `rx` as its own message. Write failures are
/// logged; the transfer carries on with the next envelope. Returns how
/// many messages were written.
pub async fn transfer_out(
    w: &mut dyn ResponseWriter,
    query: &DNSPacket,
    mut rx: mpsc::Receiver<Envelope>,
) -> usize {
    let mut written = 0;
    while let Some(envelope) = rx.recv().await {
        let mut message = DNSPacket::reply(query);
        message.header.aa = true;
        message.header.ra = false;
        message.answers = envelope;

        match w.write_msg(&message).await {
            Ok(()) => written += 1,
            Err(e) => error!("Failed to send zone transfer message to {}: {}", w.remote_addr(), e),
        }
    }
    written
}

/// Serves an AXFR for `zone`, which the dispatcher has already matched and
/// loaded.
pub async fn serve_transfer(
    w: &mut dyn ResponseWriter,
    query: &DNSPacket,
    zone: &Zone,
    session: &mut dyn StoreSession,
    zone_names: &[String],
    settings: &PluginSettings,
) -> Result<ResponseCode> {
    let client = w.remote_addr();

    if !settings.transfers_enabled {
        info!("Zone transfers are disabled, refusing {} for {}", zone.name, client);
        return reply_with(w, query, ResponseCode::Refused).await;
    }
    if w.transport() == Transport::Udp {
        warn!("Zone transfer of {} over UDP refused for {}", zone.name, client);
        return reply_with(w, query, ResponseCode::Refused).await;
    }
    if !settings.transfer_acl.permits(client.ip()) {
        warn!("Zone transfer of {} denied for client {}", zone.name, client);
        return reply_with(w, query, ResponseCode::Refused).await;
    }
    let qname = query.question().map(|q| q.name()).unwrap_or_default();
    if qname != zone.name {
        info!("AXFR request for {} which is not a zone apex", qname);
        return reply_with(w, query, ResponseCode::NotAuth).await;
    }

    let records = match session.load_axfr_records(zone, zone_names).await {
        Ok(records) => records,
        Err(e) => {
            error!("Failed to load records for transfer of {}: {}", zone.name, e);
            return reply_with(w, query, ResponseCode::ServerFailure).await;
        }
    };

    info!(
        "Starting AXFR of {} for {}: {} records",
        zone.name,
        client,
        records.len()
    );
    let rx = stream_envelopes(records, settings.max_transfer_length);
    let sent = transfer_out(w, query, rx).await;
    debug!("AXFR of {} sent in {} messages", zone.name, sent);

    w.hijack();
    Ok(ResponseCode::NoError)
}

async fn reply_with(
    w: &mut dyn ResponseWriter,
    query: &DNSPacket,
    rcode: ResponseCode,
) -> Result<ResponseCode> {
    w.write_msg(&DNSPacket::error_reply(query, rcode)).await?;
    Ok(rcode)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dns::resource::DNSResourceData;
    use std::net::Ipv4Addr;

    fn a_record(i: u8) -> DNSResource {
        DNSResource::new(
            &format!("host{}.example.com.", i),
            300,
            DNSResourceData::A(Ipv4Addr::new(192, 0, 2, i)),
        )
    }

    #[test]
    fn test_chunk_respects_budget_and_order() {
        let records: Vec<_> = (0..8).map(a_record).collect();
        let len = records[0].wire_len();
        let envelopes = chunk_envelopes(records.clone(), len * 3);

        assert_eq!(envelopes.len(), 3);
        assert_eq!(envelopes[2].len(), 2);
        for envelope in &envelopes {
            assert!(!envelope.is_empty());
            let size: usize = envelope.iter().map(DNSResource::wire_len).sum();
            assert!(size <= len * 3);
        }
        let flattened: Vec<_> = envelopes.into_iter().flatten().collect();
        assert_eq!(flattened, records);
    }

    #[test]
    fn test_oversized_record_travels_alone() {
        let big = DNSResource::new(
            "big.example.com.",
            300,
            DNSResourceData::TXT(vec!["x".repeat(400)]),
        );
        let records = vec![a_record(1), big.clone(), a_record(2)];
        let envelopes = chunk_envelopes(records, 100);

        assert_eq!(envelopes.len(), 3);
        assert_eq!(envelopes[1], vec![big]);
    }

    #[test]
    fn test_chunking_is_idempotent() {
        let records: Vec<_> = (0..10).map(a_record).collect();
        let once = chunk_envelopes(records, 90);
        let twice = chunk_envelopes(once.clone().into_iter().flatten().collect(), 90);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_empty_input() {
        assert!(chunk_envelopes(Vec::new(), 1000).is_empty());
    }

    #[tokio::test]
    async fn test_stream_closes_after_last_envelope() {
        let records: Vec<_> = (0..5).map(a_record).collect();
        let mut rx = stream_envelopes(records, 1000);
        let first = rx.recv().await.unwrap();
        assert_eq!(first.len(), 5);
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_stream_stays_one_envelope_ahead() {
        let records: Vec<_> = (0..50).map(a_record).collect();
        // every record overflows the budget, so each travels alone
        let mut rx = stream_envelopes(records.clone(), 1);

        let first = rx.recv().await.unwrap();
        assert_eq!(first, vec![records[0].clone()]);
        tokio::task::yield_now().await;
        assert!(rx.len() <= 1);

        let mut received = 1;
        while let Some(envelope) = rx.recv().await {
            assert_eq!(envelope, vec![records[received].clone()]);
            received += 1;
            assert!(rx.len() <= 1);
        }
        assert_eq!(received, 50);
    }

    #[test]
    fn test_acl() {
        let acl = TransferAcl::parse("192.0.2.0/24, 2001:db8::1").unwrap();
        assert!(acl.permits("192.0.2.77".parse().unwrap()));
        assert!(!acl.permits("198.51.100.1".parse().unwrap()));
        assert!(acl.permits("2001:db8::1".parse().unwrap()));
        assert!(!acl.permits("2001:db8::2".parse().unwrap()));

        assert!(TransferAcl::parse("").unwrap().permits("203.0.113.9".parse().unwrap()));
        assert!(TransferAcl::parse("*").unwrap().permits("::1".parse().unwrap()));
        assert!(TransferAcl::parse("10.0.0.0/33").is_err());
        assert!(TransferAcl::parse("not-an-ip").is_err());
    }

    #[test]
    fn test_prefix_on_bit_boundary() {
        let acl = TransferAcl::parse("10.1.128.0/17").unwrap();
        assert!(acl.permits("10.1.200.3".parse().unwrap()));
        assert!(!acl.permits("10.1.127.255".parse().unwrap()));
    }
}
