//! Common test utilities for redzone tests

#![allow(dead_code)] // These functions are used by various test files

use async_trait::async_trait;
use redzone::{
    dns::{
        DNSPacket,
        enums::{DNSResourceType, ResponseCode},
        header::DNSHeader,
        question::DNSQuestion,
        resource::{DNSResource, DNSResourceData},
    },
    error::{DnsError, Result},
    plugin::{Handler, PluginSettings, RedisPlugin, ResponseWriter, Transport},
    store::MemoryStore,
    zone_cache::ZoneNameCache,
};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;

/// Create a basic test DNS query packet
pub fn create_test_query(domain: &str, qtype: DNSResourceType) -> DNSPacket {
    create_test_query_with_id(1234, domain, qtype)
}

/// Create a test DNS query packet with specific ID
pub fn create_test_query_with_id(id: u16, domain: &str, qtype: DNSResourceType) -> DNSPacket {
    DNSPacket {
        header: DNSHeader {
            id,
            rd: true,
            qdcount: 1,
            ..Default::default()
        },
        questions: vec![DNSQuestion::new(domain, qtype)],
        ..Default::default()
    }
}

/// Response writer that keeps every message written to it
pub struct RecordingWriter {
    pub peer: SocketAddr,
    pub transport: Transport,
    pub messages: Vec<DNSPacket>,
    pub hijacked: bool,
    /// Writes attempted, failed ones included
    pub attempts: usize,
    /// When set, every write after this many fails
    pub fail_after: Option<usize>,
}

impl RecordingWriter {
    pub fn udp() -> Self {
        Self::new(Transport::Udp, IpAddr::V4(Ipv4Addr::LOCALHOST))
    }

    pub fn tcp() -> Self {
        Self::new(Transport::Tcp, IpAddr::V4(Ipv4Addr::LOCALHOST))
    }

    pub fn new(transport: Transport, ip: IpAddr) -> Self {
        Self {
            peer: SocketAddr::new(ip, 53000),
            transport,
            messages: Vec::new(),
            hijacked: false,
            attempts: 0,
            fail_after: None,
        }
    }

    pub fn failing_after(mut self, writes: usize) -> Self {
        self.fail_after = Some(writes);
        self
    }

    /// The single response written
    pub fn response(&self) -> &DNSPacket {
        assert_eq!(self.messages.len(), 1, "expected exactly one response");
        &self.messages[0]
    }
}

#[async_trait]
impl ResponseWriter for RecordingWriter {
    fn remote_addr(&self) -> SocketAddr {
        self.peer
    }

    fn transport(&self) -> Transport {
        self.transport
    }

    async fn write_msg(&mut self, msg: &DNSPacket) -> Result<()> {
        self.attempts += 1;
        if self.fail_after.is_some_and(|limit| self.attempts > limit) {
            return Err(DnsError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "peer went away",
            )));
        }
        // Round trip through the wire format so tests see what a client sees
        let bytes = msg.serialize()?;
        self.messages.push(DNSPacket::parse(&bytes)?);
        Ok(())
    }

    fn hijack(&mut self) {
        self.hijacked = true;
    }
}

/// Next handler in the chain; answers every query with a fixed TXT record
pub struct FallbackHandler;

pub const FALLBACK_TEXT: &str = "answered by fallback";

#[async_trait]
impl Handler for FallbackHandler {
    fn name(&self) -> &'static str {
        "fallback"
    }

    async fn serve_dns(
        &self,
        w: &mut dyn ResponseWriter,
        req: &DNSPacket,
    ) -> Result<ResponseCode> {
        let mut response = DNSPacket::reply(req);
        let name = req.question().map(|q| q.name()).unwrap_or_default();
        response.answers.push(DNSResource::new(
            &name,
            60,
            DNSResourceData::TXT(vec![FALLBACK_TEXT.to_string()]),
        ));
        w.write_msg(&response).await?;
        Ok(ResponseCode::NoError)
    }
}

/// A store holding example.com., its child zone sub.example.com. and a
/// zone that is listed but has no data.
pub fn example_store() -> MemoryStore {
    let store = MemoryStore::new(300);

    let records: &[(&str, &str, &str)] = &[
        (
            "example.com.",
            "@",
            r#"{
                "soa": {"ttl": 3600, "ns": "ns1", "mbox": "hostmaster", "serial": 2024010101,
                        "refresh": 86400, "retry": 7200, "expire": 3600000, "minttl": 300},
                "a": [{"ttl": 300, "ip": "192.0.2.1"}],
                "ns": [{"host": "ns1"}, {"host": "ns2.example.net."}],
                "mx": [{"host": "mail", "preference": 10}],
                "txt": [{"text": "v=spf1 mx -all"}],
                "caa": [{"flag": 0, "tag": "issue", "value": "letsencrypt.org"}]
            }"#,
        ),
        (
            "example.com.",
            "www",
            r#"{"a": [{"ip": "192.0.2.10"}], "aaaa": [{"ip": "2001:db8::10"}]}"#,
        ),
        ("example.com.", "ns1", r#"{"a": [{"ip": "192.0.2.53"}]}"#),
        ("example.com.", "mail", r#"{"a": [{"ip": "192.0.2.25"}]}"#),
        ("example.com.", "alias", r#"{"cname": {"host": "www"}}"#),
        ("example.com.", "*.dev", r#"{"a": [{"ip": "192.0.2.100"}]}"#),
        (
            "example.com.",
            "_sip._tcp",
            r#"{"srv": [{"priority": 10, "weight": 5, "port": 5060, "target": "sip"}]}"#,
        ),
        ("example.com.", "sip", r#"{"a": [{"ip": "192.0.2.60"}]}"#),
        ("example.com.", "sub", r#"{"ns": [{"host": "ns.sub"}]}"#),
        ("sub.example.com.", "@", r#"{"ns": [{"host": "ns"}]}"#),
        (
            "sub.example.com.",
            "ns",
            r#"{"a": [{"ip": "192.0.2.153"}], "aaaa": [{"ip": "2001:db8::153"}]}"#,
        ),
    ];
    for (zone, location, json) in records {
        store.insert_json(zone, location, json).unwrap();
    }

    store.list_without_data("broken.example.");
    store
}

/// A plugin over `store` with its zone list already loaded
pub async fn create_test_plugin(store: MemoryStore, settings: PluginSettings) -> RedisPlugin {
    let store = Arc::new(store);
    let zones = Arc::new(ZoneNameCache::new(store.clone()));
    zones.start().await.unwrap();
    RedisPlugin::new(store, zones, settings)
}

/// Run one query through `handler` with a fresh writer
pub async fn query(
    handler: &dyn Handler,
    mut writer: RecordingWriter,
    domain: &str,
    qtype: DNSResourceType,
) -> (Result<ResponseCode>, RecordingWriter) {
    let request = create_test_query(domain, qtype);
    let result = handler.serve_dns(&mut writer, &request).await;
    (result, writer)
}

pub fn rcode_of(packet: &DNSPacket) -> ResponseCode {
    packet.rcode().expect("known response code")
}
