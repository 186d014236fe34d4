pub mod common;
pub mod edns;
pub mod enums;
pub mod header;
pub mod question;
pub mod resource;

use common::{PacketComponent, WireReader, WireWriter};
use edns::EdnsOpt;
use enums::{DNSResourceType, ResponseCode};
use header::DNSHeader;
use question::DNSQuestion;
use resource::{DNSResource, DNSResourceData};
use thiserror::Error;
use tracing::{debug, trace};

/// Largest message that fits a TCP length prefix.
pub const MAX_TCP_MESSAGE_SIZE: usize = u16::MAX as usize;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DNSPacket {
    pub header: DNSHeader,
    pub questions: Vec<DNSQuestion>,
    pub answers: Vec<DNSResource>,
    pub authorities: Vec<DNSResource>,
    pub resources: Vec<DNSResource>,
    /// EDNS0 OPT record if present (extracted from additional records)
    pub edns: Option<EdnsOpt>,
}

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Invalid DNS header")]
    InvalidHeader,
    #[error("Invalid DNS label")]
    InvalidLabel,
    #[error("DNS name too long")]
    NameTooLong,
    #[error("Message ends unexpectedly at offset {0}")]
    UnexpectedEnd(usize),
    #[error("Malformed RDATA for {0:?}")]
    InvalidRdata(DNSResourceType),
    #[error("RDATA exceeds 65535 octets")]
    RdataTooLong,
    #[error("Malformed EDNS OPT record")]
    InvalidEdns,
    #[error("Invalid bit stream: {0}")]
    InvalidBitStream(String),
}

impl From<std::io::Error> for ParseError {
    fn from(e: std::io::Error) -> Self {
        ParseError::InvalidBitStream(e.to_string())
    }
}

impl DNSPacket {
    pub fn parse(buf: &[u8]) -> Result<Self, ParseError> {
        trace!("Parsing DNS packet, size: {} bytes", buf.len());
        let mut reader = WireReader::new(buf);
        let mut packet = DNSPacket {
            header: DNSHeader::read(&mut reader)?,
            ..Default::default()
        };
        trace!(
            "Parsed DNS header: id={}, qr={}, opcode={}, questions={}",
            packet.header.id, packet.header.qr, packet.header.opcode, packet.header.qdcount
        );

        for _ in 0..packet.header.qdcount {
            packet.questions.push(DNSQuestion::read(&mut reader)?);
        }
        for _ in 0..packet.header.ancount {
            packet.answers.push(DNSResource::read(&mut reader)?);
        }
        for _ in 0..packet.header.nscount {
            packet.authorities.push(DNSResource::read(&mut reader)?);
        }
        for _ in 0..packet.header.arcount {
            let resource = DNSResource::read(&mut reader)?;

            if resource.rtype == DNSResourceType::OPT && resource.name == "." {
                let rdata = match &resource.rdata {
                    DNSResourceData::Raw(bytes) => bytes.as_slice(),
                    _ => &[],
                };
                let edns = EdnsOpt::parse_from_resource(
                    resource.rclass.into(),
                    resource.ttl,
                    rdata,
                )?;
                trace!("Parsed {}", edns);
                packet.edns = Some(edns);
                continue;
            }

            packet.resources.push(resource);
        }

        Ok(packet)
    }

    /// Serializes the message. Section counts are taken from the section
    /// vectors, not from the header fields.
    pub fn serialize(&self) -> Result<Vec<u8>, ParseError> {
        let mut out = WireWriter::new(true);
        self.counted_header().write(&mut out)?;

        for question in &self.questions {
            question.write(&mut out)?;
        }
        for record in self
            .answers
            .iter()
            .chain(&self.authorities)
            .chain(&self.resources)
        {
            record.write(&mut out)?;
        }
        if let Some(edns) = &self.edns {
            write_opt(&mut out, edns);
        }

        Ok(out.into_bytes())
    }

    fn counted_header(&self) -> DNSHeader {
        let mut header = self.header.clone();
        header.qdcount = self.questions.len() as u16;
        header.ancount = self.answers.len() as u16;
        header.nscount = self.authorities.len() as u16;
        header.arcount = (self.resources.len() + usize::from(self.edns.is_some())) as u16;
        header
    }

    /// Starts a response to `query`: same id, opcode, RD bit and question.
    pub fn reply(query: &DNSPacket) -> Self {
        DNSPacket {
            header: DNSHeader {
                id: query.header.id,
                qr: true,
                opcode: query.header.opcode,
                rd: query.header.rd,
                qdcount: query.questions.len().min(1) as u16,
                ..Default::default()
            },
            questions: query.questions.iter().take(1).cloned().collect(),
            ..Default::default()
        }
    }

    /// An empty authoritative response carrying `rcode`.
    pub fn error_reply(query: &DNSPacket, rcode: ResponseCode) -> Self {
        let mut response = Self::reply(query);
        response.header.aa = true;
        response.header.ra = false;
        response.header.rcode = rcode.to_u8();
        response
    }

    pub fn rcode(&self) -> Option<ResponseCode> {
        ResponseCode::from_u8(self.header.rcode)
    }

    /// The first question, if any.
    pub fn question(&self) -> Option<&DNSQuestion> {
        self.questions.first()
    }

    /// Get the maximum UDP payload size from EDNS or use default
    pub fn max_udp_payload_size(&self) -> u16 {
        self.edns
            .as_ref()
            .map(|edns| edns.payload_size())
            .unwrap_or(edns::MIN_UDP_PAYLOAD_SIZE)
    }

    /// Mirrors the requester's EDNS0 record into this response: the OPT is
    /// only present if the query had one, it advertises our own payload
    /// size, and the DO bit is copied.
    pub fn size_and_do(&mut self, query: &DNSPacket, server_payload_size: u16) {
        self.edns = query.edns.as_ref().map(|requested| {
            let mut opt = EdnsOpt::with_payload_size(server_payload_size);
            opt.set_do_flag(requested.do_flag());
            opt
        });
    }

    /// Drops records until the compressed message fits `max_size` octets.
    ///
    /// Records are kept in section order (answers, authority, additional)
    /// and the first record that does not fit ends the message. TC is set
    /// when an answer or authority record had to go; losing additional
    /// records alone does not make a response truncated. Returns whether
    /// any record was dropped.
    pub fn scrub(&mut self, max_size: usize) -> Result<bool, ParseError> {
        let opt_len = self.edns.as_ref().map(|e| e.wire_len()).unwrap_or(0);
        let mut out = WireWriter::new(true);
        self.counted_header().write(&mut out)?;
        for question in &self.questions {
            question.write(&mut out)?;
        }

        let mut kept = [0usize; 3];
        let mut full = false;
        for (section, records) in [&self.answers, &self.authorities, &self.resources]
            .into_iter()
            .enumerate()
        {
            for record in records {
                if full {
                    break;
                }
                record.write(&mut out)?;
                if out.len() + opt_len > max_size {
                    full = true;
                    break;
                }
                kept[section] += 1;
            }
        }

        if !full {
            return Ok(false);
        }

        let dropped_required =
            kept[0] < self.answers.len() || kept[1] < self.authorities.len();
        self.answers.truncate(kept[0]);
        self.authorities.truncate(kept[1]);
        self.resources.truncate(kept[2]);
        if dropped_required {
            self.header.tc = true;
        }
        self.header.ancount = self.answers.len() as u16;
        self.header.nscount = self.authorities.len() as u16;
        self.header.arcount = self.resources.len() as u16;

        debug!(
            "Response id={} trimmed to {} octets (tc={})",
            self.header.id, max_size, self.header.tc
        );
        Ok(true)
    }
}

fn write_opt(out: &mut WireWriter, edns: &EdnsOpt) {
    let (udp_payload_size, ttl, rdata) = edns.to_resource_format();
    // NAME: root, TYPE: OPT, CLASS: UDP payload size
    out.write_u8(0);
    out.write_u16(DNSResourceType::OPT.into());
    out.write_u16(udp_payload_size);
    out.write_u32(ttl);
    out.write_u16(rdata.len() as u16);
    out.write_bytes(&rdata);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn query(name: &str, qtype: DNSResourceType) -> DNSPacket {
        DNSPacket {
            header: DNSHeader {
                id: 4242,
                rd: true,
                qdcount: 1,
                ..Default::default()
            },
            questions: vec![DNSQuestion::new(name, qtype)],
            ..Default::default()
        }
    }

    fn a_record(name: &str, last: u8) -> DNSResource {
        DNSResource::new(name, 300, DNSResourceData::A(Ipv4Addr::new(192, 0, 2, last)))
    }

    #[test]
    fn test_parse_query_with_edns() {
        let mut q = query("www.example.com.", DNSResourceType::AAAA);
        q.edns = Some(EdnsOpt::with_payload_size(1232));
        let bytes = q.serialize().unwrap();

        let parsed = DNSPacket::parse(&bytes).unwrap();
        assert_eq!(parsed.header.id, 4242);
        assert_eq!(parsed.questions[0].name(), "www.example.com.");
        assert_eq!(parsed.questions[0].qtype, DNSResourceType::AAAA);
        assert_eq!(parsed.max_udp_payload_size(), 1232);
        assert!(parsed.resources.is_empty());
    }

    #[test]
    fn test_reply_copies_identity() {
        let q = query("example.com.", DNSResourceType::A);
        let r = DNSPacket::error_reply(&q, ResponseCode::NameError);
        assert!(r.header.qr);
        assert!(r.header.aa);
        assert!(r.header.rd);
        assert_eq!(r.header.id, 4242);
        assert_eq!(r.rcode(), Some(ResponseCode::NameError));
        assert_eq!(r.questions, q.questions);
    }

    #[test]
    fn test_size_and_do_mirrors_requester() {
        let mut q = query("example.com.", DNSResourceType::A);
        let mut r = DNSPacket::reply(&q);
        r.size_and_do(&q, 1232);
        assert!(r.edns.is_none());

        let mut opt = EdnsOpt::with_payload_size(4096);
        opt.set_do_flag(true);
        q.edns = Some(opt);
        r.size_and_do(&q, 1232);
        let edns = r.edns.unwrap();
        assert_eq!(edns.udp_payload_size, 1232);
        assert!(edns.do_flag());
    }

    #[test]
    fn test_scrub_sets_tc_when_answers_dropped() {
        let q = query("big.example.com.", DNSResourceType::A);
        let mut r = DNSPacket::reply(&q);
        for i in 0..100 {
            r.answers.push(a_record("big.example.com.", i));
        }

        assert!(r.scrub(512).unwrap());
        assert!(r.header.tc);
        assert!(r.answers.len() < 100);
        assert!(r.serialize().unwrap().len() <= 512);
    }

    #[test]
    fn test_scrub_drops_extras_silently() {
        let q = query("example.com.", DNSResourceType::NS);
        let mut r = DNSPacket::reply(&q);
        r.answers.push(DNSResource::new(
            "example.com.",
            300,
            DNSResourceData::NS("ns1.example.com.".to_string()),
        ));
        for i in 0..100 {
            r.resources.push(a_record("ns1.example.com.", i));
        }

        assert!(r.scrub(512).unwrap());
        assert!(!r.header.tc);
        assert_eq!(r.answers.len(), 1);
        assert!(r.resources.len() < 100);
    }

    #[test]
    fn test_scrub_noop_when_it_fits() {
        let q = query("example.com.", DNSResourceType::A);
        let mut r = DNSPacket::reply(&q);
        r.answers.push(a_record("example.com.", 1));
        assert!(!r.scrub(512).unwrap());
        assert!(!r.header.tc);
        assert_eq!(r.answers.len(), 1);
    }

    #[test]
    fn test_compressed_response_round_trips() {
        let q = query("example.com.", DNSResourceType::MX);
        let mut r = DNSPacket::reply(&q);
        r.answers.push(DNSResource::new(
            "example.com.",
            300,
            DNSResourceData::MX {
                preference: 10,
                exchange: "mail.example.com.".to_string(),
            },
        ));
        r.resources.push(a_record("mail.example.com.", 25));

        let bytes = r.serialize().unwrap();
        let parsed = DNSPacket::parse(&bytes).unwrap();
        assert_eq!(parsed.answers, r.answers);
        assert_eq!(parsed.resources, r.resources);
    }
}
