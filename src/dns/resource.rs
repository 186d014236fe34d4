use std::net::{Ipv4Addr, Ipv6Addr};

use super::{
    ParseError,
    common::{PacketComponent, WireReader, WireWriter, name_wire_len},
    enums::{DNSResourceClass, DNSResourceType},
};

/// Fixed part of a resource record after the owner name:
/// TYPE, CLASS, TTL and RDLENGTH.
const FIXED_RR_LENGTH: usize = 10;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DNSResource {
    /// Owner name, fully qualified.
    pub name: String,
    pub rtype: DNSResourceType,
    pub rclass: DNSResourceClass,
    pub ttl: u32,
    pub rdata: DNSResourceData,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum DNSResourceData {
    #[default]
    Empty,
    A(Ipv4Addr),
    AAAA(Ipv6Addr),
    NS(String),
    CNAME(String),
    PTR(String),
    MX {
        preference: u16,
        exchange: String,
    },
    TXT(Vec<String>),
    SRV {
        priority: u16,
        weight: u16,
        port: u16,
        target: String,
    },
    SOA {
        mname: String,
        rname: String,
        serial: u32,
        refresh: u32,
        retry: u32,
        expire: u32,
        minimum: u32,
    },
    CAA {
        flags: u8,
        tag: String,
        value: Vec<u8>,
    },
    Raw(Vec<u8>),
}

impl DNSResource {
    pub fn new(name: &str, ttl: u32, rdata: DNSResourceData) -> Self {
        let rtype = match &rdata {
            DNSResourceData::A(_) => DNSResourceType::A,
            DNSResourceData::AAAA(_) => DNSResourceType::AAAA,
            DNSResourceData::NS(_) => DNSResourceType::NS,
            DNSResourceData::CNAME(_) => DNSResourceType::CNAME,
            DNSResourceData::PTR(_) => DNSResourceType::PTR,
            DNSResourceData::MX { .. } => DNSResourceType::MX,
            DNSResourceData::TXT(_) => DNSResourceType::TXT,
            DNSResourceData::SRV { .. } => DNSResourceType::SRV,
            DNSResourceData::SOA { .. } => DNSResourceType::SOA,
            DNSResourceData::CAA { .. } => DNSResourceType::CAA,
            DNSResourceData::Empty | DNSResourceData::Raw(_) => DNSResourceType::Unknown(0),
        };
        Self {
            name: super::common::fqdn(name),
            rtype,
            rclass: DNSResourceClass::IN,
            ttl,
            rdata,
        }
    }

    /// Uncompressed on-the-wire length of this record. Zone transfer
    /// envelopes are budgeted with this figure.
    pub fn wire_len(&self) -> usize {
        name_wire_len(&self.name) + FIXED_RR_LENGTH + self.rdata.wire_len()
    }

    /// Target host of records that point at another name, used for glue.
    pub fn target_host(&self) -> Option<&str> {
        match &self.rdata {
            DNSResourceData::NS(host)
            | DNSResourceData::PTR(host)
            | DNSResourceData::MX { exchange: host, .. }
            | DNSResourceData::SRV { target: host, .. } => Some(host.as_str()),
            _ => None,
        }
    }
}

impl DNSResourceData {
    fn wire_len(&self) -> usize {
        match self {
            DNSResourceData::Empty => 0,
            DNSResourceData::A(_) => 4,
            DNSResourceData::AAAA(_) => 16,
            DNSResourceData::NS(name)
            | DNSResourceData::CNAME(name)
            | DNSResourceData::PTR(name) => name_wire_len(name),
            DNSResourceData::MX { exchange, .. } => 2 + name_wire_len(exchange),
            DNSResourceData::TXT(strings) => txt_chunks(strings).map(|c| c.len() + 1).sum(),
            DNSResourceData::SRV { target, .. } => 6 + name_wire_len(target),
            DNSResourceData::SOA { mname, rname, .. } => {
                name_wire_len(mname) + name_wire_len(rname) + 20
            }
            DNSResourceData::CAA { tag, value, .. } => 2 + tag.len() + value.len(),
            DNSResourceData::Raw(bytes) => bytes.len(),
        }
    }

    fn write(&self, out: &mut WireWriter) -> Result<(), ParseError> {
        match self {
            DNSResourceData::Empty => {}
            DNSResourceData::A(ip) => out.write_bytes(&ip.octets()),
            DNSResourceData::AAAA(ip) => out.write_bytes(&ip.octets()),
            DNSResourceData::NS(name)
            | DNSResourceData::CNAME(name)
            | DNSResourceData::PTR(name) => out.write_name(name)?,
            DNSResourceData::MX {
                preference,
                exchange,
            } => {
                out.write_u16(*preference);
                out.write_name(exchange)?;
            }
            DNSResourceData::TXT(strings) => {
                for chunk in txt_chunks(strings) {
                    out.write_u8(chunk.len() as u8);
                    out.write_bytes(chunk);
                }
            }
            DNSResourceData::SRV {
                priority,
                weight,
                port,
                target,
            } => {
                out.write_u16(*priority);
                out.write_u16(*weight);
                out.write_u16(*port);
                out.write_name_uncompressed(target)?;
            }
            DNSResourceData::SOA {
                mname,
                rname,
                serial,
                refresh,
                retry,
                expire,
                minimum,
            } => {
                out.write_name(mname)?;
                out.write_name(rname)?;
                out.write_u32(*serial);
                out.write_u32(*refresh);
                out.write_u32(*retry);
                out.write_u32(*expire);
                out.write_u32(*minimum);
            }
            DNSResourceData::CAA { flags, tag, value } => {
                out.write_u8(*flags);
                out.write_u8(tag.len() as u8);
                out.write_bytes(tag.as_bytes());
                out.write_bytes(value);
            }
            DNSResourceData::Raw(bytes) => out.write_bytes(bytes),
        }
        Ok(())
    }

    fn read(
        rtype: DNSResourceType,
        reader: &mut WireReader<'_>,
        rdlength: usize,
    ) -> Result<Self, ParseError> {
        let end = reader.position() + rdlength;
        let data = match rtype {
            DNSResourceType::A => {
                let b = reader.take(4)?;
                DNSResourceData::A(Ipv4Addr::new(b[0], b[1], b[2], b[3]))
            }
            DNSResourceType::AAAA => {
                let mut octets = [0u8; 16];
                octets.copy_from_slice(reader.take(16)?);
                DNSResourceData::AAAA(Ipv6Addr::from(octets))
            }
            DNSResourceType::NS => DNSResourceData::NS(reader.read_name()?),
            DNSResourceType::CNAME => DNSResourceData::CNAME(reader.read_name()?),
            DNSResourceType::PTR => DNSResourceData::PTR(reader.read_name()?),
            DNSResourceType::MX => DNSResourceData::MX {
                preference: reader.read_u16()?,
                exchange: reader.read_name()?,
            },
            DNSResourceType::TXT => {
                let mut strings = Vec::new();
                while reader.position() < end {
                    let len = reader.read_u8()? as usize;
                    let raw = reader.take(len)?;
                    strings.push(String::from_utf8_lossy(raw).into_owned());
                }
                DNSResourceData::TXT(strings)
            }
            DNSResourceType::SRV => DNSResourceData::SRV {
                priority: reader.read_u16()?,
                weight: reader.read_u16()?,
                port: reader.read_u16()?,
                target: reader.read_name()?,
            },
            DNSResourceType::SOA => DNSResourceData::SOA {
                mname: reader.read_name()?,
                rname: reader.read_name()?,
                serial: reader.read_u32()?,
                refresh: reader.read_u32()?,
                retry: reader.read_u32()?,
                expire: reader.read_u32()?,
                minimum: reader.read_u32()?,
            },
            DNSResourceType::CAA => {
                let flags = reader.read_u8()?;
                let tag_len = reader.read_u8()? as usize;
                let tag = String::from_utf8_lossy(reader.take(tag_len)?).into_owned();
                let rest = end.saturating_sub(reader.position());
                DNSResourceData::CAA {
                    flags,
                    tag,
                    value: reader.take(rest)?.to_vec(),
                }
            }
            _ => DNSResourceData::Raw(reader.take(rdlength)?.to_vec()),
        };

        if reader.position() != end {
            return Err(ParseError::InvalidRdata(rtype));
        }
        Ok(data)
    }
}

/// TXT character-strings are limited to 255 octets; longer values are
/// split into consecutive strings.
fn txt_chunks(strings: &[String]) -> impl Iterator<Item = &[u8]> {
    strings.iter().flat_map(|s| {
        let bytes = s.as_bytes();
        if bytes.is_empty() {
            vec![bytes]
        } else {
            bytes.chunks(255).collect::<Vec<_>>()
        }
    })
}

impl PacketComponent for DNSResource {
    fn write(&self, out: &mut WireWriter) -> Result<(), ParseError> {
        out.write_name(&self.name)?;
        out.write_u16(self.rtype.into());
        out.write_u16(self.rclass.into());
        out.write_u32(self.ttl);

        let rdlength_at = out.len();
        out.write_u16(0);
        self.rdata.write(out)?;
        let rdlength = out.len() - rdlength_at - 2;
        let rdlength = u16::try_from(rdlength).map_err(|_| ParseError::RdataTooLong)?;
        out.patch_u16(rdlength_at, rdlength);
        Ok(())
    }

    fn read(reader: &mut WireReader<'_>) -> Result<Self, ParseError> {
        let name = reader.read_name()?;
        let rtype: DNSResourceType = reader.read_u16()?.into();
        let rclass = reader.read_u16()?.into();
        let ttl = reader.read_u32()?;
        let rdlength = reader.read_u16()? as usize;
        if reader.remaining() < rdlength {
            return Err(ParseError::UnexpectedEnd(reader.position()));
        }
        let rdata = DNSResourceData::read(rtype, reader, rdlength)?;
        Ok(DNSResource {
            name,
            rtype,
            rclass,
            ttl,
            rdata,
        })
    }
}
