use super::ParseError;

/// Largest payload this server will ever advertise or honour.
pub const MAX_UDP_PAYLOAD_SIZE: u16 = 4096;

/// Plain DNS over UDP, used when the requester sent no OPT record.
pub const MIN_UDP_PAYLOAD_SIZE: u16 = 512;

const DO_FLAG: u16 = 0x8000;

/// EDNS0 OPT pseudo-record
/// RFC 6891: https://tools.ietf.org/html/rfc6891
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EdnsOpt {
    /// UDP payload size that can be handled by the sender
    pub udp_payload_size: u16,
    /// Extended RCODE (high 8 bits)
    pub extended_rcode: u8,
    /// EDNS version (currently 0)
    pub version: u8,
    /// EDNS flags (16 bits)
    pub flags: u16,
    pub options: Vec<EdnsOption>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EdnsOption {
    pub code: u16,
    pub data: Vec<u8>,
}

impl EdnsOpt {
    pub fn with_payload_size(payload_size: u16) -> Self {
        Self {
            udp_payload_size: payload_size,
            ..Default::default()
        }
    }

    /// Check if DNSSEC OK (DO) flag is set
    pub fn do_flag(&self) -> bool {
        (self.flags & DO_FLAG) != 0
    }

    pub fn set_do_flag(&mut self, value: bool) {
        if value {
            self.flags |= DO_FLAG;
        } else {
            self.flags &= !DO_FLAG;
        }
    }

    /// Payload size the requester can take, no smaller than what a plain
    /// DNS client is guaranteed to handle and no larger than we honour.
    pub fn payload_size(&self) -> u16 {
        self.udp_payload_size
            .clamp(MIN_UDP_PAYLOAD_SIZE, MAX_UDP_PAYLOAD_SIZE)
    }

    /// Parse EDNS OPT record from the fields of a resource record:
    /// - CLASS: UDP payload size (16 bits)
    /// - TTL: Extended RCODE (8 bits) | Version (8 bits) | Flags (16 bits)
    /// - RDATA: Option data
    pub fn parse_from_resource(class: u16, ttl: u32, rdata: &[u8]) -> Result<Self, ParseError> {
        let extended_rcode = ((ttl >> 24) & 0xFF) as u8;
        let version = ((ttl >> 16) & 0xFF) as u8;
        let flags = (ttl & 0xFFFF) as u16;

        let mut options = Vec::new();
        let mut pos = 0;

        while pos < rdata.len() {
            if pos + 4 > rdata.len() {
                return Err(ParseError::InvalidEdns);
            }

            let code = u16::from_be_bytes([rdata[pos], rdata[pos + 1]]);
            let length = u16::from_be_bytes([rdata[pos + 2], rdata[pos + 3]]) as usize;
            pos += 4;

            if pos + length > rdata.len() {
                return Err(ParseError::InvalidEdns);
            }

            options.push(EdnsOption {
                code,
                data: rdata[pos..pos + length].to_vec(),
            });
            pos += length;
        }

        Ok(EdnsOpt {
            udp_payload_size: class,
            extended_rcode,
            version,
            flags,
            options,
        })
    }

    /// Serialize to (CLASS, TTL, RDATA) resource record fields
    pub fn to_resource_format(&self) -> (u16, u32, Vec<u8>) {
        let ttl = ((self.extended_rcode as u32) << 24)
            | ((self.version as u32) << 16)
            | (self.flags as u32);

        let mut rdata = Vec::new();
        for option in &self.options {
            rdata.extend_from_slice(&option.code.to_be_bytes());
            rdata.extend_from_slice(&(option.data.len() as u16).to_be_bytes());
            rdata.extend_from_slice(&option.data);
        }

        (self.udp_payload_size, ttl, rdata)
    }

    /// Encoded size of the OPT record: root name, fixed fields and options.
    pub fn wire_len(&self) -> usize {
        1 + 10
            + self
                .options
                .iter()
                .map(|option| 4 + option.data.len())
                .sum::<usize>()
    }
}

impl std::fmt::Display for EdnsOpt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "EDNS0: payload_size={}, version={}, flags=0x{:04x}, options={}",
            self.udp_payload_size,
            self.version,
            self.flags,
            self.options.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_do_flag() {
        let mut opt = EdnsOpt::with_payload_size(1232);
        assert!(!opt.do_flag());

        opt.set_do_flag(true);
        assert!(opt.do_flag());
        assert_eq!(opt.flags & 0x8000, 0x8000);

        opt.set_do_flag(false);
        assert!(!opt.do_flag());
    }

    #[test]
    fn test_resource_format_conversion() {
        let mut opt = EdnsOpt::with_payload_size(1232);
        opt.set_do_flag(true);
        opt.options.push(EdnsOption {
            code: 10,
            data: vec![1, 2, 3, 4, 5, 6, 7, 8],
        });

        let (class, ttl, rdata) = opt.to_resource_format();
        assert_eq!(class, 1232);
        assert_eq!(ttl & 0xFFFF, 0x8000);
        assert_eq!(rdata.len() + 11, opt.wire_len());

        let parsed = EdnsOpt::parse_from_resource(class, ttl, &rdata).unwrap();
        assert_eq!(parsed, opt);
    }

    #[test]
    fn test_small_payload_clamped() {
        assert_eq!(EdnsOpt::with_payload_size(100).payload_size(), 512);
        assert_eq!(EdnsOpt::with_payload_size(4096).payload_size(), 4096);
        assert_eq!(EdnsOpt::with_payload_size(65535).payload_size(), 4096);
    }

    #[test]
    fn test_truncated_option_rejected() {
        assert!(EdnsOpt::parse_from_resource(4096, 0, &[0, 10, 0, 8, 1]).is_err());
    }
}
