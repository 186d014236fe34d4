use super::{
    ParseError,
    common::{PacketComponent, WireReader, WireWriter, split_labels},
    enums::{DNSResourceClass, DNSResourceType},
};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DNSQuestion {
    /// Labels without the root label.
    pub labels: Vec<String>,
    pub qtype: DNSResourceType,
    pub qclass: DNSResourceClass,
}

impl DNSQuestion {
    pub fn new(name: &str, qtype: DNSResourceType) -> Self {
        Self {
            labels: split_labels(name).into_iter().map(str::to_string).collect(),
            qtype,
            qclass: DNSResourceClass::IN,
        }
    }

    /// The queried name, lower-cased and fully qualified. The root zone is
    /// returned as an empty string so callers can treat it as "no name".
    pub fn name(&self) -> String {
        if self.labels.is_empty() {
            return String::new();
        }
        format!("{}.", self.labels.join(".").to_ascii_lowercase())
    }
}

impl PacketComponent for DNSQuestion {
    fn write(&self, out: &mut WireWriter) -> Result<(), ParseError> {
        if self.labels.is_empty() {
            out.write_name(".")?;
        } else {
            out.write_name(&self.labels.join("."))?;
        }
        out.write_u16(self.qtype.into());
        out.write_u16(self.qclass.into());
        Ok(())
    }

    fn read(reader: &mut WireReader<'_>) -> Result<Self, ParseError> {
        let name = reader.read_name()?;
        let qtype = reader.read_u16()?.into();
        let qclass = reader.read_u16()?.into();
        Ok(DNSQuestion {
            labels: split_labels(&name).into_iter().map(str::to_string).collect(),
            qtype,
            qclass,
        })
    }
}
