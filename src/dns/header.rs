use bitstream_io::{BigEndian, BitRead, BitReader, BitWrite, BitWriter};

use super::{
    ParseError,
    common::{PacketComponent, WireReader, WireWriter},
};

pub const HEADER_LENGTH: usize = 12;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DNSHeader {
    pub id: u16,
    pub qr: bool,
    pub opcode: u8,
    pub aa: bool,
    pub tc: bool,
    pub rd: bool,
    pub ra: bool,
    pub z: u8,
    pub rcode: u8,
    pub qdcount: u16,
    pub ancount: u16,
    pub nscount: u16,
    pub arcount: u16,
}

impl PacketComponent for DNSHeader {
    fn write(&self, out: &mut WireWriter) -> Result<(), ParseError> {
        let mut writer = BitWriter::endian(out.buffer_mut(), BigEndian);
        writer.write_var::<u16>(16, self.id)?;
        writer.write_bit(self.qr)?;
        writer.write_var::<u8>(4, self.opcode)?;
        writer.write_bit(self.aa)?;
        writer.write_bit(self.tc)?;
        writer.write_bit(self.rd)?;
        writer.write_bit(self.ra)?;
        writer.write_var::<u8>(3, self.z)?;
        writer.write_var::<u8>(4, self.rcode)?;
        writer.write_var::<u16>(16, self.qdcount)?;
        writer.write_var::<u16>(16, self.ancount)?;
        writer.write_var::<u16>(16, self.nscount)?;
        writer.write_var::<u16>(16, self.arcount)?;
        Ok(())
    }

    fn read(reader: &mut WireReader<'_>) -> Result<Self, ParseError> {
        let raw = reader
            .take(HEADER_LENGTH)
            .map_err(|_| ParseError::InvalidHeader)?;
        let mut bits = BitReader::endian(raw, BigEndian);
        Ok(DNSHeader {
            id: bits.read_var::<u16>(16)?,
            qr: bits.read_bit()?,
            opcode: bits.read_var::<u8>(4)?,
            aa: bits.read_bit()?,
            tc: bits.read_bit()?,
            rd: bits.read_bit()?,
            ra: bits.read_bit()?,
            z: bits.read_var::<u8>(3)?,
            rcode: bits.read_var::<u8>(4)?,
            qdcount: bits.read_var::<u16>(16)?,
            ancount: bits.read_var::<u16>(16)?,
            nscount: bits.read_var::<u16>(16)?,
            arcount: bits.read_var::<u16>(16)?,
        })
    }
}
