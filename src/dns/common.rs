//! Byte-level helpers shared by every message component: the cursor-based
//! reader, the compressing writer and domain-name utilities.

use std::collections::HashMap;

use super::ParseError;

/// Longest encoded domain name (RFC 1035 section 2.3.4).
pub const MAX_NAME_LENGTH: usize = 255;
const MAX_LABEL_LENGTH: usize = 63;
const MAX_POINTER_HOPS: usize = 64;

pub trait PacketComponent: Sized {
    fn write(&self, out: &mut WireWriter) -> Result<(), ParseError>;
    fn read(reader: &mut WireReader<'_>) -> Result<Self, ParseError>;
}

/// Cursor over a received message. Names are resolved against the whole
/// buffer so compression pointers work anywhere in the message.
pub struct WireReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> WireReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.buf.len().saturating_sub(self.pos)
    }

    pub fn take(&mut self, len: usize) -> Result<&'a [u8], ParseError> {
        if self.remaining() < len {
            return Err(ParseError::UnexpectedEnd(self.pos));
        }
        let slice = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    pub fn read_u8(&mut self) -> Result<u8, ParseError> {
        Ok(self.take(1)?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16, ParseError> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    pub fn read_u32(&mut self) -> Result<u32, ParseError> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Reads a possibly compressed name and returns it fully qualified and
    /// lower-cased.
    pub fn read_name(&mut self) -> Result<String, ParseError> {
        let mut labels: Vec<String> = Vec::new();
        let mut cursor = self.pos;
        let mut resume_at: Option<usize> = None;
        let mut hops = 0;
        let mut total = 1;

        loop {
            let len = *self
                .buf
                .get(cursor)
                .ok_or(ParseError::UnexpectedEnd(cursor))? as usize;

            if len & 0xC0 == 0xC0 {
                let low = *self
                    .buf
                    .get(cursor + 1)
                    .ok_or(ParseError::UnexpectedEnd(cursor + 1))? as usize;
                hops += 1;
                if hops > MAX_POINTER_HOPS {
                    return Err(ParseError::InvalidLabel);
                }
                if resume_at.is_none() {
                    resume_at = Some(cursor + 2);
                }
                cursor = ((len & 0x3F) << 8) | low;
                continue;
            }
            if len & 0xC0 != 0 {
                return Err(ParseError::InvalidLabel);
            }

            cursor += 1;
            if len == 0 {
                break;
            }

            total += len + 1;
            if total > MAX_NAME_LENGTH {
                return Err(ParseError::NameTooLong);
            }
            let raw = self
                .buf
                .get(cursor..cursor + len)
                .ok_or(ParseError::UnexpectedEnd(cursor))?;
            let label = std::str::from_utf8(raw).map_err(|_| ParseError::InvalidLabel)?;
            labels.push(label.to_ascii_lowercase());
            cursor += len;
        }

        self.pos = resume_at.unwrap_or(cursor);

        if labels.is_empty() {
            Ok(".".to_string())
        } else {
            Ok(format!("{}.", labels.join(".")))
        }
    }
}

/// Output buffer with optional RFC 1035 name compression.
pub struct WireWriter {
    buf: Vec<u8>,
    names: Option<HashMap<String, u16>>,
}

impl WireWriter {
    pub fn new(compress: bool) -> Self {
        Self {
            buf: Vec::with_capacity(512),
            names: compress.then(HashMap::new),
        }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn buffer_mut(&mut self) -> &mut Vec<u8> {
        &mut self.buf
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    pub fn write_u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    pub fn write_u16(&mut self, value: u16) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    pub fn write_u32(&mut self, value: u32) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Overwrites two bytes written earlier, used for RDLENGTH back-patching.
    pub fn patch_u16(&mut self, at: usize, value: u16) {
        self.buf[at..at + 2].copy_from_slice(&value.to_be_bytes());
    }

    /// Writes a name, pointing at an earlier copy of its longest known
    /// suffix when compression is enabled.
    pub fn write_name(&mut self, name: &str) -> Result<(), ParseError> {
        self.write_name_inner(name, true)
    }

    /// Writes a name without ever emitting a pointer (SRV targets and other
    /// RDATA where RFC 3597 forbids compression).
    pub fn write_name_uncompressed(&mut self, name: &str) -> Result<(), ParseError> {
        self.write_name_inner(name, false)
    }

    fn write_name_inner(&mut self, name: &str, allow_pointer: bool) -> Result<(), ParseError> {
        let labels = split_labels(name);
        if name_wire_len(name) > MAX_NAME_LENGTH {
            return Err(ParseError::NameTooLong);
        }

        for i in 0..labels.len() {
            let suffix = labels[i..].join(".").to_ascii_lowercase();

            if let Some(names) = &mut self.names {
                if allow_pointer {
                    if let Some(&offset) = names.get(&suffix) {
                        self.write_u16(0xC000 | offset);
                        return Ok(());
                    }
                }
                // Pointers can only address the first 16k of the message.
                if self.buf.len() < 0x4000 {
                    names.entry(suffix).or_insert(self.buf.len() as u16);
                }
            }

            let label = labels[i];
            if label.is_empty() || label.len() > MAX_LABEL_LENGTH {
                return Err(ParseError::InvalidLabel);
            }
            self.write_u8(label.len() as u8);
            self.write_bytes(label.as_bytes());
        }

        self.write_u8(0);
        Ok(())
    }
}

/// Splits a name into its labels, ignoring the root label.
pub fn split_labels(name: &str) -> Vec<&str> {
    let trimmed = name.trim_end_matches('.');
    if trimmed.is_empty() {
        Vec::new()
    } else {
        trimmed.split('.').collect()
    }
}

/// Uncompressed encoded length of a name, including the root label.
pub fn name_wire_len(name: &str) -> usize {
    split_labels(name).iter().map(|l| l.len() + 1).sum::<usize>() + 1
}

/// Lower-cases a name and makes sure it ends with the root dot.
pub fn fqdn(name: &str) -> String {
    let lower = name.to_ascii_lowercase();
    if lower.ends_with('.') {
        lower
    } else {
        format!("{}.", lower)
    }
}

/// Returns true when `child` equals `parent` or sits below it, comparing
/// whole labels.
pub fn is_subdomain(child: &str, parent: &str) -> bool {
    let child = fqdn(child);
    let parent = fqdn(parent);
    if parent == "." {
        return true;
    }
    child == parent || child.ends_with(&format!(".{}", parent))
}
