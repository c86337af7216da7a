use std::fmt::Write as _;
use std::net::Ipv4Addr;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::WireError;

const MAX_LABEL_LEN: usize = 63;
const MAX_NAME_LEN: usize = 255;
const MAX_JUMPS: usize = 5;

/// Class IN (Internet)
pub const CLASS_IN: u16 = 1;

/// DNS Question Section
/// Format: QNAME + QTYPE (2 bytes) + QCLASS (2 bytes)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnsQuestion {
    pub name: String, // Fully qualified, presentation form (e.g., "example.com.")
    pub qtype: u16,
    pub qclass: u16,
}

/// DNS Answer/Resource Record Section
/// Format: NAME + TYPE (2 bytes) + CLASS (2 bytes) + TTL (4 bytes) + RDLENGTH (2 bytes) + RDATA
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnsAnswer {
    pub name: String,
    pub rtype: u16,
    pub rclass: u16,
    pub ttl: u32,
    pub rdata: Bytes,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordType {
    A = 1,     // IPv4 address
    AAAA = 28, // IPv6 address
    DS = 43,   // Delegation signer, served by the parent zone
}

impl RecordType {
    pub fn to_u16(self) -> u16 {
        self as u16
    }
}

impl DnsQuestion {
    pub fn new(name: impl Into<String>, qtype: u16) -> Self {
        DnsQuestion {
            name: name.into(),
            qtype,
            qclass: CLASS_IN,
        }
    }

    /// Parse a DNS question from bytes starting at the given offset
    /// Returns the question and the new offset after parsing
    pub fn from_bytes(bytes: &[u8], offset: usize) -> Result<(Self, usize), WireError> {
        let (name, new_offset) = parse_domain_name(bytes, offset)?;
        let mut rest = fixed_fields(bytes, new_offset, 4, "question type and class")?;

        let question = DnsQuestion {
            name,
            qtype: rest.get_u16(),
            qclass: rest.get_u16(),
        };
        Ok((question, new_offset + 4))
    }

    pub fn write_to(&self, buf: &mut BytesMut) -> Result<(), WireError> {
        encode_domain_name(&self.name, buf)?;
        buf.put_u16(self.qtype);
        buf.put_u16(self.qclass);
        Ok(())
    }
}

impl DnsAnswer {
    /// Parse a resource record from bytes starting at the given offset
    /// Returns the answer and the new offset after parsing
    pub fn from_bytes(bytes: &[u8], offset: usize) -> Result<(Self, usize), WireError> {
        let (name, new_offset) = parse_domain_name(bytes, offset)?;
        let mut rest = fixed_fields(bytes, new_offset, 10, "answer fields")?;

        let rtype = rest.get_u16();
        let rclass = rest.get_u16();
        let ttl = rest.get_u32();
        let rdlength = rest.get_u16() as usize;

        let data_offset = new_offset + 10;
        let rdata = fixed_fields(bytes, data_offset, rdlength, "RDATA")?;

        Ok((
            DnsAnswer {
                name,
                rtype,
                rclass,
                ttl,
                rdata: Bytes::copy_from_slice(rdata),
            },
            data_offset + rdlength,
        ))
    }

    pub fn write_to(&self, buf: &mut BytesMut) -> Result<(), WireError> {
        let rdlength =
            u16::try_from(self.rdata.len()).map_err(|_| WireError::RdataTooLong(self.rdata.len()))?;

        encode_domain_name(&self.name, buf)?;
        buf.put_u16(self.rtype);
        buf.put_u16(self.rclass);
        buf.put_u32(self.ttl);
        buf.put_u16(rdlength);
        buf.put_slice(&self.rdata);
        Ok(())
    }

    /// Create an A record (IPv4 address) answer
    pub fn new_a_record(name: String, ttl: u32, ip: Ipv4Addr) -> Self {
        DnsAnswer {
            name,
            rtype: RecordType::A.to_u16(),
            rclass: CLASS_IN,
            ttl,
            rdata: Bytes::copy_from_slice(&ip.octets()),
        }
    }

    /// The address carried by an A record, if this is one.
    pub fn ipv4(&self) -> Option<Ipv4Addr> {
        if self.rtype != RecordType::A.to_u16() {
            return None;
        }
        let octets: [u8; 4] = self.rdata.as_ref().try_into().ok()?;
        Some(Ipv4Addr::from(octets))
    }
}

fn fixed_fields<'a>(
    bytes: &'a [u8],
    offset: usize,
    len: usize,
    what: &'static str,
) -> Result<&'a [u8], WireError> {
    bytes.get(offset..offset + len).ok_or(WireError::Truncated {
        what,
        needed: offset + len,
        available: bytes.len(),
    })
}

/// Parse a domain name from DNS message format, following compression pointers.
///
/// The name is rendered fully qualified. Dots and backslashes inside a label
/// come out as `\.` and `\\`, bytes outside printable ASCII as `\DDD`, so a
/// label boundary is always an unescaped dot.
pub fn parse_domain_name(bytes: &[u8], mut offset: usize) -> Result<(String, usize), WireError> {
    let mut name = String::new();
    let mut wire_len = 1;
    let mut resume_at = None;
    let mut jumps = 0;

    loop {
        let length = *bytes.get(offset).ok_or(WireError::Truncated {
            what: "domain name",
            needed: offset + 1,
            available: bytes.len(),
        })?;

        match length & 0xC0 {
            0xC0 => {
                let low = *bytes.get(offset + 1).ok_or(WireError::Truncated {
                    what: "compression pointer",
                    needed: offset + 2,
                    available: bytes.len(),
                })?;

                jumps += 1;
                if jumps > MAX_JUMPS {
                    return Err(WireError::TooManyJumps(offset));
                }
                if resume_at.is_none() {
                    resume_at = Some(offset + 2);
                }
                offset = u16::from_be_bytes([length & 0x3F, low]) as usize;
                continue;
            }
            0x00 => {}
            _ => return Err(WireError::BadLabelType(length)),
        }

        offset += 1;
        if length == 0 {
            break;
        }

        let label = fixed_fields(bytes, offset, length as usize, "label")?;
        wire_len += label.len() + 1;
        if wire_len > MAX_NAME_LEN {
            return Err(WireError::NameTooLong(name));
        }
        push_label(&mut name, label);
        offset += label.len();
    }

    if name.is_empty() {
        name.push('.');
    }
    Ok((name, resume_at.unwrap_or(offset)))
}

fn push_label(name: &mut String, label: &[u8]) {
    for &b in label {
        match b {
            b'.' | b'\\' => {
                name.push('\\');
                name.push(b as char);
            }
            0x21..=0x7E => name.push(b as char),
            _ => {
                let _ = write!(name, "\\{:03}", b);
            }
        }
    }
    name.push('.');
}

/// Encode a presentation-form domain name to DNS message format
/// Example: "example.com." -> [7]example[3]com[0]
pub fn encode_domain_name(name: &str, buf: &mut BytesMut) -> Result<(), WireError> {
    let labels = split_labels(name)?;

    let wire_len = labels.iter().map(|label| label.len() + 1).sum::<usize>() + 1;
    if wire_len > MAX_NAME_LEN {
        return Err(WireError::NameTooLong(name.to_string()));
    }

    for label in &labels {
        if label.is_empty() {
            return Err(WireError::EmptyLabel(name.to_string()));
        }
        if label.len() > MAX_LABEL_LEN {
            return Err(WireError::LabelTooLong(name.to_string()));
        }
        buf.put_u8(label.len() as u8);
        buf.put_slice(label);
    }
    buf.put_u8(0);
    Ok(())
}

/// Split a name on unescaped dots, decoding `\.`, `\\` and `\DDD`.
fn split_labels(name: &str) -> Result<Vec<Vec<u8>>, WireError> {
    if name.is_empty() || name == "." {
        return Ok(Vec::new());
    }

    let bytes = name.as_bytes();
    let mut labels = Vec::new();
    let mut label = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'\\' => {
                let escaped = &bytes[i + 1..];
                match escaped {
                    [a, b, c, ..] if [a, b, c].iter().all(|d| d.is_ascii_digit()) => {
                        let value = [a, b, c]
                            .iter()
                            .fold(0u16, |acc, &&d| acc * 10 + (d - b'0') as u16);
                        let value = u8::try_from(value)
                            .map_err(|_| WireError::BadEscape(name.to_string()))?;
                        label.push(value);
                        i += 4;
                    }
                    [first, ..] if !first.is_ascii_digit() => {
                        label.push(*first);
                        i += 2;
                    }
                    _ => return Err(WireError::BadEscape(name.to_string())),
                }
            }
            b'.' => {
                labels.push(std::mem::take(&mut label));
                i += 1;
            }
            b => {
                label.push(b);
                i += 1;
            }
        }
    }

    if !label.is_empty() {
        labels.push(label);
    }
    Ok(labels)
}
