//! Resource records and typed RDATA.

use crate::name::Name;
use crate::rtype::RecordType;
use crate::wire::{WireReader, WireWriter};
use crate::{Error, Result};
use std::net::{Ipv4Addr, Ipv6Addr};

/// Typed RDATA for the record types loam answers with.
///
/// Unsupported types are carried opaquely so parsing a message never fails
/// on an unknown RR.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RData {
    /// IPv4 address.
    A(Ipv4Addr),
    /// IPv6 address.
    Aaaa(Ipv6Addr),
    /// Canonical name target.
    Cname(Name),
    /// Name server target.
    Ns(Name),
    /// Pointer target.
    Ptr(Name),
    /// Text strings.
    Txt(Vec<String>),
    /// Mail exchange.
    Mx {
        /// Preference; lower is preferred.
        preference: u16,
        /// Exchange host.
        exchange: Name,
    },
    /// Start of authority.
    Soa {
        /// Primary name server.
        mname: Name,
        /// Responsible mailbox.
        rname: Name,
        /// Zone serial.
        serial: u32,
        /// Refresh interval.
        refresh: u32,
        /// Retry interval.
        retry: u32,
        /// Expire limit.
        expire: u32,
        /// Minimum / negative TTL.
        minimum: u32,
    },
    /// Service locator.
    Srv {
        /// Priority; lower is preferred.
        priority: u16,
        /// Weight among equal priorities.
        weight: u16,
        /// Service port.
        port: u16,
        /// Target host.
        target: Name,
    },
    /// Certification authority authorization.
    Caa {
        /// Critical flag (0 or 128).
        flags: u8,
        /// Property tag.
        tag: String,
        /// Property value.
        value: String,
    },
    /// TLSA certificate association.
    Tlsa {
        /// Certificate usage (0-3).
        usage: u8,
        /// Selector (0-1).
        selector: u8,
        /// Matching type (0-2).
        matching_type: u8,
        /// Certificate association data.
        cert_data: Vec<u8>,
    },
    /// Opaque RDATA for any other type.
    Other(Vec<u8>),
}

/// A DNS resource record.
#[derive(Debug, Clone)]
pub struct ResourceRecord {
    /// Owner name.
    pub name: Name,
    /// Record type.
    pub rtype: RecordType,
    /// Record class.
    pub class: u16,
    /// Time to live in seconds.
    pub ttl: u32,
    /// Typed record data.
    pub rdata: RData,
}

impl ResourceRecord {
    /// Creates a new IN-class record.
    pub fn new(name: Name, rtype: RecordType, ttl: u32, rdata: RData) -> Self {
        Self {
            name,
            rtype,
            class: crate::question::CLASS_IN,
            ttl,
            rdata,
        }
    }

    /// Parses a record from wire format.
    pub fn parse(reader: &mut WireReader<'_>) -> Result<Self> {
        let name = Name::parse(reader)?;
        let rtype = RecordType::from_u16(reader.read_u16()?);
        let class = reader.read_u16()?;
        let ttl = reader.read_u32()?;
        let rdlength = reader.read_u16()? as usize;

        let rdata_start = reader.position();
        let rdata = Self::parse_rdata(rtype, reader, rdlength)?;
        let consumed = reader.position() - rdata_start;
        if consumed != rdlength {
            return Err(Error::invalid_rdata(
                rtype.name(),
                format!("RDLENGTH {rdlength} but {consumed} bytes consumed"),
            ));
        }

        Ok(Self {
            name,
            rtype,
            class,
            ttl,
            rdata,
        })
    }

    fn parse_rdata(rtype: RecordType, reader: &mut WireReader<'_>, rdlength: usize) -> Result<RData> {
        match rtype {
            RecordType::A => {
                let octets = reader.read_bytes(4)?;
                Ok(RData::A(Ipv4Addr::new(
                    octets[0], octets[1], octets[2], octets[3],
                )))
            }
            RecordType::Aaaa => {
                let octets: [u8; 16] = reader
                    .read_bytes(16)?
                    .try_into()
                    .expect("slice length checked");
                Ok(RData::Aaaa(Ipv6Addr::from(octets)))
            }
            RecordType::Cname => Ok(RData::Cname(Name::parse(reader)?)),
            RecordType::Ns => Ok(RData::Ns(Name::parse(reader)?)),
            RecordType::Ptr => Ok(RData::Ptr(Name::parse(reader)?)),
            RecordType::Txt => {
                let end = reader.position() + rdlength;
                let mut strings = Vec::new();
                while reader.position() < end {
                    let len = reader.read_u8()? as usize;
                    let raw = reader.read_bytes(len)?;
                    strings.push(String::from_utf8_lossy(raw).into_owned());
                }
                Ok(RData::Txt(strings))
            }
            RecordType::Mx => Ok(RData::Mx {
                preference: reader.read_u16()?,
                exchange: Name::parse(reader)?,
            }),
            RecordType::Soa => Ok(RData::Soa {
                mname: Name::parse(reader)?,
                rname: Name::parse(reader)?,
                serial: reader.read_u32()?,
                refresh: reader.read_u32()?,
                retry: reader.read_u32()?,
                expire: reader.read_u32()?,
                minimum: reader.read_u32()?,
            }),
            RecordType::Srv => Ok(RData::Srv {
                priority: reader.read_u16()?,
                weight: reader.read_u16()?,
                port: reader.read_u16()?,
                target: Name::parse(reader)?,
            }),
            RecordType::Caa => {
                let end = reader.position() + rdlength;
                let flags = reader.read_u8()?;
                let tag_len = reader.read_u8()? as usize;
                let tag = String::from_utf8_lossy(reader.read_bytes(tag_len)?).into_owned();
                let value_len = end.saturating_sub(reader.position());
                let value = String::from_utf8_lossy(reader.read_bytes(value_len)?).into_owned();
                Ok(RData::Caa { flags, tag, value })
            }
            RecordType::Tlsa => {
                let usage = reader.read_u8()?;
                let selector = reader.read_u8()?;
                let matching_type = reader.read_u8()?;
                let cert_data = reader.read_bytes(rdlength.saturating_sub(3))?.to_vec();
                Ok(RData::Tlsa {
                    usage,
                    selector,
                    matching_type,
                    cert_data,
                })
            }
            RecordType::Other(_) => Ok(RData::Other(reader.read_bytes(rdlength)?.to_vec())),
        }
    }

    /// Serializes the record.
    pub fn write(&self, writer: &mut WireWriter) -> Result<()> {
        self.name.write(writer)?;
        writer.write_u16(self.rtype.to_u16());
        writer.write_u16(self.class);
        writer.write_u32(self.ttl);

        let rdlength_pos = writer.len();
        writer.write_u16(0);
        let rdata_start = writer.len();

        match &self.rdata {
            RData::A(addr) => writer.write_bytes(&addr.octets()),
            RData::Aaaa(addr) => writer.write_bytes(&addr.octets()),
            RData::Cname(name) | RData::Ns(name) | RData::Ptr(name) => name.write(writer)?,
            RData::Txt(strings) => {
                for s in strings {
                    for chunk in s.as_bytes().chunks(255) {
                        writer.write_u8(chunk.len() as u8);
                        writer.write_bytes(chunk);
                    }
                    if s.is_empty() {
                        writer.write_u8(0);
                    }
                }
            }
            RData::Mx {
                preference,
                exchange,
            } => {
                writer.write_u16(*preference);
                exchange.write(writer)?;
            }
            RData::Soa {
                mname,
                rname,
                serial,
                refresh,
                retry,
                expire,
                minimum,
            } => {
                mname.write(writer)?;
                rname.write(writer)?;
                writer.write_u32(*serial);
                writer.write_u32(*refresh);
                writer.write_u32(*retry);
                writer.write_u32(*expire);
                writer.write_u32(*minimum);
            }
            RData::Srv {
                priority,
                weight,
                port,
                target,
            } => {
                writer.write_u16(*priority);
                writer.write_u16(*weight);
                writer.write_u16(*port);
                target.write(writer)?;
            }
            RData::Caa { flags, tag, value } => {
                writer.write_u8(*flags);
                writer.write_u8(tag.len() as u8);
                writer.write_bytes(tag.as_bytes());
                writer.write_bytes(value.as_bytes());
            }
            RData::Tlsa {
                usage,
                selector,
                matching_type,
                cert_data,
            } => {
                writer.write_u8(*usage);
                writer.write_u8(*selector);
                writer.write_u8(*matching_type);
                writer.write_bytes(cert_data);
            }
            RData::Other(data) => writer.write_bytes(data),
        }

        let rdlength = writer.len() - rdata_start;
        writer.patch_u16(rdlength_pos, rdlength as u16);
        Ok(())
    }
}
