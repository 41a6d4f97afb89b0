//! DNS question section entries.

use crate::name::Name;
use crate::rtype::RecordType;
use crate::wire::{WireReader, WireWriter};
use crate::Result;
use std::fmt;

/// The Internet class; the only class loam serves.
pub const CLASS_IN: u16 = 1;

/// A DNS question.
#[derive(Debug, Clone)]
pub struct Question {
    /// Queried name.
    pub qname: Name,
    /// Queried type.
    pub qtype: RecordType,
    /// Queried class (almost always IN).
    pub qclass: u16,
}

impl Question {
    /// Creates a new IN-class question.
    pub fn new(qname: Name, qtype: RecordType) -> Self {
        Self {
            qname,
            qtype,
            qclass: CLASS_IN,
        }
    }

    /// Parses a question from wire format.
    pub fn parse(reader: &mut WireReader<'_>) -> Result<Self> {
        let qname = Name::parse(reader)?;
        let qtype = RecordType::from_u16(reader.read_u16()?);
        let qclass = reader.read_u16()?;
        Ok(Self {
            qname,
            qtype,
            qclass,
        })
    }

    /// Serializes the question.
    pub fn write(&self, writer: &mut WireWriter) -> Result<()> {
        self.qname.write(writer)?;
        writer.write_u16(self.qtype.to_u16());
        writer.write_u16(self.qclass);
        Ok(())
    }
}

impl fmt::Display for Question {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.qname, self.qtype)
    }
}
