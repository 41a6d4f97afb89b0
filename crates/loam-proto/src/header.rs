//! DNS message header.

use crate::rcode::Rcode;
use crate::wire::{WireReader, WireWriter};
use crate::Result;

/// Wire size of a DNS header.
pub const HEADER_LEN: usize = 12;

/// A DNS message header.
///
/// Section counts are not stored here; [`crate::Message`] computes them from
/// its section lengths at serialization time.
#[derive(Debug, Clone, Default)]
pub struct Header {
    /// Message identifier.
    pub id: u16,
    /// True for responses, false for queries.
    pub response: bool,
    /// Operation code (0 = standard query).
    pub opcode: u8,
    /// Authoritative answer flag.
    pub authoritative: bool,
    /// Truncation flag.
    pub truncated: bool,
    /// Recursion desired flag (echoed from the query).
    pub recursion_desired: bool,
    /// Recursion available flag.
    pub recursion_available: bool,
    /// Response code.
    pub rcode: Rcode,
}

/// Raw section counts read alongside a header.
#[derive(Debug, Clone, Copy, Default)]
pub struct SectionCounts {
    /// Question count.
    pub questions: u16,
    /// Answer count.
    pub answers: u16,
    /// Authority count.
    pub authorities: u16,
    /// Additional count.
    pub additionals: u16,
}

impl Header {
    /// Parses a header and its section counts.
    pub fn parse(reader: &mut WireReader<'_>) -> Result<(Self, SectionCounts)> {
        let id = reader.read_u16()?;
        let flags = reader.read_u16()?;

        let header = Self {
            id,
            response: flags & 0x8000 != 0,
            opcode: ((flags >> 11) & 0x0F) as u8,
            authoritative: flags & 0x0400 != 0,
            truncated: flags & 0x0200 != 0,
            recursion_desired: flags & 0x0100 != 0,
            recursion_available: flags & 0x0080 != 0,
            rcode: Rcode::from_u8((flags & 0x000F) as u8),
        };

        let counts = SectionCounts {
            questions: reader.read_u16()?,
            answers: reader.read_u16()?,
            authorities: reader.read_u16()?,
            additionals: reader.read_u16()?,
        };

        Ok((header, counts))
    }

    /// Serializes the header with the given section counts.
    pub fn write(&self, counts: SectionCounts, writer: &mut WireWriter) {
        writer.write_u16(self.id);

        let mut flags = 0u16;
        if self.response {
            flags |= 0x8000;
        }
        flags |= u16::from(self.opcode & 0x0F) << 11;
        if self.authoritative {
            flags |= 0x0400;
        }
        if self.truncated {
            flags |= 0x0200;
        }
        if self.recursion_desired {
            flags |= 0x0100;
        }
        if self.recursion_available {
            flags |= 0x0080;
        }
        flags |= u16::from(self.rcode.to_u8() & 0x0F);
        writer.write_u16(flags);

        writer.write_u16(counts.questions);
        writer.write_u16(counts.answers);
        writer.write_u16(counts.authorities);
        writer.write_u16(counts.additionals);
    }
}
