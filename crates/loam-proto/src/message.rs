//! DNS messages.

use crate::header::{Header, SectionCounts};
use crate::question::Question;
use crate::rcode::Rcode;
use crate::record::ResourceRecord;
use crate::wire::{WireReader, WireWriter};
use crate::Result;

/// A complete DNS message.
#[derive(Debug, Clone, Default)]
pub struct Message {
    /// Message header.
    pub header: Header,
    /// Question section.
    pub questions: Vec<Question>,
    /// Answer section.
    pub answers: Vec<ResourceRecord>,
    /// Authority section.
    pub authorities: Vec<ResourceRecord>,
    /// Additional section.
    pub additionals: Vec<ResourceRecord>,
}

impl Message {
    /// Creates a query message with one question.
    pub fn query(id: u16, question: Question) -> Self {
        Self {
            header: Header {
                id,
                recursion_desired: true,
                ..Header::default()
            },
            questions: vec![question],
            ..Self::default()
        }
    }

    /// Creates an empty authoritative response to `query`, echoing its id,
    /// question section, and RD flag.
    pub fn response_to(query: &Message) -> Self {
        Self {
            header: Header {
                id: query.header.id,
                response: true,
                opcode: query.header.opcode,
                authoritative: true,
                recursion_desired: query.header.recursion_desired,
                recursion_available: false,
                ..Header::default()
            },
            questions: query.questions.clone(),
            ..Self::default()
        }
    }

    /// Returns the response code.
    #[inline]
    pub fn rcode(&self) -> Rcode {
        self.header.rcode
    }

    /// Sets the response code.
    #[inline]
    pub fn set_rcode(&mut self, rcode: Rcode) {
        self.header.rcode = rcode;
    }

    /// Appends an answer record.
    pub fn add_answer(&mut self, record: ResourceRecord) {
        self.answers.push(record);
    }

    /// Parses a message from wire format.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut reader = WireReader::new(data);
        let (header, counts) = Header::parse(&mut reader)?;

        let mut questions = Vec::with_capacity(counts.questions as usize);
        for _ in 0..counts.questions {
            questions.push(Question::parse(&mut reader)?);
        }

        let mut answers = Vec::with_capacity(counts.answers as usize);
        for _ in 0..counts.answers {
            answers.push(ResourceRecord::parse(&mut reader)?);
        }

        let mut authorities = Vec::with_capacity(counts.authorities as usize);
        for _ in 0..counts.authorities {
            authorities.push(ResourceRecord::parse(&mut reader)?);
        }

        let mut additionals = Vec::with_capacity(counts.additionals as usize);
        for _ in 0..counts.additionals {
            additionals.push(ResourceRecord::parse(&mut reader)?);
        }

        Ok(Self {
            header,
            questions,
            answers,
            authorities,
            additionals,
        })
    }

    /// Serializes the message to wire format.
    pub fn to_wire(&self) -> Result<Vec<u8>> {
        let mut writer = WireWriter::new();
        let counts = SectionCounts {
            questions: self.questions.len() as u16,
            answers: self.answers.len() as u16,
            authorities: self.authorities.len() as u16,
            additionals: self.additionals.len() as u16,
        };
        self.header.write(counts, &mut writer);

        for question in &self.questions {
            question.write(&mut writer)?;
        }
        for record in &self.answers {
            record.write(&mut writer)?;
        }
        for record in &self.authorities {
            record.write(&mut writer)?;
        }
        for record in &self.additionals {
            record.write(&mut writer)?;
        }

        Ok(writer.into_bytes())
    }

    /// Drops answers until the serialized message fits `max_size`, setting
    /// the TC bit if anything was removed.
    pub fn truncate_to(&mut self, max_size: usize) -> Result<()> {
        while self.to_wire()?.len() > max_size {
            if self.answers.pop().is_none() {
                break;
            }
            self.header.truncated = true;
        }
        Ok(())
    }
}
