//! # Loam DNS wire protocol
//!
//! Compact DNS message codec for an authoritative server: header, question
//! and resource-record parsing, name handling with compression-pointer
//! support, and serialization of the record types loam can answer with.
//!
//! Compression pointers are followed when parsing (with a bounded jump
//! count); serialization writes names uncompressed.

use thiserror::Error;

pub mod header;
pub mod message;
pub mod name;
pub mod question;
pub mod rcode;
pub mod record;
pub mod rtype;
pub mod wire;

pub use header::Header;
pub use message::Message;
pub use name::Name;
pub use question::Question;
pub use rcode::Rcode;
pub use record::{RData, ResourceRecord};
pub use rtype::RecordType;

/// DNS protocol errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Unexpected end of data while parsing.
    #[error("unexpected end of data at offset {offset}")]
    UnexpectedEof {
        /// Byte offset where EOF was encountered.
        offset: usize,
    },

    /// Label exceeds the 63-byte maximum.
    #[error("label too long: {length} bytes exceeds maximum of 63")]
    LabelTooLong {
        /// Actual label length.
        length: usize,
    },

    /// Name exceeds the 255-byte wire maximum.
    #[error("name too long: {length} bytes exceeds maximum of 255")]
    NameTooLong {
        /// Wire-format name length.
        length: usize,
    },

    /// Invalid compression pointer target.
    #[error("invalid compression pointer at offset {offset}: points to {target}")]
    InvalidPointer {
        /// Offset of the pointer.
        offset: usize,
        /// Target offset the pointer references.
        target: usize,
    },

    /// Too many compression pointer jumps (loop suspected).
    #[error("too many compression pointer jumps (>{max_jumps})")]
    TooManyJumps {
        /// Maximum allowed jumps.
        max_jumps: usize,
    },

    /// RDATA did not match the declared length or type.
    #[error("invalid RDATA for {rtype}: {message}")]
    InvalidRData {
        /// Record type name.
        rtype: String,
        /// Description of the problem.
        message: String,
    },

    /// Invalid data outside the above categories.
    #[error("invalid data at offset {offset}: {message}")]
    InvalidData {
        /// Byte offset of the invalid data.
        offset: usize,
        /// Description of the problem.
        message: String,
    },

    /// A name string could not be parsed.
    #[error("invalid name: {0}")]
    InvalidName(String),
}

impl Error {
    /// Creates an `UnexpectedEof` error.
    #[inline]
    pub fn unexpected_eof(offset: usize) -> Self {
        Self::UnexpectedEof { offset }
    }

    /// Creates an `InvalidData` error.
    #[inline]
    pub fn invalid_data(offset: usize, message: impl Into<String>) -> Self {
        Self::InvalidData {
            offset,
            message: message.into(),
        }
    }

    /// Creates an `InvalidRData` error.
    #[inline]
    pub fn invalid_rdata(rtype: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidRData {
            rtype: rtype.into(),
            message: message.into(),
        }
    }
}

/// Result type alias for protocol operations.
pub type Result<T> = std::result::Result<T, Error>;
