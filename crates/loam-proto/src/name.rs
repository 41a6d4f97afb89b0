//! Domain names: parsing, encoding, and comparison.

use crate::wire::{WireReader, WireWriter};
use crate::{Error, Result};
use std::fmt;
use std::str::FromStr;

/// Maximum number of compression pointer jumps before assuming a loop.
const MAX_POINTER_JUMPS: usize = 32;

/// Maximum wire length of an encoded name.
const MAX_NAME_WIRE_LEN: usize = 255;

/// Maximum length of a single label.
const MAX_LABEL_LEN: usize = 63;

/// A domain name as an ordered list of labels, most-specific first.
///
/// The root name has zero labels. Label case is preserved; comparisons via
/// [`Name::eq_ignore_case`] and hashing of the lowercased form follow the
/// DNS rule that names are case-insensitive.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Name {
    labels: Vec<String>,
}

impl Name {
    /// The root name (zero labels).
    pub fn root() -> Self {
        Self { labels: Vec::new() }
    }

    /// Creates a name from pre-validated labels.
    pub fn from_labels(labels: Vec<String>) -> Self {
        Self { labels }
    }

    /// Returns the labels, most-specific first.
    #[inline]
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Returns true if this is the root name.
    #[inline]
    pub fn is_root(&self) -> bool {
        self.labels.is_empty()
    }

    /// Returns a copy with every label lowercased.
    pub fn lowercased(&self) -> Self {
        Self {
            labels: self.labels.iter().map(|l| l.to_ascii_lowercase()).collect(),
        }
    }

    /// Case-insensitive equality.
    pub fn eq_ignore_case(&self, other: &Self) -> bool {
        self.labels.len() == other.labels.len()
            && self
                .labels
                .iter()
                .zip(other.labels.iter())
                .all(|(a, b)| a.eq_ignore_ascii_case(b))
    }

    /// Parses a name from wire format, following compression pointers.
    ///
    /// The reader is left positioned after the name as it appears at the
    /// original offset (pointers are followed on a separate cursor).
    pub fn parse(reader: &mut WireReader<'_>) -> Result<Self> {
        let mut labels = Vec::new();
        let mut wire_len = 0usize;
        let mut jumps = 0usize;
        // Position to restore once the first pointer has been followed.
        let mut resume: Option<usize> = None;
        let mut cursor = reader.clone();

        loop {
            let offset = cursor.position();
            let len = cursor.read_u8()?;

            match len {
                0 => break,
                1..=63 => {
                    wire_len += 1 + len as usize;
                    if wire_len > MAX_NAME_WIRE_LEN {
                        return Err(Error::NameTooLong { length: wire_len });
                    }
                    let raw = cursor.read_bytes(len as usize)?;
                    let label = String::from_utf8_lossy(raw).into_owned();
                    labels.push(label);
                }
                _ if len & 0xC0 == 0xC0 => {
                    jumps += 1;
                    if jumps > MAX_POINTER_JUMPS {
                        return Err(Error::TooManyJumps {
                            max_jumps: MAX_POINTER_JUMPS,
                        });
                    }
                    let low = cursor.read_u8()?;
                    let target = ((len as usize & 0x3F) << 8) | low as usize;
                    if target >= offset {
                        // Pointers must reference earlier data.
                        return Err(Error::InvalidPointer { offset, target });
                    }
                    if resume.is_none() {
                        resume = Some(cursor.position());
                    }
                    cursor.set_position(target);
                }
                _ => {
                    return Err(Error::invalid_data(offset, "invalid label length octet"));
                }
            }
        }

        reader.set_position(resume.unwrap_or(cursor.position()));
        Ok(Self { labels })
    }

    /// Encodes this name to wire format (uncompressed).
    pub fn write(&self, writer: &mut WireWriter) -> Result<()> {
        let mut wire_len = 1usize;
        for label in &self.labels {
            if label.len() > MAX_LABEL_LEN {
                return Err(Error::LabelTooLong {
                    length: label.len(),
                });
            }
            wire_len += 1 + label.len();
        }
        if wire_len > MAX_NAME_WIRE_LEN {
            return Err(Error::NameTooLong { length: wire_len });
        }

        for label in &self.labels {
            writer.write_u8(label.len() as u8);
            writer.write_bytes(label.as_bytes());
        }
        writer.write_u8(0);
        Ok(())
    }
}

impl FromStr for Name {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.strip_suffix('.').unwrap_or(s);
        if s.is_empty() {
            return Ok(Self::root());
        }

        let mut labels = Vec::new();
        for label in s.split('.') {
            if label.is_empty() {
                return Err(Error::InvalidName(format!("empty label in {s:?}")));
            }
            if label.len() > MAX_LABEL_LEN {
                return Err(Error::LabelTooLong {
                    length: label.len(),
                });
            }
            labels.push(label.to_string());
        }
        Ok(Self { labels })
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.labels.is_empty() {
            return write!(f, ".");
        }
        for label in &self.labels {
            write!(f, "{label}.")?;
        }
        Ok(())
    }
}
