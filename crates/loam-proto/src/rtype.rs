//! DNS record types.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A DNS record type.
///
/// The named variants are the types loam stores and answers; anything else
/// is carried as `Other` so unknown types survive round-trips.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RecordType {
    /// IPv4 host address.
    A,
    /// IPv6 host address.
    Aaaa,
    /// Canonical name.
    Cname,
    /// Text record.
    Txt,
    /// Mail exchange.
    Mx,
    /// Authoritative name server.
    Ns,
    /// Start of authority.
    Soa,
    /// Domain name pointer.
    Ptr,
    /// Service locator.
    Srv,
    /// Certification authority authorization.
    Caa,
    /// TLSA certificate association.
    Tlsa,
    /// Any other type, by numeric value.
    Other(u16),
}

impl RecordType {
    /// All types loam materializes; used for invalidation fan-out.
    pub const COMMON: [RecordType; 11] = [
        RecordType::A,
        RecordType::Aaaa,
        RecordType::Cname,
        RecordType::Txt,
        RecordType::Mx,
        RecordType::Ns,
        RecordType::Soa,
        RecordType::Ptr,
        RecordType::Srv,
        RecordType::Caa,
        RecordType::Tlsa,
    ];

    /// Returns the numeric type value.
    pub const fn to_u16(self) -> u16 {
        match self {
            RecordType::A => 1,
            RecordType::Ns => 2,
            RecordType::Cname => 5,
            RecordType::Soa => 6,
            RecordType::Ptr => 12,
            RecordType::Mx => 15,
            RecordType::Txt => 16,
            RecordType::Aaaa => 28,
            RecordType::Srv => 33,
            RecordType::Tlsa => 52,
            RecordType::Caa => 257,
            RecordType::Other(value) => value,
        }
    }

    /// Creates a record type from its numeric value.
    pub const fn from_u16(value: u16) -> Self {
        match value {
            1 => RecordType::A,
            2 => RecordType::Ns,
            5 => RecordType::Cname,
            6 => RecordType::Soa,
            12 => RecordType::Ptr,
            15 => RecordType::Mx,
            16 => RecordType::Txt,
            28 => RecordType::Aaaa,
            33 => RecordType::Srv,
            52 => RecordType::Tlsa,
            257 => RecordType::Caa,
            other => RecordType::Other(other),
        }
    }

    /// Returns true if this is one of the named, supported types.
    pub const fn is_supported(self) -> bool {
        !matches!(self, RecordType::Other(_))
    }

    /// Returns the presentation-format name of this type.
    pub fn name(&self) -> String {
        match self {
            RecordType::A => "A".to_string(),
            RecordType::Aaaa => "AAAA".to_string(),
            RecordType::Cname => "CNAME".to_string(),
            RecordType::Txt => "TXT".to_string(),
            RecordType::Mx => "MX".to_string(),
            RecordType::Ns => "NS".to_string(),
            RecordType::Soa => "SOA".to_string(),
            RecordType::Ptr => "PTR".to_string(),
            RecordType::Srv => "SRV".to_string(),
            RecordType::Caa => "CAA".to_string(),
            RecordType::Tlsa => "TLSA".to_string(),
            RecordType::Other(value) => format!("TYPE{value}"),
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for RecordType {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "A" => Ok(RecordType::A),
            "AAAA" => Ok(RecordType::Aaaa),
            "CNAME" => Ok(RecordType::Cname),
            "TXT" => Ok(RecordType::Txt),
            "MX" => Ok(RecordType::Mx),
            "NS" => Ok(RecordType::Ns),
            "SOA" => Ok(RecordType::Soa),
            "PTR" => Ok(RecordType::Ptr),
            "SRV" => Ok(RecordType::Srv),
            "CAA" => Ok(RecordType::Caa),
            "TLSA" => Ok(RecordType::Tlsa),
            other => {
                if let Some(num) = other.strip_prefix("TYPE") {
                    num.parse::<u16>()
                        .map(RecordType::from_u16)
                        .map_err(|_| crate::Error::InvalidName(format!("unknown record type {s:?}")))
                } else {
                    Err(crate::Error::InvalidName(format!(
                        "unknown record type {s:?}"
                    )))
                }
            }
        }
    }
}
