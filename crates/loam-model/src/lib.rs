//! # Loam record model
//!
//! Storage-level DNS records, lookup queries, and record validation.
//!
//! A [`DnsRecord`] is the atomic unit the store, caches, and resolver all
//! pass around: a flat struct with the common columns plus optional
//! type-specific fields and, for wildcard patterns, the positional-mask
//! metadata computed at normalization time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod name;
pub mod validate;

pub use loam_proto::RecordType;
pub use name::normalize_name;

/// Record validation errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    /// The record name is invalid.
    #[error("invalid name {name:?}: {message}")]
    InvalidName {
        /// The offending name.
        name: String,
        /// Description of the problem.
        message: String,
    },

    /// The record target is invalid for its type.
    #[error("invalid {rtype} target {target:?}: {message}")]
    InvalidTarget {
        /// Record type.
        rtype: RecordType,
        /// The offending target.
        target: String,
        /// Description of the problem.
        message: String,
    },

    /// A type-specific field is out of range.
    #[error("invalid {field} for {rtype} record: {message}")]
    InvalidField {
        /// Record type.
        rtype: RecordType,
        /// Field name.
        field: &'static str,
        /// Description of the problem.
        message: String,
    },

    /// The record type is not supported for storage.
    #[error("unsupported record type {0}")]
    UnsupportedType(RecordType),
}

/// Result type alias for model operations.
pub type Result<T> = std::result::Result<T, ModelError>;

/// A DNS record as stored and served.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DnsRecord {
    /// Stable identifier, assigned by the store.
    #[serde(default)]
    pub id: i64,

    /// Normalized owner name (lowercase, no trailing dot).
    pub name: String,

    /// Record type.
    pub rtype: RecordType,

    /// Type-dependent payload: address, domain, text, or structured tuple
    /// in presentation form.
    pub target: String,

    /// Time to live in seconds.
    pub ttl: u32,

    /// Priority; lower is more preferred (MX convention, applied uniformly).
    #[serde(default)]
    pub priority: u32,

    /// Creation timestamp, assigned by the store.
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,

    /// Last-update timestamp, assigned by the store.
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,

    // SOA fields.
    /// SOA responsible mailbox.
    #[serde(default)]
    pub mbox: String,
    /// SOA serial.
    #[serde(default)]
    pub serial: u32,
    /// SOA refresh interval.
    #[serde(default)]
    pub refresh: u32,
    /// SOA retry interval.
    #[serde(default)]
    pub retry: u32,
    /// SOA expire limit.
    #[serde(default)]
    pub expire: u32,
    /// SOA minimum / negative TTL.
    #[serde(default)]
    pub minttl: u32,

    // SRV fields.
    /// SRV weight.
    #[serde(default)]
    pub weight: u16,
    /// SRV port.
    #[serde(default)]
    pub port: u16,

    /// CAA tag (issue, issuewild, iodef).
    #[serde(default)]
    pub tag: String,

    // Wildcard metadata, populated by normalization for wildcard patterns.
    /// Effective TLD per the public suffix list.
    #[serde(default)]
    pub etld: String,
    /// Registrable domain (etld plus one label).
    #[serde(default)]
    pub apex_domain: String,
    /// Labels between the apex boundary and the leftmost label, left-to-right.
    #[serde(default)]
    pub subdomain_labels: Vec<String>,
    /// True if any subdomain label is `*`.
    #[serde(default)]
    pub is_wildcard: bool,
    /// Bit i set ⇔ subdomain label i is `*`.
    #[serde(default)]
    pub wildcard_mask: u64,
}

impl DnsRecord {
    /// Creates a record with the given identity fields; everything else
    /// defaults.
    pub fn new(name: impl Into<String>, rtype: RecordType, target: impl Into<String>, ttl: u32) -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            name: normalize_name(&name.into()),
            rtype,
            target: target.into(),
            ttl,
            priority: 0,
            created_at: now,
            updated_at: now,
            mbox: String::new(),
            serial: 0,
            refresh: 0,
            retry: 0,
            expire: 0,
            minttl: 0,
            weight: 0,
            port: 0,
            tag: String::new(),
            etld: String::new(),
            apex_domain: String::new(),
            subdomain_labels: Vec::new(),
            is_wildcard: false,
            wildcard_mask: 0,
        }
    }

    /// Builder-style priority setter.
    pub fn with_priority(mut self, priority: u32) -> Self {
        self.priority = priority;
        self
    }

    /// Number of exact (non-wildcard) subdomain labels.
    pub fn exact_match_count(&self) -> u32 {
        let len = self.subdomain_labels.len() as u32;
        if len == 0 {
            return 0;
        }
        let valid = if len >= 64 { u64::MAX } else { (1u64 << len) - 1 };
        len - (self.wildcard_mask & valid).count_ones()
    }

    /// Normalizes the record in place: lowercases the name, canonicalizes
    /// domain and address targets, and flags wildcard patterns. Idempotent.
    pub fn normalize(&mut self) {
        self.name = normalize_name(&self.name);
        self.is_wildcard = self.name.split('.').any(|label| label == "*");
        match self.rtype {
            RecordType::Cname | RecordType::Ns | RecordType::Mx | RecordType::Ptr => {
                self.target = normalize_name(&self.target);
            }
            RecordType::A | RecordType::Aaaa => {
                if let Ok(ip) = self.target.parse::<std::net::IpAddr>() {
                    self.target = ip.to_string();
                }
            }
            _ => {}
        }
        if !self.mbox.is_empty() {
            self.mbox = normalize_name(&self.mbox);
        }
    }

    /// Validates the record; see [`validate`] for the per-type rules.
    pub fn validate(&self) -> Result<()> {
        validate::validate_record(self)
    }
}

/// A normalized lookup request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LookupQuery {
    /// Normalized name.
    pub name: String,
    /// Record type.
    pub rtype: RecordType,
}

impl LookupQuery {
    /// Creates a normalized query.
    pub fn new(name: &str, rtype: RecordType) -> Self {
        Self {
            name: normalize_name(name),
            rtype,
        }
    }

    /// Returns the cache fingerprint `"{name}:{TYPE}"`.
    pub fn fingerprint(&self) -> String {
        format!("{}:{}", self.name, self.rtype)
    }
}

impl std::fmt::Display for LookupQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.name, self.rtype)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_idempotent() {
        let mut record = DnsRecord::new("WWW.Example.COM.", RecordType::A, "10.0.0.1", 300);
        record.normalize();
        assert_eq!(record.name, "www.example.com");
        let once = record.clone();
        record.normalize();
        assert_eq!(record, once);
    }

    #[test]
    fn test_normalize_domain_target() {
        let mut record = DnsRecord::new("www.example.com", RecordType::Cname, "Host.Example.COM.", 300);
        record.normalize();
        assert_eq!(record.target, "host.example.com");
    }

    #[test]
    fn test_normalize_flags_wildcards() {
        let mut record = DnsRecord::new("*.prod.example.com", RecordType::A, "10.0.0.1", 300);
        record.normalize();
        assert!(record.is_wildcard);

        let mut plain = DnsRecord::new("www.example.com", RecordType::A, "10.0.0.1", 300);
        plain.normalize();
        assert!(!plain.is_wildcard);
    }

    #[test]
    fn test_fingerprint() {
        let query = LookupQuery::new("WWW.Test.Internal.", RecordType::A);
        assert_eq!(query.fingerprint(), "www.test.internal:A");
    }

    #[test]
    fn test_exact_match_count() {
        let mut record = DnsRecord::new("api.*.prod.example.com", RecordType::A, "10.0.0.1", 300);
        record.subdomain_labels = vec!["api".into(), "*".into(), "prod".into()];
        record.wildcard_mask = 0b010;
        assert_eq!(record.exact_match_count(), 2);
    }

    #[test]
    fn test_serde_roundtrip() {
        let record = DnsRecord::new("www.example.com", RecordType::Mx, "mail.example.com", 300)
            .with_priority(10);
        let json = serde_json::to_string(&record).unwrap();
        let back: DnsRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back.name, record.name);
        assert_eq!(back.priority, 10);
        assert_eq!(back.rtype, RecordType::Mx);
    }
}
