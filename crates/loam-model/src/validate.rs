//! Per-type record validation.
//!
//! Each validator is a pure predicate over the record value, composed from
//! the shared predicates in [`crate::name`].

use crate::name::{
    validate_domain_name, validate_email, validate_hex_string, validate_int_range,
};
use crate::{DnsRecord, ModelError, RecordType, Result};
use std::net::IpAddr;

/// TTL ceiling (RFC 2181: 31-bit seconds).
const MAX_TTL: u32 = 2_147_483_647;

/// Maximum TXT payload loam accepts.
const MAX_TXT_LEN: usize = 4096;

/// Validates a record for storage.
pub fn validate_record(record: &DnsRecord) -> Result<()> {
    if !record.rtype.is_supported() {
        return Err(ModelError::UnsupportedType(record.rtype));
    }

    validate_domain_name(&record.name)?;

    if record.target.is_empty() {
        return Err(target_err(record, "target cannot be empty"));
    }
    if record.ttl > MAX_TTL {
        return Err(ModelError::InvalidField {
            rtype: record.rtype,
            field: "ttl",
            message: format!("{} exceeds {MAX_TTL}", record.ttl),
        });
    }

    match record.rtype {
        RecordType::A => validate_a(record),
        RecordType::Aaaa => validate_aaaa(record),
        RecordType::Cname | RecordType::Ns | RecordType::Ptr => validate_domain_target(record),
        RecordType::Mx => validate_mx(record),
        RecordType::Txt => validate_txt(record),
        RecordType::Soa => validate_soa(record),
        RecordType::Srv => validate_srv(record),
        RecordType::Caa => validate_caa(record),
        RecordType::Tlsa => validate_tlsa(record),
        RecordType::Other(_) => unreachable!("filtered above"),
    }
}

fn target_err(record: &DnsRecord, message: impl Into<String>) -> ModelError {
    ModelError::InvalidTarget {
        rtype: record.rtype,
        target: record.target.clone(),
        message: message.into(),
    }
}

fn validate_a(record: &DnsRecord) -> Result<()> {
    match record.target.parse::<IpAddr>() {
        Ok(IpAddr::V4(_)) => Ok(()),
        Ok(IpAddr::V6(_)) => Err(target_err(record, "IPv6 address in an A record")),
        Err(_) => Err(target_err(record, "not an IP address")),
    }
}

fn validate_aaaa(record: &DnsRecord) -> Result<()> {
    match record.target.parse::<IpAddr>() {
        Ok(IpAddr::V6(_)) => Ok(()),
        Ok(IpAddr::V4(_)) => Err(target_err(record, "IPv4 address in an AAAA record")),
        Err(_) => Err(target_err(record, "not an IP address")),
    }
}

fn validate_domain_target(record: &DnsRecord) -> Result<()> {
    validate_domain_name(&record.target).map_err(|e| target_err(record, e.to_string()))
}

fn validate_mx(record: &DnsRecord) -> Result<()> {
    validate_domain_target(record)
}

fn validate_txt(record: &DnsRecord) -> Result<()> {
    if record.target.len() > MAX_TXT_LEN {
        return Err(target_err(
            record,
            format!("{} characters exceeds {MAX_TXT_LEN}", record.target.len()),
        ));
    }
    Ok(())
}

fn validate_soa(record: &DnsRecord) -> Result<()> {
    validate_domain_target(record)?;
    if record.mbox.is_empty() {
        return Err(ModelError::InvalidField {
            rtype: record.rtype,
            field: "mbox",
            message: "SOA mbox cannot be empty".to_string(),
        });
    }
    // Mbox is stored in domain form (dots for the @).
    validate_domain_name(&record.mbox).map_err(|e| ModelError::InvalidField {
        rtype: record.rtype,
        field: "mbox",
        message: e.to_string(),
    })
}

fn validate_srv(record: &DnsRecord) -> Result<()> {
    if record.port == 0 {
        return Err(ModelError::InvalidField {
            rtype: record.rtype,
            field: "port",
            message: "SRV port cannot be 0".to_string(),
        });
    }
    // "." means no service available.
    if record.target == "." {
        return Ok(());
    }
    validate_domain_target(record)
}

fn validate_caa(record: &DnsRecord) -> Result<()> {
    // CAA reuses the priority column as the flag octet.
    if record.priority != 0 && record.priority != 128 {
        return Err(ModelError::InvalidField {
            rtype: record.rtype,
            field: "flag",
            message: format!("must be 0 or 128, got {}", record.priority),
        });
    }

    let tag = record.tag.trim().to_ascii_lowercase();
    match tag.as_str() {
        "issue" | "issuewild" => {
            let value = record.target.trim();
            // ";" denies all issuers.
            if value == ";" {
                return Ok(());
            }
            if value.contains("://") || value.contains(' ') {
                return Err(target_err(record, "issuer must be a bare CA domain"));
            }
            validate_domain_name(value).map_err(|e| target_err(record, e.to_string()))
        }
        "iodef" => {
            let value = record.target.trim();
            if let Some(email) = value.strip_prefix("mailto:") {
                validate_email(email).map_err(|e| target_err(record, e))
            } else if let Some(rest) = value.strip_prefix("https://") {
                let host = rest.split(['/', ':']).next().unwrap_or("");
                validate_domain_name(host).map_err(|e| target_err(record, e.to_string()))
            } else {
                Err(target_err(record, "iodef must be mailto: or https:"))
            }
        }
        "" => Err(ModelError::InvalidField {
            rtype: record.rtype,
            field: "tag",
            message: "CAA tag cannot be empty".to_string(),
        }),
        other => Err(ModelError::InvalidField {
            rtype: record.rtype,
            field: "tag",
            message: format!("must be issue, issuewild, or iodef, got {other:?}"),
        }),
    }
}

fn validate_tlsa(record: &DnsRecord) -> Result<()> {
    // Name shape: _port._protocol.domain
    let labels: Vec<&str> = record.name.split('.').collect();
    if labels.len() < 3 {
        return Err(ModelError::InvalidName {
            name: record.name.clone(),
            message: "TLSA name must be _port._protocol.domain".to_string(),
        });
    }
    let port_label = labels[0]
        .strip_prefix('_')
        .ok_or_else(|| ModelError::InvalidName {
            name: record.name.clone(),
            message: "TLSA port label must start with underscore".to_string(),
        })?;
    validate_int_range(port_label, 1, 65535).map_err(|message| ModelError::InvalidName {
        name: record.name.clone(),
        message,
    })?;
    if !matches!(labels[1], "_tcp" | "_udp" | "_sctp") {
        return Err(ModelError::InvalidName {
            name: record.name.clone(),
            message: format!("TLSA protocol must be _tcp, _udp, or _sctp, got {:?}", labels[1]),
        });
    }
    validate_domain_name(&labels[2..].join(".")).map_err(|e| ModelError::InvalidName {
        name: record.name.clone(),
        message: e.to_string(),
    })?;

    // Target shape: "usage selector matchtype certdata"
    let fields: Vec<&str> = record.target.split_whitespace().collect();
    if fields.len() != 4 {
        return Err(target_err(
            record,
            format!("expected 4 fields, got {}", fields.len()),
        ));
    }
    validate_int_range(fields[0], 0, 3).map_err(|e| target_err(record, format!("usage: {e}")))?;
    validate_int_range(fields[1], 0, 1).map_err(|e| target_err(record, format!("selector: {e}")))?;
    let matching =
        validate_int_range(fields[2], 0, 2).map_err(|e| target_err(record, format!("matching type: {e}")))?;

    let cert_data = fields[3];
    validate_hex_string(cert_data).map_err(|e| target_err(record, e))?;
    let expected = match matching {
        1 => Some(64),
        2 => Some(128),
        _ => None,
    };
    if let Some(expected) = expected {
        if cert_data.len() != expected {
            return Err(target_err(
                record,
                format!(
                    "cert data length {} does not match digest length {expected} for matching type {matching}",
                    cert_data.len()
                ),
            ));
        }
    }
    if cert_data.len() < 4 || cert_data.len() > 8192 {
        return Err(target_err(record, "cert data length outside 4-8192"));
    }
    Ok(())
}
