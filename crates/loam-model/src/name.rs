//! Domain-name normalization and the shared name predicates.
//!
//! Every per-type validator that needs to check a domain name goes through
//! [`validate_domain_name`]; the label and TLD rules live here once.

use crate::{ModelError, Result};

/// Maximum presentation length of a domain name.
pub const MAX_NAME_LEN: usize = 253;

/// Maximum length of a single label.
pub const MAX_LABEL_LEN: usize = 63;

/// Normalizes a domain name: ASCII lowercase, trailing dot stripped.
/// Idempotent.
pub fn normalize_name(name: &str) -> String {
    name.strip_suffix('.').unwrap_or(name).to_ascii_lowercase()
}

/// Validates a domain name: total length 1..=253, labels 1..=63 of
/// letters/digits/hyphens (no leading or trailing hyphen), TLD at least two
/// characters, starting with a letter, and not all-numeric. A bare `*`
/// label passes; partial wildcards (`foo*`) do not.
pub fn validate_domain_name(name: &str) -> Result<()> {
    let err = |message: String| ModelError::InvalidName {
        name: name.to_string(),
        message,
    };

    if name.is_empty() || name.len() > MAX_NAME_LEN {
        return Err(err(format!(
            "length {} outside 1-{MAX_NAME_LEN}",
            name.len()
        )));
    }

    let stripped = name.strip_suffix('.').unwrap_or(name);
    if stripped.is_empty() {
        return Err(err("empty after removing trailing dot".to_string()));
    }

    let labels: Vec<&str> = stripped.split('.').collect();
    for (i, label) in labels.iter().enumerate() {
        validate_label(label).map_err(|message| err(message))?;
        if labels.len() > 1 && i == labels.len() - 1 {
            validate_tld(label).map_err(|message| err(message))?;
        }
    }

    Ok(())
}

/// Validates one label. Returns a plain message so callers can attach the
/// full name.
fn validate_label(label: &str) -> std::result::Result<(), String> {
    if label == "*" {
        return Ok(());
    }
    if label.is_empty() || label.len() > MAX_LABEL_LEN {
        return Err(format!(
            "label length {} outside 1-{MAX_LABEL_LEN}",
            label.len()
        ));
    }
    let bytes = label.as_bytes();
    if bytes[0] == b'-' || bytes[bytes.len() - 1] == b'-' {
        return Err(format!("label {label:?} starts or ends with hyphen"));
    }
    for &b in bytes {
        if !(b.is_ascii_alphanumeric() || b == b'-' || b == b'_') {
            return Err(format!("invalid character {:?} in label {label:?}", b as char));
        }
    }
    Ok(())
}

/// Validates top-level-domain constraints on the final label.
fn validate_tld(tld: &str) -> std::result::Result<(), String> {
    if tld.len() < 2 {
        return Err(format!("TLD {tld:?} shorter than 2 characters"));
    }
    if tld.bytes().all(|b| b.is_ascii_digit()) {
        return Err(format!("TLD {tld:?} is all-numeric"));
    }
    if !tld.as_bytes()[0].is_ascii_alphabetic() {
        return Err(format!("TLD {tld:?} does not start with a letter"));
    }
    Ok(())
}

/// Validates a non-empty even-length hexadecimal string.
pub fn validate_hex_string(s: &str) -> std::result::Result<(), String> {
    if s.is_empty() {
        return Err("empty hex string".to_string());
    }
    if s.len() % 2 != 0 {
        return Err(format!("odd hex length {}", s.len()));
    }
    if let Some(bad) = s.chars().find(|c| !c.is_ascii_hexdigit()) {
        return Err(format!("non-hex character {bad:?}"));
    }
    Ok(())
}

/// Validates that `value` parses as an integer within `min..=max`.
pub fn validate_int_range(value: &str, min: u64, max: u64) -> std::result::Result<u64, String> {
    let parsed: u64 = value
        .parse()
        .map_err(|_| format!("{value:?} is not an integer"))?;
    if parsed < min || parsed > max {
        return Err(format!("{parsed} outside {min}-{max}"));
    }
    Ok(parsed)
}

/// Minimal mailbox check: one `@`, non-empty local part, valid domain.
pub fn validate_email(email: &str) -> std::result::Result<(), String> {
    let (local, domain) = email
        .split_once('@')
        .ok_or_else(|| format!("{email:?} has no '@'"))?;
    if local.is_empty() {
        return Err(format!("{email:?} has an empty local part"));
    }
    if local
        .bytes()
        .any(|b| !(b.is_ascii_alphanumeric() || matches!(b, b'.' | b'_' | b'%' | b'+' | b'-')))
    {
        return Err(format!("{email:?} has invalid characters in local part"));
    }
    validate_domain_name(domain).map_err(|e| e.to_string())?;
    if !domain.contains('.') {
        return Err(format!("{email:?} domain has no TLD"));
    }
    Ok(())
}
