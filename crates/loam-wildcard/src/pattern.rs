//! Wildcard patterns and their precedence ordering.

use crate::psl::PublicSuffixList;
use crate::{WildcardError, Result};
use chrono::{DateTime, Utc};
use loam_model::DnsRecord;
use std::cmp::Ordering;

/// Maximum subdomain depth a pattern mask can express.
pub const MAX_PATTERN_LABELS: usize = 64;

/// A positional wildcard pattern.
///
/// `mask` bit *i* is set iff `labels[i]` (left-to-right) is `*`. The payload
/// id references the record served when this pattern wins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WildcardPattern {
    /// Pattern identity (the backing record's id).
    pub id: i64,
    /// Effective TLD of the pattern name.
    pub etld: String,
    /// Registrable domain of the pattern name.
    pub apex: String,
    /// Subdomain labels, left-to-right.
    pub labels: Vec<String>,
    /// Bit i set ⇔ labels[i] is `*`.
    pub mask: u64,
    /// Number of exact labels; precomputed for tier-2 ranking.
    pub exact_count: u32,
    /// Record to serve when this pattern wins.
    pub payload_id: i64,
    /// When the pattern was created; tier-4 tiebreaker.
    pub created_at: DateTime<Utc>,
}

impl WildcardPattern {
    /// Builds a pattern from a stored wildcard record, deriving the parts
    /// through `psl` when the record predates the stored metadata.
    pub fn from_record(record: &DnsRecord, psl: &PublicSuffixList) -> Result<Self> {
        let (etld, apex, labels) =
            if !record.etld.is_empty() && !record.subdomain_labels.is_empty() {
                (
                    record.etld.clone(),
                    record.apex_domain.clone(),
                    record.subdomain_labels.clone(),
                )
            } else {
                let parts = psl
                    .split(&record.name)
                    .ok_or_else(|| WildcardError::NotRegistrable {
                        name: record.name.clone(),
                    })?;
                (parts.etld, parts.apex, parts.labels)
            };

        Self::build(
            record.id,
            record.id,
            etld,
            apex,
            labels,
            record.created_at,
        )
    }

    /// Builds a pattern from a name, validating its labels.
    pub fn from_name(
        id: i64,
        payload_id: i64,
        name: &str,
        psl: &PublicSuffixList,
    ) -> Result<Self> {
        let parts = psl.split(name).ok_or_else(|| WildcardError::NotRegistrable {
            name: name.to_string(),
        })?;
        Self::build(id, payload_id, parts.etld, parts.apex, parts.labels, Utc::now())
    }

    fn build(
        id: i64,
        payload_id: i64,
        etld: String,
        apex: String,
        labels: Vec<String>,
        created_at: DateTime<Utc>,
    ) -> Result<Self> {
        if labels.len() > MAX_PATTERN_LABELS {
            return Err(WildcardError::TooDeep {
                labels: labels.len(),
            });
        }

        let mut mask = 0u64;
        for (i, label) in labels.iter().enumerate() {
            if label == "*" {
                mask |= 1 << i;
            } else if label.contains('*') {
                return Err(WildcardError::PartialWildcard {
                    label: label.clone(),
                });
            }
        }

        let exact_count = labels.len() as u32 - mask.count_ones();
        Ok(Self {
            id,
            etld,
            apex,
            labels,
            mask,
            exact_count,
            payload_id,
            created_at,
        })
    }

    /// Presentation form of the pattern, e.g. `api.*.prod.example.com`.
    pub fn text(&self) -> String {
        if self.labels.is_empty() {
            self.apex.clone()
        } else {
            format!("{}.{}", self.labels.join("."), self.apex)
        }
    }

    /// True if the pattern contains no wildcard positions.
    #[inline]
    pub fn is_exact(&self) -> bool {
        self.mask == 0
    }

    /// Positional acceptance: every position is either a wildcard bit or a
    /// case-insensitive label match.
    pub fn matches(&self, q_labels: &[String]) -> bool {
        if q_labels.len() != self.labels.len() {
            return false;
        }
        for (i, q_label) in q_labels.iter().enumerate() {
            if (self.mask >> i) & 1 == 1 {
                continue;
            }
            if !self.labels[i].eq_ignore_ascii_case(q_label) {
                return false;
            }
        }
        true
    }

    /// Precedence comparison; `Ordering::Less` means `self` outranks
    /// `other`.
    ///
    /// Tier 1: a fully exact pattern beats any wildcard. Tier 2: more exact
    /// labels win. Tier 3: scanning positions left-to-right, the first
    /// position where one side is exact and the other wildcard decides for
    /// the exact side. Tier 4 (safety net; two distinct patterns cannot
    /// reach it for the same query): creation time, pattern text, id.
    pub fn precedence(&self, other: &Self) -> Ordering {
        match (self.is_exact(), other.is_exact()) {
            (true, false) => return Ordering::Less,
            (false, true) => return Ordering::Greater,
            _ => {}
        }

        match other.exact_count.cmp(&self.exact_count) {
            Ordering::Equal => {}
            unequal => return unequal,
        }

        for i in 0..self.labels.len().min(other.labels.len()) {
            let a = (self.mask >> i) & 1;
            let b = (other.mask >> i) & 1;
            if a != b {
                return a.cmp(&b);
            }
        }

        (self.created_at, self.text(), self.id).cmp(&(other.created_at, other.text(), other.id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pattern(id: i64, name: &str) -> WildcardPattern {
        let psl = PublicSuffixList::builtin();
        WildcardPattern::from_name(id, id, name, &psl).unwrap()
    }

    #[test]
    fn test_mask_construction() {
        let p = pattern(1, "*.service.prod.example.com");
        assert_eq!(p.labels, vec!["*", "service", "prod"]);
        assert_eq!(p.mask, 0b001);
        assert_eq!(p.exact_count, 2);

        let p = pattern(2, "api.*.prod.example.com");
        assert_eq!(p.mask, 0b010);
        assert_eq!(p.exact_count, 2);
    }

    #[test]
    fn test_partial_wildcard_rejected() {
        let psl = PublicSuffixList::builtin();
        assert!(matches!(
            WildcardPattern::from_name(1, 1, "foo*.example.com", &psl),
            Err(WildcardError::PartialWildcard { .. })
        ));
        assert!(matches!(
            WildcardPattern::from_name(1, 1, "*bar.example.com", &psl),
            Err(WildcardError::PartialWildcard { .. })
        ));
    }

    #[test]
    fn test_positional_match() {
        let p = pattern(1, "api.*.prod.example.com");
        let q = |s: &str| s.split('.').map(String::from).collect::<Vec<_>>();

        assert!(p.matches(&q("api.service.prod")));
        assert!(p.matches(&q("API.anything.PROD")));
        assert!(!p.matches(&q("web.service.prod")));
        assert!(!p.matches(&q("api.service.staging")));
        assert!(!p.matches(&q("api.prod")));
    }

    #[test]
    fn test_tier1_exact_beats_wildcard() {
        let exact = pattern(1, "api.service.prod.example.com");
        let wild = pattern(2, "*.service.prod.example.com");
        assert_eq!(exact.precedence(&wild), Ordering::Less);
        assert_eq!(wild.precedence(&exact), Ordering::Greater);
    }

    #[test]
    fn test_tier2_more_exact_labels_win() {
        let one_star = pattern(1, "*.service.prod.example.com");
        let two_star = pattern(2, "*.*.prod.example.com");
        assert_eq!(one_star.precedence(&two_star), Ordering::Less);
    }

    #[test]
    fn test_tier3_leftmost_exact_wins() {
        // For api.service.prod.example.com both patterns have two exact
        // labels; api.*.prod is exact at position 0 and wins.
        let p1 = pattern(1, "*.service.prod.example.com");
        let p2 = pattern(2, "api.*.prod.example.com");
        assert_eq!(p2.precedence(&p1), Ordering::Less);
        assert_eq!(p1.precedence(&p2), Ordering::Greater);
    }

    #[test]
    fn test_apex_pattern_has_no_labels() {
        let p = pattern(1, "example.com");
        assert!(p.labels.is_empty());
        assert!(p.is_exact());
        assert!(p.matches(&[]));
        assert!(!p.matches(&["www".to_string()]));
    }
}
