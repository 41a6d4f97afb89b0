//! # Loam wildcard matching engine
//!
//! Positional nested wildcards over a bitmask representation. Patterns are
//! subdomain shapes below a registrable domain where each label is either a
//! literal or `*`; the engine filters candidates by `(etld, label count)`
//! and ranks survivors by a three-tier precedence rule.

use dashmap::DashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

pub mod pattern;
pub mod psl;

pub use pattern::{WildcardPattern, MAX_PATTERN_LABELS};
pub use psl::{NameParts, PublicSuffixList};

/// Wildcard engine errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WildcardError {
    /// A label mixes literals and `*`.
    #[error("partial wildcard labels are not supported: {label:?}")]
    PartialWildcard {
        /// The offending label.
        label: String,
    },

    /// The name has no registrable domain.
    #[error("name has no registrable domain: {name}")]
    NotRegistrable {
        /// The offending name.
        name: String,
    },

    /// More subdomain labels than the mask can express.
    #[error("pattern too deep: {labels} labels exceeds {MAX_PATTERN_LABELS}")]
    TooDeep {
        /// The offending depth.
        labels: usize,
    },

    /// An identical pattern is already registered.
    #[error("duplicate pattern: {text}")]
    Duplicate {
        /// Presentation form of the pattern.
        text: String,
    },
}

/// Result type alias for wildcard operations.
pub type Result<T> = std::result::Result<T, WildcardError>;

/// Pattern store and matcher.
///
/// Patterns are indexed by `(etld, label count)`; a query touches exactly
/// one bucket.
pub struct WildcardEngine {
    psl: Arc<PublicSuffixList>,
    index: DashMap<(String, usize), Vec<Arc<WildcardPattern>>>,
}

impl WildcardEngine {
    /// Creates an empty engine over the given suffix list.
    pub fn new(psl: Arc<PublicSuffixList>) -> Self {
        Self {
            psl,
            index: DashMap::new(),
        }
    }

    /// Returns the engine's suffix list.
    pub fn psl(&self) -> &Arc<PublicSuffixList> {
        &self.psl
    }

    /// Total number of registered patterns.
    pub fn len(&self) -> usize {
        self.index.iter().map(|bucket| bucket.value().len()).sum()
    }

    /// True if no patterns are registered.
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Registers a pattern. Duplicates (same etld, apex, and labels) are
    /// rejected and the existing pattern retained.
    pub fn insert(&self, pattern: WildcardPattern) -> Result<()> {
        let key = (pattern.etld.clone(), pattern.labels.len());
        let mut bucket = self.index.entry(key).or_default();

        if bucket
            .iter()
            .any(|existing| existing.apex == pattern.apex && existing.labels == pattern.labels)
        {
            warn!(pattern = %pattern.text(), "duplicate wildcard pattern ignored");
            return Err(WildcardError::Duplicate {
                text: pattern.text(),
            });
        }

        debug!(pattern = %pattern.text(), mask = pattern.mask, "wildcard pattern registered");
        bucket.push(Arc::new(pattern));
        Ok(())
    }

    /// Removes a pattern by id. Returns true if something was removed.
    pub fn remove(&self, id: i64) -> bool {
        let mut removed = false;
        self.index.retain(|_, bucket| {
            let before = bucket.len();
            bucket.retain(|p| p.id != id);
            removed |= bucket.len() < before;
            !bucket.is_empty()
        });
        removed
    }

    /// Drops all patterns.
    pub fn clear(&self) {
        self.index.clear();
    }

    /// Finds the winning pattern for a query name, if any.
    ///
    /// At most one winner exists: ties below tier 3 would require two
    /// distinct patterns whose exact labels both match the same query,
    /// which the position check excludes.
    pub fn match_name(&self, name: &str) -> Option<Arc<WildcardPattern>> {
        let parts = self.psl.split(name)?;
        self.match_parts(&parts)
    }

    /// Finds the winning pattern for pre-split name parts.
    pub fn match_parts(&self, parts: &NameParts) -> Option<Arc<WildcardPattern>> {
        let bucket = self.index.get(&(parts.etld.clone(), parts.labels.len()))?;

        bucket
            .iter()
            .filter(|p| p.apex.eq_ignore_ascii_case(&parts.apex))
            .filter(|p| p.matches(&parts.labels))
            .min_by(|a, b| a.precedence(b))
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> WildcardEngine {
        WildcardEngine::new(Arc::new(PublicSuffixList::builtin()))
    }

    fn add(engine: &WildcardEngine, id: i64, name: &str) {
        let pattern = WildcardPattern::from_name(id, id, name, engine.psl()).unwrap();
        engine.insert(pattern).unwrap();
    }

    #[test]
    fn test_leftmost_position_precedence() {
        // P1 *.service.prod and P2 api.*.prod under example.com; the query
        // api.service.prod.example.com matches both, and P2 wins at
        // position 0 where it is exact.
        let engine = engine();
        add(&engine, 1, "*.service.prod.example.com");
        add(&engine, 2, "api.*.prod.example.com");

        let winner = engine.match_name("api.service.prod.example.com").unwrap();
        assert_eq!(winner.id, 2);
    }

    #[test]
    fn test_exact_beats_wildcards() {
        let engine = engine();
        add(&engine, 1, "*.prod.example.com");
        add(&engine, 2, "api.prod.example.com");

        let winner = engine.match_name("api.prod.example.com").unwrap();
        assert_eq!(winner.id, 2);

        let winner = engine.match_name("web.prod.example.com").unwrap();
        assert_eq!(winner.id, 1);
    }

    #[test]
    fn test_fewer_stars_beat_more() {
        let engine = engine();
        add(&engine, 1, "*.*.example.com");
        add(&engine, 2, "*.prod.example.com");

        let winner = engine.match_name("api.prod.example.com").unwrap();
        assert_eq!(winner.id, 2);

        // Only the double star matches a different middle label.
        let winner = engine.match_name("api.staging.example.com").unwrap();
        assert_eq!(winner.id, 1);
    }

    #[test]
    fn test_label_count_must_match() {
        let engine = engine();
        add(&engine, 1, "*.prod.example.com");

        assert!(engine.match_name("a.b.prod.example.com").is_none());
        assert!(engine.match_name("prod.example.com").is_none());
    }

    #[test]
    fn test_apex_query_matches_only_apex_patterns() {
        let engine = engine();
        add(&engine, 1, "*.example.com");
        assert!(engine.match_name("example.com").is_none());
    }

    #[test]
    fn test_apex_isolation() {
        // Same etld and label count, different registrable domain.
        let engine = engine();
        add(&engine, 1, "*.prod.example.com");
        assert!(engine.match_name("api.prod.other.com").is_none());
    }

    #[test]
    fn test_duplicate_flagged() {
        let engine = engine();
        add(&engine, 1, "*.prod.example.com");
        let dup = WildcardPattern::from_name(2, 2, "*.prod.example.com", engine.psl()).unwrap();
        assert!(matches!(
            engine.insert(dup),
            Err(WildcardError::Duplicate { .. })
        ));
        assert_eq!(engine.len(), 1);
        // The original is retained.
        assert_eq!(engine.match_name("x.prod.example.com").unwrap().id, 1);
    }

    #[test]
    fn test_remove() {
        let engine = engine();
        add(&engine, 1, "*.prod.example.com");
        assert!(engine.remove(1));
        assert!(!engine.remove(1));
        assert!(engine.match_name("x.prod.example.com").is_none());
        assert!(engine.is_empty());
    }

    #[test]
    fn test_case_insensitive_matching() {
        let engine = engine();
        add(&engine, 1, "api.*.prod.example.com");
        let winner = engine.match_name("API.Service.PROD.example.com").unwrap();
        assert_eq!(winner.id, 1);
    }

    #[test]
    fn test_deterministic_winner() {
        let engine = engine();
        add(&engine, 1, "*.service.prod.example.com");
        add(&engine, 2, "api.*.prod.example.com");
        add(&engine, 3, "*.*.prod.example.com");

        for _ in 0..10 {
            let winner = engine.match_name("api.service.prod.example.com").unwrap();
            assert_eq!(winner.id, 2);
        }
    }
}
