//! Cache keys.

use loam_model::LookupQuery;
use std::fmt;

/// A cache key: the query fingerprint `"{normalized_name}:{TYPE}"`.
///
/// L1 uses the fingerprint as-is; L2 prepends its namespace prefix.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Computes the key for a query.
    pub fn from_query(query: &LookupQuery) -> Self {
        Self(query.fingerprint())
    }

    /// Builds a key from a precomputed fingerprint.
    pub fn from_fingerprint(fingerprint: impl Into<String>) -> Self {
        Self(fingerprint.into())
    }

    /// Returns the fingerprint string.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True if this key belongs to `name` (any record type).
    pub fn is_for_name(&self, name: &str) -> bool {
        self.0
            .strip_prefix(name)
            .is_some_and(|rest| rest.starts_with(':'))
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
