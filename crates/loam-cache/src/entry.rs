//! Cache entries.

use loam_model::DnsRecord;
use std::time::{Duration, Instant};

/// A cached record group with its expiry and access bookkeeping.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// The cached record group.
    pub records: Vec<DnsRecord>,
    /// Absolute expiry time.
    pub expires_at: Instant,
    /// Last access, maintained on hits.
    pub last_access: Instant,
}

impl CacheEntry {
    /// Creates an entry expiring `ttl` from now.
    pub fn new(records: Vec<DnsRecord>, ttl: Duration) -> Self {
        let now = Instant::now();
        Self {
            records,
            expires_at: now + ttl,
            last_access: now,
        }
    }

    /// True if the entry has expired at `now`.
    #[inline]
    pub fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }

    /// Marks the entry accessed.
    #[inline]
    pub fn touch(&mut self, now: Instant) {
        self.last_access = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expiry() {
        let entry = CacheEntry::new(Vec::new(), Duration::from_secs(10));
        let now = Instant::now();
        assert!(!entry.is_expired(now));
        assert!(entry.is_expired(now + Duration::from_secs(11)));
    }

    #[test]
    fn test_zero_ttl_expires_immediately() {
        let entry = CacheEntry::new(Vec::new(), Duration::ZERO);
        assert!(entry.is_expired(Instant::now()));
    }
}
