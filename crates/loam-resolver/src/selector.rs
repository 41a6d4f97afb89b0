//! Priority tie-break selection.
//!
//! Record groups share the minimum priority; for single-answer query types
//! one member must be chosen deterministically. Both policies derive the
//! index from a stable stateless hash of the query plus a time bucket, so
//! every thread and every replica picks the same member within a bucket
//! and rotation happens across buckets.

use loam_model::{DnsRecord, LookupQuery};
use std::time::{SystemTime, UNIX_EPOCH};

/// Selection policy; one choice per process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SelectorPolicy {
    /// Rotate through the group on a short time bucket.
    #[default]
    RoundRobin,
    /// Pseudo-random pick, reseeded every five minutes.
    Random,
}

impl std::str::FromStr for SelectorPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "round_robin" | "round-robin" | "roundrobin" => Ok(Self::RoundRobin),
            "random" => Ok(Self::Random),
            other => Err(format!(
                "unknown selector policy {other:?} (expected round_robin or random)"
            )),
        }
    }
}

/// Seed bucket for the random policy, in seconds.
const RANDOM_BUCKET_SECS: u64 = 300;

/// Deterministic group selector.
#[derive(Debug, Clone, Copy)]
pub struct Selector {
    policy: SelectorPolicy,
    /// Round-robin bucket width in seconds.
    bucket_secs: u64,
}

impl Selector {
    /// Creates a selector.
    pub fn new(policy: SelectorPolicy, bucket_secs: u64) -> Self {
        Self {
            policy,
            bucket_secs: bucket_secs.max(1),
        }
    }

    /// Returns the configured policy.
    pub fn policy(&self) -> SelectorPolicy {
        self.policy
    }

    /// Picks one record from a `(priority, id)`-ordered group using the
    /// current time.
    pub fn select<'a>(&self, records: &'a [DnsRecord], query: &LookupQuery) -> Option<&'a DnsRecord> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        self.select_at(records, query, now)
    }

    /// Picks one record at an explicit epoch second; two calls with the
    /// same arguments in the same bucket return the same record.
    pub fn select_at<'a>(
        &self,
        records: &'a [DnsRecord],
        query: &LookupQuery,
        now_epoch_secs: u64,
    ) -> Option<&'a DnsRecord> {
        match records.len() {
            0 => None,
            1 => Some(&records[0]),
            n => {
                let index = self.index_at(query, n, now_epoch_secs);
                Some(&records[index])
            }
        }
    }

    /// The selected index for a group of size `n` (n ≥ 1).
    pub fn index_at(&self, query: &LookupQuery, n: usize, now_epoch_secs: u64) -> usize {
        let hash = fnv1a64(query.fingerprint().as_bytes());
        match self.policy {
            SelectorPolicy::RoundRobin => {
                let bucket = now_epoch_secs / self.bucket_secs;
                (hash.wrapping_add(bucket) % n as u64) as usize
            }
            SelectorPolicy::Random => {
                let bucket = now_epoch_secs / RANDOM_BUCKET_SECS;
                let seed = hash ^ splitmix64(bucket);
                (splitmix64(seed) % n as u64) as usize
            }
        }
    }
}

/// FNV-1a 64-bit: stable across platforms and processes, no state.
fn fnv1a64(data: &[u8]) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;
    let mut hash = OFFSET;
    for &byte in data {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(PRIME);
    }
    hash
}

/// One splitmix64 mixing step.
fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9e37_79b9_7f4a_7c15);
    x = (x ^ (x >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    x = (x ^ (x >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    x ^ (x >> 31)
}
