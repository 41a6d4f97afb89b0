//! # Loam tiered cache
//!
//! The cache stack in front of the record store:
//!
//! - **L1** ([`LocalCache`]): per-process bounded LRU with TTL entries.
//! - **L2** ([`RemoteCache`]): shared RESP-protocol cache (Redis wire
//!   compatible), optional.
//! - **Facade** ([`TieredStore`]): presents the `RecordStore` contract,
//!   populating tiers on read misses and fanning out invalidation on
//!   writes.
//!
//! TTLs are derived from the record group's semantic TTL: one tenth at L1,
//! one half at L2, so an entry never outlives the record it caches.

use thiserror::Error;

pub mod entry;
pub mod key;
pub mod l1;
pub mod l2;
pub mod tiered;

pub use entry::CacheEntry;
pub use key::CacheKey;
pub use l1::{LocalCache, LocalCacheConfig, StatsSnapshot};
pub use l2::{RemoteCache, RemoteCacheConfig};
pub use tiered::{LookupSource, TieredStore};

/// Cache-layer errors.
///
/// These never surface past the tiered facade on the read path; an L2
/// failure degrades to the next tier.
#[derive(Error, Debug)]
pub enum CacheError {
    /// The remote cache is unreachable or refused the operation.
    #[error("remote cache unavailable: {message}")]
    Unavailable {
        /// Description of the failure.
        message: String,
    },

    /// The remote cache answered with a protocol error.
    #[error("remote cache protocol error: {message}")]
    Protocol {
        /// Description of the failure.
        message: String,
    },

    /// A cached payload failed to decode.
    #[error("cache payload decode error: {0}")]
    Decode(#[from] serde_json::Error),

    /// The operation exceeded its deadline.
    #[error("remote cache operation timed out")]
    Timeout,

    /// Underlying I/O failure.
    #[error("remote cache I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CacheError {
    /// Creates an `Unavailable` error.
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }

    /// Creates a `Protocol` error.
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }
}

/// Result type alias for cache operations.
pub type Result<T> = std::result::Result<T, CacheError>;
