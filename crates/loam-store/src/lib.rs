//! # Loam record store
//!
//! Durable storage for DNS records behind the [`RecordStore`] trait.
//!
//! Two backends ship with loam: [`RedbStore`], an embedded ACID store used
//! in production, and [`MemoryStore`] for tests and development. The tiered
//! cache facade in `loam-cache` implements the same trait, so callers are
//! indifferent to whether they talk to a cache stack or a bare backend.

use async_trait::async_trait;
use loam_model::{DnsRecord, LookupQuery, ModelError, RecordType};
use thiserror::Error;

pub mod memory;
pub mod redb_store;

pub use memory::MemoryStore;
pub use redb_store::RedbStore;

/// Storage errors.
///
/// An empty lookup result is not an error; `NotFound` is reserved for
/// mutations addressing a record that does not exist.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The record failed validation.
    #[error("invalid record: {0}")]
    Invalid(#[from] ModelError),

    /// A mutation addressed a missing record.
    #[error("record not found: {what}")]
    NotFound {
        /// Description of what was looked for.
        what: String,
    },

    /// The backend failed; retryable.
    #[error("storage backend error: {message}")]
    Backend {
        /// Description of the failure.
        message: String,
    },

    /// Underlying I/O failure; retryable.
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    /// Creates a backend error.
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
        }
    }

    /// True if retrying the operation may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Backend { .. } | Self::Io(_))
    }
}

/// Result type alias for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Contract for DNS record storage.
///
/// `lookup_group` is the read path's workhorse: all records at the minimum
/// priority for the queried (name, type), id-ordered, observed from one
/// consistent snapshot.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Returns the minimum-priority record group for the query, ordered by
    /// ascending id. Empty when the name/type has no records.
    async fn lookup_group(&self, query: &LookupQuery) -> Result<Vec<DnsRecord>>;

    /// Returns all records for the query, ordered by (priority, id).
    async fn lookup_all(&self, query: &LookupQuery) -> Result<Vec<DnsRecord>>;

    /// Fetches a single record by id.
    async fn lookup_by_id(&self, id: i64) -> Result<Option<DnsRecord>>;

    /// Validates, normalizes, and stores a new record, assigning its id and
    /// timestamps.
    async fn create(&self, record: &mut DnsRecord) -> Result<()>;

    /// Validates, normalizes, and rewrites an existing record.
    async fn update(&self, record: &DnsRecord) -> Result<()>;

    /// Deletes a record by id, returning the removed record so callers can
    /// invalidate derived state.
    async fn delete(&self, id: i64) -> Result<DnsRecord>;

    /// Deletes all records for a name, optionally restricted to one type.
    /// Returns the number of records removed.
    async fn delete_name_type(&self, name: &str, rtype: Option<RecordType>) -> Result<u64>;

    /// Returns every stored wildcard pattern record.
    async fn list_wildcards(&self) -> Result<Vec<DnsRecord>>;

    /// Verifies the backend is reachable and consistent.
    async fn health(&self) -> Result<()>;
}

/// Orders records by (priority asc, id asc); the canonical answer order.
pub fn sort_records(records: &mut [DnsRecord]) {
    records.sort_by(|a, b| a.priority.cmp(&b.priority).then(a.id.cmp(&b.id)));
}

/// Reduces an ordered record list to its minimum-priority group.
///
/// Input must already be `(priority, id)`-sorted.
pub fn min_priority_group(records: Vec<DnsRecord>) -> Vec<DnsRecord> {
    let Some(min) = records.first().map(|r| r.priority) else {
        return Vec::new();
    };
    records.into_iter().take_while(|r| r.priority == min).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: i64, priority: u32) -> DnsRecord {
        let mut r = DnsRecord::new("x.example.com", RecordType::A, "10.0.0.1", 300);
        r.id = id;
        r.priority = priority;
        r
    }

    #[test]
    fn test_sort_and_group() {
        let mut records = vec![record(3, 20), record(2, 10), record(1, 10)];
        sort_records(&mut records);
        assert_eq!(
            records.iter().map(|r| r.id).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );

        let group = min_priority_group(records);
        assert_eq!(group.len(), 2);
        assert!(group.iter().all(|r| r.priority == 10));
    }

    #[test]
    fn test_empty_group() {
        assert!(min_priority_group(Vec::new()).is_empty());
    }
}
