//! In-memory record store for tests and development.

use crate::{min_priority_group, sort_records, RecordStore, Result, StoreError};
use async_trait::async_trait;
use chrono::Utc;
use loam_model::{DnsRecord, LookupQuery, RecordType};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// Non-durable record store.
///
/// Tracks how many lookups reached it, which cache tests use to prove the
/// tiers in front are actually absorbing reads.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
    lookups: AtomicU64,
}

#[derive(Default)]
struct Inner {
    records: BTreeMap<i64, DnsRecord>,
    next_id: i64,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of lookup_group/lookup_all calls that reached this store.
    pub fn lookup_count(&self) -> u64 {
        self.lookups.load(Ordering::Relaxed)
    }

    fn matching(&self, query: &LookupQuery) -> Vec<DnsRecord> {
        self.inner
            .lock()
            .records
            .values()
            .filter(|r| r.name == query.name && r.rtype == query.rtype)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn lookup_group(&self, query: &LookupQuery) -> Result<Vec<DnsRecord>> {
        self.lookups.fetch_add(1, Ordering::Relaxed);
        let mut records = self.matching(query);
        sort_records(&mut records);
        Ok(min_priority_group(records))
    }

    async fn lookup_all(&self, query: &LookupQuery) -> Result<Vec<DnsRecord>> {
        self.lookups.fetch_add(1, Ordering::Relaxed);
        let mut records = self.matching(query);
        sort_records(&mut records);
        Ok(records)
    }

    async fn lookup_by_id(&self, id: i64) -> Result<Option<DnsRecord>> {
        Ok(self.inner.lock().records.get(&id).cloned())
    }

    async fn create(&self, record: &mut DnsRecord) -> Result<()> {
        record.normalize();
        record.validate()?;

        let mut inner = self.inner.lock();
        inner.next_id += 1;
        record.id = inner.next_id;
        let now = Utc::now();
        record.created_at = now;
        record.updated_at = now;
        inner.records.insert(record.id, record.clone());
        Ok(())
    }

    async fn update(&self, record: &DnsRecord) -> Result<()> {
        let mut record = record.clone();
        record.normalize();
        record.validate()?;
        record.updated_at = Utc::now();

        let mut inner = self.inner.lock();
        if !inner.records.contains_key(&record.id) {
            return Err(StoreError::NotFound {
                what: format!("record id {}", record.id),
            });
        }
        inner.records.insert(record.id, record);
        Ok(())
    }

    async fn delete(&self, id: i64) -> Result<DnsRecord> {
        self.inner
            .lock()
            .records
            .remove(&id)
            .ok_or_else(|| StoreError::NotFound {
                what: format!("record id {id}"),
            })
    }

    async fn delete_name_type(&self, name: &str, rtype: Option<RecordType>) -> Result<u64> {
        let name = loam_model::normalize_name(name);
        let mut inner = self.inner.lock();
        let doomed: Vec<i64> = inner
            .records
            .values()
            .filter(|r| r.name == name && rtype.map_or(true, |t| r.rtype == t))
            .map(|r| r.id)
            .collect();
        for id in &doomed {
            inner.records.remove(id);
        }
        if doomed.is_empty() {
            return Err(StoreError::NotFound {
                what: format!("records for {name} {rtype:?}"),
            });
        }
        Ok(doomed.len() as u64)
    }

    async fn list_wildcards(&self) -> Result<Vec<DnsRecord>> {
        Ok(self
            .inner
            .lock()
            .records
            .values()
            .filter(|r| r.is_wildcard)
            .cloned()
            .collect())
    }

    async fn health(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_crud_roundtrip() {
        let store = MemoryStore::new();
        let mut record = DnsRecord::new("www.test.internal", RecordType::A, "10.0.0.1", 300);
        store.create(&mut record).await.unwrap();
        assert_eq!(record.id, 1);

        let query = LookupQuery::new("www.test.internal", RecordType::A);
        let group = store.lookup_group(&query).await.unwrap();
        assert_eq!(group.len(), 1);

        let removed = store.delete(record.id).await.unwrap();
        assert_eq!(removed.id, record.id);
        assert!(store.lookup_group(&query).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_lookup_counter() {
        let store = MemoryStore::new();
        let query = LookupQuery::new("x.test.internal", RecordType::A);
        let _ = store.lookup_group(&query).await.unwrap();
        let _ = store.lookup_all(&query).await.unwrap();
        assert_eq!(store.lookup_count(), 2);
    }

    #[tokio::test]
    async fn test_group_ordering() {
        let store = MemoryStore::new();
        for (target, priority) in [("10.0.2.30", 20), ("10.0.2.20", 10), ("10.0.2.21", 10)] {
            let mut record =
                DnsRecord::new("priority-test.internal", RecordType::A, target, 300)
                    .with_priority(priority);
            store.create(&mut record).await.unwrap();
        }

        let query = LookupQuery::new("priority-test.internal", RecordType::A);
        let group = store.lookup_group(&query).await.unwrap();
        assert_eq!(group.len(), 2);
        assert!(group[0].id < group[1].id);
        assert!(group.iter().all(|r| r.priority == 10));
    }
}
