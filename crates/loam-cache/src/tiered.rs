//! The tiered cache facade.
//!
//! [`TieredStore`] presents the [`RecordStore`] contract over L1 → L2 → the
//! durable store. Reads populate the tiers on their way back out; writes go
//! to the store first and then invalidate L2 before L1, so a racing reader
//! cannot repopulate L1 from stale L2 data.

use crate::key::CacheKey;
use crate::l1::LocalCache;
use crate::l2::RemoteCache;
use async_trait::async_trait;
use loam_model::{DnsRecord, LookupQuery, RecordType};
use loam_store::{RecordStore, Result, StoreError};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Which tier answered a lookup.
///
/// This is the facade's explicit capability surface: callers that care
/// about provenance use [`TieredStore::lookup_group_with_source`]; nothing
/// downcasts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupSource {
    /// Served from the in-process cache.
    Local,
    /// Served from the shared remote cache.
    Remote,
    /// Served from the durable store.
    Store,
}

/// Read-through, write-invalidate facade over the cache tiers.
pub struct TieredStore {
    l1: Option<Arc<LocalCache>>,
    l2: Option<Arc<RemoteCache>>,
    store: Arc<dyn RecordStore>,
}

impl TieredStore {
    /// Creates the facade. Either cache tier may be absent; with both
    /// disabled every read goes straight to the store.
    pub fn new(
        l1: Option<Arc<LocalCache>>,
        l2: Option<Arc<RemoteCache>>,
        store: Arc<dyn RecordStore>,
    ) -> Self {
        Self { l1, l2, store }
    }

    /// Returns the L1 tier, if enabled.
    pub fn l1(&self) -> Option<&Arc<LocalCache>> {
        self.l1.as_ref()
    }

    /// Returns the L2 tier, if enabled.
    pub fn l2(&self) -> Option<&Arc<RemoteCache>> {
        self.l2.as_ref()
    }

    /// L1 TTL: a tenth of the record TTL.
    fn l1_ttl(ttl: u32) -> Duration {
        Duration::from_secs(u64::from(ttl / 10))
    }

    /// L2 TTL: half of the record TTL.
    fn l2_ttl(ttl: u32) -> Duration {
        Duration::from_secs(u64::from(ttl / 2))
    }

    /// `lookup_group` that also reports which tier answered.
    pub async fn lookup_group_with_source(
        &self,
        query: &LookupQuery,
    ) -> Result<(Vec<DnsRecord>, LookupSource)> {
        let key = CacheKey::from_query(query);

        if let Some(l1) = &self.l1 {
            if let Some(records) = l1.get(&key) {
                if !records.is_empty() {
                    return Ok((records, LookupSource::Local));
                }
            }
        }

        if let Some(l2) = &self.l2 {
            match l2.get(&l2.namespaced(key.as_str())).await {
                Ok(Some(payload)) => match serde_json::from_slice::<Vec<DnsRecord>>(&payload) {
                    Ok(records) if !records.is_empty() => {
                        if let Some(l1) = &self.l1 {
                            l1.insert(key, records.clone(), Self::l1_ttl(records[0].ttl));
                        }
                        return Ok((records, LookupSource::Remote));
                    }
                    Ok(_) => {}
                    Err(e) => {
                        debug!(key = %key, error = %e, "discarding undecodable L2 payload");
                    }
                },
                Ok(None) => {}
                Err(e) => {
                    // L2 trouble degrades to the store; it never fails a read.
                    debug!(key = %key, error = %e, "L2 lookup failed, falling through");
                }
            }
        }

        let records = self.store.lookup_group(query).await?;
        if records.is_empty() {
            // Negative answers are not cached.
            return Ok((records, LookupSource::Store));
        }

        let ttl = records[0].ttl;
        if let Some(l2) = &self.l2 {
            match serde_json::to_vec(&records) {
                Ok(payload) => {
                    if let Err(e) = l2
                        .set(&l2.namespaced(key.as_str()), &payload, Self::l2_ttl(ttl))
                        .await
                    {
                        debug!(key = %key, error = %e, "L2 populate failed");
                    }
                }
                Err(e) => debug!(key = %key, error = %e, "L2 encode failed"),
            }
        }
        if let Some(l1) = &self.l1 {
            l1.insert(key, records.clone(), Self::l1_ttl(ttl));
        }

        Ok((records, LookupSource::Store))
    }

    /// Invalidates one fingerprint at L2 then L1.
    async fn invalidate_fingerprint(&self, fingerprint: &str) {
        if let Some(l2) = &self.l2 {
            if let Err(e) = l2.delete(&[l2.namespaced(fingerprint)]).await {
                debug!(key = fingerprint, error = %e, "L2 invalidation failed");
            }
        }
        if let Some(l1) = &self.l1 {
            l1.remove(&CacheKey::from_fingerprint(fingerprint));
        }
    }

    /// Invalidates a (name, type) pair.
    async fn invalidate(&self, name: &str, rtype: RecordType) {
        self.invalidate_fingerprint(&LookupQuery::new(name, rtype).fingerprint())
            .await;
    }

    /// Invalidates every materialized type for a name: the enumerated
    /// common set, then a scan-based sweep for anything else.
    async fn invalidate_name(&self, name: &str) {
        for rtype in RecordType::COMMON {
            self.invalidate(name, rtype).await;
        }

        if let Some(l2) = &self.l2 {
            let prefix = l2.namespaced(&format!("{name}:"));
            match l2.scan(&prefix).await {
                Ok(keys) if !keys.is_empty() => {
                    if let Err(e) = l2.delete(&keys).await {
                        debug!(name, error = %e, "L2 scan-delete failed");
                    }
                }
                Ok(_) => {}
                Err(e) => debug!(name, error = %e, "L2 scan failed"),
            }
        }
        if let Some(l1) = &self.l1 {
            l1.remove_name(name);
        }
    }
}

#[async_trait]
impl RecordStore for TieredStore {
    async fn lookup_group(&self, query: &LookupQuery) -> Result<Vec<DnsRecord>> {
        self.lookup_group_with_source(query)
            .await
            .map(|(records, _)| records)
    }

    /// Full-list lookups bypass the caches; only groups are materialized.
    async fn lookup_all(&self, query: &LookupQuery) -> Result<Vec<DnsRecord>> {
        self.store.lookup_all(query).await
    }

    async fn lookup_by_id(&self, id: i64) -> Result<Option<DnsRecord>> {
        self.store.lookup_by_id(id).await
    }

    async fn create(&self, record: &mut DnsRecord) -> Result<()> {
        self.store.create(record).await?;
        self.invalidate(&record.name, record.rtype).await;
        Ok(())
    }

    async fn update(&self, record: &DnsRecord) -> Result<()> {
        self.store.update(record).await?;
        self.invalidate(&record.name, record.rtype).await;
        Ok(())
    }

    async fn delete(&self, id: i64) -> Result<DnsRecord> {
        // The store hands back the removed record, which carries the
        // (name, type) this facade needs for the invalidation key.
        let removed = self.store.delete(id).await?;
        self.invalidate(&removed.name, removed.rtype).await;
        Ok(removed)
    }

    async fn delete_name_type(&self, name: &str, rtype: Option<RecordType>) -> Result<u64> {
        let removed = self.store.delete_name_type(name, rtype).await?;
        let name = loam_model::normalize_name(name);
        match rtype {
            Some(rtype) => self.invalidate(&name, rtype).await,
            None => self.invalidate_name(&name).await,
        }
        Ok(removed)
    }

    async fn list_wildcards(&self) -> Result<Vec<DnsRecord>> {
        self.store.list_wildcards().await
    }

    async fn health(&self) -> Result<()> {
        self.store.health().await?;
        if let Some(l2) = &self.l2 {
            l2.ping()
                .await
                .map_err(|e| StoreError::backend(format!("L2 health: {e}")))?;
        }
        Ok(())
    }
}
