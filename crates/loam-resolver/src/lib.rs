//! # Loam resolver
//!
//! Maps a DNS question to its answer set: direct lookups with tie-break
//! selection, multi-answer types, SOA zone-apex walking, and the wildcard
//! fallback for types that support it.

use loam_model::{DnsRecord, LookupQuery, RecordType};
use loam_store::{RecordStore, StoreError};
use loam_wildcard::WildcardEngine;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tracing::{debug, trace};

pub mod selector;

pub use selector::{Selector, SelectorPolicy};

/// Resolution errors.
#[derive(Error, Debug)]
pub enum ResolveError {
    /// The store (or a tier in front of it) failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// Result type alias for resolution.
pub type Result<T> = std::result::Result<T, ResolveError>;

/// The outcome of resolving a query.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// One or more answer records.
    Answered(Vec<DnsRecord>),
    /// No answer at either the exact or wildcard level.
    NotFound,
}

impl Resolution {
    /// Returns the answer records, empty for `NotFound`.
    pub fn records(&self) -> &[DnsRecord] {
        match self {
            Resolution::Answered(records) => records,
            Resolution::NotFound => &[],
        }
    }
}

/// Resolver configuration.
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// Selection policy for single-answer types.
    pub policy: SelectorPolicy,
    /// Round-robin bucket width in seconds.
    pub bucket_secs: u64,
    /// Record types eligible for the wildcard fallback.
    pub wildcard_types: Vec<RecordType>,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            policy: SelectorPolicy::RoundRobin,
            bucket_secs: 5,
            wildcard_types: vec![
                RecordType::A,
                RecordType::Aaaa,
                RecordType::Cname,
                RecordType::Txt,
            ],
        }
    }
}

/// Per-query-type resolution over the record store and wildcard engine.
pub struct Resolver {
    store: Arc<dyn RecordStore>,
    engine: Option<Arc<WildcardEngine>>,
    selector: Selector,
    wildcard_types: HashSet<RecordType>,
}

impl Resolver {
    /// Creates a resolver. Passing no engine disables the wildcard
    /// fallback.
    pub fn new(
        store: Arc<dyn RecordStore>,
        engine: Option<Arc<WildcardEngine>>,
        config: &ResolverConfig,
    ) -> Self {
        Self {
            store,
            engine,
            selector: Selector::new(config.policy, config.bucket_secs),
            wildcard_types: config.wildcard_types.iter().copied().collect(),
        }
    }

    /// Resolves a query at the current time.
    pub async fn resolve(&self, query: &LookupQuery) -> Result<Resolution> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        self.resolve_at(query, now).await
    }

    /// Resolves a query at an explicit epoch second; the time only feeds
    /// the rotation bucket, so answers are reproducible in tests.
    pub async fn resolve_at(&self, query: &LookupQuery, now_epoch_secs: u64) -> Result<Resolution> {
        match query.rtype {
            RecordType::Soa => self.resolve_soa(query).await,
            RecordType::Mx | RecordType::Ns | RecordType::Srv => {
                let records = self.store.lookup_all(query).await?;
                if records.is_empty() {
                    Ok(Resolution::NotFound)
                } else {
                    Ok(Resolution::Answered(records))
                }
            }
            _ => self.resolve_single(query, now_epoch_secs).await,
        }
    }

    /// Single-answer path: group lookup, selector reduction, wildcard
    /// fallback.
    async fn resolve_single(&self, query: &LookupQuery, now: u64) -> Result<Resolution> {
        let group = self.store.lookup_group(query).await?;
        if let Some(record) = self.selector.select_at(&group, query, now) {
            trace!(%query, id = record.id, "answered from record group");
            return Ok(Resolution::Answered(vec![record.clone()]));
        }

        if self.wildcard_types.contains(&query.rtype) {
            if let Some(resolution) = self.resolve_wildcard(query).await? {
                return Ok(resolution);
            }
        }

        Ok(Resolution::NotFound)
    }

    /// Wildcard fallback: consult the engine, fetch the winning pattern's
    /// payload, and present it under the query name.
    async fn resolve_wildcard(&self, query: &LookupQuery) -> Result<Option<Resolution>> {
        let Some(engine) = &self.engine else {
            return Ok(None);
        };
        let Some(winner) = engine.match_name(&query.name) else {
            return Ok(None);
        };

        let Some(payload) = self.store.lookup_by_id(winner.payload_id).await? else {
            debug!(pattern = %winner.text(), payload_id = winner.payload_id,
                "wildcard pattern references a missing payload record");
            return Ok(None);
        };
        if payload.rtype != query.rtype {
            return Ok(None);
        }

        debug!(%query, pattern = %winner.text(), "answered from wildcard pattern");
        let mut answer = payload;
        answer.name = query.name.clone();
        Ok(Some(Resolution::Answered(vec![answer])))
    }

    /// SOA resolution: walk the suffix hierarchy from most to least
    /// specific and present the first SOA found as applying to the queried
    /// name.
    async fn resolve_soa(&self, query: &LookupQuery) -> Result<Resolution> {
        for suffix in suffix_hierarchy(&query.name) {
            let soa_query = LookupQuery::new(&suffix, RecordType::Soa);
            let group = self.store.lookup_group(&soa_query).await?;
            if let Some(record) = group.first() {
                let mut answer = record.clone();
                answer.name = query.name.clone();
                return Ok(Resolution::Answered(vec![answer]));
            }
        }
        Ok(Resolution::NotFound)
    }
}

/// All suffixes of a name from most-specific to least-specific:
/// `www.test.internal` → `[www.test.internal, test.internal, internal]`.
fn suffix_hierarchy(name: &str) -> Vec<String> {
    let name = loam_model::normalize_name(name);
    if name.is_empty() {
        return Vec::new();
    }
    let labels: Vec<&str> = name.split('.').collect();
    (0..labels.len()).map(|i| labels[i..].join(".")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use loam_model::DnsRecord;
    use loam_store::MemoryStore;
    use loam_wildcard::{PublicSuffixList, WildcardPattern};

    async fn seed(store: &MemoryStore, record: DnsRecord) -> DnsRecord {
        let mut record = record;
        store.create(&mut record).await.unwrap();
        record
    }

    fn resolver(store: Arc<MemoryStore>) -> Resolver {
        Resolver::new(store, None, &ResolverConfig::default())
    }

    #[test]
    fn test_suffix_hierarchy() {
        assert_eq!(
            suffix_hierarchy("www.test.internal"),
            vec!["www.test.internal", "test.internal", "internal"]
        );
        assert_eq!(suffix_hierarchy("internal"), vec!["internal"]);
    }

    #[tokio::test]
    async fn test_priority_tie_round_robin() {
        let store = Arc::new(MemoryStore::new());
        for (target, priority) in [
            ("10.0.2.20", 10),
            ("10.0.2.21", 10),
            ("10.0.2.22", 10),
            ("10.0.2.30", 20),
        ] {
            seed(
                &store,
                DnsRecord::new("priority-test.internal", RecordType::A, target, 300)
                    .with_priority(priority),
            )
            .await;
        }
        let resolver = resolver(store);
        let query = LookupQuery::new("priority-test.internal", RecordType::A);

        // Within one bucket: one and the same address, never the pri=20 one.
        let base = 1_700_000_000 - (1_700_000_000 % 5);
        let first = resolver.resolve_at(&query, base).await.unwrap();
        let first_target = first.records()[0].target.clone();
        assert_ne!(first_target, "10.0.2.30");
        for offset in 1..5 {
            let again = resolver.resolve_at(&query, base + offset).await.unwrap();
            assert_eq!(again.records()[0].target, first_target);
        }
    }

    #[tokio::test]
    async fn test_mx_returns_full_ordered_group() {
        let store = Arc::new(MemoryStore::new());
        seed(
            &store,
            DnsRecord::new("test.internal", RecordType::Mx, "mail2.test.internal", 300)
                .with_priority(20),
        )
        .await;
        seed(
            &store,
            DnsRecord::new("test.internal", RecordType::Mx, "mail.test.internal", 300)
                .with_priority(10),
        )
        .await;

        let resolver = resolver(store);
        let query = LookupQuery::new("test.internal", RecordType::Mx);
        let resolution = resolver.resolve_at(&query, 0).await.unwrap();
        let records = resolution.records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].target, "mail.test.internal");
        assert_eq!(records[1].target, "mail2.test.internal");
    }

    #[tokio::test]
    async fn test_soa_hierarchy_walk_rewrites_name() {
        let store = Arc::new(MemoryStore::new());
        let mut soa = DnsRecord::new("test.internal", RecordType::Soa, "ns1.test.internal", 3600);
        soa.mbox = "hostmaster.test.internal".to_string();
        soa.serial = 1;
        seed(&store, soa).await;

        let resolver = resolver(store);
        let query = LookupQuery::new("api.v1.test.internal", RecordType::Soa);
        let resolution = resolver.resolve_at(&query, 0).await.unwrap();
        let records = resolution.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "api.v1.test.internal");
        assert_eq!(records[0].target, "ns1.test.internal");
    }

    #[tokio::test]
    async fn test_soa_no_ancestor_not_found() {
        let store = Arc::new(MemoryStore::new());
        let resolver = resolver(store);
        let query = LookupQuery::new("nowhere.example", RecordType::Soa);
        assert_eq!(
            resolver.resolve_at(&query, 0).await.unwrap(),
            Resolution::NotFound
        );
    }

    #[tokio::test]
    async fn test_not_found() {
        let store = Arc::new(MemoryStore::new());
        let resolver = resolver(store);
        let query = LookupQuery::new("missing.test.internal", RecordType::A);
        assert_eq!(
            resolver.resolve_at(&query, 0).await.unwrap(),
            Resolution::NotFound
        );
    }

    #[tokio::test]
    async fn test_wildcard_fallback() {
        let store = Arc::new(MemoryStore::new());
        let payload = seed(
            &store,
            DnsRecord::new("*.prod.example.com", RecordType::A, "10.9.9.9", 300),
        )
        .await;

        let psl = Arc::new(PublicSuffixList::builtin());
        let engine = Arc::new(WildcardEngine::new(psl));
        engine
            .insert(
                WildcardPattern::from_name(
                    payload.id,
                    payload.id,
                    "*.prod.example.com",
                    engine.psl(),
                )
                .unwrap(),
            )
            .unwrap();

        let resolver = Resolver::new(store, Some(engine), &ResolverConfig::default());

        // Exact lookup is empty; the wildcard pattern answers under the
        // query name.
        let query = LookupQuery::new("api.prod.example.com", RecordType::A);
        let resolution = resolver.resolve_at(&query, 0).await.unwrap();
        let records = resolution.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "api.prod.example.com");
        assert_eq!(records[0].target, "10.9.9.9");

        // A type outside the wildcard set gets no fallback.
        let mx_query = LookupQuery::new("api.prod.example.com", RecordType::Mx);
        assert_eq!(
            resolver.resolve_at(&mx_query, 0).await.unwrap(),
            Resolution::NotFound
        );
    }

    #[tokio::test]
    async fn test_wildcard_type_mismatch_is_not_found() {
        let store = Arc::new(MemoryStore::new());
        let payload = seed(
            &store,
            DnsRecord::new("*.prod.example.com", RecordType::A, "10.9.9.9", 300),
        )
        .await;

        let engine = Arc::new(WildcardEngine::new(Arc::new(PublicSuffixList::builtin())));
        engine
            .insert(
                WildcardPattern::from_name(
                    payload.id,
                    payload.id,
                    "*.prod.example.com",
                    engine.psl(),
                )
                .unwrap(),
            )
            .unwrap();

        let resolver = Resolver::new(store, Some(engine), &ResolverConfig::default());
        // TXT is wildcard-eligible, but the payload is an A record.
        let query = LookupQuery::new("api.prod.example.com", RecordType::Txt);
        assert_eq!(
            resolver.resolve_at(&query, 0).await.unwrap(),
            Resolution::NotFound
        );
    }

    #[tokio::test]
    async fn test_exact_match_beats_wildcard() {
        let store = Arc::new(MemoryStore::new());
        seed(
            &store,
            DnsRecord::new("api.prod.example.com", RecordType::A, "10.1.1.1", 300),
        )
        .await;
        let payload = seed(
            &store,
            DnsRecord::new("*.prod.example.com", RecordType::A, "10.9.9.9", 300),
        )
        .await;

        let engine = Arc::new(WildcardEngine::new(Arc::new(PublicSuffixList::builtin())));
        engine
            .insert(
                WildcardPattern::from_name(
                    payload.id,
                    payload.id,
                    "*.prod.example.com",
                    engine.psl(),
                )
                .unwrap(),
            )
            .unwrap();

        let resolver = Resolver::new(store, Some(engine), &ResolverConfig::default());
        let query = LookupQuery::new("api.prod.example.com", RecordType::A);
        let resolution = resolver.resolve_at(&query, 0).await.unwrap();
        // The direct record wins; the engine is never consulted.
        assert_eq!(resolution.records()[0].target, "10.1.1.1");
    }
}
