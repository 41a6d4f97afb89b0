//! Server statistics.

use loam_proto::RecordType;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Atomic counters for the request orchestrator.
///
/// Updated with relaxed increments on the read path; never locked.
#[derive(Debug)]
pub struct ServerStats {
    start_time: Instant,

    /// Questions received.
    pub received: AtomicU64,
    /// Questions answered with at least one record.
    pub answered: AtomicU64,
    /// Questions with no answer (NXDOMAIN).
    pub not_found: AtomicU64,
    /// Questions that failed.
    pub errors: AtomicU64,

    // Per-type histogram.
    type_a: AtomicU64,
    type_aaaa: AtomicU64,
    type_cname: AtomicU64,
    type_txt: AtomicU64,
    type_mx: AtomicU64,
    type_ns: AtomicU64,
    type_soa: AtomicU64,
    type_ptr: AtomicU64,
    type_srv: AtomicU64,
    type_caa: AtomicU64,
    type_tlsa: AtomicU64,
    type_other: AtomicU64,
}

impl ServerStats {
    /// Creates zeroed statistics stamped with the start time.
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            received: AtomicU64::new(0),
            answered: AtomicU64::new(0),
            not_found: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            type_a: AtomicU64::new(0),
            type_aaaa: AtomicU64::new(0),
            type_cname: AtomicU64::new(0),
            type_txt: AtomicU64::new(0),
            type_mx: AtomicU64::new(0),
            type_ns: AtomicU64::new(0),
            type_soa: AtomicU64::new(0),
            type_ptr: AtomicU64::new(0),
            type_srv: AtomicU64::new(0),
            type_caa: AtomicU64::new(0),
            type_tlsa: AtomicU64::new(0),
            type_other: AtomicU64::new(0),
        }
    }

    /// Server uptime.
    pub fn uptime(&self) -> std::time::Duration {
        self.start_time.elapsed()
    }

    /// Counts one received question of the given type.
    pub fn record_question(&self, rtype: RecordType) {
        self.received.fetch_add(1, Ordering::Relaxed);
        let counter = match rtype {
            RecordType::A => &self.type_a,
            RecordType::Aaaa => &self.type_aaaa,
            RecordType::Cname => &self.type_cname,
            RecordType::Txt => &self.type_txt,
            RecordType::Mx => &self.type_mx,
            RecordType::Ns => &self.type_ns,
            RecordType::Soa => &self.type_soa,
            RecordType::Ptr => &self.type_ptr,
            RecordType::Srv => &self.type_srv,
            RecordType::Caa => &self.type_caa,
            RecordType::Tlsa => &self.type_tlsa,
            RecordType::Other(_) => &self.type_other,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Counts an answered question.
    pub fn record_answered(&self) {
        self.answered.fetch_add(1, Ordering::Relaxed);
    }

    /// Counts an NXDOMAIN outcome.
    pub fn record_not_found(&self) {
        self.not_found.fetch_add(1, Ordering::Relaxed);
    }

    /// Counts a failed question.
    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Per-type counts in a stable order, for the periodic stats log.
    pub fn type_histogram(&self) -> Vec<(&'static str, u64)> {
        vec![
            ("A", self.type_a.load(Ordering::Relaxed)),
            ("AAAA", self.type_aaaa.load(Ordering::Relaxed)),
            ("CNAME", self.type_cname.load(Ordering::Relaxed)),
            ("TXT", self.type_txt.load(Ordering::Relaxed)),
            ("MX", self.type_mx.load(Ordering::Relaxed)),
            ("NS", self.type_ns.load(Ordering::Relaxed)),
            ("SOA", self.type_soa.load(Ordering::Relaxed)),
            ("PTR", self.type_ptr.load(Ordering::Relaxed)),
            ("SRV", self.type_srv.load(Ordering::Relaxed)),
            ("CAA", self.type_caa.load(Ordering::Relaxed)),
            ("TLSA", self.type_tlsa.load(Ordering::Relaxed)),
            ("other", self.type_other.load(Ordering::Relaxed)),
        ]
    }
}

impl Default for ServerStats {
    fn default() -> Self {
        Self::new()
    }
}
