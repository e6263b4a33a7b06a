//! # LLMQ Metrics
//!
//! Prometheus metrics for the quorum cache and the quorum data protocol.
//!
//! ## Usage
//!
//! Enable with the `metrics` feature:
//! ```toml
//! qc-18-llmq = { path = "...", features = ["metrics"] }
//! ```
//!
//! ## Metrics Exported
//!
//! - `llmq_quorum_cache_hits_total` - Quorum lookups served from the cache
//! - `llmq_quorums_built_total` - Quorums constructed and cached
//! - `llmq_scan_cache_hits_total` - Scans answered from the scan cache (by kind)
//! - `llmq_qgetdata_replies_total` - `qdata` replies sent (by error code)
//! - `llmq_qgetdata_rejected_total` - `qgetdata` refused without a reply (by reason)
//! - `llmq_qdata_accepted_total` - `qdata` replies installed
//! - `llmq_qdata_rejected_total` - `qdata` replies rejected (by misbehavior score)
//! - `llmq_recovery_total` - Recovery runs (by outcome)

#[cfg(feature = "metrics")]
use lazy_static::lazy_static;

#[cfg(feature = "metrics")]
use prometheus::{
    register_int_counter, register_int_counter_vec, IntCounter, IntCounterVec,
};

use crate::domain::DataRequestError;

/// How a scan used the scan cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanCacheHit {
    /// Cached list long enough.
    Full,
    /// Cached list extended from its oldest entry.
    Partial,
}

/// How a recovery run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryOutcome {
    Started,
    Succeeded,
    Exhausted,
    Aborted,
}

impl RecoveryOutcome {
    #[cfg_attr(not(feature = "metrics"), allow(dead_code))]
    fn label(self) -> &'static str {
        match self {
            Self::Started => "started",
            Self::Succeeded => "succeeded",
            Self::Exhausted => "exhausted",
            Self::Aborted => "aborted",
        }
    }
}

#[cfg(feature = "metrics")]
lazy_static! {
    /// Quorum lookups answered from the quorum cache
    pub static ref QUORUM_CACHE_HITS: IntCounter = register_int_counter!(
        "llmq_quorum_cache_hits_total",
        "Total number of quorum lookups served from the cache"
    )
    .expect("Failed to create QUORUM_CACHE_HITS metric");

    /// Quorums built from a mined commitment
    pub static ref QUORUMS_BUILT: IntCounter = register_int_counter!(
        "llmq_quorums_built_total",
        "Total number of quorums built and cached"
    )
    .expect("Failed to create QUORUMS_BUILT metric");

    /// Scan cache hits, labeled full or partial
    pub static ref SCAN_CACHE_HITS: IntCounterVec = register_int_counter_vec!(
        "llmq_scan_cache_hits_total",
        "Total number of quorum scans answered from the scan cache",
        &["kind"]
    )
    .expect("Failed to create SCAN_CACHE_HITS metric");

    /// qdata replies sent, labeled by error code
    pub static ref QGETDATA_REPLIES: IntCounterVec = register_int_counter_vec!(
        "llmq_qgetdata_replies_total",
        "Total number of qdata replies sent",
        &["error"]
    )
    .expect("Failed to create QGETDATA_REPLIES metric");

    /// qgetdata requests refused without a reply
    pub static ref QGETDATA_REJECTED: IntCounterVec = register_int_counter_vec!(
        "llmq_qgetdata_rejected_total",
        "Total number of qgetdata requests refused",
        &["reason"]
    )
    .expect("Failed to create QGETDATA_REJECTED metric");

    /// qdata replies installed
    pub static ref QDATA_ACCEPTED: IntCounter = register_int_counter!(
        "llmq_qdata_accepted_total",
        "Total number of qdata replies accepted"
    )
    .expect("Failed to create QDATA_ACCEPTED metric");

    /// qdata replies rejected, labeled by the score given to the sender
    pub static ref QDATA_REJECTED: IntCounterVec = register_int_counter_vec!(
        "llmq_qdata_rejected_total",
        "Total number of qdata replies rejected",
        &["score"]
    )
    .expect("Failed to create QDATA_REJECTED metric");

    /// Recovery runs, labeled by outcome
    pub static ref RECOVERY: IntCounterVec = register_int_counter_vec!(
        "llmq_recovery_total",
        "Quorum data recovery runs by outcome",
        &["outcome"]
    )
    .expect("Failed to create RECOVERY metric");
}

/// Record a quorum cache hit
#[cfg(feature = "metrics")]
pub fn record_quorum_cache_hit() {
    QUORUM_CACHE_HITS.inc();
}

/// Record a newly built quorum
#[cfg(feature = "metrics")]
pub fn record_quorum_built() {
    QUORUMS_BUILT.inc();
}

/// Record a scan cache hit
#[cfg(feature = "metrics")]
pub fn record_scan_cache_hit(hit: ScanCacheHit) {
    let kind = match hit {
        ScanCacheHit::Full => "full",
        ScanCacheHit::Partial => "partial",
    };
    SCAN_CACHE_HITS.with_label_values(&[kind]).inc();
}

/// Record a qdata reply sent for a qgetdata
#[cfg(feature = "metrics")]
pub fn record_qgetdata_reply(error: DataRequestError) {
    QGETDATA_REPLIES.with_label_values(&[error.name()]).inc();
}

/// Record a qgetdata refused without reply
#[cfg(feature = "metrics")]
pub fn record_qgetdata_rejected(reason: &str) {
    QGETDATA_REJECTED.with_label_values(&[reason]).inc();
}

/// Record an accepted qdata
#[cfg(feature = "metrics")]
pub fn record_qdata_accepted() {
    QDATA_ACCEPTED.inc();
}

/// Record a rejected qdata with the sender's score
#[cfg(feature = "metrics")]
pub fn record_qdata_rejected(score: u32) {
    QDATA_REJECTED.with_label_values(&[&score.to_string()]).inc();
}

/// Record a recovery state change
#[cfg(feature = "metrics")]
pub fn record_recovery(outcome: RecoveryOutcome) {
    RECOVERY.with_label_values(&[outcome.label()]).inc();
}

// No-op implementations when metrics feature is disabled
#[cfg(not(feature = "metrics"))]
pub fn record_quorum_cache_hit() {}

#[cfg(not(feature = "metrics"))]
pub fn record_quorum_built() {}

#[cfg(not(feature = "metrics"))]
pub fn record_scan_cache_hit(_hit: ScanCacheHit) {}

#[cfg(not(feature = "metrics"))]
pub fn record_qgetdata_reply(_error: DataRequestError) {}

#[cfg(not(feature = "metrics"))]
pub fn record_qgetdata_rejected(_reason: &str) {}

#[cfg(not(feature = "metrics"))]
pub fn record_qdata_accepted() {}

#[cfg(not(feature = "metrics"))]
pub fn record_qdata_rejected(_score: u32) {}

#[cfg(not(feature = "metrics"))]
pub fn record_recovery(_outcome: RecoveryOutcome) {}
