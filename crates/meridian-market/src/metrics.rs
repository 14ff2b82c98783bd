//! Observability metrics for the control plane.
//!
//! Metrics are exported through the `metrics` crate facade; install any
//! recorder (e.g. `metrics_exporter_prometheus::PrometheusBuilder`) at
//! process start to expose them.
//!
//! ## Metrics Exported
//!
//! | Metric | Type | Labels | Description |
//! |--------|------|--------|-------------|
//! | `meridian_jobs_submitted_total` | Counter | - | Jobs accepted by `submit` |
//! | `meridian_jobs_failed_total` | Counter | `reason` | Submissions that ended FAILED |
//! | `meridian_ledger_entries_total` | Counter | `kind` | Ledger entries recorded |
//! | `meridian_outbox_published_total` | Counter | - | Outbox rows delivered to the bus |
//! | `meridian_outbox_publish_failures_total` | Counter | - | Publish attempts that failed |
//! | `meridian_outbox_backlog` | Gauge | - | Unprocessed rows seen by the last relay cycle |
//! | `meridian_sweeper_repairs_total` | Counter | - | Stuck jobs advanced by the sweeper |

use metrics::{counter, gauge};

use crate::ledger::EntryKind;

/// Metric names as constants for consistency.
pub mod names {
    /// Counter: jobs accepted by `submit`.
    pub const JOBS_SUBMITTED: &str = "meridian_jobs_submitted_total";
    /// Counter: submissions that ended FAILED, by reason.
    pub const JOBS_FAILED: &str = "meridian_jobs_failed_total";
    /// Counter: ledger entries recorded, by kind.
    pub const LEDGER_ENTRIES: &str = "meridian_ledger_entries_total";
    /// Counter: outbox rows delivered to the bus.
    pub const OUTBOX_PUBLISHED: &str = "meridian_outbox_published_total";
    /// Counter: publish attempts that failed.
    pub const OUTBOX_PUBLISH_FAILURES: &str = "meridian_outbox_publish_failures_total";
    /// Gauge: unprocessed rows seen by the last relay cycle.
    pub const OUTBOX_BACKLOG: &str = "meridian_outbox_backlog";
    /// Counter: stuck jobs advanced by the sweeper.
    pub const SWEEPER_REPAIRS: &str = "meridian_sweeper_repairs_total";
}

/// Records an accepted submission.
pub fn record_job_submitted() {
    counter!(names::JOBS_SUBMITTED).increment(1);
}

/// Records a submission that ended FAILED.
pub fn record_job_failed(reason: &'static str) {
    counter!(names::JOBS_FAILED, "reason" => reason).increment(1);
}

/// Records a newly written ledger entry.
pub fn record_ledger_entry(kind: EntryKind) {
    let kind = match kind {
        EntryKind::Hold => "hold",
        EntryKind::Debit => "debit",
        EntryKind::Refund => "refund",
        EntryKind::Charge => "charge",
    };
    counter!(names::LEDGER_ENTRIES, "kind" => kind).increment(1);
}

/// Records a successful outbox publish.
pub fn record_outbox_published() {
    counter!(names::OUTBOX_PUBLISHED).increment(1);
}

/// Records a failed outbox publish attempt.
pub fn record_outbox_publish_failure() {
    counter!(names::OUTBOX_PUBLISH_FAILURES).increment(1);
}

/// Records the backlog observed by a relay cycle.
pub fn set_outbox_backlog(backlog: usize) {
    #[allow(clippy::cast_precision_loss)]
    gauge!(names::OUTBOX_BACKLOG).set(backlog as f64);
}

/// Records one sweeper repair.
pub fn record_sweeper_repair() {
    counter!(names::SWEEPER_REPAIRS).increment(1);
}
