//! Fiber instrumentation counters, in the style of `common::metrics`'
//! convention of one `log_*` helper per named metric (there, registered
//! against an internal Prometheus wrapper; here, against the `metrics`
//! facade crate, whichever recorder the host process installs).

const FIBER_SPAWNED_TOTAL: &str = "effectual_fiber_spawned_total";
const FIBER_COMPLETED_TOTAL: &str = "effectual_fiber_completed_total";
const FIBER_FAILED_TOTAL: &str = "effectual_fiber_failed_total";
const FIBER_INTERRUPTED_TOTAL: &str = "effectual_fiber_interrupted_total";
const SCHEDULE_RETRY_TOTAL: &str = "effectual_schedule_retry_total";

pub(crate) fn log_fiber_spawned() {
    metrics::counter!(FIBER_SPAWNED_TOTAL).increment(1);
}

pub(crate) fn log_fiber_completed() {
    metrics::counter!(FIBER_COMPLETED_TOTAL).increment(1);
}

pub(crate) fn log_fiber_failed() {
    metrics::counter!(FIBER_FAILED_TOTAL).increment(1);
}

pub(crate) fn log_fiber_interrupted() {
    metrics::counter!(FIBER_INTERRUPTED_TOTAL).increment(1);
}

pub(crate) fn log_schedule_retry() {
    metrics::counter!(SCHEDULE_RETRY_TOTAL).increment(1);
}
