// Metric names emitted by the lock coordinator
// Recorded through the `metrics` facade; installing a recorder is up to the host

use metrics::{describe_counter, describe_histogram};

pub const ACQUIRE_ATTEMPTS_TOTAL: &str = "leasehold_acquire_attempts_total";
pub const ACQUIRE_CONTENTION_TOTAL: &str = "leasehold_acquire_contention_total";
pub const ACQUIRE_SUCCESS_TOTAL: &str = "leasehold_acquire_success_total";
pub const ACQUIRE_FAILED_TOTAL: &str = "leasehold_acquire_failed_total";
pub const ACQUIRE_DURATION_SECONDS: &str = "leasehold_acquire_duration_seconds";
pub const RELEASE_TOTAL: &str = "leasehold_release_total";
pub const REFRESH_TOTAL: &str = "leasehold_refresh_total";
pub const OWNERSHIP_MISMATCH_TOTAL: &str = "leasehold_ownership_mismatch_total";

/// Register descriptions for all lock metrics
/// Should be called once, after the host installs its recorder
pub fn describe_metrics() {
    describe_counter!(
        ACQUIRE_ATTEMPTS_TOTAL,
        "Total number of try-acquire round-trips issued to the store"
    );
    describe_counter!(
        ACQUIRE_CONTENTION_TOTAL,
        "Total number of attempts that found the key already held"
    );
    describe_counter!(ACQUIRE_SUCCESS_TOTAL, "Total number of granted locks");
    describe_counter!(
        ACQUIRE_FAILED_TOTAL,
        "Total number of acquisitions that exhausted their retries or hit an error"
    );
    describe_histogram!(
        ACQUIRE_DURATION_SECONDS,
        "Wall time of acquire calls in seconds, retries included"
    );
    describe_counter!(RELEASE_TOTAL, "Total number of successful releases");
    describe_counter!(REFRESH_TOTAL, "Total number of successful refreshes");
    describe_counter!(
        OWNERSHIP_MISMATCH_TOTAL,
        "Total number of release/refresh calls rejected by the identity check"
    );
}
