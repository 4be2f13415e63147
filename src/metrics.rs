//! Prometheus metrics for the credential service.
//!
//! Recorded by [`crate::service::CredentialService`], never from inside the
//! per-request state machine.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_histogram, register_int_counter_vec, CounterVec, Histogram,
    IntCounterVec,
};

/// Credential pairs minted for a new login.
pub static CREDENTIALS_ISSUED: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "credentials_issued_total",
        "Total number of credential pairs issued for new logins",
        &["signing_method"]
    )
    .expect("Failed to register credentials_issued metric")
});

/// Validation attempts by outcome.
pub static CREDENTIAL_VALIDATIONS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "credential_validations_total",
        "Total number of credential validations",
        &["outcome"]
    )
    .expect("Failed to register credential_validations metric")
});

/// Refresh attempts by status.
pub static CREDENTIAL_REFRESHES: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "credential_refresh_total",
        "Total number of refresh attempts",
        &["status"]
    )
    .expect("Failed to register credential_refresh metric")
});

/// Time spent rebuilding and validating request credentials.
pub static VALIDATION_LATENCY: Lazy<Histogram> = Lazy::new(|| {
    register_histogram!(
        "credential_validation_duration_seconds",
        "Credential validation latency in seconds",
        vec![0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5]
    )
    .expect("Failed to register credential_validation_duration metric")
});

/// Record a credential pair issued for a new login.
pub fn record_issued(signing_method: &str) {
    CREDENTIALS_ISSUED.with_label_values(&[signing_method]).inc();
}

/// Record the outcome of a validation attempt.
pub fn record_validation(outcome: &str) {
    CREDENTIAL_VALIDATIONS.with_label_values(&[outcome]).inc();
}

/// Record a refresh attempt.
pub fn record_refresh(status: &str) {
    CREDENTIAL_REFRESHES.with_label_values(&[status]).inc();
}

/// Record validation latency.
pub fn record_validation_latency(duration_secs: f64) {
    VALIDATION_LATENCY.observe(duration_secs);
}
