//! Reconciler configuration.

use std::time::Duration;

/// Default finalizer token placed on every adopted resource.
pub const DEFAULT_FINALIZER: &str = "adopt.dev/adopted-resource";

/// Timing and identity knobs for the reconciler.
///
/// Every interval is configurable so tests can run on deterministic schedules.
#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    /// Requeue delay after a normal pass or a connectivity failure.
    pub health_check_interval: Duration,
    /// Requeue delay while a resource waits for acceptance.
    pub resync_interval: Duration,
    /// Deadline for each network step (probe, health, link, registry).
    pub step_timeout: Duration,
    /// Per-request timeout of the registry client.
    pub registry_timeout: Duration,
    /// Sent as `X-API-Key` to the registry when set.
    pub registry_api_key: Option<String>,
    /// Finalizer token gating physical deletion.
    pub finalizer: String,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            health_check_interval: Duration::from_secs(30),
            resync_interval: Duration::from_secs(5 * 60),
            step_timeout: Duration::from_secs(30),
            registry_timeout: adopt_registry::DEFAULT_TIMEOUT,
            registry_api_key: None,
            finalizer: DEFAULT_FINALIZER.to_string(),
        }
    }
}
