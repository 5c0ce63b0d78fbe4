//! Orchestrator tuning.

use std::time::Duration;

/// Resolved orchestrator settings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OrchestratorConfig {
    /// Attach attempts per track before it is dropped.
    pub max_attach_attempts: u32,
    /// Delay between attach attempts.
    pub retry_backoff: Duration,
    /// Delay between background playlist items.
    pub ingest_pacing: Duration,
    /// Emit an ingestion progress notice every this many added tracks.
    pub progress_every: usize,
    /// Idle sweep period.
    pub idle_sweep: Duration,
    /// Upcoming tracks returned by `inspect`.
    pub inspect_limit: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_attach_attempts: 3,
            retry_backoff: Duration::from_millis(1000),
            ingest_pacing: Duration::from_millis(500),
            progress_every: 5,
            idle_sweep: Duration::from_secs(300),
            inspect_limit: 10,
        }
    }
}
