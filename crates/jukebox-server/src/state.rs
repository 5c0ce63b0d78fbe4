//! Shared application state.

use std::sync::Arc;

use jukebox_core::{Notifier, Orchestrator, TenantId};

use crate::notices::{BusNotifier, NoticeBus};

/// Shared application state for Actix handlers.
pub struct AppState {
    /// Per-guild queues and playback.
    pub orchestrator: Orchestrator,
    /// Notice history and live feed.
    pub notices: Arc<NoticeBus>,
}

impl AppState {
    pub fn new(orchestrator: Orchestrator, notices: Arc<NoticeBus>) -> Self {
        Self {
            orchestrator,
            notices,
        }
    }

    /// Notifier that records notices for `guild`.
    pub fn notifier_for(&self, guild: TenantId) -> Arc<dyn Notifier> {
        Arc::new(BusNotifier::new(self.notices.clone(), guild))
    }
}
