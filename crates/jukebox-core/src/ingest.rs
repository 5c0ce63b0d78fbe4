//! Background playlist ingestion.
//!
//! At most one ingestion task runs per tenant. It drains the tenant's backlog
//! one entry at a time, reacquiring the tenant lock per item, so playback and
//! other commands are never blocked on a long playlist.

use std::sync::{Arc, Weak};

use crate::notifier::{Notice, deliver};
use crate::orchestrator::Inner;
use crate::track::TenantId;

/// Spawn the tenant's ingestion task. Call with the tenant lock held, after
/// setting `ingestion_in_progress`.
pub(crate) fn spawn_ingestion(inner: &Arc<Inner>, tenant: TenantId, epoch: u64) {
    tracing::info!(guild = %tenant, "starting playlist ingestion");
    tokio::spawn(run_ingestion(Arc::downgrade(inner), tenant, epoch));
}

async fn run_ingestion(inner: Weak<Inner>, tenant: TenantId, epoch: u64) {
    loop {
        let Some(pacing) = inner.upgrade().map(|inner| inner.config.ingest_pacing) else {
            return;
        };
        tokio::time::sleep(pacing).await;

        let Some(inner) = inner.upgrade() else {
            return;
        };
        let Some(slot) = inner.existing_slot(tenant) else {
            return;
        };

        let item = {
            let mut state = slot.state.lock().await;
            if slot.epoch() != epoch {
                tracing::debug!(guild = %tenant, "ingestion cancelled");
                return;
            }
            match state.ingestion_backlog.pop_front() {
                Some(item) => item,
                None => {
                    state.ingestion_in_progress = false;
                    let notice = Notice::IngestComplete {
                        added: state.ingest_added,
                        skipped: state.ingest_skipped,
                    };
                    let notifier = state.notifier.clone();
                    drop(state);
                    tracing::info!(guild = %tenant, "{notice}");
                    deliver(notifier.as_ref(), notice).await;
                    return;
                }
            }
        };

        let resolved = inner.resolver.resolve_entry(&item.entry).await;

        let mut state = slot.state.lock().await;
        if slot.epoch() != epoch {
            tracing::debug!(guild = %tenant, "ingestion cancelled");
            return;
        }
        match resolved {
            Ok(track) => {
                state.pending.push_back(track.requested_by(item.requester));
                state.queue_finished_announced = false;
                state.ingest_added += 1;
                let added = state.ingest_added;
                let remaining = state.ingestion_backlog.len();
                let claimed = state.try_claim_advance();
                let notifier = state.notifier.clone();
                drop(state);
                if claimed {
                    slot.kick(epoch);
                }
                let every = inner.config.progress_every;
                if every > 0 && added % every == 0 && remaining > 0 {
                    deliver(notifier.as_ref(), Notice::IngestProgress { added, remaining }).await;
                }
            }
            Err(err) => {
                state.ingest_skipped += 1;
                drop(state);
                tracing::debug!(
                    guild = %tenant,
                    entry = %item.entry.label(),
                    error = %err,
                    "skipping playlist entry"
                );
            }
        }
    }
}
