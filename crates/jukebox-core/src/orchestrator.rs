//! Guild playback orchestrator.
//!
//! Owns one [`TenantSlot`] per guild. Each slot pairs the tenant's queue state
//! (behind a `tokio::sync::Mutex`) with a stop epoch and a worker task that
//! serializes advances and sink completions for that tenant.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, Weak};

use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;

use crate::advance;
use crate::config::OrchestratorConfig;
use crate::error::OrchestratorError;
use crate::ingest;
use crate::notifier::{Notice, Notifier};
use crate::resolver::{Resolution, Resolver};
use crate::sink::{AttachmentId, Completion, PlaybackOutcome, PlaybackSink};
use crate::sweep;
use crate::tenant::{BacklogItem, QueueSnapshot, TenantQueueState};
use crate::track::{PlaylistEntry, RequesterId, TenantId, Track};

/// Work item for a tenant worker.
#[derive(Debug)]
pub(crate) enum TenantEvent {
    /// Run an advance claimed at the given stop epoch.
    Advance { epoch: u64 },
    /// The sink finished an attachment.
    Finished {
        attachment: AttachmentId,
        outcome: PlaybackOutcome,
    },
}

pub(crate) struct TenantSlot {
    pub(crate) id: TenantId,
    pub(crate) state: Mutex<TenantQueueState>,
    epoch: AtomicU64,
    next_attachment: AtomicU64,
    events: mpsc::UnboundedSender<TenantEvent>,
}

impl TenantSlot {
    pub(crate) fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    /// Cancel in-flight advance, retry and ingestion work. Call with the state lock held.
    pub(crate) fn bump_epoch(&self) -> u64 {
        self.epoch.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub(crate) fn completion(&self) -> Completion {
        let attachment = AttachmentId(self.next_attachment.fetch_add(1, Ordering::Relaxed) + 1);
        Completion::new(self.id, attachment, self.events.clone())
    }

    /// Hand a claimed advance to the worker.
    pub(crate) fn kick(&self, epoch: u64) {
        let _ = self.events.send(TenantEvent::Advance { epoch });
    }
}

pub(crate) struct Inner {
    pub(crate) config: OrchestratorConfig,
    pub(crate) resolver: Arc<dyn Resolver>,
    pub(crate) sink: Arc<dyn PlaybackSink>,
    tenants: std::sync::Mutex<HashMap<TenantId, Arc<TenantSlot>>>,
}

impl Inner {
    /// Look up a tenant without creating it.
    pub(crate) fn existing_slot(&self, tenant: TenantId) -> Option<Arc<TenantSlot>> {
        let tenants = self.tenants.lock().unwrap_or_else(PoisonError::into_inner);
        tenants.get(&tenant).cloned()
    }

    /// Look up a tenant, creating its slot and worker on first use.
    fn slot(self: &Arc<Self>, tenant: TenantId) -> Arc<TenantSlot> {
        let mut tenants = self.tenants.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(slot) = tenants.get(&tenant) {
            return slot.clone();
        }
        let (tx, rx) = mpsc::unbounded_channel();
        let slot = Arc::new(TenantSlot {
            id: tenant,
            state: Mutex::new(TenantQueueState::default()),
            epoch: AtomicU64::new(0),
            next_attachment: AtomicU64::new(0),
            events: tx,
        });
        tenants.insert(tenant, slot.clone());
        tokio::spawn(run_worker(Arc::downgrade(self), tenant, rx));
        tracing::debug!(guild = %tenant, "tenant created");
        slot
    }
}

async fn run_worker(
    inner: Weak<Inner>,
    tenant: TenantId,
    mut rx: mpsc::UnboundedReceiver<TenantEvent>,
) {
    while let Some(event) = rx.recv().await {
        let Some(inner) = inner.upgrade() else {
            break;
        };
        let Some(slot) = inner.existing_slot(tenant) else {
            break;
        };
        match event {
            TenantEvent::Advance { epoch } => advance::advance(&inner, &slot, epoch).await,
            TenantEvent::Finished {
                attachment,
                outcome,
            } => advance::on_completion(&inner, &slot, attachment, outcome).await,
        }
    }
    tracing::debug!(guild = %tenant, "tenant worker exiting");
}

/// Outcome of a successful enqueue.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Submitted {
    /// A single track was queued. `position` is 0 when it starts right away.
    Track { title: String, position: usize },
    /// The first playlist track was queued; the rest load in the background.
    Playlist { first_title: String, remaining: usize },
}

/// Per-guild playback orchestrator.
///
/// Cheap to clone. Background workers hold weak references and wind down once
/// every clone is dropped.
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

impl Orchestrator {
    pub fn new(
        config: OrchestratorConfig,
        resolver: Arc<dyn Resolver>,
        sink: Arc<dyn PlaybackSink>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                resolver,
                sink,
                tenants: std::sync::Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.inner.config
    }

    /// Resolve `query` and queue the result for `tenant`.
    ///
    /// `notifier` receives this call's notice and becomes the tenant's channel
    /// for later asynchronous notices (now playing, ingestion progress, faults).
    pub async fn enqueue(
        &self,
        tenant: TenantId,
        query: &str,
        requester: RequesterId,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Submitted, OrchestratorError> {
        let query = query.trim();
        let resolution = match self.inner.resolver.resolve(query).await {
            Ok(resolution) => resolution,
            Err(source) => {
                tracing::warn!(guild = %tenant, query = %query, error = %source, "resolve failed");
                notifier
                    .notify(Notice::ResolutionFailed {
                        query: query.to_string(),
                        reason: source.to_string(),
                    })
                    .await;
                return Err(OrchestratorError::ResolutionFailed {
                    query: query.to_string(),
                    source,
                });
            }
        };

        match resolution {
            Resolution::Single(track) => {
                let track = track.requested_by(requester);
                self.submit(tenant, track, VecDeque::new(), 0, notifier).await
            }
            Resolution::Playlist { title, entries } => {
                let mut entries: VecDeque<PlaylistEntry> = entries.into_iter().flatten().collect();
                let mut skipped = 0;
                let mut first = None;
                while let Some(entry) = entries.pop_front() {
                    match self.inner.resolver.resolve_entry(&entry).await {
                        Ok(track) => {
                            first = Some(track);
                            break;
                        }
                        Err(err) => {
                            tracing::debug!(
                                guild = %tenant,
                                entry = %entry.label(),
                                error = %err,
                                "playlist entry unavailable"
                            );
                            skipped += 1;
                        }
                    }
                }
                let Some(first) = first else {
                    tracing::warn!(
                        guild = %tenant,
                        query = %query,
                        playlist = title.as_deref().unwrap_or(""),
                        "playlist has no playable entries"
                    );
                    notifier
                        .notify(Notice::EmptyPlaylist {
                            query: query.to_string(),
                        })
                        .await;
                    return Err(OrchestratorError::EmptyPlaylist {
                        query: query.to_string(),
                    });
                };
                let backlog = entries
                    .into_iter()
                    .map(|entry| BacklogItem {
                        entry,
                        requester: requester.clone(),
                    })
                    .collect();
                let track = first.requested_by(requester);
                self.submit(tenant, track, backlog, skipped, notifier).await
            }
        }
    }

    async fn submit(
        &self,
        tenant: TenantId,
        track: Track,
        backlog: VecDeque<BacklogItem>,
        skipped: usize,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Submitted, OrchestratorError> {
        let slot = self.inner.slot(tenant);
        let title = track.title.clone();
        let remaining = backlog.len();
        let (position, claimed_epoch) = {
            let mut state = slot.state.lock().await;
            state.notifier = Some(notifier.clone());
            state.pending.push_back(track);
            state.queue_finished_announced = false;
            let claimed = state.try_claim_advance();
            let position = if claimed { 0 } else { state.pending.len() };
            if !backlog.is_empty() {
                state.ingestion_backlog.extend(backlog);
                if state.ingestion_in_progress {
                    state.ingest_skipped += skipped;
                    tracing::info!(
                        guild = %tenant,
                        backlog = state.ingestion_backlog.len(),
                        "extended playlist ingestion"
                    );
                } else {
                    state.ingestion_in_progress = true;
                    state.ingest_added = 0;
                    state.ingest_skipped = skipped;
                    ingest::spawn_ingestion(&self.inner, tenant, slot.epoch());
                }
            }
            (position, claimed.then(|| slot.epoch()))
        };

        tracing::info!(guild = %tenant, title = %title, position, "queued");
        let submitted = if remaining > 0 {
            notifier
                .notify(Notice::PlaylistQueued {
                    first_title: title.clone(),
                    remaining,
                })
                .await;
            Submitted::Playlist {
                first_title: title,
                remaining,
            }
        } else {
            notifier
                .notify(Notice::Enqueued {
                    title: title.clone(),
                    position,
                })
                .await;
            Submitted::Track { title, position }
        };
        if let Some(epoch) = claimed_epoch {
            slot.kick(epoch);
        }
        Ok(submitted)
    }

    /// Stop the active track; its completion advances the queue.
    pub async fn skip(
        &self,
        tenant: TenantId,
        notifier: &dyn Notifier,
    ) -> Result<(), OrchestratorError> {
        let title = match self.inner.existing_slot(tenant) {
            Some(slot) => {
                let state = slot.state.lock().await;
                state.now_playing.as_ref().map(|active| {
                    active.handle.stop();
                    active.track.title.clone()
                })
            }
            None => None,
        };
        let Some(title) = title else {
            notifier.notify(Notice::NothingPlaying).await;
            return Err(OrchestratorError::NothingPlaying);
        };
        tracing::info!(guild = %tenant, title = %title, "skipped");
        notifier.notify(Notice::Skipped { title }).await;
        Ok(())
    }

    /// Cancel all work for `tenant`, drop its queue and release the output.
    pub async fn stop(
        &self,
        tenant: TenantId,
        notifier: &dyn Notifier,
    ) -> Result<(), OrchestratorError> {
        let active = match self.inner.existing_slot(tenant) {
            Some(slot) => {
                let mut state = slot.state.lock().await;
                slot.bump_epoch();
                state.reset()
            }
            None => None,
        };
        if let Some(active) = active {
            active.handle.stop();
        }
        if let Err(err) = self.inner.sink.disconnect(tenant).await {
            tracing::warn!(guild = %tenant, error = %err, "disconnect failed");
        }
        tracing::info!(guild = %tenant, "stopped");
        notifier.notify(Notice::Stopped).await;
        Ok(())
    }

    /// Leave the guild's output. Same as [`Orchestrator::stop`].
    pub async fn leave(
        &self,
        tenant: TenantId,
        notifier: &dyn Notifier,
    ) -> Result<(), OrchestratorError> {
        self.stop(tenant, notifier).await
    }

    /// Empty the pending queue, leaving the active track alone.
    pub async fn clear(&self, tenant: TenantId, notifier: &dyn Notifier) -> usize {
        let removed = match self.inner.existing_slot(tenant) {
            Some(slot) => {
                let mut state = slot.state.lock().await;
                let removed = state.pending.len();
                state.pending.clear();
                removed
            }
            None => 0,
        };
        tracing::info!(guild = %tenant, removed, "cleared queue");
        notifier.notify(Notice::Cleared { removed }).await;
        removed
    }

    /// Remove the pending track at 1-based `position`.
    pub async fn remove(
        &self,
        tenant: TenantId,
        position: usize,
        notifier: &dyn Notifier,
    ) -> Result<Track, OrchestratorError> {
        let result = match self.inner.existing_slot(tenant) {
            Some(slot) => slot.state.lock().await.remove(position),
            None => Err(OrchestratorError::OutOfRange { position, len: 0 }),
        };
        match &result {
            Ok(track) => {
                tracing::info!(guild = %tenant, position, title = %track.title, "removed");
                notifier
                    .notify(Notice::Removed {
                        position,
                        title: track.title.clone(),
                    })
                    .await;
            }
            Err(OrchestratorError::OutOfRange { position, len }) => {
                notifier
                    .notify(Notice::OutOfRange {
                        position: *position,
                        len: *len,
                    })
                    .await;
            }
            Err(_) => {}
        }
        result
    }

    /// Snapshot of the tenant's queue. Unknown tenants read as empty.
    pub async fn inspect(&self, tenant: TenantId) -> QueueSnapshot {
        match self.inner.existing_slot(tenant) {
            Some(slot) => slot.state.lock().await.snapshot(self.inner.config.inspect_limit),
            None => QueueSnapshot::default(),
        }
    }

    pub async fn pause(
        &self,
        tenant: TenantId,
        notifier: &dyn Notifier,
    ) -> Result<(), OrchestratorError> {
        let result = match self.inner.existing_slot(tenant) {
            Some(slot) => {
                let state = slot.state.lock().await;
                match state.now_playing.as_ref() {
                    Some(active) if !active.handle.is_paused() => {
                        active.handle.pause().map_err(OrchestratorError::from)
                    }
                    _ => Err(OrchestratorError::NothingPlaying),
                }
            }
            None => Err(OrchestratorError::NothingPlaying),
        };
        self.report_control(tenant, result, Notice::Paused, notifier).await
    }

    pub async fn resume(
        &self,
        tenant: TenantId,
        notifier: &dyn Notifier,
    ) -> Result<(), OrchestratorError> {
        let result = match self.inner.existing_slot(tenant) {
            Some(slot) => {
                let state = slot.state.lock().await;
                match state.now_playing.as_ref() {
                    Some(active) if active.handle.is_paused() => {
                        active.handle.resume().map_err(OrchestratorError::from)
                    }
                    _ => Err(OrchestratorError::NothingPaused),
                }
            }
            None => Err(OrchestratorError::NothingPaused),
        };
        self.report_control(tenant, result, Notice::Resumed, notifier).await
    }

    async fn report_control(
        &self,
        tenant: TenantId,
        result: Result<(), OrchestratorError>,
        success: Notice,
        notifier: &dyn Notifier,
    ) -> Result<(), OrchestratorError> {
        let notice = match &result {
            Ok(()) => success,
            Err(OrchestratorError::NothingPlaying) => Notice::NothingPlaying,
            Err(OrchestratorError::NothingPaused) => Notice::NothingPaused,
            Err(err) => {
                tracing::warn!(guild = %tenant, error = %err, "playback control failed");
                return result;
            }
        };
        tracing::info!(guild = %tenant, kind = notice.kind(), "playback control");
        notifier.notify(notice).await;
        result
    }

    #[cfg(test)]
    pub(crate) fn existing_slot(&self, tenant: TenantId) -> Option<Arc<TenantSlot>> {
        self.inner.existing_slot(tenant)
    }

    /// Run one idle-reclamation pass; returns the number of tenants released.
    pub async fn sweep_idle(&self) -> usize {
        sweep::sweep_idle(&self.inner).await
    }

    /// Spawn the periodic idle sweep. The task exits once the orchestrator is dropped.
    pub fn spawn_idle_sweep(&self) -> JoinHandle<()> {
        sweep::spawn_idle_sweep(&self.inner)
    }
}
