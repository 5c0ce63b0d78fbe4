//! Per-tenant queue state.
//!
//! ## Design
//! - One [`TenantQueueState`] per guild, always accessed through the tenant's
//!   `tokio::sync::Mutex`; nothing here locks or awaits.
//! - `advancing` is the single-flight advance claim. Whoever flips it from
//!   `false` to `true` owns the next advance and must send the worker event.
//! - `now_playing` is `Some` exactly while the sink holds an attachment for
//!   the tenant.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use crate::error::OrchestratorError;
use crate::notifier::Notifier;
use crate::sink::{AttachmentId, PlaybackHandle};
use crate::track::{PlaylistEntry, RequesterId, Track};

/// Track currently attached to the tenant's output.
pub(crate) struct ActivePlayback {
    pub(crate) track: Track,
    pub(crate) attachment: AttachmentId,
    pub(crate) handle: Box<dyn PlaybackHandle>,
    pub(crate) started_at: Instant,
}

/// Playlist entry waiting for background ingestion.
#[derive(Clone, Debug)]
pub(crate) struct BacklogItem {
    pub(crate) entry: PlaylistEntry,
    pub(crate) requester: RequesterId,
}

#[derive(Default)]
pub(crate) struct TenantQueueState {
    pub(crate) pending: VecDeque<Track>,
    pub(crate) now_playing: Option<ActivePlayback>,
    pub(crate) ingestion_in_progress: bool,
    pub(crate) ingestion_backlog: VecDeque<BacklogItem>,
    pub(crate) ingest_added: usize,
    pub(crate) ingest_skipped: usize,
    pub(crate) advancing: bool,
    pub(crate) queue_finished_announced: bool,
    pub(crate) notifier: Option<Arc<dyn Notifier>>,
}

impl TenantQueueState {
    /// Claim the next advance if the tenant is idle and has work.
    pub(crate) fn try_claim_advance(&mut self) -> bool {
        if self.now_playing.is_some() || self.advancing || self.pending.is_empty() {
            return false;
        }
        self.advancing = true;
        true
    }

    /// Drop all queued work and return the active playback, if any.
    pub(crate) fn reset(&mut self) -> Option<ActivePlayback> {
        self.pending.clear();
        self.ingestion_backlog.clear();
        self.ingestion_in_progress = false;
        self.ingest_added = 0;
        self.ingest_skipped = 0;
        self.advancing = false;
        self.queue_finished_announced = false;
        self.now_playing.take()
    }

    /// Remove the track at 1-based `position` from `pending`.
    pub(crate) fn remove(&mut self, position: usize) -> Result<Track, OrchestratorError> {
        let len = self.pending.len();
        if position == 0 || position > len {
            return Err(OrchestratorError::OutOfRange { position, len });
        }
        self.pending
            .remove(position - 1)
            .ok_or(OrchestratorError::OutOfRange { position, len })
    }

    pub(crate) fn snapshot(&self, limit: usize) -> QueueSnapshot {
        let upcoming: Vec<Track> = self.pending.iter().take(limit).cloned().collect();
        let overflow = self.pending.len().saturating_sub(upcoming.len());
        let paused = self
            .now_playing
            .as_ref()
            .is_some_and(|active| active.handle.is_paused());
        QueueSnapshot {
            now_playing: self.now_playing.as_ref().map(|active| NowPlaying {
                track: active.track.clone(),
                elapsed: active.started_at.elapsed(),
            }),
            upcoming,
            overflow,
            ingesting: self.ingestion_in_progress,
            backlog: self.ingestion_backlog.len(),
            paused,
        }
    }
}

/// Track on air and how long it has been playing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NowPlaying {
    pub track: Track,
    pub elapsed: Duration,
}

/// Read-only view of a tenant's queue.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct QueueSnapshot {
    pub now_playing: Option<NowPlaying>,
    /// Next tracks in play order, capped at the inspect limit.
    pub upcoming: Vec<Track>,
    /// Pending tracks beyond `upcoming`.
    pub overflow: usize,
    /// Whether a playlist is still loading in the background.
    pub ingesting: bool,
    /// Playlist entries not yet loaded.
    pub backlog: usize,
    pub paused: bool,
}

impl QueueSnapshot {
    /// Total pending tracks.
    pub fn pending_len(&self) -> usize {
        self.upcoming.len() + self.overflow
    }
}
