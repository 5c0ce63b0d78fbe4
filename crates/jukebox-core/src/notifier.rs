//! Outward notices.
//!
//! Every terminal failure and every successful state transition produces one
//! [`Notice`]. Delivery is best effort; the orchestrator never waits on a
//! notifier to make progress beyond the `notify` call itself.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::track::{RequesterId, format_duration};

/// Human-facing message about a tenant's playback.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Notice {
    Enqueued {
        title: String,
        /// 1-based position in the pending queue; 0 when it starts immediately.
        position: usize,
    },
    PlaylistQueued {
        first_title: String,
        remaining: usize,
    },
    NowPlaying {
        title: String,
        duration: Option<Duration>,
        thumbnail: Option<String>,
        requested_by: RequesterId,
    },
    IngestProgress {
        added: usize,
        remaining: usize,
    },
    IngestComplete {
        added: usize,
        skipped: usize,
    },
    QueueFinished,
    Skipped {
        title: String,
    },
    TrackFailed {
        title: String,
        reason: String,
    },
    Stopped,
    Cleared {
        removed: usize,
    },
    Removed {
        position: usize,
        title: String,
    },
    Paused,
    Resumed,
    ResolutionFailed {
        query: String,
        reason: String,
    },
    EmptyPlaylist {
        query: String,
    },
    OutOfRange {
        position: usize,
        len: usize,
    },
    NothingPlaying,
    NothingPaused,
    PlaybackFault {
        title: String,
        reason: String,
    },
    RecoveryFailed {
        reason: String,
    },
    IdleDisconnected,
}

impl Notice {
    /// Stable machine-readable kind, used by the server's notice log.
    pub fn kind(&self) -> &'static str {
        match self {
            Notice::Enqueued { .. } => "enqueued",
            Notice::PlaylistQueued { .. } => "playlist_queued",
            Notice::NowPlaying { .. } => "now_playing",
            Notice::IngestProgress { .. } => "ingest_progress",
            Notice::IngestComplete { .. } => "ingest_complete",
            Notice::QueueFinished => "queue_finished",
            Notice::Skipped { .. } => "skipped",
            Notice::TrackFailed { .. } => "track_failed",
            Notice::Stopped => "stopped",
            Notice::Cleared { .. } => "cleared",
            Notice::Removed { .. } => "removed",
            Notice::Paused => "paused",
            Notice::Resumed => "resumed",
            Notice::ResolutionFailed { .. } => "resolution_failed",
            Notice::EmptyPlaylist { .. } => "empty_playlist",
            Notice::OutOfRange { .. } => "out_of_range",
            Notice::NothingPlaying => "nothing_playing",
            Notice::NothingPaused => "nothing_paused",
            Notice::PlaybackFault { .. } => "playback_fault",
            Notice::RecoveryFailed { .. } => "recovery_failed",
            Notice::IdleDisconnected => "idle_disconnected",
        }
    }

    /// True for notices reporting a failure.
    pub fn is_error(&self) -> bool {
        matches!(
            self,
            Notice::TrackFailed { .. }
                | Notice::ResolutionFailed { .. }
                | Notice::EmptyPlaylist { .. }
                | Notice::OutOfRange { .. }
                | Notice::NothingPlaying
                | Notice::NothingPaused
                | Notice::PlaybackFault { .. }
                | Notice::RecoveryFailed { .. }
        )
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notice::Enqueued { title, position: 0 } => write!(f, "Queued {title}"),
            Notice::Enqueued { title, position } => {
                write!(f, "Queued {title} at position {position}")
            }
            Notice::PlaylistQueued {
                first_title,
                remaining,
            } => write!(
                f,
                "Queued {first_title}; loading {remaining} more from the playlist"
            ),
            Notice::NowPlaying {
                title,
                duration,
                requested_by,
                ..
            } => {
                write!(f, "Now playing {title}")?;
                if let Some(duration) = duration {
                    write!(f, " [{}]", format_duration(*duration))?;
                }
                if !requested_by.as_str().is_empty() {
                    write!(f, " (requested by {requested_by})")?;
                }
                Ok(())
            }
            Notice::IngestProgress { added, remaining } => {
                write!(f, "Added {added} playlist tracks, {remaining} to go")
            }
            Notice::IngestComplete { added, skipped: 0 } => {
                write!(f, "Finished loading playlist: {added} tracks added")
            }
            Notice::IngestComplete { added, skipped } => write!(
                f,
                "Finished loading playlist: {added} tracks added, {skipped} unavailable"
            ),
            Notice::QueueFinished => f.write_str("Queue finished"),
            Notice::Skipped { title } => write!(f, "Skipped {title}"),
            Notice::TrackFailed { title, reason } => {
                write!(f, "Could not play {title}: {reason}")
            }
            Notice::Stopped => f.write_str("Stopped playback and cleared the queue"),
            Notice::Cleared { removed } => write!(f, "Cleared {removed} tracks from the queue"),
            Notice::Removed { position, title } => {
                write!(f, "Removed {title} from position {position}")
            }
            Notice::Paused => f.write_str("Paused"),
            Notice::Resumed => f.write_str("Resumed"),
            Notice::ResolutionFailed { query, reason } => {
                write!(f, "Could not find {query}: {reason}")
            }
            Notice::EmptyPlaylist { query } => {
                write!(f, "Playlist {query} has no playable tracks")
            }
            Notice::OutOfRange { position, len } => write!(
                f,
                "Position {position} is out of range (queue has {len} tracks)"
            ),
            Notice::NothingPlaying => f.write_str("Nothing is playing"),
            Notice::NothingPaused => f.write_str("Nothing is paused"),
            Notice::PlaybackFault { title, reason } => {
                write!(f, "Playback of {title} failed: {reason}")
            }
            Notice::RecoveryFailed { reason } => {
                write!(f, "Could not reconnect output: {reason}")
            }
            Notice::IdleDisconnected => f.write_str("Left after being idle"),
        }
    }
}

/// Delivers notices for one tenant.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notice: Notice);
}

/// Deliver an asynchronous notice to the tenant's registered notifier, or
/// log it when none is registered.
pub(crate) async fn deliver(notifier: Option<&Arc<dyn Notifier>>, notice: Notice) {
    match notifier {
        Some(notifier) => notifier.notify(notice).await,
        None => TracingNotifier.notify(notice).await,
    }
}

/// Forwards notices into an unbounded channel.
#[derive(Clone, Debug)]
pub struct ChannelNotifier {
    tx: mpsc::UnboundedSender<Notice>,
}

impl ChannelNotifier {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Notice>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl Notifier for ChannelNotifier {
    async fn notify(&self, notice: Notice) {
        let _ = self.tx.send(notice);
    }
}

/// Logs notices and nothing else.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingNotifier;

#[async_trait]
impl Notifier for TracingNotifier {
    async fn notify(&self, notice: Notice) {
        if notice.is_error() {
            tracing::warn!(kind = notice.kind(), "{notice}");
        } else {
            tracing::info!(kind = notice.kind(), "{notice}");
        }
    }
}
