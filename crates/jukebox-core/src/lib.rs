//! Per-guild playback orchestration.
//!
//! The [`Orchestrator`] keeps an independent queue for every guild, plays one
//! track at a time through a [`PlaybackSink`], loads playlists in the
//! background, retries failed attachments and releases idle outputs. Track
//! lookup, audio output and user-facing messages are supplied by the caller
//! through the [`Resolver`], [`PlaybackSink`] and [`Notifier`] traits.

mod advance;
pub mod config;
pub mod error;
mod ingest;
pub mod notifier;
pub mod orchestrator;
pub mod resolver;
pub mod sink;
mod sweep;
pub mod tenant;
pub mod track;

#[cfg(test)]
mod testing;

pub use config::OrchestratorConfig;
pub use error::OrchestratorError;
pub use notifier::{ChannelNotifier, Notice, Notifier, TracingNotifier};
pub use orchestrator::{Orchestrator, Submitted};
pub use resolver::{ResolveError, Resolution, Resolver};
pub use sink::{
    AttachmentId, Completion, OutputState, PlaybackHandle, PlaybackOutcome, PlaybackSink,
    SinkError,
};
pub use tenant::{NowPlaying, QueueSnapshot};
pub use track::{PlaylistEntry, RequesterId, TenantId, Track, format_duration};
