//! Playback sink contract.
//!
//! A sink owns one output attachment per tenant and streams a single track at a
//! time into it. Completion is reported through the [`Completion`] token handed
//! to [`PlaybackSink::attach`]; the orchestrator receives it as an event on the
//! tenant's worker, in the order the sink emits them.

use std::fmt;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::orchestrator::TenantEvent;
use crate::track::{TenantId, Track};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SinkError {
    /// No output attachment exists for the tenant.
    #[error("output not connected for guild {0}")]
    NotConnected(TenantId),
    /// The playback process could not be started.
    #[error("failed to start playback: {0}")]
    Spawn(String),
    /// Output I/O failed.
    #[error("output i/o error: {0}")]
    Io(String),
    /// The sink does not support the requested control.
    #[error("unsupported sink operation: {0}")]
    Unsupported(&'static str),
}

/// State of a tenant's output as seen by the sink.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputState {
    /// No output attachment.
    Disconnected,
    /// Attached but not streaming.
    Idle,
    Playing,
    Paused,
}

impl OutputState {
    /// True for states the idle sweep must leave alone.
    pub fn is_active(self) -> bool {
        matches!(self, OutputState::Playing | OutputState::Paused)
    }
}

/// Identifies one sink attachment; completions carry it back.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct AttachmentId(pub u64);

impl fmt::Display for AttachmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Terminal signal for an attachment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PlaybackOutcome {
    /// Graceful end of track.
    Finished,
    /// Stopped through [`PlaybackHandle::stop`].
    Stopped,
    /// Playback-layer fault.
    Fault(String),
}

/// One-shot completion token for a single attachment.
///
/// Dropping the token without calling [`Completion::finish`] reports a fault so
/// the tenant is never left waiting on a lost callback.
pub struct Completion {
    tenant: TenantId,
    attachment: AttachmentId,
    tx: Option<mpsc::UnboundedSender<TenantEvent>>,
}

impl Completion {
    pub(crate) fn new(
        tenant: TenantId,
        attachment: AttachmentId,
        tx: mpsc::UnboundedSender<TenantEvent>,
    ) -> Self {
        Self {
            tenant,
            attachment,
            tx: Some(tx),
        }
    }

    pub fn tenant(&self) -> TenantId {
        self.tenant
    }

    pub fn attachment(&self) -> AttachmentId {
        self.attachment
    }

    /// Report the terminal outcome of the attachment.
    pub fn finish(mut self, outcome: PlaybackOutcome) {
        self.send(outcome);
    }

    fn send(&mut self, outcome: PlaybackOutcome) {
        if let Some(tx) = self.tx.take() {
            let _ = tx.send(TenantEvent::Finished {
                attachment: self.attachment,
                outcome,
            });
        }
    }
}

impl Drop for Completion {
    fn drop(&mut self) {
        if self.tx.is_some() {
            tracing::debug!(
                guild = %self.tenant,
                attachment = %self.attachment,
                "completion dropped without outcome"
            );
            self.send(PlaybackOutcome::Fault("completion dropped".to_string()));
        }
    }
}

impl fmt::Debug for Completion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Completion")
            .field("tenant", &self.tenant)
            .field("attachment", &self.attachment)
            .finish()
    }
}

/// Control handle for an active attachment.
pub trait PlaybackHandle: Send + Sync {
    /// Stop streaming. Must eventually consume the attachment's completion with
    /// [`PlaybackOutcome::Stopped`].
    fn stop(&self);
    fn pause(&self) -> Result<(), SinkError>;
    fn resume(&self) -> Result<(), SinkError>;
    fn is_paused(&self) -> bool;
}

#[async_trait]
pub trait PlaybackSink: Send + Sync {
    /// Create the tenant's output attachment.
    async fn connect(&self, tenant: TenantId) -> Result<(), SinkError>;
    /// Release the tenant's output attachment, stopping anything streaming.
    async fn disconnect(&self, tenant: TenantId) -> Result<(), SinkError>;
    /// Start streaming `track` into the tenant's output.
    async fn attach(
        &self,
        tenant: TenantId,
        track: &Track,
        completion: Completion,
    ) -> Result<Box<dyn PlaybackHandle>, SinkError>;
    fn output_state(&self, tenant: TenantId) -> OutputState;
    /// Tenants that currently hold an output attachment.
    fn connected_tenants(&self) -> Vec<TenantId>;
}
