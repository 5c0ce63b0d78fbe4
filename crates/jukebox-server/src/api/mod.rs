//! HTTP API handlers.
//!
//! Defines the Actix routes for guild queues, playback control and notices.

pub mod health;
pub mod notices;
pub mod playback;
pub mod queue;
pub mod streams;

use actix_web::HttpResponse;
use jukebox_core::OrchestratorError;
use jukebox_types::ErrorResponse;

pub use notices::notices_list;
pub use playback::{guild_leave, guild_pause, guild_resume, guild_skip, guild_stop, outputs_sweep};
pub use queue::{queue_clear, queue_enqueue, queue_list, queue_remove};
pub use streams::notices_stream;

/// Errors returned by API handlers.
#[derive(Debug)]
pub(crate) enum ApiError {
    Orchestrator(OrchestratorError),
    BadRequest(String),
}

impl From<OrchestratorError> for ApiError {
    fn from(err: OrchestratorError) -> Self {
        ApiError::Orchestrator(err)
    }
}

impl ApiError {
    /// Convert an API error into an HTTP response.
    pub(crate) fn into_response(self) -> HttpResponse {
        let (mut builder, code, message) = match self {
            ApiError::BadRequest(message) => (HttpResponse::BadRequest(), "bad_request", message),
            ApiError::Orchestrator(err) => {
                let message = err.to_string();
                match err {
                    OrchestratorError::OutOfRange { .. } => {
                        (HttpResponse::BadRequest(), "out_of_range", message)
                    }
                    OrchestratorError::NothingPlaying => {
                        (HttpResponse::Conflict(), "nothing_playing", message)
                    }
                    OrchestratorError::NothingPaused => {
                        (HttpResponse::Conflict(), "nothing_paused", message)
                    }
                    OrchestratorError::ResolutionFailed { .. } => {
                        (HttpResponse::UnprocessableEntity(), "resolution_failed", message)
                    }
                    OrchestratorError::EmptyPlaylist { .. } => {
                        (HttpResponse::UnprocessableEntity(), "empty_playlist", message)
                    }
                    OrchestratorError::Sink(_) => {
                        (HttpResponse::ServiceUnavailable(), "output_unavailable", message)
                    }
                }
            }
        };
        builder.json(ErrorResponse {
            code: code.to_string(),
            message,
        })
    }
}
