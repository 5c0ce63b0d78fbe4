use thiserror::Error;

use crate::resolver::ResolveError;
use crate::sink::SinkError;

/// Errors returned to callers of the orchestrator.
///
/// Each of these is also delivered to the tenant's notifier.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum OrchestratorError {
    #[error("could not resolve {query}: {source}")]
    ResolutionFailed {
        query: String,
        #[source]
        source: ResolveError,
    },
    #[error("playlist {query} has no playable entries")]
    EmptyPlaylist { query: String },
    #[error("position {position} out of range (queue length {len})")]
    OutOfRange { position: usize, len: usize },
    #[error("nothing is playing")]
    NothingPlaying,
    #[error("nothing is paused")]
    NothingPaused,
    #[error(transparent)]
    Sink(#[from] SinkError),
}
