//! Resolver contract.
//!
//! Turns a user query (direct locator or free-text search) into tracks.

use async_trait::async_trait;
use thiserror::Error;

use crate::track::{PlaylistEntry, Track};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ResolveError {
    /// The backend could not be reached or exited abnormally.
    #[error("resolver unavailable: {0}")]
    Unavailable(String),
    /// The query produced nothing playable.
    #[error("nothing found for {0}")]
    NotFound(String),
    /// The backend answered with data that could not be interpreted.
    #[error("invalid resolver response: {0}")]
    Invalid(String),
    /// The lookup did not finish in time.
    #[error("resolver timed out after {0}s")]
    Timeout(u64),
}

/// Result of resolving a query.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Resolution {
    /// A single playable track.
    Single(Track),
    /// A playlist. Entries are resolved lazily; `None` marks an entry the
    /// listing could not describe (deleted or private items).
    Playlist {
        title: Option<String>,
        entries: Vec<Option<PlaylistEntry>>,
    },
}

#[async_trait]
pub trait Resolver: Send + Sync {
    /// Resolve a direct locator or search key.
    async fn resolve(&self, query: &str) -> Result<Resolution, ResolveError>;
    /// Resolve one playlist entry into a playable track.
    async fn resolve_entry(&self, entry: &PlaylistEntry) -> Result<Track, ResolveError>;
    /// Fetch a fresh direct locator for a track.
    async fn refresh(&self, track: &Track) -> Result<String, ResolveError>;
}
