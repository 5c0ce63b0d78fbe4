//! Track descriptors and identity types.
//!
//! A [`Track`] is produced by a [`Resolver`](crate::Resolver) and owned by the
//! tenant queue holding it until it is played or removed.

use std::fmt;
use std::time::Duration;

/// Tenant (guild) identifier. Each tenant has its own queue and output.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TenantId(pub u64);

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque identifier of the member who requested a track.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct RequesterId(pub String);

impl RequesterId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequesterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Playable track descriptor.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Track {
    /// Display title.
    pub title: String,
    /// Direct stream address. Empty until resolved; refreshed on retry since
    /// direct addresses expire.
    pub resolved_locator: String,
    /// Duration, when the resolver knows it.
    pub duration: Option<Duration>,
    /// Thumbnail URI.
    pub thumbnail: Option<String>,
    /// Original lookup key, used to re-resolve the locator.
    pub source_query: String,
    /// Member who requested the track.
    pub requested_by: RequesterId,
}

impl Track {
    /// Build a track with only a title and lookup key; the locator is resolved later.
    pub fn unresolved(title: impl Into<String>, source_query: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            resolved_locator: String::new(),
            duration: None,
            thumbnail: None,
            source_query: source_query.into(),
            requested_by: RequesterId::default(),
        }
    }

    /// True when the track has a direct locator that can be handed to a sink.
    pub fn has_locator(&self) -> bool {
        !self.resolved_locator.trim().is_empty()
    }

    /// Return the track stamped with the requesting member.
    pub fn requested_by(mut self, requester: RequesterId) -> Self {
        self.requested_by = requester;
        self
    }
}

/// A playlist item that has not been resolved into a [`Track`] yet.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlaylistEntry {
    /// Lookup key for the entry (usually a page URL or id).
    pub query: String,
    /// Title reported by the playlist listing, if any.
    pub title: Option<String>,
}

impl PlaylistEntry {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            title: None,
        }
    }

    /// Label used in logs and notices.
    pub fn label(&self) -> &str {
        self.title.as_deref().unwrap_or(&self.query)
    }
}

/// Format a duration as `m:ss` or `h:mm:ss`.
pub fn format_duration(duration: Duration) -> String {
    let total = duration.as_secs();
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let seconds = total % 60;
    if hours > 0 {
        format!("{hours}:{minutes:02}:{seconds:02}")
    } else {
        format!("{minutes}:{seconds:02}")
    }
}
