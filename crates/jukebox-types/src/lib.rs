use serde::{Deserialize, Serialize};

/// Request to queue a track, playlist or search for a guild.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct EnqueueRequest {
    /// Direct link, playlist link or free-text search.
    pub query: String,
    /// Opaque id of the member asking for the track.
    #[serde(default)]
    pub requester: Option<String>,
}

/// What an enqueue request produced.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum EnqueueKind {
    /// A single track was queued.
    Track,
    /// A playlist was accepted; its first track is queued and the rest load in the background.
    Playlist,
}

/// Response for a successful enqueue.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct EnqueueResponse {
    pub kind: EnqueueKind,
    /// Title of the queued track (first playlist track for playlists).
    pub title: String,
    /// 1-based queue position; 0 when playback starts immediately.
    pub position: usize,
    /// Playlist entries still loading in the background.
    pub remaining: usize,
}

/// Track as shown in queue listings.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct TrackSummary {
    pub title: String,
    /// Duration in milliseconds, if known.
    pub duration_ms: Option<u64>,
    pub thumbnail: Option<String>,
    /// Member who requested the track.
    pub requested_by: Option<String>,
    /// Lookup key the track was resolved from.
    pub source_query: String,
}

/// Queue listing for a guild.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct QueueSnapshotResponse {
    pub now_playing: Option<TrackSummary>,
    /// Elapsed time of the current track in milliseconds.
    pub elapsed_ms: Option<u64>,
    pub paused: bool,
    /// Next tracks in play order (capped).
    pub upcoming: Vec<TrackSummary>,
    /// Pending tracks not listed in `upcoming`.
    pub overflow: usize,
    /// `true` while a playlist is still loading.
    pub ingesting: bool,
    /// Playlist entries not yet loaded.
    pub backlog: usize,
}

/// Request to remove a pending track.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct RemoveRequest {
    /// 1-based position in the pending queue.
    pub position: usize,
}

/// Response for a removed track.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct RemoveResponse {
    pub position: usize,
    pub track: TrackSummary,
}

/// Response for a queue clear.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ClearResponse {
    pub removed: usize,
}

/// One notice delivered to a guild.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct NoticeEntry {
    /// Monotonic id within the server process.
    pub id: u64,
    pub guild: u64,
    /// Machine-readable notice kind (for example `now_playing`).
    pub kind: String,
    /// Human-readable message.
    pub text: String,
    /// `true` when the notice reports a failure.
    pub error: bool,
    /// Unix timestamp in milliseconds.
    pub timestamp_ms: u64,
}

/// Recent notices for a guild, oldest first.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct NoticesResponse {
    pub notices: Vec<NoticeEntry>,
}

/// Error body returned by the control API.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ErrorResponse {
    /// Stable error code (for example `out_of_range`).
    pub code: String,
    pub message: String,
}
