//! Conversions from orchestrator types to API models.

use jukebox_core::{QueueSnapshot, Submitted, Track};
use jukebox_types::{EnqueueKind, EnqueueResponse, QueueSnapshotResponse, TrackSummary};

pub fn track_summary(track: &Track) -> TrackSummary {
    TrackSummary {
        title: track.title.clone(),
        duration_ms: track.duration.map(|d| d.as_millis() as u64),
        thumbnail: track.thumbnail.clone(),
        requested_by: Some(track.requested_by.to_string()).filter(|id| !id.is_empty()),
        source_query: track.source_query.clone(),
    }
}

pub fn snapshot_response(snapshot: &QueueSnapshot) -> QueueSnapshotResponse {
    QueueSnapshotResponse {
        now_playing: snapshot
            .now_playing
            .as_ref()
            .map(|current| track_summary(&current.track)),
        elapsed_ms: snapshot
            .now_playing
            .as_ref()
            .map(|current| current.elapsed.as_millis() as u64),
        paused: snapshot.paused,
        upcoming: snapshot.upcoming.iter().map(track_summary).collect(),
        overflow: snapshot.overflow,
        ingesting: snapshot.ingesting,
        backlog: snapshot.backlog,
    }
}

pub fn enqueue_response(submitted: Submitted) -> EnqueueResponse {
    match submitted {
        Submitted::Track { title, position } => EnqueueResponse {
            kind: EnqueueKind::Track,
            title,
            position,
            remaining: 0,
        },
        Submitted::Playlist {
            first_title,
            remaining,
        } => EnqueueResponse {
            kind: EnqueueKind::Playlist,
            title: first_title,
            position: 0,
            remaining,
        },
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use jukebox_core::{NowPlaying, RequesterId};

    use super::*;

    #[test]
    fn anonymous_requester_is_omitted() {
        let mut track = Track::unresolved("Song", "song");
        track.duration = Some(Duration::from_millis(1500));
        let summary = track_summary(&track);
        assert_eq!(summary.requested_by, None);
        assert_eq!(summary.duration_ms, Some(1500));

        let summary = track_summary(&track.requested_by(RequesterId::new("alice")));
        assert_eq!(summary.requested_by.as_deref(), Some("alice"));
    }

    #[test]
    fn snapshot_carries_elapsed_time() {
        let snapshot = QueueSnapshot {
            now_playing: Some(NowPlaying {
                track: Track::unresolved("A", "a"),
                elapsed: Duration::from_secs(3),
            }),
            upcoming: vec![Track::unresolved("B", "b")],
            overflow: 4,
            ingesting: true,
            backlog: 9,
            paused: true,
        };
        let response = snapshot_response(&snapshot);
        assert_eq!(response.elapsed_ms, Some(3000));
        assert_eq!(response.upcoming.len(), 1);
        assert_eq!(response.overflow, 4);
        assert!(response.paused);
        assert!(response.ingesting);
    }
}
