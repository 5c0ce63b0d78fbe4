//! Plain-text rendering of server responses.

use jukebox_types::{EnqueueKind, EnqueueResponse, NoticeEntry, QueueSnapshotResponse, TrackSummary};

pub(crate) fn format_ms(ms: u64) -> String {
    let total = ms / 1000;
    let (hours, minutes, seconds) = (total / 3600, (total % 3600) / 60, total % 60);
    if hours > 0 {
        format!("{hours}:{minutes:02}:{seconds:02}")
    } else {
        format!("{minutes}:{seconds:02}")
    }
}

fn track_line(track: &TrackSummary) -> String {
    let mut line = track.title.clone();
    if let Some(ms) = track.duration_ms {
        line.push_str(&format!(" [{}]", format_ms(ms)));
    }
    if let Some(who) = track.requested_by.as_deref() {
        line.push_str(&format!(" ({who})"));
    }
    line
}

pub(crate) fn enqueue(resp: &EnqueueResponse) -> String {
    match resp.kind {
        EnqueueKind::Track if resp.position == 0 => format!("Playing {}", resp.title),
        EnqueueKind::Track => format!("Queued {} at position {}", resp.title, resp.position),
        EnqueueKind::Playlist => format!(
            "Queued {}; loading {} more from the playlist",
            resp.title, resp.remaining
        ),
    }
}

pub(crate) fn queue(resp: &QueueSnapshotResponse) -> String {
    let mut out = String::new();
    match resp.now_playing.as_ref() {
        Some(current) => {
            let state = if resp.paused { "Paused" } else { "Now playing" };
            out.push_str(&format!("{state}: {}", current.title));
            match (resp.elapsed_ms, current.duration_ms) {
                (Some(elapsed), Some(total)) => {
                    out.push_str(&format!(" [{} / {}]", format_ms(elapsed), format_ms(total)))
                }
                (Some(elapsed), None) => out.push_str(&format!(" [{}]", format_ms(elapsed))),
                _ => {}
            }
            out.push('\n');
        }
        None => out.push_str("Nothing playing\n"),
    }
    if resp.upcoming.is_empty() {
        out.push_str("Queue is empty\n");
    }
    for (idx, track) in resp.upcoming.iter().enumerate() {
        out.push_str(&format!("{:>3}. {}\n", idx + 1, track_line(track)));
    }
    if resp.overflow > 0 {
        out.push_str(&format!("     ... and {} more\n", resp.overflow));
    }
    if resp.ingesting {
        out.push_str(&format!("Loading playlist: {} entries left\n", resp.backlog));
    }
    out
}

pub(crate) fn notice(entry: &NoticeEntry) -> String {
    let marker = if entry.error { "!" } else { "-" };
    format!("{marker} {}", entry.text)
}
