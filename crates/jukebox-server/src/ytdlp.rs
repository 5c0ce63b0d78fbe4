//! Track lookup through the `yt-dlp` executable.
//!
//! Direct links are listed with `--flat-playlist` so large playlists come back
//! quickly; each entry is resolved on its own later. Free text goes through a
//! `ytsearch1:` lookup. Direct stream addresses expire, so `refresh` asks for a
//! new one with `-g`.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use jukebox_core::{PlaylistEntry, ResolveError, Resolution, Resolver, Track};
use serde::Deserialize;
use tokio::process::Command;

const UNKNOWN_TITLE: &str = "Unknown title";

/// Resolved yt-dlp settings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct YtDlpConfig {
    pub binary: String,
    pub format: String,
    pub timeout: Duration,
    pub extra_args: Vec<String>,
}

impl Default for YtDlpConfig {
    fn default() -> Self {
        Self {
            binary: "yt-dlp".to_string(),
            format: "bestaudio/best".to_string(),
            timeout: Duration::from_secs(60),
            extra_args: Vec::new(),
        }
    }
}

/// Subset of the yt-dlp info JSON the resolver reads.
#[derive(Debug, Default, Deserialize)]
struct InfoJson {
    id: Option<String>,
    title: Option<String>,
    url: Option<String>,
    webpage_url: Option<String>,
    original_url: Option<String>,
    duration: Option<f64>,
    thumbnail: Option<String>,
    entries: Option<Vec<Option<InfoJson>>>,
}

/// True for queries that are links rather than search text.
pub fn is_locator(query: &str) -> bool {
    let query = query.trim();
    query.starts_with("https://") || query.starts_with("http://")
}

/// Argument yt-dlp should look up for `query`.
pub fn lookup_key(query: &str) -> String {
    let query = query.trim();
    if is_locator(query) {
        query.to_string()
    } else {
        format!("ytsearch1:{query}")
    }
}

pub struct YtDlpResolver {
    config: YtDlpConfig,
}

impl YtDlpResolver {
    pub fn new(config: YtDlpConfig) -> Self {
        Self { config }
    }

    fn base_args(&self) -> Vec<String> {
        let mut args = vec![
            "--no-warnings".to_string(),
            "--force-ipv4".to_string(),
            "-f".to_string(),
            self.config.format.clone(),
        ];
        args.extend(self.config.extra_args.iter().cloned());
        args
    }

    pub(crate) fn resolve_args(&self, query: &str) -> Vec<String> {
        let mut args = self.base_args();
        if is_locator(query) {
            args.extend(["-J".to_string(), "--flat-playlist".to_string()]);
        } else {
            args.extend(["-J".to_string(), "--no-playlist".to_string()]);
        }
        args.push(lookup_key(query));
        args
    }

    pub(crate) fn entry_args(&self, query: &str) -> Vec<String> {
        let mut args = self.base_args();
        args.extend(["-J".to_string(), "--no-playlist".to_string()]);
        args.push(lookup_key(query));
        args
    }

    pub(crate) fn refresh_args(&self, query: &str) -> Vec<String> {
        let mut args = self.base_args();
        args.extend(["-g".to_string(), "--no-playlist".to_string()]);
        args.push(lookup_key(query));
        args
    }

    async fn run(&self, args: Vec<String>) -> Result<String, ResolveError> {
        tracing::debug!(binary = %self.config.binary, args = ?args, "running yt-dlp");
        let mut cmd = Command::new(&self.config.binary);
        cmd.args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        let output = match tokio::time::timeout(self.config.timeout, cmd.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(err)) => {
                return Err(ResolveError::Unavailable(format!(
                    "{}: {err}",
                    self.config.binary
                )));
            }
            Err(_) => return Err(ResolveError::Timeout(self.config.timeout.as_secs())),
        };
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(classify_failure(&stderr, output.status.code()));
        }
        String::from_utf8(output.stdout)
            .map_err(|_| ResolveError::Invalid("yt-dlp output is not valid UTF-8".to_string()))
    }
}

#[async_trait]
impl Resolver for YtDlpResolver {
    async fn resolve(&self, query: &str) -> Result<Resolution, ResolveError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(ResolveError::NotFound("empty query".to_string()));
        }
        let raw = self.run(self.resolve_args(query)).await?;
        parse_resolution(&raw, query)
    }

    async fn resolve_entry(&self, entry: &PlaylistEntry) -> Result<Track, ResolveError> {
        let raw = self.run(self.entry_args(&entry.query)).await?;
        let mut track = parse_track(&raw, &entry.query)?;
        if track.title == UNKNOWN_TITLE {
            if let Some(title) = entry.title.as_ref() {
                track.title = title.clone();
            }
        }
        Ok(track)
    }

    async fn refresh(&self, track: &Track) -> Result<String, ResolveError> {
        let raw = self.run(self.refresh_args(&track.source_query)).await?;
        parse_locator(&raw)
    }
}

/// Map a failed yt-dlp run onto a resolve error.
fn classify_failure(stderr: &str, code: Option<i32>) -> ResolveError {
    let message = stderr
        .lines()
        .rev()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(|line| line.trim_start_matches("ERROR:").trim().to_string())
        .unwrap_or_else(|| format!("yt-dlp exited with status {}", code.unwrap_or(-1)));
    let lower = message.to_ascii_lowercase();
    if lower.contains("unsupported url")
        || lower.contains("unavailable")
        || lower.contains("private video")
        || lower.contains("does not exist")
    {
        ResolveError::NotFound(message)
    } else {
        ResolveError::Unavailable(message)
    }
}

fn parse_info(raw: &str) -> Result<InfoJson, ResolveError> {
    serde_json::from_str(raw).map_err(|err| ResolveError::Invalid(err.to_string()))
}

/// Interpret `yt-dlp -J` output for a user query.
pub(crate) fn parse_resolution(raw: &str, query: &str) -> Result<Resolution, ResolveError> {
    let info = parse_info(raw)?;
    match info.entries {
        Some(entries) if !is_locator(query) => {
            // Search results: a one-element list of full entries.
            let first = entries
                .into_iter()
                .flatten()
                .next()
                .ok_or_else(|| ResolveError::NotFound(query.to_string()))?;
            Ok(Resolution::Single(track_from_info(first, query)))
        }
        Some(entries) => Ok(Resolution::Playlist {
            title: info.title,
            entries: entries
                .into_iter()
                .map(|entry| entry.and_then(entry_from_info))
                .collect(),
        }),
        None => Ok(Resolution::Single(track_from_info(info, query))),
    }
}

/// Interpret `yt-dlp -J` output for one playlist entry.
pub(crate) fn parse_track(raw: &str, query: &str) -> Result<Track, ResolveError> {
    let mut info = parse_info(raw)?;
    if let Some(entries) = info.entries.take() {
        info = entries
            .into_iter()
            .flatten()
            .next()
            .ok_or_else(|| ResolveError::NotFound(query.to_string()))?;
    }
    Ok(track_from_info(info, query))
}

/// First direct address printed by `yt-dlp -g`.
pub(crate) fn parse_locator(raw: &str) -> Result<String, ResolveError> {
    raw.lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(str::to_string)
        .ok_or_else(|| ResolveError::Invalid("yt-dlp printed no stream address".to_string()))
}

fn track_from_info(info: InfoJson, query: &str) -> Track {
    let source_query = info
        .webpage_url
        .or(info.original_url)
        .unwrap_or_else(|| query.to_string());
    let mut track = Track::unresolved(
        info.title.unwrap_or_else(|| UNKNOWN_TITLE.to_string()),
        source_query,
    );
    track.resolved_locator = info.url.unwrap_or_default();
    track.duration = info
        .duration
        .filter(|secs| secs.is_finite() && *secs >= 0.0)
        .map(Duration::from_secs_f64);
    track.thumbnail = info.thumbnail;
    track
}

fn entry_from_info(info: InfoJson) -> Option<PlaylistEntry> {
    let query = info.url.or(info.webpage_url).or(info.id)?;
    Some(PlaylistEntry {
        query,
        title: info.title,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_text_uses_ytsearch() {
        assert_eq!(lookup_key("  lofi beats "), "ytsearch1:lofi beats");
        assert_eq!(
            lookup_key("https://www.youtube.com/watch?v=abc"),
            "https://www.youtube.com/watch?v=abc"
        );
    }

    #[test]
    fn links_are_listed_flat() {
        let resolver = YtDlpResolver::new(YtDlpConfig::default());
        let args = resolver.resolve_args("https://example.com/list");
        assert!(args.contains(&"--flat-playlist".to_string()));
        assert_eq!(args.last().map(String::as_str), Some("https://example.com/list"));

        let args = resolver.refresh_args("some song");
        assert!(args.contains(&"-g".to_string()));
        assert_eq!(args.last().map(String::as_str), Some("ytsearch1:some song"));
    }

    #[test]
    fn single_video_becomes_track() {
        let raw = r#"{
            "id": "abc",
            "title": "Song",
            "url": "https://cdn.example/audio",
            "webpage_url": "https://www.youtube.com/watch?v=abc",
            "duration": 215.0,
            "thumbnail": "https://i.example/abc.jpg"
        }"#;
        let resolution = parse_resolution(raw, "https://youtu.be/abc").unwrap();
        let Resolution::Single(track) = resolution else {
            panic!("expected single track");
        };
        assert_eq!(track.title, "Song");
        assert_eq!(track.resolved_locator, "https://cdn.example/audio");
        assert_eq!(track.source_query, "https://www.youtube.com/watch?v=abc");
        assert_eq!(track.duration, Some(Duration::from_secs(215)));
        assert_eq!(track.thumbnail.as_deref(), Some("https://i.example/abc.jpg"));
    }

    #[test]
    fn flat_playlist_keeps_null_entries() {
        let raw = r#"{
            "_type": "playlist",
            "title": "Mix",
            "entries": [
                {"_type": "url", "id": "a", "url": "https://www.youtube.com/watch?v=a", "title": "A"},
                null,
                {"_type": "url", "id": "b", "title": "B"}
            ]
        }"#;
        let resolution = parse_resolution(raw, "https://www.youtube.com/playlist?list=x").unwrap();
        let Resolution::Playlist { title, entries } = resolution else {
            panic!("expected playlist");
        };
        assert_eq!(title.as_deref(), Some("Mix"));
        assert_eq!(entries.len(), 3);
        assert!(entries[1].is_none());
        let first = entries[0].as_ref().unwrap();
        assert_eq!(first.query, "https://www.youtube.com/watch?v=a");
        assert_eq!(entries[2].as_ref().unwrap().query, "b");
    }

    #[test]
    fn search_result_takes_first_entry() {
        let raw = r#"{"_type": "playlist", "entries": [{"title": "Found", "url": "https://cdn/x", "webpage_url": "https://w/x"}]}"#;
        let Resolution::Single(track) = parse_resolution(raw, "some song").unwrap() else {
            panic!("expected single track");
        };
        assert_eq!(track.title, "Found");
        assert_eq!(track.source_query, "https://w/x");

        let empty = r#"{"_type": "playlist", "entries": []}"#;
        assert!(matches!(
            parse_resolution(empty, "nothing"),
            Err(ResolveError::NotFound(_))
        ));
    }

    #[test]
    fn garbage_output_is_invalid() {
        assert!(matches!(
            parse_resolution("not json", "x"),
            Err(ResolveError::Invalid(_))
        ));
        assert!(matches!(parse_locator("\n \n"), Err(ResolveError::Invalid(_))));
        assert_eq!(
            parse_locator("\nhttps://cdn/a\nhttps://cdn/b\n").unwrap(),
            "https://cdn/a"
        );
    }

    #[test]
    fn failures_are_classified_from_stderr() {
        let err = classify_failure("WARNING: x\nERROR: [youtube] abc: Video unavailable\n", Some(1));
        assert_eq!(
            err,
            ResolveError::NotFound("[youtube] abc: Video unavailable".to_string())
        );
        assert!(matches!(
            classify_failure("", Some(2)),
            ResolveError::Unavailable(_)
        ));
    }

    #[tokio::test]
    async fn missing_binary_is_unavailable() {
        let resolver = YtDlpResolver::new(YtDlpConfig {
            binary: "/nonexistent/yt-dlp".to_string(),
            ..YtDlpConfig::default()
        });
        assert!(matches!(
            resolver.resolve("anything").await,
            Err(ResolveError::Unavailable(_))
        ));
    }
}
