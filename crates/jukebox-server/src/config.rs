//! Configuration loading and parsing.
//!
//! Every field of the TOML file is optional; the `*_from_config` helpers turn
//! the raw sections into the resolved settings each component takes.

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use jukebox_core::OrchestratorConfig;
use serde::Deserialize;

use crate::ffmpeg_sink::FfmpegConfig;
use crate::ytdlp::YtDlpConfig;

/// Default per-guild notice history.
pub const DEFAULT_NOTICE_CAPACITY: usize = 50;

/// Top-level server configuration loaded from TOML.
#[derive(Debug, Default, Deserialize)]
pub struct ServerConfig {
    /// Bind address (host:port).
    pub bind: Option<String>,
    /// Track lookup settings.
    pub ytdlp: Option<YtDlpSection>,
    /// Audio output settings.
    pub ffmpeg: Option<FfmpegSection>,
    /// Queue and retry tuning.
    pub playback: Option<PlaybackSection>,
    /// Notice history settings.
    pub notices: Option<NoticesSection>,
}

#[derive(Debug, Default, Deserialize)]
pub struct YtDlpSection {
    /// Path or name of the yt-dlp executable.
    pub binary: Option<String>,
    /// Format selector (default `bestaudio/best`).
    pub format: Option<String>,
    /// Per-invocation timeout in seconds.
    pub timeout_secs: Option<u64>,
    /// Extra arguments appended to every invocation.
    pub extra_args: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
pub struct FfmpegSection {
    /// Path or name of the ffmpeg executable.
    pub binary: Option<String>,
    /// Output path template; `{guild}` is replaced with the guild id.
    pub output: Option<String>,
    /// Linear gain applied to the stream.
    pub volume: Option<f32>,
    pub sample_rate: Option<u32>,
    pub channels: Option<u16>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PlaybackSection {
    pub max_attach_attempts: Option<u32>,
    pub retry_backoff_ms: Option<u64>,
    pub ingest_pacing_ms: Option<u64>,
    pub progress_every: Option<usize>,
    pub idle_sweep_secs: Option<u64>,
    pub inspect_limit: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
pub struct NoticesSection {
    /// Notices kept per guild.
    pub capacity: Option<usize>,
}

impl ServerConfig {
    /// Load configuration from disk.
    pub fn load(path: &Path) -> Result<Self> {
        let raw =
            std::fs::read_to_string(path).with_context(|| format!("read config {:?}", path))?;
        Self::parse(&raw).with_context(|| format!("parse config {:?}", path))
    }

    pub fn parse(raw: &str) -> Result<Self> {
        Ok(toml::from_str::<ServerConfig>(raw)?)
    }
}

/// Parse an optional bind address from config.
pub fn bind_from_config(cfg: &ServerConfig) -> Result<Option<SocketAddr>> {
    let Some(bind) = cfg.bind.as_deref() else {
        return Ok(None);
    };
    let addr = bind.parse().with_context(|| format!("parse bind {bind}"))?;
    Ok(Some(addr))
}

/// Resolve orchestrator tuning, falling back to defaults per field.
pub fn orchestrator_config_from_config(cfg: &ServerConfig) -> Result<OrchestratorConfig> {
    let defaults = OrchestratorConfig::default();
    let Some(section) = cfg.playback.as_ref() else {
        return Ok(defaults);
    };
    let max_attach_attempts = section
        .max_attach_attempts
        .unwrap_or(defaults.max_attach_attempts);
    if max_attach_attempts == 0 {
        return Err(anyhow::anyhow!(
            "playback.max_attach_attempts must be at least 1"
        ));
    }
    let idle_sweep = section
        .idle_sweep_secs
        .map(Duration::from_secs)
        .unwrap_or(defaults.idle_sweep);
    if idle_sweep.is_zero() {
        return Err(anyhow::anyhow!("playback.idle_sweep_secs must be positive"));
    }
    Ok(OrchestratorConfig {
        max_attach_attempts,
        retry_backoff: section
            .retry_backoff_ms
            .map(Duration::from_millis)
            .unwrap_or(defaults.retry_backoff),
        ingest_pacing: section
            .ingest_pacing_ms
            .map(Duration::from_millis)
            .unwrap_or(defaults.ingest_pacing),
        progress_every: section.progress_every.unwrap_or(defaults.progress_every),
        idle_sweep,
        inspect_limit: section.inspect_limit.unwrap_or(defaults.inspect_limit),
    })
}

/// Resolve yt-dlp settings.
pub fn ytdlp_config_from_config(cfg: &ServerConfig) -> Result<YtDlpConfig> {
    let defaults = YtDlpConfig::default();
    let Some(section) = cfg.ytdlp.as_ref() else {
        return Ok(defaults);
    };
    let timeout = section
        .timeout_secs
        .map(Duration::from_secs)
        .unwrap_or(defaults.timeout);
    if timeout.is_zero() {
        return Err(anyhow::anyhow!("ytdlp.timeout_secs must be positive"));
    }
    Ok(YtDlpConfig {
        binary: non_empty(section.binary.as_deref()).unwrap_or(defaults.binary),
        format: non_empty(section.format.as_deref()).unwrap_or(defaults.format),
        timeout,
        extra_args: section.extra_args.clone().unwrap_or_default(),
    })
}

/// Resolve ffmpeg output settings.
pub fn ffmpeg_config_from_config(cfg: &ServerConfig) -> Result<FfmpegConfig> {
    let defaults = FfmpegConfig::default();
    let Some(section) = cfg.ffmpeg.as_ref() else {
        return Ok(defaults);
    };
    let output_template =
        non_empty(section.output.as_deref()).unwrap_or(defaults.output_template);
    if !output_template.contains("{guild}") {
        return Err(anyhow::anyhow!(
            "ffmpeg.output must contain the {{guild}} placeholder"
        ));
    }
    let volume = section.volume.unwrap_or(defaults.volume);
    if !volume.is_finite() || !(0.0..=4.0).contains(&volume) {
        return Err(anyhow::anyhow!("ffmpeg.volume must be between 0.0 and 4.0"));
    }
    let channels = section.channels.unwrap_or(defaults.channels);
    if channels == 0 {
        return Err(anyhow::anyhow!("ffmpeg.channels must be positive"));
    }
    Ok(FfmpegConfig {
        binary: non_empty(section.binary.as_deref()).unwrap_or(defaults.binary),
        output_template,
        volume,
        sample_rate: section.sample_rate.unwrap_or(defaults.sample_rate),
        channels,
    })
}

/// Resolve the per-guild notice history size.
pub fn notice_capacity_from_config(cfg: &ServerConfig) -> usize {
    cfg.notices
        .as_ref()
        .and_then(|section| section.capacity)
        .filter(|capacity| *capacity > 0)
        .unwrap_or(DEFAULT_NOTICE_CAPACITY)
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}
