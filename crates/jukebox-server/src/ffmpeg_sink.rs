//! Guild audio output backed by ffmpeg.
//!
//! Each connected guild owns an output file. Attaching a track spawns ffmpeg
//! to decode the stream at native rate into raw PCM, and a pump task copies
//! its stdout into the guild's output until the stream ends, is stopped or
//! fails. Pausing stops the pump from reading, which back-pressures ffmpeg.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use jukebox_core::{
    AttachmentId, Completion, OutputState, PlaybackHandle, PlaybackOutcome, PlaybackSink,
    SinkError, TenantId, Track,
};
use tokio::fs::OpenOptions;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::process::{Child, Command};
use tokio::sync::{Notify, watch};

const CHUNK_BYTES: usize = 16 * 1024;
const STDERR_TAIL_BYTES: usize = 2048;

/// Resolved ffmpeg output settings.
#[derive(Clone, Debug, PartialEq)]
pub struct FfmpegConfig {
    pub binary: String,
    /// Output path; `{guild}` is replaced with the guild id. A regular file is
    /// truncated when the guild connects and appended to per track. Point it
    /// at a FIFO to feed a live consumer.
    pub output_template: String,
    /// Linear gain.
    pub volume: f32,
    pub sample_rate: u32,
    pub channels: u16,
}

impl Default for FfmpegConfig {
    fn default() -> Self {
        Self {
            binary: "ffmpeg".to_string(),
            output_template: "/tmp/jukebox/{guild}.pcm".to_string(),
            volume: 0.5,
            sample_rate: 48_000,
            channels: 2,
        }
    }
}

impl FfmpegConfig {
    pub fn output_path(&self, tenant: TenantId) -> PathBuf {
        PathBuf::from(self.output_template.replace("{guild}", &tenant.to_string()))
    }
}

/// Arguments for decoding `locator` into s16le PCM on stdout.
pub fn build_ffmpeg_args(config: &FfmpegConfig, locator: &str) -> Vec<String> {
    let mut args: Vec<String> = ["-hide_banner", "-nostdin", "-loglevel", "error"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    if locator.starts_with("http://") || locator.starts_with("https://") {
        args.extend(
            [
                "-reconnect",
                "1",
                "-reconnect_streamed",
                "1",
                "-reconnect_delay_max",
                "5",
            ]
            .iter()
            .map(|s| s.to_string()),
        );
    }
    args.extend(["-re".to_string(), "-i".to_string(), locator.to_string()]);
    args.extend([
        "-vn".to_string(),
        "-af".to_string(),
        format!("volume={:.2}", config.volume),
        "-f".to_string(),
        "s16le".to_string(),
        "-ar".to_string(),
        config.sample_rate.to_string(),
        "-ac".to_string(),
        config.channels.to_string(),
        "pipe:1".to_string(),
    ]);
    args
}

struct StreamControl {
    paused: watch::Sender<bool>,
    stop: Notify,
    finished: AtomicBool,
}

impl StreamControl {
    fn new() -> Self {
        let (paused, _) = watch::channel(false);
        Self {
            paused,
            stop: Notify::new(),
            finished: AtomicBool::new(false),
        }
    }

    fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }
}

struct ActiveStream {
    attachment: AttachmentId,
    control: Arc<StreamControl>,
}

struct OutputSlot {
    path: PathBuf,
    active: Option<ActiveStream>,
}

pub struct FfmpegSink {
    config: FfmpegConfig,
    outputs: Mutex<HashMap<TenantId, OutputSlot>>,
    next_stream: AtomicU64,
}

impl FfmpegSink {
    pub fn new(config: FfmpegConfig) -> Self {
        Self {
            config,
            outputs: Mutex::new(HashMap::new()),
            next_stream: AtomicU64::new(1),
        }
    }

    fn outputs(&self) -> std::sync::MutexGuard<'_, HashMap<TenantId, OutputSlot>> {
        self.outputs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn spawn_decoder(&self, locator: &str) -> Result<Child, SinkError> {
        let args = build_ffmpeg_args(&self.config, locator);
        Command::new(&self.config.binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|err| SinkError::Spawn(format!("{}: {err}", self.config.binary)))
    }
}

#[async_trait]
impl PlaybackSink for FfmpegSink {
    async fn connect(&self, tenant: TenantId) -> Result<(), SinkError> {
        if self.outputs().contains_key(&tenant) {
            return Ok(());
        }
        let path = self.config.output_path(tenant);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|err| SinkError::Io(format!("{}: {err}", parent.display())))?;
        }
        truncate_regular_file(&path).await?;
        let mut outputs = self.outputs();
        if !outputs.contains_key(&tenant) {
            tracing::info!(guild = %tenant, path = %path.display(), "output connected");
            outputs.insert(tenant, OutputSlot { path, active: None });
        }
        Ok(())
    }

    async fn disconnect(&self, tenant: TenantId) -> Result<(), SinkError> {
        let removed = self.outputs().remove(&tenant);
        if let Some(slot) = removed {
            if let Some(active) = slot.active {
                tracing::debug!(guild = %tenant, attachment = %active.attachment, "stopping stream");
                active.control.stop.notify_one();
            }
            tracing::info!(guild = %tenant, "output disconnected");
        }
        Ok(())
    }

    async fn attach(
        &self,
        tenant: TenantId,
        track: &Track,
        completion: Completion,
    ) -> Result<Box<dyn PlaybackHandle>, SinkError> {
        let path = self
            .outputs()
            .get(&tenant)
            .map(|slot| slot.path.clone())
            .ok_or(SinkError::NotConnected(tenant))?;
        if !track.has_locator() {
            return Err(SinkError::Spawn(format!(
                "{} has no stream address",
                track.title
            )));
        }
        let output = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|err| SinkError::Io(format!("{}: {err}", path.display())))?;
        let mut child = self.spawn_decoder(&track.resolved_locator)?;

        let control = Arc::new(StreamControl::new());
        {
            let mut outputs = self.outputs();
            let Some(slot) = outputs.get_mut(&tenant) else {
                let _ = child.start_kill();
                return Err(SinkError::NotConnected(tenant));
            };
            if let Some(previous) = slot.active.take() {
                previous.control.stop.notify_one();
            }
            slot.active = Some(ActiveStream {
                attachment: completion.attachment(),
                control: control.clone(),
            });
        }

        let stream = self.next_stream.fetch_add(1, Ordering::Relaxed);
        tracing::info!(
            guild = %tenant,
            attachment = %completion.attachment(),
            stream,
            title = %track.title,
            "decoder started"
        );
        tokio::spawn(pump(child, output, control.clone(), completion));
        Ok(Box::new(FfmpegHandle { control }))
    }

    fn output_state(&self, tenant: TenantId) -> OutputState {
        let outputs = self.outputs();
        let Some(slot) = outputs.get(&tenant) else {
            return OutputState::Disconnected;
        };
        match slot.active.as_ref() {
            Some(active) if !active.control.is_finished() => {
                if *active.control.paused.borrow() {
                    OutputState::Paused
                } else {
                    OutputState::Playing
                }
            }
            _ => OutputState::Idle,
        }
    }

    fn connected_tenants(&self) -> Vec<TenantId> {
        self.outputs().keys().copied().collect()
    }
}

/// Empty a leftover output file. FIFOs and missing paths are left alone.
async fn truncate_regular_file(path: &Path) -> Result<(), SinkError> {
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_file() => tokio::fs::File::create(path)
            .await
            .map(drop)
            .map_err(|err| SinkError::Io(format!("{}: {err}", path.display()))),
        _ => Ok(()),
    }
}

struct FfmpegHandle {
    control: Arc<StreamControl>,
}

impl PlaybackHandle for FfmpegHandle {
    fn stop(&self) {
        self.control.stop.notify_one();
    }

    fn pause(&self) -> Result<(), SinkError> {
        if self.control.is_finished() {
            return Err(SinkError::Io("stream already ended".to_string()));
        }
        self.control.paused.send_replace(true);
        Ok(())
    }

    fn resume(&self) -> Result<(), SinkError> {
        if self.control.is_finished() {
            return Err(SinkError::Io("stream already ended".to_string()));
        }
        self.control.paused.send_replace(false);
        Ok(())
    }

    fn is_paused(&self) -> bool {
        *self.control.paused.borrow()
    }
}

async fn pump<W>(mut child: Child, mut output: W, control: Arc<StreamControl>, completion: Completion)
where
    W: AsyncWrite + Unpin,
{
    let outcome = match child.stdout.take() {
        Some(stdout) => {
            let stderr = child.stderr.take().map(|stderr| tokio::spawn(read_tail(stderr)));
            let copied = copy_stream(stdout, &mut output, &control).await;
            let outcome = match copied {
                Ok(true) => PlaybackOutcome::Stopped,
                Ok(false) => match child.wait().await {
                    Ok(status) if status.success() => PlaybackOutcome::Finished,
                    Ok(status) => {
                        let tail = match stderr {
                            Some(task) => task.await.unwrap_or_default(),
                            None => String::new(),
                        };
                        PlaybackOutcome::Fault(if tail.is_empty() {
                            format!("ffmpeg exited with {status}")
                        } else {
                            tail
                        })
                    }
                    Err(err) => PlaybackOutcome::Fault(err.to_string()),
                },
                Err(reason) => PlaybackOutcome::Fault(reason),
            };
            if !matches!(outcome, PlaybackOutcome::Finished) {
                let _ = child.kill().await;
            }
            outcome
        }
        None => {
            let _ = child.kill().await;
            PlaybackOutcome::Fault("ffmpeg stdout unavailable".to_string())
        }
    };
    let _ = output.flush().await;
    control.finished.store(true, Ordering::Release);
    tracing::debug!(attachment = %completion.attachment(), ?outcome, "decoder finished");
    completion.finish(outcome);
}

/// Copy decoded audio until EOF. Returns `Ok(true)` when stopped.
async fn copy_stream<R, W>(mut input: R, output: &mut W, control: &StreamControl) -> Result<bool, String>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut paused = control.paused.subscribe();
    let mut buf = vec![0u8; CHUNK_BYTES];
    loop {
        let is_paused = *paused.borrow_and_update();
        if is_paused {
            tokio::select! {
                _ = control.stop.notified() => return Ok(true),
                _ = paused.changed() => continue,
            }
        }
        tokio::select! {
            _ = control.stop.notified() => return Ok(true),
            read = input.read(&mut buf) => match read {
                Ok(0) => return Ok(false),
                Ok(n) => output
                    .write_all(&buf[..n])
                    .await
                    .map_err(|err| format!("output write failed: {err}"))?,
                Err(err) => return Err(format!("decoder read failed: {err}")),
            },
        }
    }
}

async fn read_tail<R>(mut stderr: R) -> String
where
    R: AsyncRead + Unpin,
{
    let mut raw = Vec::new();
    let _ = stderr.read_to_end(&mut raw).await;
    let start = raw.len().saturating_sub(STDERR_TAIL_BYTES);
    String::from_utf8_lossy(&raw[start..]).trim().to_string()
}
