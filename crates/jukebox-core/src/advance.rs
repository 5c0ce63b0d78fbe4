//! Advance loop and completion handling.
//!
//! Both functions run only on the tenant worker, so at most one advance is in
//! flight per tenant. Neither holds the tenant lock across resolver or sink
//! calls or across sleeps.

use std::sync::Arc;

use tokio::time::Instant;

use crate::notifier::{Notice, deliver};
use crate::orchestrator::{Inner, TenantSlot};
use crate::sink::{AttachmentId, OutputState, PlaybackHandle, PlaybackOutcome, SinkError};
use crate::tenant::ActivePlayback;
use crate::track::Track;

enum StartResult {
    Started {
        track: Track,
        attachment: AttachmentId,
        handle: Box<dyn PlaybackHandle>,
    },
    Failed {
        track: Track,
        reason: String,
    },
    Cancelled,
}

/// Start the next playable track, dropping tracks that fail every attempt.
///
/// The caller must hold the advance claim taken at `epoch`.
pub(crate) async fn advance(inner: &Arc<Inner>, slot: &TenantSlot, epoch: u64) {
    let tenant = slot.id;
    loop {
        let (track, notifier) = {
            let mut state = slot.state.lock().await;
            if slot.epoch() != epoch {
                tracing::debug!(guild = %tenant, "advance cancelled");
                return;
            }
            if state.now_playing.is_some() {
                state.advancing = false;
                return;
            }
            match state.pending.pop_front() {
                Some(track) => (track, state.notifier.clone()),
                None => {
                    state.advancing = false;
                    let announce = !state.queue_finished_announced;
                    state.queue_finished_announced = true;
                    let notifier = state.notifier.clone();
                    drop(state);
                    if announce {
                        tracing::info!(guild = %tenant, "queue finished");
                        deliver(notifier.as_ref(), Notice::QueueFinished).await;
                    }
                    return;
                }
            }
        };

        match start_track(inner, slot, track, epoch).await {
            StartResult::Started {
                track,
                attachment,
                handle,
            } => {
                let mut state = slot.state.lock().await;
                if slot.epoch() != epoch {
                    drop(state);
                    tracing::debug!(guild = %tenant, title = %track.title, "stopped while attaching");
                    handle.stop();
                    if let Err(err) = inner.sink.disconnect(tenant).await {
                        tracing::warn!(guild = %tenant, error = %err, "disconnect failed");
                    }
                    return;
                }
                let notice = Notice::NowPlaying {
                    title: track.title.clone(),
                    duration: track.duration,
                    thumbnail: track.thumbnail.clone(),
                    requested_by: track.requested_by.clone(),
                };
                tracing::info!(
                    guild = %tenant,
                    title = %track.title,
                    attachment = %attachment,
                    "now playing"
                );
                state.now_playing = Some(ActivePlayback {
                    track,
                    attachment,
                    handle,
                    started_at: Instant::now(),
                });
                state.advancing = false;
                state.queue_finished_announced = false;
                let notifier = state.notifier.clone();
                drop(state);
                deliver(notifier.as_ref(), notice).await;
                return;
            }
            StartResult::Failed { track, reason } => {
                tracing::warn!(guild = %tenant, title = %track.title, reason = %reason, "dropping track");
                deliver(
                    notifier.as_ref(),
                    Notice::TrackFailed {
                        title: track.title,
                        reason,
                    },
                )
                .await;
            }
            StartResult::Cancelled => {
                tracing::debug!(guild = %tenant, "advance cancelled during retry");
                return;
            }
        }
    }
}

/// Attach `track`, retrying with a fresh locator up to the configured limit.
async fn start_track(
    inner: &Arc<Inner>,
    slot: &TenantSlot,
    mut track: Track,
    epoch: u64,
) -> StartResult {
    let attempts = inner.config.max_attach_attempts.max(1);
    let mut reason = String::new();
    for attempt in 1..=attempts {
        if attempt > 1 {
            tokio::time::sleep(inner.config.retry_backoff * (attempt - 1)).await;
        }
        if slot.epoch() != epoch {
            return StartResult::Cancelled;
        }
        match try_attach(inner, slot, &mut track, attempt > 1).await {
            Ok((attachment, handle)) => {
                return StartResult::Started {
                    track,
                    attachment,
                    handle,
                };
            }
            Err(err) => {
                tracing::debug!(
                    guild = %slot.id,
                    title = %track.title,
                    attempt,
                    error = %err,
                    "attach attempt failed"
                );
                reason = err;
            }
        }
    }
    StartResult::Failed { track, reason }
}

async fn try_attach(
    inner: &Arc<Inner>,
    slot: &TenantSlot,
    track: &mut Track,
    retry: bool,
) -> Result<(AttachmentId, Box<dyn PlaybackHandle>), String> {
    let tenant = slot.id;
    if inner.sink.output_state(tenant) == OutputState::Disconnected {
        inner
            .sink
            .connect(tenant)
            .await
            .map_err(|err| err.to_string())?;
    }
    if retry || !track.has_locator() {
        track.resolved_locator = inner
            .resolver
            .refresh(track)
            .await
            .map_err(|err| err.to_string())?;
    }
    let completion = slot.completion();
    let attachment = completion.attachment();
    let handle = inner
        .sink
        .attach(tenant, track, completion)
        .await
        .map_err(|err| err.to_string())?;
    Ok((attachment, handle))
}

/// Handle a sink completion. Stale attachments are ignored.
pub(crate) async fn on_completion(
    inner: &Arc<Inner>,
    slot: &TenantSlot,
    attachment: AttachmentId,
    outcome: PlaybackOutcome,
) {
    let tenant = slot.id;
    let (active, notifier, epoch) = {
        let mut state = slot.state.lock().await;
        let Some(active) = state
            .now_playing
            .take_if(|active| active.attachment == attachment)
        else {
            tracing::debug!(guild = %tenant, attachment = %attachment, "ignoring stale completion");
            return;
        };
        state.advancing = true;
        (active, state.notifier.clone(), slot.epoch())
    };
    tracing::info!(
        guild = %tenant,
        title = %active.track.title,
        outcome = ?outcome,
        "playback ended"
    );

    if let PlaybackOutcome::Fault(reason) = outcome {
        deliver(
            notifier.as_ref(),
            Notice::PlaybackFault {
                title: active.track.title.clone(),
                reason,
            },
        )
        .await;
        if slot.epoch() == epoch {
            if let Err(err) = recover_output(inner, slot, epoch).await {
                tracing::warn!(guild = %tenant, error = %err, "output recovery failed");
                deliver(
                    notifier.as_ref(),
                    Notice::RecoveryFailed {
                        reason: err.to_string(),
                    },
                )
                .await;
            }
        }
    }
    drop(active);
    advance(inner, slot, epoch).await;
}

async fn recover_output(inner: &Arc<Inner>, slot: &TenantSlot, epoch: u64) -> Result<(), SinkError> {
    tracing::info!(guild = %slot.id, "reconnecting output after fault");
    inner.sink.disconnect(slot.id).await?;
    inner.sink.connect(slot.id).await?;
    if slot.epoch() != epoch {
        tracing::debug!(guild = %slot.id, "stopped during recovery, releasing output");
        inner.sink.disconnect(slot.id).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::config::OrchestratorConfig;
    use crate::notifier::{ChannelNotifier, Notifier};
    use crate::orchestrator::Orchestrator;
    use crate::testing::{FakeResolver, FakeSink, drain, settle};
    use crate::track::{RequesterId, TenantId};

    fn setup() -> (Orchestrator, Arc<FakeResolver>, Arc<FakeSink>) {
        let resolver = Arc::new(FakeResolver::default());
        let sink = Arc::new(FakeSink::default());
        let orchestrator =
            Orchestrator::new(OrchestratorConfig::default(), resolver.clone(), sink.clone());
        (orchestrator, resolver, sink)
    }

    async fn enqueue_all(
        orchestrator: &Orchestrator,
        tenant: TenantId,
        notifier: &Arc<dyn Notifier>,
        queries: &[&str],
    ) {
        for query in queries {
            let result = orchestrator
                .enqueue(tenant, query, RequesterId::default(), notifier.clone())
                .await;
            assert!(result.is_ok());
        }
    }

    #[tokio::test(start_paused = true)]
    async fn failing_track_is_dropped_after_three_attempts() {
        let (orchestrator, resolver, sink) = setup();
        sink.fail_attach("A", u32::MAX);
        let (notifier, mut rx) = ChannelNotifier::new();
        let notifier: Arc<dyn Notifier> = Arc::new(notifier);
        let tenant = TenantId(1);

        enqueue_all(&orchestrator, tenant, &notifier, &["A", "B"]).await;
        tokio::time::sleep(Duration::from_secs(10)).await;

        let snapshot = orchestrator.inspect(tenant).await;
        assert_eq!(
            snapshot.now_playing.map(|np| np.track.title),
            Some("B".to_string())
        );
        assert_eq!(sink.attached_titles(), vec!["B"]);
        // Retries two and three refresh the locator.
        assert_eq!(resolver.refreshes(), 2);
        let failed: Vec<_> = drain(&mut rx)
            .into_iter()
            .filter(|n| matches!(n, Notice::TrackFailed { .. }))
            .collect();
        assert_eq!(failed.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn failing_refresh_drops_track_and_plays_next() {
        let (orchestrator, resolver, sink) = setup();
        sink.fail_attach("A", 1);
        resolver.fail_refresh("A");
        let (notifier, mut rx) = ChannelNotifier::new();
        let notifier: Arc<dyn Notifier> = Arc::new(notifier);
        let tenant = TenantId(1);

        enqueue_all(&orchestrator, tenant, &notifier, &["A", "B"]).await;
        tokio::time::sleep(Duration::from_secs(10)).await;

        let snapshot = orchestrator.inspect(tenant).await;
        assert_eq!(
            snapshot.now_playing.map(|np| np.track.title),
            Some("B".to_string())
        );
        assert_eq!(sink.attached_titles(), vec!["B"]);
        assert_eq!(resolver.refreshes(), 2);
        let failed: Vec<_> = drain(&mut rx)
            .into_iter()
            .filter_map(|n| match n {
                Notice::TrackFailed { title, reason } => Some((title, reason)),
                _ => None,
            })
            .collect();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].0, "A");
        assert!(failed[0].1.contains("expired"));
    }

    #[tokio::test(start_paused = true)]
    async fn queue_finished_is_announced_again_after_refilled_track_fails() {
        let (orchestrator, _resolver, sink) = setup();
        let (notifier, mut rx) = ChannelNotifier::new();
        let notifier: Arc<dyn Notifier> = Arc::new(notifier);
        let tenant = TenantId(1);

        enqueue_all(&orchestrator, tenant, &notifier, &["A"]).await;
        settle().await;
        sink.finish(tenant);
        settle().await;

        sink.fail_attach("B", u32::MAX);
        enqueue_all(&orchestrator, tenant, &notifier, &["B"]).await;
        tokio::time::sleep(Duration::from_secs(10)).await;

        let kinds: Vec<_> = drain(&mut rx).iter().map(Notice::kind).collect();
        assert_eq!(
            kinds,
            vec![
                "enqueued",
                "now_playing",
                "queue_finished",
                "enqueued",
                "track_failed",
                "queue_finished"
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn transient_attach_failure_is_retried() {
        let (orchestrator, _resolver, sink) = setup();
        sink.fail_attach("A", 2);
        let (notifier, mut rx) = ChannelNotifier::new();
        let notifier: Arc<dyn Notifier> = Arc::new(notifier);
        let tenant = TenantId(1);

        enqueue_all(&orchestrator, tenant, &notifier, &["A"]).await;
        tokio::time::sleep(Duration::from_secs(10)).await;

        assert_eq!(sink.attached_titles(), vec!["A"]);
        assert!(
            !drain(&mut rx)
                .iter()
                .any(|n| matches!(n, Notice::TrackFailed { .. }))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn stop_during_backoff_aborts_retries() {
        let (orchestrator, resolver, sink) = setup();
        sink.fail_attach("A", u32::MAX);
        let (notifier, mut rx) = ChannelNotifier::new();
        let shared: Arc<dyn Notifier> = Arc::new(notifier.clone());
        let tenant = TenantId(1);

        enqueue_all(&orchestrator, tenant, &shared, &["A", "B"]).await;
        settle().await;
        // First attempt failed; the worker is now sleeping the backoff.
        assert_eq!(resolver.refreshes(), 0);
        let _ = orchestrator.stop(tenant, &notifier).await;
        tokio::time::sleep(Duration::from_secs(10)).await;

        assert_eq!(resolver.refreshes(), 0);
        assert!(sink.attached_titles().is_empty());
        let snapshot = orchestrator.inspect(tenant).await;
        assert!(snapshot.now_playing.is_none());
        assert!(snapshot.upcoming.is_empty());
        assert!(
            !drain(&mut rx)
                .iter()
                .any(|n| matches!(n, Notice::TrackFailed { .. } | Notice::NowPlaying { .. }))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn fault_reconnects_output_then_advances() {
        let (orchestrator, _resolver, sink) = setup();
        let (notifier, mut rx) = ChannelNotifier::new();
        let notifier: Arc<dyn Notifier> = Arc::new(notifier);
        let tenant = TenantId(1);

        enqueue_all(&orchestrator, tenant, &notifier, &["A", "B"]).await;
        settle().await;
        assert_eq!(sink.connects(), 1);
        sink.fault(tenant, "stream reset");
        settle().await;

        assert_eq!(sink.disconnects(), 1);
        assert_eq!(sink.connects(), 2);
        assert_eq!(sink.attached_titles(), vec!["A", "B"]);
        assert!(drain(&mut rx).iter().any(|n| matches!(
            n,
            Notice::PlaybackFault { title, .. } if title == "A"
        )));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_recovery_is_reported_and_advance_still_runs() {
        let (orchestrator, _resolver, sink) = setup();
        let (notifier, mut rx) = ChannelNotifier::new();
        let notifier: Arc<dyn Notifier> = Arc::new(notifier);
        let tenant = TenantId(1);

        enqueue_all(&orchestrator, tenant, &notifier, &["A", "B"]).await;
        settle().await;
        sink.fail_connects(1);
        sink.fault(tenant, "device lost");
        settle().await;

        let notices = drain(&mut rx);
        assert!(
            notices
                .iter()
                .any(|n| matches!(n, Notice::RecoveryFailed { .. }))
        );
        // Advance connects again on its own.
        assert_eq!(sink.attached_titles(), vec!["A", "B"]);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_during_recovery_keeps_output_released() {
        let (orchestrator, _resolver, sink) = setup();
        let (notifier, _rx) = ChannelNotifier::new();
        let shared: Arc<dyn Notifier> = Arc::new(notifier.clone());
        let tenant = TenantId(1);

        enqueue_all(&orchestrator, tenant, &shared, &["A", "B"]).await;
        settle().await;
        sink.delay_connects(Duration::from_secs(1));
        sink.fault(tenant, "stream reset");
        settle().await;
        // Recovery has disconnected and is waiting on the reconnect.
        assert!(!sink.is_connected(tenant));
        let _ = orchestrator.stop(tenant, &notifier).await;
        tokio::time::sleep(Duration::from_secs(2)).await;

        assert!(!sink.is_connected(tenant));
        assert_eq!(sink.attached_titles(), vec!["A"]);
        assert!(orchestrator.inspect(tenant).await.now_playing.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn stale_completion_is_ignored() {
        let (orchestrator, _resolver, sink) = setup();
        let (notifier, _rx) = ChannelNotifier::new();
        let notifier: Arc<dyn Notifier> = Arc::new(notifier);
        let tenant = TenantId(1);

        enqueue_all(&orchestrator, tenant, &notifier, &["A", "B", "C"]).await;
        settle().await;

        let slot = orchestrator.existing_slot(tenant).expect("tenant exists");
        slot.completion().finish(PlaybackOutcome::Finished);
        settle().await;

        let snapshot = orchestrator.inspect(tenant).await;
        assert_eq!(
            snapshot.now_playing.map(|np| np.track.title),
            Some("A".to_string())
        );
        assert_eq!(snapshot.upcoming.len(), 2);
    }
}
