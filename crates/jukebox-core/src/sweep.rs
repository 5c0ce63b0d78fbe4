//! Idle output reclamation.

use std::sync::{Arc, Weak};

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::notifier::{Notice, deliver};
use crate::orchestrator::Inner;

/// Release every connected tenant whose output is neither playing nor paused.
///
/// Tenants are handled one at a time under their own lock. Activity is
/// re-checked once the lock is held; a tenant with an advance in flight or a
/// track on air is left for the next pass.
pub(crate) async fn sweep_idle(inner: &Arc<Inner>) -> usize {
    let mut released = 0;
    for tenant in inner.sink.connected_tenants() {
        if inner.sink.output_state(tenant).is_active() {
            continue;
        }
        let (active, notifier) = match inner.existing_slot(tenant) {
            Some(slot) => {
                let mut state = slot.state.lock().await;
                if state.advancing {
                    tracing::debug!(guild = %tenant, "advance in flight, skipping idle check");
                    continue;
                }
                if state.now_playing.is_some() || inner.sink.output_state(tenant).is_active() {
                    tracing::debug!(guild = %tenant, "output became active, skipping idle check");
                    continue;
                }
                slot.bump_epoch();
                (state.reset(), state.notifier.clone())
            }
            None => (None, None),
        };
        if let Some(active) = active {
            active.handle.stop();
        }
        if let Err(err) = inner.sink.disconnect(tenant).await {
            tracing::warn!(guild = %tenant, error = %err, "idle disconnect failed");
            continue;
        }
        tracing::info!(guild = %tenant, "released idle output");
        deliver(notifier.as_ref(), Notice::IdleDisconnected).await;
        released += 1;
    }
    released
}

pub(crate) fn spawn_idle_sweep(inner: &Arc<Inner>) -> JoinHandle<()> {
    let weak = Arc::downgrade(inner);
    let period = inner.config.idle_sweep;
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let Some(inner) = Weak::upgrade(&weak) else {
                tracing::debug!("idle sweep exiting");
                return;
            };
            let released = sweep_idle(&inner).await;
            if released > 0 {
                tracing::info!(released, "idle sweep");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::config::OrchestratorConfig;
    use crate::notifier::{ChannelNotifier, Notifier};
    use crate::orchestrator::Orchestrator;
    use crate::sink::PlaybackSink;
    use crate::testing::{FakeResolver, FakeSink, drain, settle};
    use crate::track::{RequesterId, TenantId};

    fn setup() -> (Orchestrator, Arc<FakeSink>) {
        let resolver = Arc::new(FakeResolver::default());
        let sink = Arc::new(FakeSink::default());
        let orchestrator = Orchestrator::new(OrchestratorConfig::default(), resolver, sink.clone());
        (orchestrator, sink)
    }

    #[tokio::test(start_paused = true)]
    async fn idle_output_is_released() {
        let (orchestrator, sink) = setup();
        let (notifier, mut rx) = ChannelNotifier::new();
        let tenant = TenantId(7);

        let _ = orchestrator
            .enqueue(tenant, "A", RequesterId::default(), Arc::new(notifier))
            .await;
        settle().await;
        sink.finish(tenant);
        settle().await;
        assert!(sink.is_connected(tenant));
        drain(&mut rx);

        assert_eq!(orchestrator.sweep_idle().await, 1);
        assert!(!sink.is_connected(tenant));
        let snapshot = orchestrator.inspect(tenant).await;
        assert!(snapshot.now_playing.is_none());
        assert!(snapshot.upcoming.is_empty());
        assert_eq!(drain(&mut rx), vec![Notice::IdleDisconnected]);
    }

    #[tokio::test(start_paused = true)]
    async fn playing_and_paused_outputs_are_kept() {
        let (orchestrator, sink) = setup();
        let (notifier, _rx) = ChannelNotifier::new();
        let shared: Arc<dyn Notifier> = Arc::new(notifier.clone());

        for (tenant, query) in [(TenantId(1), "A"), (TenantId(2), "B")] {
            let _ = orchestrator
                .enqueue(tenant, query, RequesterId::default(), shared.clone())
                .await;
        }
        settle().await;
        let _ = orchestrator.pause(TenantId(2), &notifier).await;

        assert_eq!(orchestrator.sweep_idle().await, 0);
        assert!(sink.is_connected(TenantId(1)));
        assert!(sink.is_connected(TenantId(2)));
    }

    #[tokio::test(start_paused = true)]
    async fn track_on_air_is_kept_when_output_reads_idle() {
        let (orchestrator, sink) = setup();
        let (notifier, mut rx) = ChannelNotifier::new();
        let tenant = TenantId(3);

        let _ = orchestrator
            .enqueue(tenant, "A", RequesterId::default(), Arc::new(notifier))
            .await;
        settle().await;
        drain(&mut rx);
        // The output looks idle but the tenant already holds an attachment.
        sink.report_idle(tenant);

        assert_eq!(orchestrator.sweep_idle().await, 0);
        assert!(sink.is_connected(tenant));
        let snapshot = orchestrator.inspect(tenant).await;
        assert_eq!(
            snapshot.now_playing.map(|np| np.track.title),
            Some("A".to_string())
        );
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn tenant_with_advance_in_flight_is_skipped() {
        let (orchestrator, sink) = setup();
        sink.fail_attach("A", u32::MAX);
        let (notifier, _rx) = ChannelNotifier::new();
        let tenant = TenantId(1);

        let _ = orchestrator
            .enqueue(tenant, "A", RequesterId::default(), Arc::new(notifier))
            .await;
        settle().await;
        // Connected and idle, but the worker is sleeping between attach attempts.
        assert!(sink.is_connected(tenant));
        assert_eq!(orchestrator.sweep_idle().await, 0);
        assert!(sink.is_connected(tenant));
    }

    #[tokio::test(start_paused = true)]
    async fn periodic_sweep_runs_on_interval() {
        let (orchestrator, sink) = setup();
        sink.connect(TenantId(5)).await.expect("connect");
        let handle = orchestrator.spawn_idle_sweep();

        tokio::time::sleep(Duration::from_secs(299)).await;
        assert!(sink.is_connected(TenantId(5)));
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(!sink.is_connected(TenantId(5)));

        drop(orchestrator);
        tokio::time::sleep(Duration::from_secs(301)).await;
        assert!(handle.is_finished());
    }
}
