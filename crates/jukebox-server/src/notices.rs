//! Per-guild notice log.
//!
//! Keeps the most recent notices for each guild and broadcasts new ones to SSE
//! subscribers. [`BusNotifier`] is the orchestrator-facing side.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use jukebox_core::{Notice, Notifier, TenantId};
use jukebox_types::NoticeEntry;
use tokio::sync::broadcast;

pub struct NoticeBus {
    sender: broadcast::Sender<NoticeEntry>,
    buffers: Mutex<HashMap<u64, VecDeque<NoticeEntry>>>,
    capacity: usize,
    next_id: AtomicU64,
}

impl NoticeBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(16));
        Self {
            sender,
            buffers: Mutex::new(HashMap::new()),
            capacity: capacity.max(1),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<NoticeEntry> {
        self.sender.subscribe()
    }

    /// Recent notices for `guild`, oldest first.
    pub fn snapshot(&self, guild: TenantId) -> Vec<NoticeEntry> {
        self.buffers
            .lock()
            .map(|buffers| {
                buffers
                    .get(&guild.0)
                    .map(|buf| buf.iter().cloned().collect())
                    .unwrap_or_default()
            })
            .unwrap_or_default()
    }

    pub fn publish(&self, guild: TenantId, notice: &Notice) -> NoticeEntry {
        let timestamp_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        let entry = NoticeEntry {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            guild: guild.0,
            kind: notice.kind().to_string(),
            text: notice.to_string(),
            error: notice.is_error(),
            timestamp_ms,
        };
        if let Ok(mut buffers) = self.buffers.lock() {
            let buffer = buffers.entry(guild.0).or_default();
            buffer.push_back(entry.clone());
            while buffer.len() > self.capacity {
                buffer.pop_front();
            }
        }
        let _ = self.sender.send(entry.clone());
        entry
    }
}

/// Notifier that records into a [`NoticeBus`] under one guild.
pub struct BusNotifier {
    bus: Arc<NoticeBus>,
    guild: TenantId,
}

impl BusNotifier {
    pub fn new(bus: Arc<NoticeBus>, guild: TenantId) -> Self {
        Self { bus, guild }
    }
}

#[async_trait]
impl Notifier for BusNotifier {
    async fn notify(&self, notice: Notice) {
        if notice.is_error() {
            tracing::warn!(guild = %self.guild, kind = notice.kind(), "{notice}");
        } else {
            tracing::info!(guild = %self.guild, kind = notice.kind(), "{notice}");
        }
        self.bus.publish(self.guild, &notice);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffers_are_per_guild_and_bounded() {
        let bus = NoticeBus::new(2);
        bus.publish(TenantId(1), &Notice::Paused);
        bus.publish(TenantId(1), &Notice::Resumed);
        bus.publish(TenantId(1), &Notice::QueueFinished);
        bus.publish(TenantId(2), &Notice::Stopped);

        let first: Vec<_> = bus
            .snapshot(TenantId(1))
            .into_iter()
            .map(|entry| entry.kind)
            .collect();
        assert_eq!(first, vec!["resumed", "queue_finished"]);
        assert_eq!(bus.snapshot(TenantId(2)).len(), 1);
        assert!(bus.snapshot(TenantId(3)).is_empty());
    }

    #[tokio::test]
    async fn notifier_broadcasts_entries() {
        let bus = Arc::new(NoticeBus::new(8));
        let mut rx = bus.subscribe();
        let notifier = BusNotifier::new(bus.clone(), TenantId(9));
        notifier.notify(Notice::NothingPlaying).await;

        let entry = rx.recv().await.expect("entry");
        assert_eq!(entry.guild, 9);
        assert_eq!(entry.kind, "nothing_playing");
        assert!(entry.error);
        assert_eq!(entry.text, "Nothing is playing");
    }
}
