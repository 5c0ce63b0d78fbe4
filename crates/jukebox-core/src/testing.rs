//! In-memory resolver and sink doubles for orchestrator tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::notifier::Notice;
use crate::resolver::{ResolveError, Resolution, Resolver};
use crate::sink::{
    AttachmentId, Completion, OutputState, PlaybackHandle, PlaybackOutcome, PlaybackSink,
    SinkError,
};
use crate::track::{PlaylistEntry, TenantId, Track};

/// Let spawned tasks run until they block.
pub(crate) async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

pub(crate) fn drain(rx: &mut mpsc::UnboundedReceiver<Notice>) -> Vec<Notice> {
    let mut notices = Vec::new();
    while let Ok(notice) = rx.try_recv() {
        notices.push(notice);
    }
    notices
}

fn locator(query: &str) -> String {
    format!("direct://{query}")
}

#[derive(Default)]
struct ResolverState {
    playlists: HashMap<String, Vec<Option<PlaylistEntry>>>,
    failing_queries: HashSet<String>,
    failing_entries: HashSet<String>,
    failing_refreshes: HashSet<String>,
    refreshes: usize,
}

/// Resolves any query to a single track titled after it, unless told otherwise.
#[derive(Default)]
pub(crate) struct FakeResolver {
    state: Mutex<ResolverState>,
}

impl FakeResolver {
    pub(crate) fn playlist(&self, query: &str, items: &[&str]) {
        let entries = items.iter().map(|item| Some(PlaylistEntry::new(*item))).collect();
        self.playlist_entries(query, entries);
    }

    pub(crate) fn playlist_entries(&self, query: &str, entries: Vec<Option<PlaylistEntry>>) {
        let mut state = self.state.lock().unwrap();
        state.playlists.insert(query.to_string(), entries);
    }

    pub(crate) fn fail_query(&self, query: &str) {
        self.state.lock().unwrap().failing_queries.insert(query.to_string());
    }

    pub(crate) fn fail_entry(&self, query: &str) {
        self.state.lock().unwrap().failing_entries.insert(query.to_string());
    }

    /// Make every locator refresh for `query` fail.
    pub(crate) fn fail_refresh(&self, query: &str) {
        self.state.lock().unwrap().failing_refreshes.insert(query.to_string());
    }

    pub(crate) fn refreshes(&self) -> usize {
        self.state.lock().unwrap().refreshes
    }
}

#[async_trait]
impl Resolver for FakeResolver {
    async fn resolve(&self, query: &str) -> Result<Resolution, ResolveError> {
        let state = self.state.lock().unwrap();
        if state.failing_queries.contains(query) {
            return Err(ResolveError::NotFound(query.to_string()));
        }
        if let Some(entries) = state.playlists.get(query) {
            return Ok(Resolution::Playlist {
                title: Some(query.to_string()),
                entries: entries.clone(),
            });
        }
        let mut track = Track::unresolved(query, query);
        track.resolved_locator = locator(query);
        Ok(Resolution::Single(track))
    }

    async fn resolve_entry(&self, entry: &PlaylistEntry) -> Result<Track, ResolveError> {
        let state = self.state.lock().unwrap();
        if state.failing_entries.contains(&entry.query) {
            return Err(ResolveError::NotFound(entry.query.clone()));
        }
        let mut track = Track::unresolved(entry.label(), entry.query.clone());
        track.resolved_locator = locator(&entry.query);
        Ok(track)
    }

    async fn refresh(&self, track: &Track) -> Result<String, ResolveError> {
        let mut state = self.state.lock().unwrap();
        state.refreshes += 1;
        if state.failing_refreshes.contains(&track.source_query) {
            return Err(ResolveError::Unavailable(format!("{} expired", track.source_query)));
        }
        Ok(format!("{}?fresh={}", locator(&track.source_query), state.refreshes))
    }
}

struct ActiveAttachment {
    attachment: AttachmentId,
    completion: Completion,
    paused: Arc<AtomicBool>,
}

#[derive(Default)]
struct SinkState {
    connected: HashSet<TenantId>,
    active: HashMap<TenantId, ActiveAttachment>,
    attached: Vec<String>,
    /// Remaining attach failures per track title.
    failing: HashMap<String, u32>,
    failing_connects: u32,
    connect_delay: Duration,
    /// Tenants whose output reads idle regardless of the active attachment.
    idle_reports: HashSet<TenantId>,
    connects: usize,
    disconnects: usize,
}

/// Records attachments and holds their completions until the test finishes them.
#[derive(Default)]
pub(crate) struct FakeSink {
    state: Arc<Mutex<SinkState>>,
}

impl FakeSink {
    pub(crate) fn attached_titles(&self) -> Vec<String> {
        self.state.lock().unwrap().attached.clone()
    }

    pub(crate) fn is_connected(&self, tenant: TenantId) -> bool {
        self.state.lock().unwrap().connected.contains(&tenant)
    }

    pub(crate) fn connects(&self) -> usize {
        self.state.lock().unwrap().connects
    }

    pub(crate) fn disconnects(&self) -> usize {
        self.state.lock().unwrap().disconnects
    }

    /// Make the next `times` attaches of `title` fail.
    pub(crate) fn fail_attach(&self, title: &str, times: u32) {
        self.state.lock().unwrap().failing.insert(title.to_string(), times);
    }

    pub(crate) fn fail_connects(&self, times: u32) {
        self.state.lock().unwrap().failing_connects = times;
    }

    /// Make later connects wait `delay` before taking effect.
    pub(crate) fn delay_connects(&self, delay: Duration) {
        self.state.lock().unwrap().connect_delay = delay;
    }

    /// Report the tenant's output as idle even while a track is attached.
    pub(crate) fn report_idle(&self, tenant: TenantId) {
        self.state.lock().unwrap().idle_reports.insert(tenant);
    }

    /// Complete the tenant's active attachment gracefully.
    pub(crate) fn finish(&self, tenant: TenantId) {
        self.complete(tenant, PlaybackOutcome::Finished);
    }

    pub(crate) fn fault(&self, tenant: TenantId, reason: &str) {
        self.complete(tenant, PlaybackOutcome::Fault(reason.to_string()));
    }

    fn complete(&self, tenant: TenantId, outcome: PlaybackOutcome) {
        let active = self.state.lock().unwrap().active.remove(&tenant);
        if let Some(active) = active {
            active.completion.finish(outcome);
        }
    }
}

#[async_trait]
impl PlaybackSink for FakeSink {
    async fn connect(&self, tenant: TenantId) -> Result<(), SinkError> {
        let delay = self.state.lock().unwrap().connect_delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let mut state = self.state.lock().unwrap();
        state.connects += 1;
        if state.failing_connects > 0 {
            state.failing_connects -= 1;
            return Err(SinkError::Io("connect refused".to_string()));
        }
        state.connected.insert(tenant);
        Ok(())
    }

    async fn disconnect(&self, tenant: TenantId) -> Result<(), SinkError> {
        let active = {
            let mut state = self.state.lock().unwrap();
            state.disconnects += 1;
            state.connected.remove(&tenant);
            state.active.remove(&tenant)
        };
        if let Some(active) = active {
            active.completion.finish(PlaybackOutcome::Stopped);
        }
        Ok(())
    }

    async fn attach(
        &self,
        tenant: TenantId,
        track: &Track,
        completion: Completion,
    ) -> Result<Box<dyn PlaybackHandle>, SinkError> {
        let mut state = self.state.lock().unwrap();
        if !state.connected.contains(&tenant) {
            return Err(SinkError::NotConnected(tenant));
        }
        if let Some(remaining) = state.failing.get_mut(&track.title) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(SinkError::Spawn(format!("cannot open {}", track.title)));
            }
        }
        let attachment = completion.attachment();
        let paused = Arc::new(AtomicBool::new(false));
        state.attached.push(track.title.clone());
        state.active.insert(
            tenant,
            ActiveAttachment {
                attachment,
                completion,
                paused: paused.clone(),
            },
        );
        Ok(Box::new(FakeHandle {
            state: self.state.clone(),
            tenant,
            attachment,
            paused,
        }))
    }

    fn output_state(&self, tenant: TenantId) -> OutputState {
        let state = self.state.lock().unwrap();
        if !state.connected.contains(&tenant) {
            return OutputState::Disconnected;
        }
        if state.idle_reports.contains(&tenant) {
            return OutputState::Idle;
        }
        match state.active.get(&tenant) {
            Some(active) if active.paused.load(Ordering::SeqCst) => OutputState::Paused,
            Some(_) => OutputState::Playing,
            None => OutputState::Idle,
        }
    }

    fn connected_tenants(&self) -> Vec<TenantId> {
        let mut tenants: Vec<_> = self.state.lock().unwrap().connected.iter().copied().collect();
        tenants.sort();
        tenants
    }
}

struct FakeHandle {
    state: Arc<Mutex<SinkState>>,
    tenant: TenantId,
    attachment: AttachmentId,
    paused: Arc<AtomicBool>,
}

impl PlaybackHandle for FakeHandle {
    fn stop(&self) {
        let active = {
            let mut state = self.state.lock().unwrap();
            let current = state
                .active
                .get(&self.tenant)
                .is_some_and(|active| active.attachment == self.attachment);
            if current {
                state.active.remove(&self.tenant)
            } else {
                None
            }
        };
        if let Some(active) = active {
            active.completion.finish(PlaybackOutcome::Stopped);
        }
    }

    fn pause(&self) -> Result<(), SinkError> {
        self.paused.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn resume(&self) -> Result<(), SinkError> {
        self.paused.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }
}
