//! Server-sent event streams.

use std::collections::VecDeque;
use std::time::Instant;

use actix_web::http::header;
use actix_web::web::Bytes;
use actix_web::{Error, HttpResponse, Responder, get, web};
use futures_util::{Stream, stream::unfold};
use jukebox_core::TenantId;
use jukebox_types::NoticeEntry;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::time::{Duration, Interval, MissedTickBehavior};

use crate::state::AppState;

const PING_INTERVAL: Duration = Duration::from_secs(15);

struct NoticeStreamState {
    guild: u64,
    receiver: broadcast::Receiver<NoticeEntry>,
    interval: Interval,
    pending: VecDeque<Bytes>,
    last_ping: Instant,
}

fn sse_event(event: &str, data: &str) -> Bytes {
    let mut payload = String::new();
    payload.push_str("event: ");
    payload.push_str(event);
    payload.push('\n');
    for line in data.lines() {
        payload.push_str("data: ");
        payload.push_str(line);
        payload.push('\n');
    }
    payload.push('\n');
    Bytes::from(payload)
}

fn push_ping_if_needed(pending: &mut VecDeque<Bytes>, last_ping: &mut Instant) {
    if pending.is_empty() && last_ping.elapsed() >= PING_INTERVAL {
        *last_ping = Instant::now();
        pending.push_back(Bytes::from(": ping\n\n"));
    }
}

enum StreamSignal<E> {
    Tick,
    Event(Result<E, RecvError>),
}

async fn recv_signal<E: Clone>(
    receiver: &mut broadcast::Receiver<E>,
    interval: &mut Interval,
) -> StreamSignal<E> {
    tokio::select! {
        _ = interval.tick() => StreamSignal::Tick,
        result = receiver.recv() => StreamSignal::Event(result),
    }
}

fn sse_response<S>(stream: S) -> HttpResponse
where
    S: Stream<Item = Result<Bytes, Error>> + 'static,
{
    HttpResponse::Ok()
        .insert_header((header::CONTENT_TYPE, "text/event-stream"))
        .insert_header((header::CACHE_CONTROL, "no-cache"))
        .insert_header((header::CONNECTION, "keep-alive"))
        .streaming(stream)
}

#[utoipa::path(
    get,
    path = "/guilds/{guild}/notices/stream",
    params(
        ("guild" = u64, Path, description = "Guild id")
    ),
    responses(
        (status = 200, description = "Notice event stream")
    )
)]
#[get("/guilds/{guild}/notices/stream")]
/// Stream a guild's notices via server-sent events.
///
/// The first `notices` event carries the buffered history; each later
/// `notice` event carries one entry.
pub async fn notices_stream(state: web::Data<AppState>, guild: web::Path<u64>) -> impl Responder {
    let guild = guild.into_inner();
    // Subscribe before the snapshot so nothing published in between is lost.
    let receiver = state.notices.subscribe();
    let initial = state.notices.snapshot(TenantId(guild));
    let last_seen = initial.last().map(|entry| entry.id).unwrap_or(0);
    let initial_json = serde_json::to_string(&initial).unwrap_or_else(|_| "[]".to_string());
    let mut pending = VecDeque::new();
    pending.push_back(sse_event("notices", &initial_json));

    let mut interval = tokio::time::interval(PING_INTERVAL);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let stream = unfold(
        NoticeStreamState {
            guild,
            receiver,
            interval,
            pending,
            last_ping: Instant::now(),
        },
        move |mut ctx| async move {
            loop {
                if let Some(bytes) = ctx.pending.pop_front() {
                    return Some((Ok::<Bytes, Error>(bytes), ctx));
                }

                match recv_signal(&mut ctx.receiver, &mut ctx.interval).await {
                    StreamSignal::Tick => {}
                    StreamSignal::Event(result) => match result {
                        Ok(entry) if entry.guild == ctx.guild && entry.id > last_seen => {
                            let json = serde_json::to_string(&entry)
                                .unwrap_or_else(|_| "null".to_string());
                            ctx.pending.push_back(sse_event("notice", &json));
                        }
                        Ok(_) => {}
                        Err(RecvError::Lagged(skipped)) => {
                            tracing::debug!(guild = ctx.guild, skipped, "notice stream lagged");
                        }
                        Err(RecvError::Closed) => return None,
                    },
                }

                push_ping_if_needed(&mut ctx.pending, &mut ctx.last_ping);
            }
        },
    );

    sse_response(stream)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn multiline_data_is_split() {
        let bytes = sse_event("notice", "a\nb");
        assert_eq!(&bytes[..], b"event: notice\ndata: a\ndata: b\n\n");
    }

    #[test]
    fn ping_waits_for_interval() {
        let mut pending = VecDeque::new();
        let mut last_ping = Instant::now();
        push_ping_if_needed(&mut pending, &mut last_ping);
        assert!(pending.is_empty());

        last_ping = Instant::now()
            .checked_sub(PING_INTERVAL)
            .unwrap_or(last_ping);
        if last_ping.elapsed() < PING_INTERVAL {
            return;
        }
        push_ping_if_needed(&mut pending, &mut last_ping);
        assert_eq!(pending.len(), 1);
    }
}
