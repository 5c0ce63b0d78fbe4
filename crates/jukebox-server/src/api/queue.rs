//! Queue-related API handlers.

use actix_web::{HttpResponse, Responder, get, post, web};
use jukebox_core::{RequesterId, TenantId};
use jukebox_types::{
    ClearResponse, EnqueueRequest, EnqueueResponse, ErrorResponse, QueueSnapshotResponse,
    RemoveRequest, RemoveResponse,
};

use super::ApiError;
use crate::models::{enqueue_response, snapshot_response, track_summary};
use crate::state::AppState;

#[utoipa::path(
    post,
    path = "/guilds/{guild}/queue",
    params(
        ("guild" = u64, Path, description = "Guild id")
    ),
    request_body = EnqueueRequest,
    responses(
        (status = 200, description = "Track or playlist queued", body = EnqueueResponse),
        (status = 400, description = "Blank query", body = ErrorResponse),
        (status = 422, description = "Nothing playable found", body = ErrorResponse),
        (status = 503, description = "Output unavailable", body = ErrorResponse)
    )
)]
#[post("/guilds/{guild}/queue")]
/// Resolve a link or search and queue the result.
pub async fn queue_enqueue(
    state: web::Data<AppState>,
    guild: web::Path<u64>,
    body: web::Json<EnqueueRequest>,
) -> impl Responder {
    let guild = TenantId(guild.into_inner());
    let body = body.into_inner();
    if body.query.trim().is_empty() {
        return ApiError::BadRequest("query must not be empty".to_string()).into_response();
    }
    let requester = RequesterId::new(body.requester.unwrap_or_default());
    match state
        .orchestrator
        .enqueue(guild, &body.query, requester, state.notifier_for(guild))
        .await
    {
        Ok(submitted) => HttpResponse::Ok().json(enqueue_response(submitted)),
        Err(err) => ApiError::from(err).into_response(),
    }
}

#[utoipa::path(
    get,
    path = "/guilds/{guild}/queue",
    params(
        ("guild" = u64, Path, description = "Guild id")
    ),
    responses(
        (status = 200, description = "Queue contents", body = QueueSnapshotResponse)
    )
)]
#[get("/guilds/{guild}/queue")]
/// Return the current track and upcoming queue.
pub async fn queue_list(state: web::Data<AppState>, guild: web::Path<u64>) -> impl Responder {
    let snapshot = state.orchestrator.inspect(TenantId(guild.into_inner())).await;
    HttpResponse::Ok().json(snapshot_response(&snapshot))
}

#[utoipa::path(
    post,
    path = "/guilds/{guild}/queue/remove",
    params(
        ("guild" = u64, Path, description = "Guild id")
    ),
    request_body = RemoveRequest,
    responses(
        (status = 200, description = "Track removed", body = RemoveResponse),
        (status = 400, description = "Position out of range", body = ErrorResponse)
    )
)]
#[post("/guilds/{guild}/queue/remove")]
/// Remove a pending track by 1-based position.
pub async fn queue_remove(
    state: web::Data<AppState>,
    guild: web::Path<u64>,
    body: web::Json<RemoveRequest>,
) -> impl Responder {
    let guild = TenantId(guild.into_inner());
    let notifier = state.notifier_for(guild);
    match state
        .orchestrator
        .remove(guild, body.position, notifier.as_ref())
        .await
    {
        Ok(track) => HttpResponse::Ok().json(RemoveResponse {
            position: body.position,
            track: track_summary(&track),
        }),
        Err(err) => ApiError::from(err).into_response(),
    }
}

#[utoipa::path(
    post,
    path = "/guilds/{guild}/queue/clear",
    params(
        ("guild" = u64, Path, description = "Guild id")
    ),
    responses(
        (status = 200, description = "Pending queue emptied", body = ClearResponse)
    )
)]
#[post("/guilds/{guild}/queue/clear")]
/// Drop every pending track; the current track keeps playing.
pub async fn queue_clear(state: web::Data<AppState>, guild: web::Path<u64>) -> impl Responder {
    let guild = TenantId(guild.into_inner());
    let notifier = state.notifier_for(guild);
    let removed = state.orchestrator.clear(guild, notifier.as_ref()).await;
    HttpResponse::Ok().json(ClearResponse { removed })
}
