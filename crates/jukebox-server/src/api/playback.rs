//! Playback control handlers.

use actix_web::{HttpResponse, Responder, post, web};
use jukebox_core::{OrchestratorError, TenantId};
use jukebox_types::ErrorResponse;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::ApiError;
use crate::state::AppState;

#[derive(Serialize, Deserialize, ToSchema)]
pub struct SweepResponse {
    /// Outputs released by this pass.
    pub released: usize,
}

fn control_response(result: Result<(), OrchestratorError>) -> HttpResponse {
    match result {
        Ok(()) => HttpResponse::NoContent().finish(),
        Err(err) => ApiError::from(err).into_response(),
    }
}

#[utoipa::path(
    post,
    path = "/guilds/{guild}/skip",
    params(
        ("guild" = u64, Path, description = "Guild id")
    ),
    responses(
        (status = 204, description = "Current track stopped"),
        (status = 409, description = "Nothing playing", body = ErrorResponse)
    )
)]
#[post("/guilds/{guild}/skip")]
/// Skip the current track.
pub async fn guild_skip(state: web::Data<AppState>, guild: web::Path<u64>) -> impl Responder {
    let guild = TenantId(guild.into_inner());
    let notifier = state.notifier_for(guild);
    control_response(state.orchestrator.skip(guild, notifier.as_ref()).await)
}

#[utoipa::path(
    post,
    path = "/guilds/{guild}/stop",
    params(
        ("guild" = u64, Path, description = "Guild id")
    ),
    responses(
        (status = 204, description = "Playback stopped and queue dropped")
    )
)]
#[post("/guilds/{guild}/stop")]
/// Stop playback, drop the queue and release the output.
pub async fn guild_stop(state: web::Data<AppState>, guild: web::Path<u64>) -> impl Responder {
    let guild = TenantId(guild.into_inner());
    let notifier = state.notifier_for(guild);
    control_response(state.orchestrator.stop(guild, notifier.as_ref()).await)
}

#[utoipa::path(
    post,
    path = "/guilds/{guild}/leave",
    params(
        ("guild" = u64, Path, description = "Guild id")
    ),
    responses(
        (status = 204, description = "Output released")
    )
)]
#[post("/guilds/{guild}/leave")]
pub async fn guild_leave(state: web::Data<AppState>, guild: web::Path<u64>) -> impl Responder {
    let guild = TenantId(guild.into_inner());
    let notifier = state.notifier_for(guild);
    control_response(state.orchestrator.leave(guild, notifier.as_ref()).await)
}

#[utoipa::path(
    post,
    path = "/guilds/{guild}/pause",
    params(
        ("guild" = u64, Path, description = "Guild id")
    ),
    responses(
        (status = 204, description = "Playback paused"),
        (status = 409, description = "Nothing playing", body = ErrorResponse)
    )
)]
#[post("/guilds/{guild}/pause")]
pub async fn guild_pause(state: web::Data<AppState>, guild: web::Path<u64>) -> impl Responder {
    let guild = TenantId(guild.into_inner());
    let notifier = state.notifier_for(guild);
    control_response(state.orchestrator.pause(guild, notifier.as_ref()).await)
}

#[utoipa::path(
    post,
    path = "/guilds/{guild}/resume",
    params(
        ("guild" = u64, Path, description = "Guild id")
    ),
    responses(
        (status = 204, description = "Playback resumed"),
        (status = 409, description = "Nothing paused", body = ErrorResponse)
    )
)]
#[post("/guilds/{guild}/resume")]
pub async fn guild_resume(state: web::Data<AppState>, guild: web::Path<u64>) -> impl Responder {
    let guild = TenantId(guild.into_inner());
    let notifier = state.notifier_for(guild);
    control_response(state.orchestrator.resume(guild, notifier.as_ref()).await)
}

#[utoipa::path(
    post,
    path = "/outputs/sweep",
    responses(
        (status = 200, description = "Idle outputs released", body = SweepResponse)
    )
)]
#[post("/outputs/sweep")]
/// Release idle outputs now instead of waiting for the periodic sweep.
pub async fn outputs_sweep(state: web::Data<AppState>) -> impl Responder {
    let released = state.orchestrator.sweep_idle().await;
    HttpResponse::Ok().json(SweepResponse { released })
}
