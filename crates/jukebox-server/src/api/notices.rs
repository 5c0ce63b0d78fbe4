//! Notice history handlers.

use actix_web::{HttpResponse, Responder, get, web};
use jukebox_core::TenantId;
use jukebox_types::NoticesResponse;

use crate::state::AppState;

#[utoipa::path(
    get,
    path = "/guilds/{guild}/notices",
    params(
        ("guild" = u64, Path, description = "Guild id")
    ),
    responses(
        (status = 200, description = "Recent notices, oldest first", body = NoticesResponse)
    )
)]
#[get("/guilds/{guild}/notices")]
pub async fn notices_list(state: web::Data<AppState>, guild: web::Path<u64>) -> impl Responder {
    let notices = state.notices.snapshot(TenantId(guild.into_inner()));
    HttpResponse::Ok().json(NoticesResponse { notices })
}
