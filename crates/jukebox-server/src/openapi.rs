use utoipa::OpenApi;

use crate::api;

#[derive(OpenApi)]
#[openapi(
    paths(
        api::health::health,
        api::queue::queue_enqueue,
        api::queue::queue_list,
        api::queue::queue_remove,
        api::queue::queue_clear,
        api::playback::guild_skip,
        api::playback::guild_stop,
        api::playback::guild_leave,
        api::playback::guild_pause,
        api::playback::guild_resume,
        api::playback::outputs_sweep,
        api::notices::notices_list,
        api::streams::notices_stream,
    ),
    components(
        schemas(
            jukebox_types::EnqueueRequest,
            jukebox_types::EnqueueKind,
            jukebox_types::EnqueueResponse,
            jukebox_types::TrackSummary,
            jukebox_types::QueueSnapshotResponse,
            jukebox_types::RemoveRequest,
            jukebox_types::RemoveResponse,
            jukebox_types::ClearResponse,
            jukebox_types::NoticeEntry,
            jukebox_types::NoticesResponse,
            jukebox_types::ErrorResponse,
            api::health::HealthResponse,
            api::playback::SweepResponse,
        )
    ),
    tags(
        (name = "jukebox-server", description = "Guild music queue control API")
    )
)]
pub struct ApiDoc;
