//! Actix server startup + app wiring.
//!
//! Builds the orchestrator and shared state, routes, middleware, and OpenAPI
//! endpoints.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::task::{Context, Poll};

use actix_web::dev::{Service, ServiceRequest, ServiceResponse};
use actix_web::{App, Error, HttpServer, web};
use anyhow::Result;
use futures_util::future::{LocalBoxFuture, Ready, ok};
use jukebox_core::Orchestrator;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::api;
use crate::config;
use crate::ffmpeg_sink::FfmpegSink;
use crate::notices::NoticeBus;
use crate::openapi;
use crate::state::AppState;
use crate::ytdlp::YtDlpResolver;

const DEFAULT_BIND: &str = "0.0.0.0:8080";

/// Build server state and start the Actix HTTP server.
pub(crate) async fn run(args: crate::Args) -> Result<()> {
    let cfg = load_config(args.config.as_ref())?;
    let bind = resolve_bind(args.bind, &cfg)?;
    let orchestrator_config = config::orchestrator_config_from_config(&cfg)?;
    let ytdlp = config::ytdlp_config_from_config(&cfg)?;
    let ffmpeg = config::ffmpeg_config_from_config(&cfg)?;
    tracing::info!(
        bind = %bind,
        ytdlp = %ytdlp.binary,
        ffmpeg = %ffmpeg.binary,
        output = %ffmpeg.output_template,
        idle_sweep_secs = orchestrator_config.idle_sweep.as_secs(),
        "starting jukebox-server"
    );

    let orchestrator = Orchestrator::new(
        orchestrator_config,
        Arc::new(YtDlpResolver::new(ytdlp)),
        Arc::new(FfmpegSink::new(ffmpeg)),
    );
    let sweeper = orchestrator.spawn_idle_sweep();
    let notices = Arc::new(NoticeBus::new(config::notice_capacity_from_config(&cfg)));
    let state = web::Data::new(AppState::new(orchestrator, notices));

    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .wrap(FilteredLogger)
            .service(
                SwaggerUi::new("/swagger-ui/{_:.*}")
                    .url("/api-doc/openapi.json", openapi::ApiDoc::openapi()),
            )
            .service(api::health::health)
            .service(api::queue_enqueue)
            .service(api::queue_list)
            .service(api::queue_remove)
            .service(api::queue_clear)
            .service(api::guild_skip)
            .service(api::guild_stop)
            .service(api::guild_leave)
            .service(api::guild_pause)
            .service(api::guild_resume)
            .service(api::outputs_sweep)
            .service(api::notices_list)
            .service(api::notices_stream)
    })
    .bind(bind)?
    .run()
    .await?;

    sweeper.abort();
    Ok(())
}

/// Return true when the request path should be logged.
fn should_log_path(path: &str) -> bool {
    if path == "/health" || path.ends_with("/notices/stream") {
        return false;
    }
    // Queue listings are polled.
    !(path.starts_with("/guilds/") && path.ends_with("/queue"))
}

/// Actix middleware that filters noisy paths from logging.
struct FilteredLogger;

impl<S, B> actix_web::dev::Transform<S, ServiceRequest> for FilteredLogger
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = FilteredLoggerMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ok(FilteredLoggerMiddleware { service })
    }
}

struct FilteredLoggerMiddleware<S> {
    service: S,
}

impl<S, B> Service<ServiceRequest> for FilteredLoggerMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&self, ctx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.service.poll_ready(ctx)
    }

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let path = req.path().to_string();
        let should_log = req.method() != actix_web::http::Method::GET || should_log_path(&path);
        let method = req.method().clone();
        let peer = req
            .connection_info()
            .realip_remote_addr()
            .unwrap_or("-")
            .to_string();
        let start = std::time::Instant::now();
        let fut = self.service.call(req);
        Box::pin(async move {
            let res = fut.await?;
            if should_log {
                tracing::info!(
                    method = %method,
                    path = %path,
                    status = %res.status().as_u16(),
                    peer = %peer,
                    elapsed_ms = %start.elapsed().as_millis(),
                    "http request"
                );
            }
            Ok(res)
        })
    }
}

/// Load server config from disk, next to the executable, or fall back to defaults.
fn load_config(path: Option<&PathBuf>) -> Result<config::ServerConfig> {
    if let Some(path) = path {
        return config::ServerConfig::load(path);
    }
    let auto_path = std::env::current_exe()
        .ok()
        .and_then(|path| path.parent().map(|dir| dir.join("config.toml")));
    match auto_path {
        Some(path) if path.exists() => {
            tracing::info!(path = %path.display(), "using config next to executable");
            config::ServerConfig::load(&path)
        }
        _ => {
            tracing::info!("no config file; using defaults");
            Ok(config::ServerConfig::default())
        }
    }
}

/// Resolve the final bind address from args + config.
fn resolve_bind(bind: Option<SocketAddr>, cfg: &config::ServerConfig) -> Result<SocketAddr> {
    if let Some(addr) = bind {
        return Ok(addr);
    }
    match config::bind_from_config(cfg)? {
        Some(addr) => Ok(addr),
        None => Ok(DEFAULT_BIND.parse()?),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn polled_paths_are_quiet() {
        assert!(!should_log_path("/health"));
        assert!(!should_log_path("/guilds/1/queue"));
        assert!(!should_log_path("/guilds/1/notices/stream"));
        assert!(should_log_path("/guilds/1/notices"));
    }

    #[test]
    fn cli_bind_wins_over_config() {
        let cfg = config::ServerConfig::parse("bind = \"127.0.0.1:9000\"\n").unwrap();
        let cli: SocketAddr = "127.0.0.1:7000".parse().unwrap();
        assert_eq!(resolve_bind(Some(cli), &cfg).unwrap(), cli);
        assert_eq!(
            resolve_bind(None, &cfg).unwrap(),
            "127.0.0.1:9000".parse().unwrap()
        );
        let empty = config::ServerConfig::default();
        assert_eq!(resolve_bind(None, &empty).unwrap().port(), 8080);
    }
}
