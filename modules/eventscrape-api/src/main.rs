use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use axum::extract::{ConnectInfo, State};
use axum::http::{header, HeaderValue, Method, StatusCode};
use axum::middleware::{self, Next};
use axum::response::IntoResponse;
use axum::routing::{get, post, put};
use axum::Router;
use tokio::sync::Mutex;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use eventscrape_common::Config;
use eventscrape_export::ExportEngine;
use eventscrape_match::MatchEngine;
use eventscrape_queue::{CancelFlags, JobQueue, LogStream, RepeatableRegistry};
use eventscrape_scheduler::Scheduler;
use eventscrape_store::Store;

mod error;
mod rest;

pub struct AppState {
    pub store: Store,
    pub queue: JobQueue,
    pub scheduler: Scheduler,
    pub export_engine: ExportEngine,
    pub match_engine: MatchEngine,
    pub logs: LogStream,
    pub flags: CancelFlags,
    pub config: Config,
    pub rate_limiter: Mutex<HashMap<IpAddr, Vec<Instant>>>,
}

impl AppState {
    /// Sliding-window IP rate limit. Returns false when the caller is over.
    pub async fn check_rate_limit(&self, ip: IpAddr) -> bool {
        if self.config.api_rate_limit_max == 0 {
            return true;
        }
        let window = Duration::from_secs(self.config.api_rate_limit_time_window_secs);
        let now = Instant::now();
        let mut limiter = self.rate_limiter.lock().await;
        let hits = limiter.entry(ip).or_default();
        hits.retain(|t| now.duration_since(*t) < window);
        if hits.len() >= self.config.api_rate_limit_max as usize {
            return false;
        }
        hits.push(now);
        true
    }
}

async fn rate_limit_middleware(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: axum::extract::Request,
    next: Next,
) -> axum::response::Response {
    if !state.check_rate_limit(addr.ip()).await {
        warn!(ip = %addr.ip(), "Rate limit exceeded");
        return (StatusCode::TOO_MANY_REQUESTS, "rate limit exceeded").into_response();
    }
    next.run(request).await
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("eventscrape=info".parse()?),
        )
        .init();

    let config = Config::api_from_env();
    config.log_redacted();

    let store = Store::connect(&config.database_url).await?;
    store.migrate().await?;
    let queue = JobQueue::connect(&config.redis_url).await?;

    let export_engine = ExportEngine::new(store.clone(), config.export_dir.clone());
    let scheduler = Scheduler::new(store.clone(), queue.clone(), export_engine.clone());
    scheduler.sync_on_startup().await?;

    // The scheduler singleton owns the repeatable tick loop; concurrent
    // processes stay safe through the shared fire markers.
    let registry = RepeatableRegistry::new(&queue);
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let tick_queue = queue.clone();
    let tick_registry = registry.clone();
    let tick_shutdown = shutdown_rx.clone();
    let tick_task = tokio::spawn(async move {
        tick_registry.run(tick_queue, tick_shutdown).await;
    });

    let state = Arc::new(AppState {
        store: store.clone(),
        queue: queue.clone(),
        scheduler,
        export_engine,
        match_engine: MatchEngine::new(store.clone()),
        logs: LogStream::new(&queue),
        flags: CancelFlags::new(&queue),
        config: config.clone(),
        rate_limiter: Mutex::new(HashMap::new()),
    });

    let app = Router::new()
        // Health check
        .route("/health", get(rest::health))
        // Sources
        .route("/api/sources", get(rest::sources::list).post(rest::sources::create))
        .route(
            "/api/sources/{id}",
            get(rest::sources::get)
                .put(rest::sources::update)
                .delete(rest::sources::delete),
        )
        // Events
        .route("/api/events", get(rest::events::list))
        .route("/api/events/{raw_id}/promote", post(rest::events::promote))
        .route("/api/occurrences/stale", get(rest::events::stale_occurrences))
        // Runs + ad-hoc scrapes
        .route("/api/runs", get(rest::runs::list))
        .route("/api/runs/{id}", get(rest::runs::get))
        .route("/api/runs/scrape/{module_key}", post(rest::runs::scrape_now))
        .route("/api/jobs/instagram/{job_id}/cancel", post(rest::runs::cancel_instagram_job))
        .route("/api/jobs/instagram/{job_id}/status", get(rest::runs::instagram_job_status))
        .route("/api/queues/{queue_name}/{action}", post(rest::runs::set_queue_paused))
        // Logs
        .route("/api/logs/stream/{run_id}", get(rest::logs::stream))
        .route("/api/logs/history/{run_id}", get(rest::logs::history))
        // Schedules
        .route("/api/schedules", get(rest::schedules::list).post(rest::schedules::create))
        .route(
            "/api/schedules/{id}",
            get(rest::schedules::get)
                .put(rest::schedules::update)
                .delete(rest::schedules::delete),
        )
        .route("/api/schedules/{id}/trigger", post(rest::schedules::trigger))
        .route("/api/schedules/trigger-all-active", post(rest::schedules::trigger_all_active))
        // Exports
        .route("/api/exports", get(rest::exports::list).post(rest::exports::create))
        .route("/api/exports/{id}", get(rest::exports::get))
        .route("/api/exports/{id}/cancel", post(rest::exports::cancel))
        .route("/api/exports/{id}/download", get(rest::exports::download))
        // Matches
        .route("/api/matches", get(rest::matches::list))
        .route("/api/matches/generate", post(rest::runs::generate_matches))
        .route("/api/matches/{id}/{action}", post(rest::matches::action))
        // Settings
        .route(
            "/api/wordpress-settings",
            get(rest::settings::list_wordpress).post(rest::settings::create_wordpress),
        )
        .route(
            "/api/wordpress-settings/{id}",
            put(rest::settings::update_wordpress).delete(rest::settings::delete_wordpress),
        )
        .route(
            "/api/settings/system",
            get(rest::settings::get_system).put(rest::settings::update_system),
        )
        .layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit_middleware,
        ))
        .with_state(state)
        .layer(build_cors(&config))
        .layer(
            tower_http::trace::TraceLayer::new_for_http().make_span_with(
                |request: &axum::http::Request<_>| {
                    tracing::info_span!(
                        "http_request",
                        method = %request.method(),
                        path = %request.uri().path(),
                    )
                },
            ),
        );

    let addr = format!("0.0.0.0:{}", config.port);
    info!("EventScrape API starting on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(wait_for_shutdown())
    .await?;

    let _ = shutdown_tx.send(true);
    let _ = tick_task.await;
    info!("API stopped cleanly");
    Ok(())
}

fn build_cors(config: &Config) -> tower_http::cors::CorsLayer {
    let methods = [Method::GET, Method::POST, Method::PUT, Method::DELETE];
    if config.cors_allowed_origins.is_empty() {
        tower_http::cors::CorsLayer::new()
            .allow_origin(tower_http::cors::Any)
            .allow_methods(methods)
            .allow_headers([header::CONTENT_TYPE])
    } else {
        let origins: Vec<HeaderValue> = config
            .cors_allowed_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        tower_http::cors::CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(methods)
            .allow_headers([header::CONTENT_TYPE])
    }
}

async fn wait_for_shutdown() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = ctrl_c.await;
    }
}
