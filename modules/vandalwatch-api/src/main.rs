use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    http::{header, HeaderValue},
    routing::{get, post},
    Router,
};
use sqlx::postgres::PgPoolOptions;
use tower_http::set_header::SetResponseHeaderLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

use vandalwatch_common::Config;
use vandalwatch_scout::{CaseService, KeywordAnalyzer, Monitor, MonitorScheduler, PgCaseStore};
use x_client::XClient;

mod rest;

pub struct AppState {
    pub cases: CaseService,
    pub monitor: Arc<Monitor>,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        // Health check
        .route("/", get(|| async { "ok" }))
        // Monitoring
        .route("/api/monitor/run", get(rest::monitor::api_monitor_run))
        // Cases
        .route("/api/cases", get(rest::api_cases))
        .route("/api/cases/{id}", get(rest::api_case_detail))
        .route("/api/cases/{id}/status", post(rest::api_case_status))
        .route("/api/cases/{id}/duplicate-of", post(rest::api_case_duplicate_of))
        .with_state(state)
        .layer(
            tower_http::cors::CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods(tower_http::cors::Any)
                .allow_headers(tower_http::cors::Any),
        )
        .layer(SetResponseHeaderLayer::overriding(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-store"),
        ))
        // Method + path + status + latency only
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
        )
}

fn init_tracing() -> Result<()> {
    let filter = EnvFilter::from_default_env()
        .add_directive("vandalwatch=info".parse()?)
        .add_directive("x_client=info".parse()?);
    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    if json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing()?;

    let config = Config::from_env()?;

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await
        .context("connecting to Postgres")?;
    let store = Arc::new(PgCaseStore::new(pool));
    store.migrate().await?;
    info!("Database migrations applied");

    let monitor = Arc::new(Monitor::new(
        Arc::new(XClient::new(config.x_bearer_token.clone())),
        Arc::new(KeywordAnalyzer::new()),
        store.clone(),
        config.monitor.clone(),
    ));
    info!(
        queries = monitor.queries().len(),
        delay_ms = config.monitor.request_delay.as_millis() as u64,
        "Monitor configured"
    );

    let scheduler = MonitorScheduler::new(monitor.clone());
    match config.monitor_interval {
        Some(interval) => {
            scheduler.start(interval);
        }
        None => info!("MONITOR_INTERVAL_MINUTES unset, scheduled monitoring disabled"),
    }

    let state = Arc::new(AppState {
        cases: CaseService::new(store),
        monitor,
    });
    let app = router(state);

    let addr = format!("{}:{}", config.web_host, config.web_port);
    info!("VandalWatch API starting on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    scheduler.stop().await;
    Ok(())
}
