//! discharge-server library crate
//!
//! Exposes `build_app` and `config` for integration tests.
//! The actual binary entrypoint is in `main.rs`.

pub mod ai;
pub mod config;
pub mod db;
pub mod error;
mod middleware;
mod routes;

use axum::{Extension, Router, middleware as axum_mw, routing::get};
use deadpool_postgres::Pool;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use ai::{Coordinator, InferenceClient, PromptBuilder};
use config::Config;
use db::{PatientRepository, SummaryRepository};

/// Shared application state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub pool: Pool,
    pub patients: PatientRepository,
    pub summaries: SummaryRepository,
    pub prompt: PromptBuilder,
    /// None when no inference token is configured; summarization endpoints
    /// answer 503 in that case while the rest of the API stays up.
    pub coordinator: Option<Coordinator<InferenceClient, SummaryRepository>>,
    pub model: String,
}

/// Build the full application router with all routes and middleware.
///
/// Extracted from `main()` so integration tests can construct the app
/// without binding to a TCP port.
pub fn build_app(pool: Pool, config: &Config) -> Router {
    let patients = PatientRepository::new(pool.clone());
    let summaries = SummaryRepository::new(pool.clone());
    let prompt = PromptBuilder::new(config);

    // Coordinator is only wired up when a token is present.
    let coordinator = config.hf_token.as_ref().map(|token| {
        let client = InferenceClient::new(config, token.clone());
        Coordinator::new(client, summaries.clone(), config.coordinator_wait)
    });

    let state = AppState {
        pool,
        patients,
        summaries,
        prompt,
        coordinator,
        model: config.model.clone(),
    };

    // Create rate limiter
    let rate_limiter = middleware::create_rate_limiter(config.rate_limit_rps);

    let api_routes = routes::api_routes()
        .layer(axum_mw::from_fn(middleware::rate_limit_middleware))
        .layer(Extension(rate_limiter));

    // Install Prometheus metrics recorder.
    // Use build_recorder() + set_global_recorder() so that repeated calls
    // (e.g. in integration tests) don't panic: the second install is
    // silently ignored and we still get a valid handle for /metrics.
    let recorder = metrics_exporter_prometheus::PrometheusBuilder::new().build_recorder();
    let prometheus_handle = recorder.handle();
    let _ = metrics::set_global_recorder(recorder);

    // Operational routes, outside the rate limit
    let ops_routes = Router::new()
        .route("/health", get(routes::health::check))
        .route("/health/ai", get(routes::health::ai_status))
        .route("/metrics", get(routes::metrics::get))
        .layer(Extension(prometheus_handle));

    // Build CORS layer
    let cors = if config.cors_origins.iter().any(|o| o == "*") {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<_> = config
            .cors_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    };

    // Build application
    Router::new()
        .merge(ops_routes)
        .merge(api_routes)
        .with_state(state)
        .layer(axum_mw::from_fn(middleware::audit_middleware))
        .layer(axum_mw::from_fn(middleware::request_id_middleware))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(axum_mw::from_fn(middleware::metrics_middleware))
}
