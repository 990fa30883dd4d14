use std::sync::Arc;

use axum::{Router, routing::get, routing::post};
use metrics_exporter_prometheus::PrometheusBuilder;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use stylebooth::app_state::AppState;
use stylebooth::config::AppConfig;
use stylebooth::routes;
use stylebooth::services::genmodel::GeminiImageClient;
use stylebooth::services::storage::{ArtifactStore, R2Client};
use stylebooth::services::worker::StyleWorker;

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    // Load configuration from environment
    let config = AppConfig::from_env().expect("Failed to load configuration from environment");

    tracing::info!("Initializing stylebooth server");

    // Initialize Prometheus metrics recorder
    let prometheus_handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus metrics recorder");
    let prometheus_handle = Arc::new(prometheus_handle);

    // Register application metrics
    metrics::describe_histogram!(
        "styling_processing_seconds",
        "Time to style one full batch end to end"
    );
    metrics::describe_counter!("styling_jobs_total", "Total styling batches received");
    metrics::describe_counter!("styling_jobs_completed", "Total styling batches completed");
    metrics::describe_counter!("styling_jobs_failed", "Total styling batches that failed");
    metrics::describe_counter!("styling_photos_total", "Total photos styled and uploaded");
    metrics::describe_counter!("model_attempts_total", "Model calls, labeled by outcome");

    // Initialize R2 storage client
    tracing::info!("Initializing R2 storage client");
    let storage: Arc<dyn ArtifactStore> = Arc::new(
        R2Client::new(
            &config.r2_bucket,
            &config.r2_endpoint,
            &config.r2_access_key,
            &config.r2_secret_key,
            &config.r2_public_base_url,
        )
        .expect("Failed to initialize R2 client"),
    );

    // Initialize Gemini client
    tracing::info!(model = %config.gemini_model, "Initializing Gemini client");
    let model = GeminiImageClient::new(
        config.gemini_api_key.clone(),
        config.gemini_model.clone(),
        config.model_timeout(),
    )
    .expect("Failed to initialize Gemini client");

    // Assemble the sequential styling worker
    let worker = StyleWorker::new(
        Arc::new(model),
        Arc::clone(&storage),
        config.retry_policy(),
        config.inter_item_delay(),
        config.frame(),
    );

    // Create shared application state
    let state = AppState::new(worker, storage);

    // Build API routes
    let app = Router::new()
        .route("/health", get(routes::health::health_check))
        .route("/api/v1/style", post(routes::style::style_batch))
        .with_state(state)
        // Prometheus metrics endpoint (separate state)
        .route(
            "/metrics",
            get(routes::metrics::prometheus_metrics).with_state(prometheus_handle),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .layer(RequestBodyLimitLayer::new(64 * 1024 * 1024)); // base64 photo batches are big

    tracing::info!("Starting stylebooth on {}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app).await.expect("Server error");
}
