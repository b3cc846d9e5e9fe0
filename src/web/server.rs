//! Web server setup and routing

use axum::{
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use super::handlers;
use super::state::AppState;

/// Routes for the dashboard page, the gap report and the JSON API
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // HTML pages
        .route("/", get(handlers::index))
        .route("/report/:filename", get(handlers::report_page))
        // API endpoints
        .route("/api/health", get(handlers::health))
        .route(
            "/api/ratings",
            get(handlers::api_get_ratings).post(handlers::api_save_rating),
        )
        .route("/api/ratings/:candidate_id", get(handlers::api_get_human_rating))
        .route("/api/score", post(handlers::api_score))
        .route("/api/rubric", get(handlers::api_rubric))
        .route("/api/evaluation-runs", get(handlers::api_list_runs))
        .route(
            "/api/evaluation-runs/:filename/hide",
            post(handlers::api_hide_run),
        )
        .route(
            "/api/evaluation-data/:filename",
            get(handlers::api_evaluation_data),
        )
        .route("/api/analytics", get(handlers::api_analytics))
        .route("/api/candidates", get(handlers::api_candidates))
        .route("/api/image/:filename", get(handlers::api_image))
        .layer(cors)
        .with_state(state)
}

/// Start the dashboard server
pub async fn start_server(port: u16, state: AppState) -> anyhow::Result<()> {
    let app = router(Arc::new(state));

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("Starting dashboard on http://localhost:{}", port);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
