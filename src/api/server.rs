//! API server setup and configuration.

use super::handlers::{extract_ocr_handler, health_handler, process_handler, summarize_handler};
use super::types::{ApiState, ServerConfig, SESSION_HEADER};
use crate::config::PipelineConfig;
use crate::controller::{Backends, PipelineController};
use crate::error::PipelineError;
use axum::extract::DefaultBodyLimit;
use axum::http::{header, HeaderName, HeaderValue, Method};
use axum::routing::{get, post};
use axum::Router;
use std::net::{IpAddr, SocketAddr};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

/// Build the router around an existing state.
pub fn create_router(state: ApiState, config: &ServerConfig) -> Router {
    Router::new()
        .route("/api/summarize", post(summarize_handler))
        .route("/api/extractOcr", post(extract_ocr_handler))
        .route("/api/process", post(process_handler))
        .route("/health", get(health_handler))
        .layer(DefaultBodyLimit::max(config.max_upload_bytes))
        .layer(RequestBodyLimitLayer::new(config.max_upload_bytes))
        .layer(cors_layer(&config.allowed_origin))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(origin: &str) -> CorsLayer {
    let allow_origin = match origin.parse::<HeaderValue>() {
        Ok(value) => AllowOrigin::exact(value),
        Err(_) => {
            tracing::warn!("Invalid MEDPDF_ALLOWED_ORIGIN '{}'; cross-origin requests disabled", origin);
            AllowOrigin::list(Vec::<HeaderValue>::new())
        }
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, HeaderName::from_static(SESSION_HEADER)])
        .allow_credentials(true)
}

/// Bind and serve until Ctrl-C.
pub async fn serve(server: ServerConfig, pipeline: PipelineConfig) -> Result<(), PipelineError> {
    let ip: IpAddr = server
        .host
        .parse()
        .map_err(|e| PipelineError::InvalidConfig(format!("Invalid host address: {}", e)))?;
    let addr = SocketAddr::new(ip, server.port);

    let backends = Backends::production(&pipeline).await?;
    let state = ApiState::new(PipelineController::new(backends, &pipeline));
    let app = create_router(state, &server);

    tracing::info!(
        "medpdf API listening on http://{} (origin {}, upload limit {} MB)",
        addr,
        server.allowed_origin,
        server.max_upload_bytes / (1024 * 1024)
    );

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| PipelineError::Internal(format!("cannot bind {}: {}", addr, e)))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutting down");
        })
        .await
        .map_err(|e| PipelineError::Internal(e.to_string()))?;

    Ok(())
}
