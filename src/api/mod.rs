//! REST surface consumed by the form engine and the web UI.

mod routes;

use crate::bridge::BridgeCore;
use crate::errors::{AppError, AppResult};
use crate::models::ErrorBody;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, patch, post};
use axum::{Json, Router};
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;

pub type SharedBridge = Arc<BridgeCore>;

pub fn create_router(bridge: SharedBridge) -> Router {
    Router::new()
        .route("/api/health", get(routes::health))
        .route("/api/config", get(routes::config_status).post(routes::save_config))
        .route(
            "/api/config/properties",
            get(routes::list_properties).post(routes::save_properties),
        )
        .route("/api/config/database-structure", get(routes::database_structure))
        .route("/api/config/dynamic-fields", post(routes::save_dynamic_fields))
        .route("/api/config/validate-properties", post(routes::validate_properties))
        .route(
            "/api/config/validate-property-values",
            post(routes::validate_property_values),
        )
        .route("/api/configs", get(routes::list_configs).post(routes::create_config))
        .route(
            "/api/configs/:id",
            delete(routes::delete_config).put(routes::update_config),
        )
        .route("/api/configs/:id/select", patch(routes::select_config))
        .route("/api/settings", get(routes::get_settings).patch(routes::update_settings))
        .route("/api/chat", post(routes::submit_chat))
        .layer(CorsLayer::permissive())
        .with_state(bridge)
}

/// Serves the API on `listener` until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, bridge: SharedBridge, shutdown: F) -> AppResult<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let address = listener.local_addr()?;
    tracing::info!(%address, "backend listening");
    axum::serve(listener, create_router(bridge))
        .with_graceful_shutdown(shutdown)
        .await?;
    tracing::info!(%address, "backend stopped");
    Ok(())
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::ConfigurationMissing(_) | Self::InvalidInput(_) | Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Notion(_) | Self::SchemaFetch(_) => StatusCode::BAD_GATEWAY,
            Self::Submission(_) | Self::Io(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        let body = ErrorBody {
            error: self.message().to_string(),
        };
        (status, Json(body)).into_response()
    }
}
