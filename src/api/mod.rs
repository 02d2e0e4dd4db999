use std::sync::Arc;

use axum::{
    extract::State,
    routing::{delete, get, post, put},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::ai::gemini::GeminiClient;
use crate::bus::EventBus;
use crate::config::Config;
use crate::store::Store;

pub mod ai;
pub mod events;
pub mod market;

pub struct AppState {
    pub store: Arc<Store>,
    pub bus: Arc<EventBus>,
    /// `None` puts every AI endpoint in mock mode.
    pub gemini: Option<GeminiClient>,
    pub config: Config,
}

/// Where an AI payload came from. Mock and fallback results look alike to a
/// caller, so the distinction is carried as an explicit field instead of a
/// free-text note.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseSource {
    Model,
    Mock,
    Fallback,
}

/// Standard response envelope shared by every endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<ResponseSource>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            data: Some(data),
            success: true,
            message: None,
            error: None,
            source: None,
        }
    }

    pub fn ok_from(data: T, source: ResponseSource, message: Option<String>) -> Self {
        Self {
            data: Some(data),
            success: true,
            message,
            error: None,
            source: Some(source),
        }
    }

    pub fn ok_message(message: impl Into<String>) -> Self {
        Self {
            data: None,
            success: true,
            message: Some(message.into()),
            error: None,
            source: None,
        }
    }

    pub fn error(error: impl Into<String>) -> Self {
        Self {
            data: None,
            success: false,
            message: None,
            error: Some(error.into()),
            source: None,
        }
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/ai/translate", post(ai::translate))
        .route("/api/ai/price-suggestion", post(ai::price_suggestion))
        .route("/api/ai/negotiation", post(ai::negotiation))
        .route(
            "/api/products",
            get(market::list_products).post(market::add_product),
        )
        .route(
            "/api/products/:id",
            get(market::get_product)
                .put(market::update_product)
                .delete(market::delete_product),
        )
        .route(
            "/api/preferences",
            get(market::get_preferences).put(market::update_preferences),
        )
        .route(
            "/api/sessions",
            get(market::list_sessions).post(market::add_session),
        )
        .route("/api/sessions/:id", put(market::update_session))
        .route("/api/sessions/:id/messages", post(market::append_message))
        .route("/api/data/export", get(market::export_data))
        .route("/api/data/import", post(market::import_data))
        .route("/api/data", delete(market::clear_data))
        .route("/api/storage", get(market::storage_info))
        .route("/api/events", get(events::stream))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub environment: String,
    pub gemini_configured: bool,
    pub version: String,
}

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp: Utc::now(),
        environment: state.config.environment.clone(),
        gemini_configured: state.gemini.is_some(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
