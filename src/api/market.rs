//! REST surface over the store: products, preferences, chat sessions and
//! whole-store operations. Handlers are thin; all rules live in the store.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};

use crate::api::{ApiResponse, AppState};
use crate::chat::{ChatSession, Message, MessageInput, SenderRole, SessionInput, SessionUpdate};
use crate::entity::{PreferencesUpdate, Product, ProductInput, ProductUpdate, UserPreferences};
use crate::store::StorageInfo;

type Reply<T> = (StatusCode, Json<ApiResponse<T>>);

fn ok<T>(data: T) -> Reply<T> {
    (StatusCode::OK, Json(ApiResponse::ok(data)))
}

fn bad_request<T>(error: impl Into<String>) -> Reply<T> {
    (StatusCode::BAD_REQUEST, Json(ApiResponse::error(error)))
}

fn not_found<T>(error: impl Into<String>) -> Reply<T> {
    (StatusCode::NOT_FOUND, Json(ApiResponse::error(error)))
}

// --- Products ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddProductRequest {
    #[serde(default)]
    pub name: String,
    pub quantity: Option<f64>,
    pub price: Option<f64>,
    pub currency: Option<String>,
    pub language: Option<String>,
}

pub async fn list_products(State(state): State<Arc<AppState>>) -> Reply<Vec<Product>> {
    ok(state.store.products())
}

pub async fn get_product(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Reply<Product> {
    match state.store.product(&id) {
        Some(product) => ok(product),
        None => not_found("Product not found"),
    }
}

pub async fn add_product(
    State(state): State<Arc<AppState>>,
    Json(req): Json<AddProductRequest>,
) -> Reply<Product> {
    let (Some(quantity), Some(price)) = (req.quantity, req.price) else {
        return bad_request("Missing required fields: name, quantity, price");
    };
    if req.name.trim().is_empty() {
        return bad_request("Missing required fields: name, quantity, price");
    }

    let input = ProductInput {
        name: req.name,
        quantity,
        price,
        currency: req.currency,
        language: req.language,
    };
    match state.store.add_product(input) {
        Ok(product) => ok(product),
        Err(e) => bad_request(e.to_string()),
    }
}

pub async fn update_product(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(updates): Json<ProductUpdate>,
) -> Reply<Product> {
    match state.store.update_product(&id, updates) {
        Some(product) => ok(product),
        None => not_found("Product not found"),
    }
}

pub async fn delete_product(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Reply<()> {
    if state.store.delete_product(&id) {
        (
            StatusCode::OK,
            Json(ApiResponse::ok_message("Product deleted")),
        )
    } else {
        not_found("Product not found")
    }
}

// --- Preferences ---

pub async fn get_preferences(State(state): State<Arc<AppState>>) -> Reply<UserPreferences> {
    ok(state.store.preferences())
}

pub async fn update_preferences(
    State(state): State<Arc<AppState>>,
    Json(updates): Json<PreferencesUpdate>,
) -> Reply<UserPreferences> {
    ok(state.store.update_preferences(updates))
}

// --- Chat sessions ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddSessionRequest {
    #[serde(default)]
    pub product_id: String,
    #[serde(default)]
    pub vendor_id: String,
    #[serde(default)]
    pub buyer_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppendMessageRequest {
    pub sender: Option<SenderRole>,
    #[serde(default)]
    pub text: String,
    pub translated_text: Option<String>,
    pub language: Option<String>,
}

pub async fn list_sessions(State(state): State<Arc<AppState>>) -> Reply<Vec<ChatSession>> {
    ok(state.store.sessions())
}

pub async fn add_session(
    State(state): State<Arc<AppState>>,
    Json(req): Json<AddSessionRequest>,
) -> Reply<ChatSession> {
    if req.product_id.is_empty() || req.vendor_id.is_empty() || req.buyer_id.is_empty() {
        return bad_request("Missing required fields: product_id, vendor_id, buyer_id");
    }
    ok(state.store.add_session(SessionInput {
        product_id: req.product_id,
        vendor_id: req.vendor_id,
        buyer_id: req.buyer_id,
    }))
}

pub async fn update_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(updates): Json<SessionUpdate>,
) -> Reply<ChatSession> {
    match state.store.update_session(&id, updates) {
        Some(session) => ok(session),
        None => not_found("Chat session not found"),
    }
}

pub async fn append_message(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<AppendMessageRequest>,
) -> Reply<Message> {
    let Some(sender) = req.sender else {
        return bad_request("Missing required fields: sender, text");
    };
    if req.text.trim().is_empty() {
        return bad_request("Missing required fields: sender, text");
    }

    let language = req
        .language
        .unwrap_or_else(|| state.store.preferences().language);
    let input = MessageInput {
        sender,
        text: req.text,
        translated_text: req.translated_text,
        language,
    };
    match state.store.append_message(&id, input) {
        Some(message) => ok(message),
        None => not_found("Chat session not found"),
    }
}

// --- Whole-store operations ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportRequest {
    #[serde(default)]
    pub data: String,
}

pub async fn export_data(State(state): State<Arc<AppState>>) -> Reply<String> {
    ok(state.store.export_data())
}

pub async fn import_data(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ImportRequest>,
) -> Reply<()> {
    if state.store.import_data(&req.data) {
        (StatusCode::OK, Json(ApiResponse::ok_message("Data imported")))
    } else {
        bad_request("Import payload is not a valid store envelope")
    }
}

pub async fn clear_data(State(state): State<Arc<AppState>>) -> Reply<()> {
    if state.store.clear_all() {
        (
            StatusCode::OK,
            Json(ApiResponse::ok_message("All data cleared")),
        )
    } else {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ApiResponse::error("Failed to persist cleared store")),
        )
    }
}

pub async fn storage_info(State(state): State<Arc<AppState>>) -> Reply<StorageInfo> {
    ok(state.store.storage_info())
}
