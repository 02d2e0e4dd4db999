//! AI proxy handlers: translate, price suggestion, negotiation.
//!
//! Each handler validates input, asks the model once and normalizes the
//! result. Upstream failures never surface as errors; the handler answers
//! HTTP 200 with a labeled fallback payload so the chat flow is never
//! broken. With no credential configured, a deterministic mock result is
//! served instead and flagged as such.

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::ai::{normalize, prompts};
use crate::api::{ApiResponse, AppState, ResponseSource};
use crate::chat::SenderRole;
use crate::entity::{is_supported_language, MarketTrend, Tone};

const MAX_TRANSLATION_CHARS: usize = 5000;
const MAX_PRODUCT_NAME_CHARS: usize = 200;
const MAX_LOCATION_CHARS: usize = 100;
const MAX_QUANTITY: f64 = 100_000.0;

const MOCK_SUGGESTIONS: [&str; 3] = [
    "Thank you for your interest! I can offer a competitive price for this quality product.",
    "Let me check what I can do for you. How about we meet in the middle?",
    "I appreciate your business. This is a fair price considering the current market conditions.",
];

const FALLBACK_SUGGESTIONS: [&str; 3] = [
    "Thank you for your interest in our products.",
    "Let me see what I can offer you.",
    "I appreciate your business.",
];

type Reply<T> = (StatusCode, Json<ApiResponse<T>>);

fn bad_request<T>(error: impl Into<String>) -> Reply<T> {
    (StatusCode::BAD_REQUEST, Json(ApiResponse::error(error)))
}

fn ok<T>(response: ApiResponse<T>) -> Reply<T> {
    (StatusCode::OK, Json(response))
}

// --- Translation ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranslationRequest {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub source_language: String,
    #[serde(default)]
    pub target_language: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranslationResponse {
    pub translated_text: String,
    pub original_text: String,
    pub source_language: String,
    pub target_language: String,
    pub confidence: f64,
}

fn canned_translation(req: &TranslationRequest, source: ResponseSource) -> TranslationResponse {
    let marker = match source {
        ResponseSource::Fallback => "[FALLBACK]",
        _ => "[MOCK] Translated:",
    };
    TranslationResponse {
        translated_text: format!("{marker} {}", req.text),
        original_text: req.text.clone(),
        source_language: req.source_language.clone(),
        target_language: req.target_language.clone(),
        confidence: match source {
            ResponseSource::Fallback => 0.5,
            _ => 0.95,
        },
    }
}

pub async fn translate(
    State(state): State<Arc<AppState>>,
    Json(req): Json<TranslationRequest>,
) -> Reply<TranslationResponse> {
    if req.text.trim().is_empty()
        || req.source_language.is_empty()
        || req.target_language.is_empty()
    {
        return bad_request("Missing required fields: text, source_language, target_language");
    }
    if req.text.chars().count() > MAX_TRANSLATION_CHARS {
        return bad_request(format!(
            "Text too long: maximum {MAX_TRANSLATION_CHARS} characters"
        ));
    }

    let Some(client) = &state.gemini else {
        return ok(ApiResponse::ok_from(
            canned_translation(&req, ResponseSource::Mock),
            ResponseSource::Mock,
            Some("Using mock translation (API key not configured)".to_string()),
        ));
    };

    let prompt = prompts::translation(&req.text, &req.source_language, &req.target_language);
    match client.generate_text(&prompt).await {
        Ok(translated) => ok(ApiResponse::ok_from(
            TranslationResponse {
                translated_text: translated.trim().to_string(),
                original_text: req.text.clone(),
                source_language: req.source_language.clone(),
                target_language: req.target_language.clone(),
                confidence: 0.9,
            },
            ResponseSource::Model,
            None,
        )),
        Err(e) => {
            warn!("translation upstream failed, serving fallback: {e:#}");
            ok(ApiResponse::ok_from(
                canned_translation(&req, ResponseSource::Fallback),
                ResponseSource::Fallback,
                Some("Using fallback translation due to API error".to_string()),
            ))
        }
    }
}

// --- Price suggestion ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceSuggestionRequest {
    #[serde(default)]
    pub product_name: String,
    pub quantity: Option<f64>,
    pub current_price: Option<f64>,
    pub location: Option<String>,
    pub language: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceSuggestionResponse {
    pub min_price: f64,
    pub max_price: f64,
    pub recommended_price: f64,
    pub reasoning: String,
    pub market_trend: MarketTrend,
    pub confidence: f64,
}

fn canned_price(req: &PriceSuggestionRequest, source: ResponseSource) -> PriceSuggestionResponse {
    let current = req.current_price;
    let reasoning = match source {
        ResponseSource::Fallback => format!(
            "Fallback pricing for {} based on standard market calculations.",
            req.product_name
        ),
        _ => format!(
            "Based on market analysis for {}, considering current supply and demand factors.",
            req.product_name
        ),
    };
    PriceSuggestionResponse {
        min_price: f64::max(1.0, current.map(|p| p * 0.8).unwrap_or(20.0)),
        max_price: current.map(|p| p * 1.2).unwrap_or(60.0),
        recommended_price: current.map(|p| p * 1.05).unwrap_or(40.0),
        reasoning,
        market_trend: MarketTrend::Stable,
        confidence: match source {
            ResponseSource::Fallback => 0.5,
            _ => 0.85,
        },
    }
}

/// Apply per-field defaults to the normalized model output. A partially
/// missing shape degrades field by field instead of failing the operation.
fn price_from_model(value: &Value) -> PriceSuggestionResponse {
    PriceSuggestionResponse {
        min_price: value.get("min_price").and_then(Value::as_f64).unwrap_or(20.0),
        max_price: value.get("max_price").and_then(Value::as_f64).unwrap_or(60.0),
        recommended_price: value
            .get("recommended_price")
            .and_then(Value::as_f64)
            .unwrap_or(40.0),
        reasoning: value
            .get("reasoning")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| "AI-generated pricing based on market analysis".to_string()),
        market_trend: value
            .get("market_trend")
            .cloned()
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or_default(),
        confidence: 0.85,
    }
}

pub async fn price_suggestion(
    State(state): State<Arc<AppState>>,
    Json(req): Json<PriceSuggestionRequest>,
) -> Reply<PriceSuggestionResponse> {
    if req.product_name.trim().is_empty() || req.quantity.is_none() {
        return bad_request("Missing required fields: product_name, quantity");
    }
    if req.product_name.chars().count() > MAX_PRODUCT_NAME_CHARS {
        return bad_request(format!(
            "Product name too long: maximum {MAX_PRODUCT_NAME_CHARS} characters"
        ));
    }
    let quantity = req.quantity.unwrap_or_default();
    if !quantity.is_finite() || !(0.0..=MAX_QUANTITY).contains(&quantity) {
        return bad_request(format!(
            "Invalid quantity: must be between 0 and {MAX_QUANTITY}"
        ));
    }
    if let Some(location) = req.location.as_deref() {
        if location.chars().count() > MAX_LOCATION_CHARS {
            return bad_request(format!(
                "Location too long: maximum {MAX_LOCATION_CHARS} characters"
            ));
        }
    }
    let language = req
        .language
        .clone()
        .unwrap_or_else(|| state.config.default_language.clone());
    if !is_supported_language(&language) {
        return bad_request(format!("Unsupported language code: {language}"));
    }

    let Some(client) = &state.gemini else {
        return ok(ApiResponse::ok_from(
            canned_price(&req, ResponseSource::Mock),
            ResponseSource::Mock,
            Some("Using mock price suggestion (API key not configured)".to_string()),
        ));
    };

    let location = req
        .location
        .clone()
        .unwrap_or_else(|| state.config.default_location.clone());
    let prompt = prompts::price_suggestion(
        req.product_name.trim(),
        quantity,
        req.current_price,
        &location,
        &language,
    );

    let normalized = match client.generate(&prompt).await {
        Ok(response) => normalize::normalize_response(&response),
        Err(e) => {
            warn!("price suggestion upstream failed, serving fallback: {e:#}");
            return ok(ApiResponse::ok_from(
                canned_price(&req, ResponseSource::Fallback),
                ResponseSource::Fallback,
                Some("Using fallback price suggestion due to API error".to_string()),
            ));
        }
    };

    match normalized {
        Ok(value) => ok(ApiResponse::ok_from(
            price_from_model(&value),
            ResponseSource::Model,
            None,
        )),
        Err(e) => {
            warn!("price suggestion response unparseable, serving fallback: {e}");
            ok(ApiResponse::ok_from(
                canned_price(&req, ResponseSource::Fallback),
                ResponseSource::Fallback,
                Some("Using fallback price suggestion due to API error".to_string()),
            ))
        }
    }
}

// --- Negotiation ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NegotiationProduct {
    #[serde(default)]
    pub name: String,
    pub price: Option<f64>,
    pub quantity: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub sender: SenderRole,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NegotiationRequest {
    pub product: Option<NegotiationProduct>,
    #[serde(default)]
    pub buyer_message: String,
    #[serde(default)]
    pub vendor_language: String,
    #[serde(default)]
    pub conversation_history: Vec<ConversationMessage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NegotiationResponse {
    pub suggestions: Vec<String>,
    pub context: String,
    pub tone: Tone,
}

fn canned_negotiation(source: ResponseSource) -> NegotiationResponse {
    let (suggestions, context) = match source {
        ResponseSource::Fallback => (FALLBACK_SUGGESTIONS, "Fallback negotiation assistance"),
        _ => (MOCK_SUGGESTIONS, "Professional negotiation response"),
    };
    NegotiationResponse {
        suggestions: suggestions.iter().map(|s| s.to_string()).collect(),
        context: context.to_string(),
        tone: Tone::Friendly,
    }
}

/// Always exactly three non-empty suggestions; short model output is topped
/// up from the fallback set.
fn exactly_three(mut suggestions: Vec<String>) -> Vec<String> {
    suggestions.retain(|s| !s.trim().is_empty());
    suggestions.truncate(3);
    for default in FALLBACK_SUGGESTIONS {
        if suggestions.len() >= 3 {
            break;
        }
        suggestions.push(default.to_string());
    }
    suggestions
}

fn negotiation_from_model(value: &Value) -> NegotiationResponse {
    let suggestions = value
        .get("suggestions")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    NegotiationResponse {
        suggestions: exactly_three(suggestions),
        context: "AI-generated negotiation assistance".to_string(),
        tone: value
            .get("tone")
            .cloned()
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or_default(),
    }
}

pub async fn negotiation(
    State(state): State<Arc<AppState>>,
    Json(req): Json<NegotiationRequest>,
) -> Reply<NegotiationResponse> {
    let product = match req.product.as_ref() {
        Some(p) if !p.name.trim().is_empty() && p.price.is_some() && p.quantity.is_some() => p,
        _ => {
            return bad_request("Missing required fields: product, buyer_message, vendor_language")
        }
    };
    if req.buyer_message.trim().is_empty() || req.vendor_language.is_empty() {
        return bad_request("Missing required fields: product, buyer_message, vendor_language");
    }

    let Some(client) = &state.gemini else {
        return ok(ApiResponse::ok_from(
            canned_negotiation(ResponseSource::Mock),
            ResponseSource::Mock,
            Some("Using mock negotiation suggestions (API key not configured)".to_string()),
        ));
    };

    let history = req
        .conversation_history
        .iter()
        .map(|msg| {
            let sender = match msg.sender {
                SenderRole::Vendor => "vendor",
                SenderRole::Buyer => "buyer",
            };
            format!("{sender}: {}", msg.text)
        })
        .collect::<Vec<_>>()
        .join("\n");

    let prompt = prompts::negotiation(
        product.name.trim(),
        product.price.unwrap_or_default(),
        product.quantity.unwrap_or_default(),
        &history,
        &req.buyer_message,
        &req.vendor_language,
    );

    let normalized = match client.generate(&prompt).await {
        Ok(response) => normalize::normalize_response(&response),
        Err(e) => {
            warn!("negotiation upstream failed, serving fallback: {e:#}");
            return ok(ApiResponse::ok_from(
                canned_negotiation(ResponseSource::Fallback),
                ResponseSource::Fallback,
                Some("Using fallback negotiation suggestions due to API error".to_string()),
            ));
        }
    };

    match normalized {
        Ok(value) => ok(ApiResponse::ok_from(
            negotiation_from_model(&value),
            ResponseSource::Model,
            None,
        )),
        Err(e) => {
            warn!("negotiation response unparseable, serving fallback: {e}");
            ok(ApiResponse::ok_from(
                canned_negotiation(ResponseSource::Fallback),
                ResponseSource::Fallback,
                Some("Using fallback negotiation suggestions due to API error".to_string()),
            ))
        }
    }
}
