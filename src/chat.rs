use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SenderRole {
    Vendor,
    Buyer,
}

/// A single chat message. Immutable once appended; the only way it goes away
/// is with the whole store being cleared or imported over.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub sender: SenderRole,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub translated_text: Option<String>,
    pub language: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageInput {
    pub sender: SenderRole,
    pub text: String,
    pub translated_text: Option<String>,
    pub language: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Active,
    Closed,
}

/// A negotiation thread between one vendor and one buyer about one product.
/// The product may be deleted later; the session keeps the dangling id and
/// readers must tolerate the product being gone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatSession {
    pub id: String,
    pub product_id: String,
    pub vendor_id: String,
    pub buyer_id: String,
    pub messages: Vec<Message>,
    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionInput {
    pub product_id: String,
    pub vendor_id: String,
    pub buyer_id: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionUpdate {
    pub status: Option<SessionStatus>,
}
