//! JSON shapes exchanged with the assistant backend.
//!
//! Field names follow the backend verbatim. Conversion into domain types
//! happens here so the rest of the workspace never sees raw payloads.

use serde::{Deserialize, Serialize};

use crate::types::{BotReply, Category, InputSource, SessionId, Suggestion, Timestamp};

// =============================================================================
// Conversation
// =============================================================================

/// Bot half of a chat entry.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct WireBot {
    #[serde(default)]
    pub answer: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub similarity: Option<f64>,
    #[serde(default)]
    pub suggestions: Option<Vec<Suggestion>>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub is_shortcut: Option<bool>,
}

impl From<WireBot> for BotReply {
    fn from(bot: WireBot) -> Self {
        BotReply {
            answer_text: bot.answer,
            source_url: bot.url.filter(|u| !u.trim().is_empty()),
            method: bot.method,
            similarity: bot.similarity.map(|s| s.clamp(0.0, 1.0)),
            suggestions: bot.suggestions.unwrap_or_default(),
            category: bot.category,
            is_shortcut: bot.is_shortcut.unwrap_or(false),
        }
    }
}

/// One stored exchange.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WireMessage {
    pub user: String,
    pub timestamp: Timestamp,
    #[serde(default)]
    pub bot: Option<WireBot>,
}

/// A session as listed by `GET /get_sessions`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WireSession {
    pub id: SessionId,
    pub date: Timestamp,
    #[serde(default)]
    pub messages: Vec<WireMessage>,
}

/// `POST /new_chat` response.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NewChatReply {
    pub session_id: SessionId,
}

/// `POST /delete_chat` body.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DeleteChatRequest {
    pub session_id: SessionId,
}

/// `POST /api/chat` body. `session_id` is `null` for a draft session.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    pub session_id: Option<SessionId>,
    pub source: InputSource,
}

/// `POST /api/chat` response.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChatReply {
    pub chat_entry: WireMessage,
    pub session_id: SessionId,
}

/// `POST /rate` body.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateRequest {
    pub question: String,
    pub rating: bool,
}

// =============================================================================
// Self-learning
// =============================================================================

/// `GET /api/self-learning/status` response.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LearningStatus {
    #[serde(default)]
    pub well_rated_available: u64,
    #[serde(default)]
    pub total_questions: Option<u64>,
    #[serde(default)]
    pub new_questions: Option<u64>,
    #[serde(default)]
    pub candidates_ready: Option<bool>,
}

impl LearningStatus {
    /// Whether there is anything worth opening a review for.
    pub fn has_candidates(&self) -> bool {
        self.well_rated_available > 0
    }
}

/// A candidate Q/A pair, both as fetched and as posted back for integration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WireCandidate {
    pub question: String,
    pub answer: String,
    pub category: Category,
    #[serde(default)]
    pub confidence: f64,
}

/// `GET /api/self-learning/candidates` response.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CandidatesReply {
    #[serde(default)]
    pub candidates: Vec<WireCandidate>,
}

/// `POST /api/self-learning/integrate` body.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IntegrateRequest {
    pub questions: Vec<WireCandidate>,
}

/// Server verdict for one integrated question.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WireItemVerdict {
    #[serde(alias = "integrated", alias = "ok")]
    Accepted,
    #[serde(alias = "error", alias = "duplicate")]
    Rejected,
}

/// Per-question entry of an integrate response.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WireItemStatus {
    pub question: String,
    pub status: WireItemVerdict,
    #[serde(default)]
    pub reason: Option<String>,
}

/// `POST /api/self-learning/integrate` response.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct IntegrateReply {
    #[serde(default)]
    pub count: u64,
    #[serde(
        default,
        rename = "perItemStatus",
        alias = "per_item_status",
        skip_serializing_if = "Option::is_none"
    )]
    pub per_item_status: Option<Vec<WireItemStatus>>,
}
