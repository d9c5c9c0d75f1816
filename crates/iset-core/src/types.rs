use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

// =============================================================================
// Identifiers
// =============================================================================

/// Server-assigned session identifier.
///
/// The backend hands these out as integers, but share links and some JSON
/// payloads carry them as strings. Both forms are converted here and nowhere
/// else.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Returned when a string is not a valid session id.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid session id: {0:?}")]
pub struct ParseSessionIdError(pub String);

impl FromStr for SessionId {
    type Err = ParseSessionIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<u64>()
            .map(SessionId)
            .map_err(|_| ParseSessionIdError(s.to_string()))
    }
}

impl<'de> Deserialize<'de> for SessionId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(u64),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Number(n) => Ok(SessionId(n)),
            Raw::Text(s) => s.parse().map_err(serde::de::Error::custom),
        }
    }
}

/// Local handle for a session held by the store.
///
/// Assigned on insertion and stable across the draft -> committed transition,
/// so in-flight submissions can address a session before the server has
/// named it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionKey(pub Uuid);

impl SessionKey {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionKey {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// Temporal
// =============================================================================

/// UTC instant.
///
/// Deserializes both RFC 3339 strings and the offset-less ISO strings the
/// backend writes (those are read as UTC).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct Timestamp(pub DateTime<Utc>);

impl Timestamp {
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Parse an RFC 3339 or naive ISO 8601 timestamp.
    pub fn parse_lenient(s: &str) -> Option<Self> {
        let s = s.trim();
        if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
            return Some(Self(dt.with_timezone(&Utc)));
        }
        NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
            .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f"))
            .ok()
            .map(|naive| Self(naive.and_utc()))
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Timestamp::parse_lenient(&raw)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp: {raw:?}")))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}

// =============================================================================
// Conversation
// =============================================================================

/// Where a submitted message came from.
///
/// Submission behaves identically for every source; the tag only travels to
/// the backend and into logs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputSource {
    /// Typed into the composer.
    #[serde(rename = "text")]
    Typed,
    /// A quick-action chip or a suggestion chip.
    Shortcut,
    /// A finalized speech transcript.
    Voice,
}

impl fmt::Display for InputSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputSource::Typed => write!(f, "text"),
            InputSource::Shortcut => write!(f, "shortcut"),
            InputSource::Voice => write!(f, "voice"),
        }
    }
}

/// Lifecycle of a turn. Only `Pending` may change, and only once.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnStatus {
    Pending,
    Confirmed,
    Failed,
}

impl TurnStatus {
    /// Returns whether a transition from `self` to `target` is valid.
    pub fn can_transition_to(&self, target: &TurnStatus) -> bool {
        matches!(
            (self, target),
            (TurnStatus::Pending, TurnStatus::Confirmed) | (TurnStatus::Pending, TurnStatus::Failed)
        )
    }
}

impl fmt::Display for TurnStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TurnStatus::Pending => write!(f, "pending"),
            TurnStatus::Confirmed => write!(f, "confirmed"),
            TurnStatus::Failed => write!(f, "failed"),
        }
    }
}

/// A follow-up chip offered with a bot reply.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Suggestion {
    pub label: String,
    pub text: String,
}

/// The assistant's side of a turn.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BotReply {
    pub answer_text: String,
    pub source_url: Option<String>,
    /// Matching method reported by the backend (e.g. "tfidf", "ensemble").
    pub method: Option<String>,
    /// Similarity in `[0, 1]`.
    pub similarity: Option<f64>,
    pub suggestions: Vec<Suggestion>,
    pub category: Option<String>,
    pub is_shortcut: bool,
}

impl BotReply {
    /// Similarity as a percentage with two decimals, e.g. `"87.50%"`.
    pub fn similarity_percent(&self) -> Option<String> {
        self.similarity.map(|s| format!("{:.2}%", s * 100.0))
    }
}

/// One user/bot exchange, ordered within its session by `sequence`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub sequence: u64,
    pub user_text: String,
    pub submitted_at: Timestamp,
    pub source: InputSource,
    pub status: TurnStatus,
    pub bot_reply: Option<BotReply>,
    /// Why the turn failed, when `status` is `Failed`.
    pub failure: Option<String>,
}

impl Turn {
    /// A fresh optimistic turn carrying only the user's text.
    pub fn pending(sequence: u64, user_text: String, source: InputSource) -> Self {
        Self {
            sequence,
            user_text,
            submitted_at: Timestamp::now(),
            source,
            status: TurnStatus::Pending,
            bot_reply: None,
            failure: None,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == TurnStatus::Pending
    }
}

// =============================================================================
// Voice
// =============================================================================

/// Phase of the voice capture state machine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoicePhase {
    /// No capture in progress. Ready to start.
    Idle,
    /// Recognition stream open, interim transcripts arriving.
    Listening,
    /// Stream closed, deciding whether there is anything to send.
    Stopping,
    /// Transcript handed to the submission pipeline.
    Sending,
    /// The recognizer failed. `start()` re-arms from here.
    Error,
}

impl VoicePhase {
    /// Returns whether a transition from `self` to `target` is valid.
    pub fn can_transition_to(&self, target: &VoicePhase) -> bool {
        matches!(
            (self, target),
            (VoicePhase::Idle, VoicePhase::Listening)
                | (VoicePhase::Listening, VoicePhase::Stopping)
                | (VoicePhase::Stopping, VoicePhase::Idle)
                | (VoicePhase::Stopping, VoicePhase::Sending)
                | (VoicePhase::Sending, VoicePhase::Idle)
                // Re-arm after a failure
                | (VoicePhase::Error, VoicePhase::Listening)
                | (VoicePhase::Error, VoicePhase::Idle)
        ) || (*target == VoicePhase::Error && *self != VoicePhase::Error)
    }
}

impl fmt::Display for VoicePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VoicePhase::Idle => write!(f, "Idle"),
            VoicePhase::Listening => write!(f, "Listening"),
            VoicePhase::Stopping => write!(f, "Stopping"),
            VoicePhase::Sending => write!(f, "Sending"),
            VoicePhase::Error => write!(f, "Error"),
        }
    }
}

// =============================================================================
// Knowledge-base review
// =============================================================================

/// Knowledge-base category a candidate answer is filed under.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Admission,
    Cours,
    Examens,
    Bibliotheque,
    Horaires,
    Contact,
    General,
    #[serde(other)]
    Autres,
}

impl Category {
    pub const ALL: [Category; 8] = [
        Category::Admission,
        Category::Cours,
        Category::Examens,
        Category::Bibliotheque,
        Category::Horaires,
        Category::Contact,
        Category::General,
        Category::Autres,
    ];

    /// Human-readable label.
    pub fn label(&self) -> &'static str {
        match self {
            Category::Admission => "Admission",
            Category::Cours => "Cours",
            Category::Examens => "Examens",
            Category::Bibliotheque => "Bibliothèque",
            Category::Horaires => "Horaires",
            Category::Contact => "Contact",
            Category::General => "Général",
            Category::Autres => "Autres",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Category::Admission => "admission",
            Category::Cours => "cours",
            Category::Examens => "examens",
            Category::Bibliotheque => "bibliotheque",
            Category::Horaires => "horaires",
            Category::Contact => "contact",
            Category::General => "general",
            Category::Autres => "autres",
        };
        write!(f, "{}", name)
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::ALL
            .iter()
            .copied()
            .find(|c| c.to_string() == s.trim().to_lowercase())
            .ok_or_else(|| format!("unknown category: {s}"))
    }
}
