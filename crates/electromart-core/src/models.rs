//! Wire types exchanged with the assistant backend, plus the chat message
//! type the console keeps locally.
//!
//! These types don't depend on any UI framework and are shared by the TUI and
//! the one-shot CLI commands.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

/// The role of a chat message sender
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
    System,
}

/// Backend-assigned agent category. Only used for display styling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentType {
    Orchestrator,
    Sales,
    Marketing,
    TechnicalSupport,
    OrderLogistics,
    CustomerService,
    #[serde(other)]
    Unknown,
}

impl AgentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentType::Orchestrator => "orchestrator",
            AgentType::Sales => "sales",
            AgentType::Marketing => "marketing",
            AgentType::TechnicalSupport => "technical_support",
            AgentType::OrderLogistics => "order_logistics",
            AgentType::CustomerService => "customer_service",
            AgentType::Unknown => "unknown",
        }
    }
}

/// A chat message in the conversation. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
    #[serde(with = "timestamp")]
    pub timestamp: DateTime<Local>,
    #[serde(default)]
    pub agent_type: Option<AgentType>,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
            timestamp: Local::now(),
            agent_type: None,
        }
    }

    pub fn assistant(content: impl Into<String>, agent_type: Option<AgentType>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
            timestamp: Local::now(),
            agent_type,
        }
    }
}

/// Body of `POST /chat`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub voice_input: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AgentInfo {
    pub agent_type: AgentType,
    pub confidence: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SentimentLabel {
    Positive,
    Negative,
    Neutral,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SentimentInfo {
    pub label: SentimentLabel,
    pub score: f64,
}

/// Reply of `POST /chat`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
    pub response: String,
    pub session_id: String,
    pub agent_info: AgentInfo,
    #[serde(default)]
    pub sentiment: Option<SentimentInfo>,
    pub response_time_ms: u64,
    #[serde(with = "timestamp")]
    pub timestamp: DateTime<Local>,
    #[serde(default)]
    pub suggestions: Option<Vec<String>>,
}

/// Reply of `GET /conversation/{session_id}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationHistory {
    pub session_id: String,
    pub messages: Vec<ChatMessage>,
    pub total_messages: usize,
}

/// Body of `POST /feedback`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeedbackRequest {
    pub session_id: String,
    pub rating: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feedback_text: Option<String>,
    pub helpful: bool,
}

pub const MIN_RATING: u8 = 1;
pub const MAX_RATING: u8 = 5;
pub const MAX_FEEDBACK_CHARS: usize = 500;

/// Reply of `POST /feedback`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackReceipt {
    pub message: String,
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentPerformance {
    pub agent_type: AgentType,
    pub total_queries: u64,
    pub success_rate: f64,
    pub avg_response_time_ms: f64,
    pub total_tokens_used: u64,
    pub avg_confidence: f64,
}

/// Reply of `GET /analytics`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemAnalytics {
    pub total_conversations: u64,
    pub total_messages: u64,
    pub avg_sentiment_score: f64,
    pub agent_performance: Vec<AgentPerformance>,
    #[serde(with = "timestamp")]
    pub timestamp: DateTime<Local>,
}

/// Reply of `GET /health`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthCheck {
    pub status: String,
    pub version: String,
    #[serde(with = "timestamp")]
    pub timestamp: DateTime<Local>,
    pub database_status: String,
    pub vector_db_status: String,
}

impl HealthCheck {
    pub fn is_healthy(&self) -> bool {
        self.status == "healthy"
    }
}

/// A human-support ticket the backend opened when it escalated a conversation.
///
/// `GET /tickets/{ticket_id}` returns every field; the per-session listing
/// only carries the id, creation time, issue type, priority, status and
/// description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SupportTicket {
    pub ticket_id: String,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Local>,
    #[serde(default)]
    pub customer_email: Option<String>,
    pub issue_type: String,
    pub priority: String,
    pub status: String,
    pub description: String,
    #[serde(default)]
    pub resolution: Option<String>,
    #[serde(default)]
    pub assigned_agent: Option<String>,
    #[serde(default)]
    pub extra_metadata: Option<serde_json::Value>,
}

impl SupportTicket {
    pub fn is_open(&self) -> bool {
        matches!(self.status.as_str(), "open" | "in_progress")
    }
}

/// Reply of `GET /tickets/session/{session_id}`, newest ticket first
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionTickets {
    pub session_id: String,
    pub tickets: Vec<SupportTicket>,
    pub total_tickets: usize,
}

/// The backend writes naive local timestamps (`2025-01-25T10:30:00.123456`);
/// RFC 3339 with an offset is accepted as well.
pub mod timestamp {
    use chrono::{DateTime, Local, NaiveDateTime, TimeZone};
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn parse(raw: &str) -> Option<DateTime<Local>> {
        if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
            return Some(dt.with_timezone(&Local));
        }
        let naive = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
            .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f"))
            .ok()?;
        Local.from_local_datetime(&naive).earliest()
    }

    pub fn serialize<S>(value: &DateTime<Local>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&value.to_rfc3339())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Local>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).ok_or_else(|| de::Error::custom(format!("invalid timestamp: {raw}")))
    }
}
