pub mod client;
pub mod config;
pub mod conversation;
pub mod display;
pub mod error;
pub mod models;
pub mod voice;

// Re-export main types for convenience
pub use client::{ApiClient, ChatBackend};
pub use config::Config;
pub use conversation::{Conversation, ConversationState, PendingSend};
pub use display::{agent_badge, escalation_ticket, relative_time, AgentBadge};
pub use error::{ApiError, ConfigError};
pub use models::{
    AgentType, ChatMessage, ChatRequest, ChatResponse, ChatRole, ConversationHistory,
    FeedbackReceipt, FeedbackRequest, HealthCheck, SessionTickets, SupportTicket, SystemAnalytics,
};
pub use voice::{CommandVoiceCapture, VoiceCapture, VoiceEvent};
