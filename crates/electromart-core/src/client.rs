use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::ApiError;
use crate::models::{
    ChatRequest, ChatResponse, ConversationHistory, FeedbackReceipt, FeedbackRequest,
    HealthCheck, SessionTickets, SupportTicket, SystemAnalytics, MAX_FEEDBACK_CHARS, MAX_RATING,
    MIN_RATING,
};

pub const DEFAULT_BASE_URL: &str = "http://localhost:8000/api/v1";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// The two calls the conversation container makes. Split out so the
/// container can run against an in-memory backend.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn send_message(&self, request: &ChatRequest) -> Result<ChatResponse, ApiError>;
    async fn clear_conversation(&self, session_id: &str) -> Result<(), ApiError>;
}

/// HTTP client for the assistant backend. One method per endpoint, fixed
/// timeout, no retries.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ApiError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub async fn send_message(&self, request: &ChatRequest) -> Result<ChatResponse, ApiError> {
        let url = self.url("/chat");
        debug!(%url, session_id = ?request.session_id, "sending chat message");

        let response = self.client.post(&url).json(request).send().await?;
        decode(response).await
    }

    pub async fn get_conversation(&self, session_id: &str) -> Result<ConversationHistory, ApiError> {
        let url = self.url(&format!("/conversation/{}", session_id));
        debug!(%url, "fetching conversation history");

        let response = self.client.get(&url).send().await?;
        decode(response).await
    }

    pub async fn clear_conversation(&self, session_id: &str) -> Result<(), ApiError> {
        let url = self.url(&format!("/conversation/{}", session_id));
        debug!(%url, "clearing conversation history");

        let response = self.client.delete(&url).send().await?;
        check_status(response).await?;
        Ok(())
    }

    pub async fn submit_feedback(&self, feedback: &FeedbackRequest) -> Result<FeedbackReceipt, ApiError> {
        validate_feedback(feedback)?;

        let url = self.url("/feedback");
        debug!(%url, rating = feedback.rating, "submitting feedback");

        let response = self.client.post(&url).json(feedback).send().await?;
        decode(response).await
    }

    pub async fn get_analytics(&self, days: u32) -> Result<SystemAnalytics, ApiError> {
        let url = self.url("/analytics");
        debug!(%url, days, "fetching analytics");

        let response = self
            .client
            .get(&url)
            .query(&[("days", days)])
            .send()
            .await?;
        decode(response).await
    }

    pub async fn health_check(&self) -> Result<HealthCheck, ApiError> {
        let url = self.url("/health");
        debug!(%url, "checking backend health");

        let response = self.client.get(&url).send().await?;
        decode(response).await
    }

    pub async fn get_ticket(&self, ticket_id: &str) -> Result<SupportTicket, ApiError> {
        let url = self.url(&format!("/tickets/{}", ticket_id));
        debug!(%url, "fetching support ticket");

        let response = self.client.get(&url).send().await?;
        decode(response).await
    }

    pub async fn get_session_tickets(&self, session_id: &str) -> Result<SessionTickets, ApiError> {
        let url = self.url(&format!("/tickets/session/{}", session_id));
        debug!(%url, "fetching session tickets");

        let response = self.client.get(&url).send().await?;
        decode(response).await
    }
}

#[async_trait]
impl ChatBackend for ApiClient {
    async fn send_message(&self, request: &ChatRequest) -> Result<ChatResponse, ApiError> {
        ApiClient::send_message(self, request).await
    }

    async fn clear_conversation(&self, session_id: &str) -> Result<(), ApiError> {
        ApiClient::clear_conversation(self, session_id).await
    }
}

async fn check_status(response: Response) -> Result<Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ApiError::Status { status, body })
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, ApiError> {
    let response = check_status(response).await?;
    Ok(response.json().await?)
}

pub fn validate_feedback(feedback: &FeedbackRequest) -> Result<(), ApiError> {
    if !(MIN_RATING..=MAX_RATING).contains(&feedback.rating) {
        return Err(ApiError::InvalidFeedback(format!(
            "rating must be between {} and {}, got {}",
            MIN_RATING, MAX_RATING, feedback.rating
        )));
    }
    if let Some(text) = &feedback.feedback_text {
        if text.chars().count() > MAX_FEEDBACK_CHARS {
            return Err(ApiError::InvalidFeedback(format!(
                "feedback text is limited to {} characters",
                MAX_FEEDBACK_CHARS
            )));
        }
    }
    Ok(())
}
