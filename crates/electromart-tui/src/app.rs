use electromart_core::models::ChatRole;
use electromart_core::{
    ApiClient, ApiError, ChatResponse, Conversation, FeedbackReceipt, FeedbackRequest,
    HealthCheck, SystemAnalytics, VoiceCapture,
};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Suggestions beyond this many are neither shown nor selectable.
pub const MAX_SHOWN_SUGGESTIONS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    Editing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Popup {
    None,
    Feedback,
    Analytics,
}

#[derive(Debug, Clone, PartialEq)]
pub enum BackendStatus {
    Checking,
    Healthy { version: String },
    Degraded { status: String },
    Unreachable,
}

pub struct App {
    // Core state
    pub should_quit: bool,
    pub input_mode: InputMode,
    pub popup: Popup,
    pub conversation: Conversation,

    // Input line
    pub input_cursor: usize, // cursor position in chars

    // Chat area
    pub chat_scroll: u16,
    pub chat_height: u16, // Height of chat area for scroll calculations
    pub chat_width: u16,  // Width of chat area for wrap calculations
    pub last_confidence: Option<f64>,

    // Animation state
    pub animation_frame: u8, // 0-2 for ellipsis animation

    // Status line (feedback receipts and similar notices)
    pub notice: Option<String>,

    // Backend
    pub client: ApiClient,
    pub backend_status: BackendStatus,
    pub analytics: Option<SystemAnalytics>,
    pub analytics_days: u32,

    // Background tasks, polled from the event loop
    pub send_task: Option<(u64, JoinHandle<Result<ChatResponse, ApiError>>)>,
    pub health_task: Option<JoinHandle<Result<HealthCheck, ApiError>>>,
    pub analytics_task: Option<JoinHandle<Result<SystemAnalytics, ApiError>>>,
    pub feedback_task: Option<JoinHandle<Result<FeedbackReceipt, ApiError>>>,
}

impl App {
    pub fn new(client: ApiClient, voice: Option<Box<dyn VoiceCapture>>) -> Self {
        Self {
            should_quit: false,
            input_mode: InputMode::Editing,
            popup: Popup::None,
            conversation: Conversation::new(voice),

            input_cursor: 0,

            chat_scroll: 0,
            chat_height: 0,
            chat_width: 0,
            last_confidence: None,

            animation_frame: 0,
            notice: None,

            client,
            backend_status: BackendStatus::Checking,
            analytics: None,
            analytics_days: 7,

            send_task: None,
            health_task: None,
            analytics_task: None,
            feedback_task: None,
        }
    }

    pub fn input(&self) -> &str {
        &self.conversation.state().input_value
    }

    /// Send whatever is in the input line on a background task.
    pub fn submit_input(&mut self) {
        let text = self.input().to_string();
        let Some(pending) = self.conversation.begin_send(&text) else {
            return;
        };

        self.input_cursor = 0;
        self.notice = None;
        self.scroll_chat_to_bottom();

        let client = self.client.clone();
        let request = pending.request;
        self.send_task = Some((
            pending.seq,
            tokio::spawn(async move { client.send_message(&request).await }),
        ));
    }

    /// Clear the server-side history in the background and start a new
    /// session locally. An outstanding send is abandoned.
    pub fn clear_conversation(&mut self) {
        if let Some((_, task)) = self.send_task.take() {
            task.abort();
        }

        let old_session = self.conversation.reset_session();
        let client = self.client.clone();
        tokio::spawn(async move {
            if let Err(e) = client.clear_conversation(&old_session).await {
                warn!(error = %e, session_id = %old_session, "failed to clear conversation on server");
            }
        });

        self.input_cursor = self.input().chars().count();
        self.chat_scroll = 0;
        self.last_confidence = None;
        self.notice = Some("Started a new conversation".to_string());
    }

    pub fn select_suggestion(&mut self, index: usize) {
        if index >= MAX_SHOWN_SUGGESTIONS {
            return;
        }
        let Some(text) = self.conversation.state().suggestions.get(index).cloned() else {
            return;
        };
        self.conversation.select_suggestion(&text);
        self.input_cursor = text.chars().count();
        self.input_mode = InputMode::Editing;
    }

    /// Put the next suggestion into the input line, wrapping around.
    pub fn cycle_suggestion(&mut self) {
        let suggestions = &self.conversation.state().suggestions;
        let shown = suggestions.len().min(MAX_SHOWN_SUGGESTIONS);
        if shown == 0 {
            return;
        }
        let next = suggestions[..shown]
            .iter()
            .position(|s| s == self.input())
            .map(|i| (i + 1) % shown)
            .unwrap_or(0);
        self.select_suggestion(next);
    }

    pub fn toggle_voice(&mut self) {
        self.conversation.toggle_voice_capture();
    }

    pub fn spawn_health_check(&mut self) {
        let client = self.client.clone();
        self.backend_status = BackendStatus::Checking;
        self.health_task = Some(tokio::spawn(async move { client.health_check().await }));
    }

    pub fn open_analytics(&mut self) {
        self.popup = Popup::Analytics;
        if self.analytics_task.is_some() {
            return;
        }
        let client = self.client.clone();
        let days = self.analytics_days;
        self.analytics_task = Some(tokio::spawn(async move { client.get_analytics(days).await }));
    }

    pub fn submit_feedback(&mut self, rating: u8) {
        self.popup = Popup::None;
        if self.feedback_task.is_some() {
            return;
        }
        let feedback = FeedbackRequest {
            session_id: self.conversation.session_id().to_string(),
            rating,
            feedback_text: None,
            helpful: rating >= 4,
        };
        let client = self.client.clone();
        self.feedback_task = Some(tokio::spawn(async move { client.submit_feedback(&feedback).await }));
        self.notice = Some("Sending feedback...".to_string());
    }

    /// Collect results of finished background tasks.
    pub async fn poll_tasks(&mut self) {
        if self.conversation.poll_voice() {
            self.input_cursor = self.input().chars().count();
        }

        if self.send_task.as_ref().is_some_and(|(_, task)| task.is_finished()) {
            if let Some((seq, task)) = self.send_task.take() {
                match task.await {
                    Ok(result) => {
                        if let Ok(response) = &result {
                            self.last_confidence = Some(response.agent_info.confidence);
                        }
                        self.conversation.complete_send(seq, result);
                    }
                    Err(e) => {
                        error!(error = %e, "send task did not complete");
                        self.conversation.complete_send(seq, Err(e));
                    }
                }
                if self.conversation.state().input_focused {
                    self.input_mode = InputMode::Editing;
                    self.input_cursor = self.input().chars().count();
                }
                self.scroll_chat_to_bottom();
            }
        }

        if self.health_task.as_ref().is_some_and(|task| task.is_finished()) {
            if let Some(task) = self.health_task.take() {
                self.backend_status = match task.await {
                    Ok(Ok(health)) if health.is_healthy() => {
                        info!(version = %health.version, "backend healthy");
                        BackendStatus::Healthy { version: health.version }
                    }
                    Ok(Ok(health)) => BackendStatus::Degraded { status: health.status },
                    Ok(Err(e)) => {
                        warn!(error = %e, "health check failed");
                        BackendStatus::Unreachable
                    }
                    Err(_) => BackendStatus::Unreachable,
                };
            }
        }

        if self.analytics_task.as_ref().is_some_and(|task| task.is_finished()) {
            if let Some(task) = self.analytics_task.take() {
                match task.await {
                    Ok(Ok(analytics)) => self.analytics = Some(analytics),
                    Ok(Err(e)) => {
                        warn!(error = %e, "analytics request failed");
                        self.notice = Some("Could not load analytics".to_string());
                    }
                    Err(e) => error!(error = %e, "analytics task did not complete"),
                }
            }
        }

        if self.feedback_task.as_ref().is_some_and(|task| task.is_finished()) {
            if let Some(task) = self.feedback_task.take() {
                self.notice = Some(match task.await {
                    Ok(Ok(receipt)) => receipt.message,
                    Ok(Err(e)) => {
                        warn!(error = %e, "feedback submission failed");
                        "Could not send feedback".to_string()
                    }
                    Err(_) => "Could not send feedback".to_string(),
                });
            }
        }
    }

    /// Tick animation frame (called by Tick event)
    pub fn tick_animation(&mut self) {
        if self.conversation.state().is_loading || self.conversation.state().is_recording {
            self.animation_frame = (self.animation_frame + 1) % 3;
        }
    }

    pub fn scroll_up(&mut self, lines: u16) {
        self.chat_scroll = self.chat_scroll.saturating_sub(lines);
    }

    pub fn scroll_down(&mut self, lines: u16) {
        let max = self.total_chat_lines().saturating_sub(self.visible_chat_height());
        self.chat_scroll = self.chat_scroll.saturating_add(lines).min(max);
    }

    /// Scroll chat to bottom so the newest message (or "Thinking...") is visible
    pub fn scroll_chat_to_bottom(&mut self) {
        let total = self.total_chat_lines();
        let visible = self.visible_chat_height();
        self.chat_scroll = total.saturating_sub(visible);
    }

    fn visible_chat_height(&self) -> u16 {
        if self.chat_height > 0 {
            self.chat_height
        } else {
            20
        }
    }

    fn total_chat_lines(&self) -> u16 {
        // Use actual chat width for wrap calculation, default to 50 if not set
        let wrap_width = if self.chat_width > 0 {
            self.chat_width as usize
        } else {
            50
        };

        let state = self.conversation.state();
        let mut total_lines: u16 = 0;

        for msg in &state.messages {
            // System notices have no header line
            if msg.role != ChatRole::System {
                total_lines = total_lines.saturating_add(1);
            }
            total_lines = total_lines.saturating_add(wrapped_line_count(&msg.content, wrap_width));
            total_lines = total_lines.saturating_add(1); // Blank line after message
        }

        if state.is_loading {
            total_lines = total_lines.saturating_add(2); // Badge + "Thinking..."
        }

        total_lines
    }
}

/// Lines `text` occupies when wrapped at `width` columns.
pub fn wrapped_line_count(text: &str, width: usize) -> u16 {
    let width = width.max(1);
    text.lines()
        .map(|line| {
            // Use character count, not byte length, for proper UTF-8 handling
            let char_count = line.chars().count();
            if char_count == 0 {
                1
            } else {
                u16::try_from(char_count.div_ceil(width)).unwrap_or(u16::MAX)
            }
        })
        .fold(0u16, u16::saturating_add)
        .max(1)
}
