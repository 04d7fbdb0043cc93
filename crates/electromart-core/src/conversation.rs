//! Client-side conversation state and the handlers that mutate it.
//!
//! Sending is optimistic: the user message is appended before the backend
//! answers and removed again if the call fails. The UI drives sends in two
//! halves (`begin_send` / `complete_send`) so it can keep drawing while the
//! request runs on a background task.

use tokio::sync::mpsc::{self, UnboundedReceiver};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::client::ChatBackend;
use crate::models::{ChatMessage, ChatRequest, ChatResponse, ConversationHistory};
use crate::voice::{VoiceCapture, VoiceEvent};

pub const SEND_FAILED: &str = "Failed to send message. Please try again.";
pub const VOICE_UNSUPPORTED: &str = "Voice input is not supported on this system.";
pub const VOICE_FAILED: &str = "Voice recognition failed. Please try again.";

pub fn new_session_id() -> String {
    format!("session_{}", Uuid::new_v4().simple())
}

/// Everything the chat surface renders.
#[derive(Debug, Clone)]
pub struct ConversationState {
    pub messages: Vec<ChatMessage>,
    pub input_value: String,
    pub is_loading: bool,
    pub error: Option<String>,
    pub suggestions: Vec<String>,
    pub session_id: String,
    pub is_recording: bool,
    /// The input line should hold focus (set after every send completes).
    pub input_focused: bool,
}

impl Default for ConversationState {
    fn default() -> Self {
        Self {
            messages: Vec::new(),
            input_value: String::new(),
            is_loading: false,
            error: None,
            suggestions: Vec::new(),
            session_id: new_session_id(),
            is_recording: false,
            input_focused: true,
        }
    }
}

/// A send that has been applied optimistically and awaits the backend.
#[derive(Debug, Clone)]
pub struct PendingSend {
    pub seq: u64,
    pub request: ChatRequest,
}

#[derive(Debug, Clone, Copy)]
struct InFlight {
    seq: u64,
    optimistic_index: usize,
}

pub struct Conversation {
    state: ConversationState,
    in_flight: Option<InFlight>,
    next_seq: u64,
    input_from_voice: bool,
    voice: Option<Box<dyn VoiceCapture>>,
    /// Receiver for the current recognition attempt only. Each attempt gets
    /// a fresh channel, so a stopped device can no longer reach the state.
    voice_rx: Option<UnboundedReceiver<VoiceEvent>>,
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new(None)
    }
}

impl Conversation {
    pub fn new(voice: Option<Box<dyn VoiceCapture>>) -> Self {
        Self {
            state: ConversationState::default(),
            in_flight: None,
            next_seq: 0,
            input_from_voice: false,
            voice,
            voice_rx: None,
        }
    }

    pub fn state(&self) -> &ConversationState {
        &self.state
    }

    pub fn session_id(&self) -> &str {
        &self.state.session_id
    }

    pub fn voice_available(&self) -> bool {
        self.voice.as_ref().is_some_and(|v| v.is_available())
    }

    pub fn set_input(&mut self, text: impl Into<String>) {
        self.state.input_value = text.into();
        self.input_from_voice = false;
    }

    pub fn input_mut(&mut self) -> &mut String {
        self.input_from_voice = false;
        &mut self.state.input_value
    }

    pub fn set_input_focused(&mut self, focused: bool) {
        self.state.input_focused = focused;
    }

    pub fn dismiss_error(&mut self) {
        self.state.error = None;
    }

    /// Apply a send optimistically. Returns `None` when the text is blank or
    /// a send is already outstanding.
    pub fn begin_send(&mut self, text: &str) -> Option<PendingSend> {
        if text.trim().is_empty() || self.state.is_loading {
            return None;
        }

        let seq = self.next_seq;
        self.next_seq += 1;

        self.state.messages.push(ChatMessage::user(text));
        self.in_flight = Some(InFlight {
            seq,
            optimistic_index: self.state.messages.len() - 1,
        });
        self.state.input_value.clear();
        self.state.is_loading = true;
        self.state.error = None;

        let voice_input = std::mem::take(&mut self.input_from_voice);
        debug!(seq, session_id = %self.state.session_id, voice_input, "send started");

        Some(PendingSend {
            seq,
            request: ChatRequest {
                message: text.to_string(),
                session_id: Some(self.state.session_id.clone()),
                voice_input,
            },
        })
    }

    /// Apply the backend's answer to the send identified by `seq`. Answers
    /// for a send that is no longer outstanding are dropped.
    pub fn complete_send<E>(&mut self, seq: u64, result: Result<ChatResponse, E>)
    where
        E: std::fmt::Display,
    {
        let in_flight = match self.in_flight {
            Some(in_flight) if in_flight.seq == seq => in_flight,
            _ => {
                debug!(seq, "dropping stale send completion");
                return;
            }
        };
        self.in_flight = None;

        match result {
            Ok(response) => {
                if response.session_id != self.state.session_id {
                    debug!(
                        ours = %self.state.session_id,
                        theirs = %response.session_id,
                        "backend answered with a different session id"
                    );
                }
                self.state.messages.push(ChatMessage::assistant(
                    response.response,
                    Some(response.agent_info.agent_type),
                ));
                self.state.suggestions = response.suggestions.unwrap_or_default();
                info!(
                    agent = response.agent_info.agent_type.as_str(),
                    response_time_ms = response.response_time_ms,
                    "assistant replied"
                );
            }
            Err(e) => {
                warn!(error = %e, "send failed, rolling back");
                if in_flight.optimistic_index + 1 == self.state.messages.len() {
                    self.state.messages.pop();
                } else if in_flight.optimistic_index < self.state.messages.len() {
                    self.state.messages.remove(in_flight.optimistic_index);
                }
                self.state.error = Some(SEND_FAILED.to_string());
            }
        }

        self.state.is_loading = false;
        self.state.input_focused = true;
    }

    /// Send `text` and wait for the backend. Returns whether a request was made.
    pub async fn send_message<B>(&mut self, backend: &B, text: &str) -> bool
    where
        B: ChatBackend + ?Sized,
    {
        let Some(pending) = self.begin_send(text) else {
            return false;
        };
        let result = backend.send_message(&pending.request).await;
        self.complete_send(pending.seq, result);
        true
    }

    /// Reset local state and issue a new session id. Any outstanding send is
    /// forgotten. Returns the previous session id.
    pub fn reset_session(&mut self) -> String {
        self.stop_voice();

        let old = std::mem::replace(&mut self.state.session_id, new_session_id());
        self.state.messages.clear();
        self.state.suggestions.clear();
        self.state.error = None;
        self.state.is_loading = false;
        self.state.is_recording = false;
        self.state.input_focused = true;
        self.in_flight = None;
        info!(old = %old, new = %self.state.session_id, "conversation reset");
        old
    }

    /// Best-effort server-side clear followed by a local reset.
    pub async fn clear_conversation<B>(&mut self, backend: &B)
    where
        B: ChatBackend + ?Sized,
    {
        if let Err(e) = backend.clear_conversation(&self.state.session_id).await {
            warn!(error = %e, session_id = %self.state.session_id, "failed to clear conversation on server");
        }
        self.reset_session();
    }

    /// Resume a session the backend already knows about.
    pub fn restore_history(&mut self, history: ConversationHistory) {
        self.reset_session();
        self.state.session_id = history.session_id;
        self.state.messages = history.messages;
    }

    pub fn select_suggestion(&mut self, text: &str) {
        self.set_input(text);
        self.state.input_focused = true;
    }

    pub fn toggle_voice_capture(&mut self) {
        let Some(voice) = self.voice.as_mut().filter(|v| v.is_available()) else {
            self.state.error = Some(VOICE_UNSUPPORTED.to_string());
            return;
        };

        if self.state.is_recording {
            self.stop_voice();
            debug!("voice capture stopped");
            return;
        }

        let (tx, rx) = mpsc::unbounded_channel();
        match voice.start(tx) {
            Ok(()) => {
                self.voice_rx = Some(rx);
                self.state.is_recording = true;
                self.state.error = None;
            }
            Err(e) => {
                warn!(error = %e, "voice capture failed to start");
                self.state.error = Some(VOICE_FAILED.to_string());
            }
        }
    }

    pub fn handle_voice_event(&mut self, event: VoiceEvent) {
        match event {
            VoiceEvent::Transcript(text) => {
                self.state.input_value = text;
                self.input_from_voice = true;
                self.state.is_recording = false;
            }
            VoiceEvent::Error(detail) => {
                warn!(%detail, "voice recognition error");
                self.state.error = Some(VOICE_FAILED.to_string());
                self.state.is_recording = false;
            }
            VoiceEvent::End => {
                self.state.is_recording = false;
            }
        }
    }

    /// Apply any voice events that arrived since the last call. Returns true
    /// when state changed.
    pub fn poll_voice(&mut self) -> bool {
        let mut events = Vec::new();
        if let Some(rx) = self.voice_rx.as_mut() {
            while let Ok(event) = rx.try_recv() {
                let end = event == VoiceEvent::End;
                events.push(event);
                if end {
                    break;
                }
            }
        }

        let changed = !events.is_empty();
        for event in events {
            if event == VoiceEvent::End {
                self.voice_rx = None;
            }
            self.handle_voice_event(event);
        }
        changed
    }

    /// Stop the device and drop the attempt's receiver along with anything
    /// still queued or sent later.
    fn stop_voice(&mut self) {
        if let Some(voice) = self.voice.as_mut() {
            voice.stop();
        }
        self.voice_rx = None;
        self.state.is_recording = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ApiError;
    use crate::models::{AgentInfo, AgentType, ChatRole};
    use async_trait::async_trait;
    use chrono::Local;
    use std::io;
    use std::sync::{Arc, Mutex};
    use tokio::sync::mpsc::UnboundedSender;

    #[derive(Default)]
    struct FakeBackend {
        fail_send: bool,
        fail_clear: bool,
        sent: Mutex<Vec<ChatRequest>>,
        cleared: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ChatBackend for FakeBackend {
        async fn send_message(&self, request: &ChatRequest) -> Result<ChatResponse, ApiError> {
            self.sent.lock().unwrap().push(request.clone());
            if self.fail_send {
                return Err(ApiError::Status {
                    status: reqwest::StatusCode::INTERNAL_SERVER_ERROR,
                    body: String::new(),
                });
            }
            Ok(reply_for(request))
        }

        async fn clear_conversation(&self, session_id: &str) -> Result<(), ApiError> {
            self.cleared.lock().unwrap().push(session_id.to_string());
            if self.fail_clear {
                return Err(ApiError::Status {
                    status: reqwest::StatusCode::BAD_GATEWAY,
                    body: String::new(),
                });
            }
            Ok(())
        }
    }

    fn reply_for(request: &ChatRequest) -> ChatResponse {
        ChatResponse {
            response: format!("Looking into: {}", request.message),
            session_id: request.session_id.clone().unwrap_or_default(),
            agent_info: AgentInfo {
                agent_type: AgentType::OrderLogistics,
                confidence: 0.9,
            },
            sentiment: None,
            response_time_ms: 12,
            timestamp: Local::now(),
            suggestions: Some(vec![
                "Can I change my delivery address?".to_string(),
                "How do I track my package?".to_string(),
            ]),
        }
    }

    #[derive(Clone, Default)]
    struct FakeVoice {
        starts: Arc<Mutex<u32>>,
        stops: Arc<Mutex<u32>>,
        sender: Arc<Mutex<Option<UnboundedSender<VoiceEvent>>>>,
    }

    impl FakeVoice {
        fn emit(&self, event: VoiceEvent) {
            if let Some(tx) = self.sender.lock().unwrap().as_ref() {
                // The receiver is gone once the attempt is stopped.
                let _ = tx.send(event);
            }
        }
    }

    impl VoiceCapture for FakeVoice {
        fn start(&mut self, events: UnboundedSender<VoiceEvent>) -> io::Result<()> {
            *self.starts.lock().unwrap() += 1;
            *self.sender.lock().unwrap() = Some(events);
            Ok(())
        }

        fn stop(&mut self) {
            *self.stops.lock().unwrap() += 1;
        }
    }

    #[tokio::test]
    async fn test_successful_send_appends_user_then_assistant() {
        let backend = FakeBackend::default();
        let mut conversation = Conversation::default();

        assert!(conversation.send_message(&backend, "Track my order #12345").await);

        let state = conversation.state();
        assert_eq!(state.messages.len(), 2);
        assert_eq!(state.messages[0].role, ChatRole::User);
        assert_eq!(state.messages[0].content, "Track my order #12345");
        assert_eq!(state.messages[1].role, ChatRole::Assistant);
        assert_eq!(state.messages[1].content, "Looking into: Track my order #12345");
        assert_eq!(state.messages[1].agent_type, Some(AgentType::OrderLogistics));
        assert_eq!(state.suggestions.len(), 2);
        assert!(!state.is_loading);
        assert!(state.input_focused);
        assert!(state.error.is_none());
    }

    #[tokio::test]
    async fn test_send_carries_session_id() {
        let backend = FakeBackend::default();
        let mut conversation = Conversation::default();
        let session = conversation.session_id().to_string();

        conversation.send_message(&backend, "hello").await;

        let sent = backend.sent.lock().unwrap();
        assert_eq!(sent[0].session_id.as_deref(), Some(session.as_str()));
        assert!(!sent[0].voice_input);
    }

    #[tokio::test]
    async fn test_blank_text_is_ignored() {
        let backend = FakeBackend::default();
        let mut conversation = Conversation::default();

        assert!(!conversation.send_message(&backend, "").await);
        assert!(!conversation.send_message(&backend, "   \t\n").await);

        assert!(conversation.state().messages.is_empty());
        assert!(backend.sent.lock().unwrap().is_empty());
    }

    #[test]
    fn test_send_while_loading_is_ignored() {
        let mut conversation = Conversation::default();
        let first = conversation.begin_send("first");
        assert!(first.is_some());
        assert_eq!(conversation.state().messages.len(), 1);

        assert!(conversation.begin_send("second").is_none());
        assert_eq!(conversation.state().messages.len(), 1);
        assert!(conversation.state().is_loading);
    }

    #[tokio::test]
    async fn test_failed_send_rolls_back() {
        let ok = FakeBackend::default();
        let failing = FakeBackend {
            fail_send: true,
            ..Default::default()
        };
        let mut conversation = Conversation::default();
        conversation.send_message(&ok, "first").await;
        let before = conversation.state().messages.len();

        assert!(conversation.send_message(&failing, "second").await);

        let state = conversation.state();
        assert_eq!(state.messages.len(), before);
        assert_eq!(state.messages.last().unwrap().role, ChatRole::Assistant);
        assert_eq!(state.error.as_deref(), Some(SEND_FAILED));
        assert!(!state.is_loading);
        assert!(state.input_focused);
    }

    #[test]
    fn test_begin_send_clears_input_and_error() {
        let mut conversation = Conversation::default();
        conversation.set_input("hello");
        conversation.state.error = Some("old".to_string());

        conversation.begin_send("hello").unwrap();

        assert!(conversation.state().input_value.is_empty());
        assert!(conversation.state().error.is_none());
    }

    #[test]
    fn test_stale_completion_is_dropped_after_reset() {
        let mut conversation = Conversation::default();
        let pending = conversation.begin_send("hello").unwrap();
        conversation.reset_session();

        conversation.complete_send(pending.seq, Ok::<_, ApiError>(reply_for(&pending.request)));

        assert!(conversation.state().messages.is_empty());
        assert!(conversation.state().suggestions.is_empty());
        assert!(!conversation.state().is_loading);
    }

    #[tokio::test]
    async fn test_clear_resets_and_issues_new_session() {
        let backend = FakeBackend::default();
        let mut conversation = Conversation::default();
        conversation.send_message(&backend, "hello").await;
        let old = conversation.session_id().to_string();

        conversation.clear_conversation(&backend).await;

        let state = conversation.state();
        assert!(state.messages.is_empty());
        assert!(state.suggestions.is_empty());
        assert!(state.error.is_none());
        assert_ne!(state.session_id, old);
        assert_eq!(backend.cleared.lock().unwrap().as_slice(), [old]);
    }

    #[tokio::test]
    async fn test_clear_failure_is_not_surfaced() {
        let backend = FakeBackend {
            fail_clear: true,
            ..Default::default()
        };
        let mut conversation = Conversation::default();
        let old = conversation.session_id().to_string();

        conversation.clear_conversation(&backend).await;

        assert!(conversation.state().error.is_none());
        assert_ne!(conversation.session_id(), old);
    }

    #[test]
    fn test_select_suggestion_fills_input_without_sending() {
        let mut conversation = Conversation::default();
        conversation.select_suggestion("How do I track my package?");

        assert_eq!(conversation.state().input_value, "How do I track my package?");
        assert!(conversation.state().messages.is_empty());
        assert!(!conversation.state().is_loading);
    }

    #[test]
    fn test_restore_history_adopts_session() {
        let mut conversation = Conversation::default();
        conversation.restore_history(ConversationHistory {
            session_id: "session_resumed".to_string(),
            messages: vec![ChatMessage::user("hi"), ChatMessage::assistant("hello", None)],
            total_messages: 2,
        });

        assert_eq!(conversation.session_id(), "session_resumed");
        assert_eq!(conversation.state().messages.len(), 2);
    }

    #[test]
    fn test_toggle_voice_without_device_sets_error() {
        let mut conversation = Conversation::new(None);
        conversation.toggle_voice_capture();

        assert_eq!(conversation.state().error.as_deref(), Some(VOICE_UNSUPPORTED));
        assert!(!conversation.state().is_recording);
    }

    #[test]
    fn test_toggle_voice_starts_and_stops() {
        let voice = FakeVoice::default();
        let mut conversation = Conversation::new(Some(Box::new(voice.clone())));

        conversation.toggle_voice_capture();
        assert!(conversation.state().is_recording);
        assert_eq!(*voice.starts.lock().unwrap(), 1);

        conversation.toggle_voice_capture();
        assert!(!conversation.state().is_recording);
        assert_eq!(*voice.stops.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_voice_transcript_fills_input_and_marks_request() {
        let voice = FakeVoice::default();
        let backend = FakeBackend::default();
        let mut conversation = Conversation::new(Some(Box::new(voice.clone())));

        conversation.toggle_voice_capture();
        voice.emit(VoiceEvent::Transcript("Is the iPhone in stock?".to_string()));
        voice.emit(VoiceEvent::End);
        assert!(conversation.poll_voice());

        assert_eq!(conversation.state().input_value, "Is the iPhone in stock?");
        assert!(!conversation.state().is_recording);

        let text = conversation.state().input_value.clone();
        conversation.send_message(&backend, &text).await;
        assert!(backend.sent.lock().unwrap()[0].voice_input);
    }

    #[test]
    fn test_voice_error_is_generic_and_stops_recording() {
        let voice = FakeVoice::default();
        let mut conversation = Conversation::new(Some(Box::new(voice.clone())));

        conversation.toggle_voice_capture();
        voice.emit(VoiceEvent::Error("microphone busy".to_string()));
        conversation.poll_voice();

        assert_eq!(conversation.state().error.as_deref(), Some(VOICE_FAILED));
        assert!(!conversation.state().is_recording);
    }

    #[test]
    fn test_events_queued_before_stop_are_discarded() {
        let voice = FakeVoice::default();
        let mut conversation = Conversation::new(Some(Box::new(voice.clone())));

        conversation.toggle_voice_capture();
        voice.emit(VoiceEvent::Transcript("late".to_string()));
        conversation.toggle_voice_capture();

        assert!(!conversation.poll_voice());
        assert!(conversation.state().input_value.is_empty());
    }

    #[test]
    fn test_events_sent_after_stop_do_not_reach_next_attempt() {
        let voice = FakeVoice::default();
        let mut conversation = Conversation::new(Some(Box::new(voice.clone())));

        conversation.toggle_voice_capture();
        let first_attempt = voice.sender.lock().unwrap().clone().unwrap();
        conversation.toggle_voice_capture();

        // The first device finishes after the user stopped it and started again.
        conversation.toggle_voice_capture();
        let _ = first_attempt.send(VoiceEvent::Transcript("stale".to_string()));
        let _ = first_attempt.send(VoiceEvent::End);

        assert!(!conversation.poll_voice());
        assert!(conversation.state().input_value.is_empty());
        assert!(conversation.state().is_recording);

        voice.emit(VoiceEvent::Transcript("fresh".to_string()));
        assert!(conversation.poll_voice());
        assert_eq!(conversation.state().input_value, "fresh");
    }

    #[test]
    fn test_session_ids_are_unique() {
        assert_ne!(new_session_id(), new_session_id());
        assert!(new_session_id().starts_with("session_"));
    }
}
