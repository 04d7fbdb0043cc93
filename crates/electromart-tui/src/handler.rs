use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use electromart_core::models::{MAX_RATING, MIN_RATING};

use crate::app::{App, InputMode, Popup};
use crate::tui::AppEvent;

/// Convert a character index to a byte index for UTF-8 safe string operations
fn char_to_byte_index(s: &str, char_idx: usize) -> usize {
    s.char_indices()
        .nth(char_idx)
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}

pub async fn handle_event(app: &mut App, event: AppEvent) -> Result<()> {
    match event {
        AppEvent::Key(key) => handle_key(app, key),
        AppEvent::Paste(text) => insert_text(app, &text),
        AppEvent::Resize => app.scroll_chat_to_bottom(),
        AppEvent::Tick => app.tick_animation(),
    }
    app.poll_tasks().await;
    Ok(())
}

fn handle_key(app: &mut App, key: KeyEvent) {
    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);

    // Global keys that work in any mode
    match key.code {
        KeyCode::Char('c') if ctrl => {
            app.should_quit = true;
            return;
        }
        KeyCode::Char('l') if ctrl => {
            app.clear_conversation();
            return;
        }
        KeyCode::Char('r') if ctrl => {
            app.toggle_voice();
            return;
        }
        _ => {}
    }

    match app.popup {
        Popup::Feedback => return handle_feedback_popup(app, key),
        Popup::Analytics => return handle_analytics_popup(app, key),
        Popup::None => {}
    }

    match app.input_mode {
        InputMode::Normal => handle_normal_mode(app, key),
        InputMode::Editing => handle_editing_mode(app, key),
    }
}

fn handle_normal_mode(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Char('q') => app.should_quit = true,

        KeyCode::Char('i') | KeyCode::Enter => {
            app.input_mode = InputMode::Editing;
            app.conversation.set_input_focused(true);
        }
        KeyCode::Esc => app.conversation.dismiss_error(),

        // Scrolling
        KeyCode::Char('j') | KeyCode::Down => app.scroll_down(1),
        KeyCode::Char('k') | KeyCode::Up => app.scroll_up(1),
        KeyCode::PageDown => app.scroll_down(app.chat_height.max(2) / 2),
        KeyCode::PageUp => app.scroll_up(app.chat_height.max(2) / 2),
        KeyCode::Char('G') | KeyCode::End => app.scroll_chat_to_bottom(),
        KeyCode::Char('g') | KeyCode::Home => app.chat_scroll = 0,

        // Suggestions are numbered from 1
        KeyCode::Char(c @ '1'..='5') => {
            let index = c as usize - '1' as usize;
            app.select_suggestion(index);
        }

        KeyCode::Char('c') => app.clear_conversation(),
        KeyCode::Char('r') => app.toggle_voice(),
        KeyCode::Char('f') => app.popup = Popup::Feedback,
        KeyCode::Char('a') => app.open_analytics(),
        KeyCode::Char('h') => app.spawn_health_check(),

        _ => {}
    }
}

fn handle_editing_mode(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc => {
            app.input_mode = InputMode::Normal;
            app.conversation.set_input_focused(false);
            return;
        }
        KeyCode::Enter => {
            app.submit_input();
            return;
        }
        KeyCode::PageUp => {
            app.scroll_up(app.chat_height.max(2) / 2);
            return;
        }
        KeyCode::PageDown => {
            app.scroll_down(app.chat_height.max(2) / 2);
            return;
        }
        _ => {}
    }

    // The input line is disabled while recording
    if app.conversation.state().is_recording {
        return;
    }

    let cursor = app.input_cursor;
    match key.code {
        KeyCode::Tab => app.cycle_suggestion(),
        KeyCode::Backspace => {
            if cursor > 0 {
                app.input_cursor -= 1;
                let input = app.conversation.input_mut();
                let byte_pos = char_to_byte_index(input, cursor - 1);
                input.remove(byte_pos);
            }
        }
        KeyCode::Delete => {
            let char_count = app.input().chars().count();
            if cursor < char_count {
                let input = app.conversation.input_mut();
                let byte_pos = char_to_byte_index(input, cursor);
                input.remove(byte_pos);
            }
        }
        KeyCode::Left => {
            app.input_cursor = cursor.saturating_sub(1);
        }
        KeyCode::Right => {
            let char_count = app.input().chars().count();
            app.input_cursor = (cursor + 1).min(char_count);
        }
        KeyCode::Home => {
            app.input_cursor = 0;
        }
        KeyCode::End => {
            app.input_cursor = app.input().chars().count();
        }
        KeyCode::Char('u') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            app.conversation.set_input("");
            app.input_cursor = 0;
        }
        KeyCode::Char(c) => insert_text(app, &c.to_string()),
        _ => {}
    }
}

fn insert_text(app: &mut App, text: &str) {
    if app.input_mode != InputMode::Editing || app.conversation.state().is_recording {
        return;
    }
    // Pasted newlines would otherwise end up inside a single-line input
    let text: String = text.chars().filter(|c| !c.is_control()).collect();
    let cursor = app.input_cursor;
    let input = app.conversation.input_mut();
    let byte_pos = char_to_byte_index(input, cursor);
    input.insert_str(byte_pos, &text);
    app.input_cursor += text.chars().count();
}

fn handle_feedback_popup(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc | KeyCode::Char('q') => app.popup = Popup::None,
        KeyCode::Char(c) => {
            if let Some(rating) = c.to_digit(10) {
                let rating = rating as u8;
                if (MIN_RATING..=MAX_RATING).contains(&rating) {
                    app.submit_feedback(rating);
                }
            }
        }
        _ => {}
    }
}

fn handle_analytics_popup(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc | KeyCode::Char('q') | KeyCode::Char('a') => app.popup = Popup::None,
        KeyCode::Char('r') => {
            app.analytics = None;
            app.open_analytics();
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Local;
    use electromart_core::models::{AgentInfo, AgentType};
    use electromart_core::{ApiClient, ApiError, ChatResponse, VoiceCapture, VoiceEvent};
    use std::io;
    use std::time::Duration;
    use tokio::sync::mpsc::UnboundedSender;

    fn test_app() -> App {
        let client = ApiClient::new("http://127.0.0.1:9", Duration::from_secs(1)).unwrap();
        App::new(client, None)
    }

    /// A microphone that records until stopped and never hears anything.
    struct SilentMic;

    impl VoiceCapture for SilentMic {
        fn start(&mut self, _events: UnboundedSender<VoiceEvent>) -> io::Result<()> {
            Ok(())
        }

        fn stop(&mut self) {}
    }

    fn recording_app() -> App {
        let client = ApiClient::new("http://127.0.0.1:9", Duration::from_secs(1)).unwrap();
        let mut app = App::new(client, Some(Box::new(SilentMic)));
        app.toggle_voice();
        assert!(app.conversation.state().is_recording);
        app
    }

    fn give_suggestions(app: &mut App, suggestions: &[&str]) {
        let pending = app.conversation.begin_send("hi").unwrap();
        let reply = ChatResponse {
            response: "Hello!".to_string(),
            session_id: pending.request.session_id.clone().unwrap_or_default(),
            agent_info: AgentInfo {
                agent_type: AgentType::Marketing,
                confidence: 0.7,
            },
            sentiment: None,
            response_time_ms: 5,
            timestamp: Local::now(),
            suggestions: Some(suggestions.iter().map(|s| s.to_string()).collect()),
        };
        app.conversation.complete_send(pending.seq, Ok::<_, ApiError>(reply));
    }

    fn press(app: &mut App, code: KeyCode) {
        handle_key(app, KeyEvent::new(code, KeyModifiers::NONE));
    }

    #[test]
    fn test_char_to_byte_index_handles_multibyte() {
        let s = "héllo";
        assert_eq!(char_to_byte_index(s, 0), 0);
        assert_eq!(char_to_byte_index(s, 2), 3);
        assert_eq!(char_to_byte_index(s, 10), s.len());
    }

    #[test]
    fn test_typing_and_editing() {
        let mut app = test_app();
        for c in "helo".chars() {
            press(&mut app, KeyCode::Char(c));
        }
        press(&mut app, KeyCode::Left);
        press(&mut app, KeyCode::Char('l'));
        assert_eq!(app.input(), "hello");

        press(&mut app, KeyCode::End);
        press(&mut app, KeyCode::Backspace);
        assert_eq!(app.input(), "hell");
        assert_eq!(app.input_cursor, 4);
    }

    #[test]
    fn test_paste_strips_newlines() {
        let mut app = test_app();
        insert_text(&mut app, "track\norder");
        assert_eq!(app.input(), "trackorder");
        assert_eq!(app.input_cursor, 10);
    }

    #[test]
    fn test_voice_toggle_without_device_shows_error() {
        let mut app = test_app();
        handle_key(&mut app, KeyEvent::new(KeyCode::Char('r'), KeyModifiers::CONTROL));
        assert!(app.conversation.state().error.is_some());
        assert!(!app.conversation.state().is_recording);
    }

    #[test]
    fn test_escape_then_quit() {
        let mut app = test_app();
        press(&mut app, KeyCode::Esc);
        assert_eq!(app.input_mode, InputMode::Normal);
        press(&mut app, KeyCode::Char('q'));
        assert!(app.should_quit);
    }

    #[test]
    fn test_digit_keys_only_reach_shown_suggestions() {
        let mut app = test_app();
        let suggestions: Vec<String> = (1..=7).map(|i| format!("deal {}", i)).collect();
        let refs: Vec<&str> = suggestions.iter().map(String::as_str).collect();
        give_suggestions(&mut app, &refs);
        app.input_mode = InputMode::Normal;

        press(&mut app, KeyCode::Char('6'));
        assert_eq!(app.input(), "");
        assert_eq!(app.input_mode, InputMode::Normal);

        press(&mut app, KeyCode::Char('5'));
        assert_eq!(app.input(), "deal 5");
        assert_eq!(app.input_mode, InputMode::Editing);
    }

    #[test]
    fn test_tab_fills_suggestion() {
        let mut app = test_app();
        give_suggestions(&mut app, &["Any laptop deals?", "Show me headphones"]);

        press(&mut app, KeyCode::Tab);
        assert_eq!(app.input(), "Any laptop deals?");
        press(&mut app, KeyCode::Tab);
        assert_eq!(app.input(), "Show me headphones");
    }

    #[test]
    fn test_input_is_locked_while_recording() {
        let mut app = recording_app();
        give_suggestions(&mut app, &["Any laptop deals?"]);

        press(&mut app, KeyCode::Tab);
        press(&mut app, KeyCode::Char('x'));
        insert_text(&mut app, "pasted");
        assert_eq!(app.input(), "");

        // Leaving the input line still works
        press(&mut app, KeyCode::Esc);
        assert_eq!(app.input_mode, InputMode::Normal);
    }

    #[test]
    fn test_feedback_popup_ignores_out_of_range_digits() {
        let mut app = test_app();
        app.popup = Popup::Feedback;
        press(&mut app, KeyCode::Char('9'));
        assert_eq!(app.popup, Popup::Feedback);
        assert!(app.feedback_task.is_none());
    }
}
