use chrono::Local;
use electromart_core::models::ChatRole;
use electromart_core::{agent_badge, escalation_ticket, relative_time, AgentType, ChatMessage};
use ratatui::{
    layout::{Alignment, Constraint, Flex, Layout, Rect},
    style::{Color, Modifier, Style, Stylize},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Clear, Paragraph, Wrap},
    Frame,
};

use crate::app::{App, BackendStatus, InputMode, Popup, MAX_SHOWN_SUGGESTIONS};

/// Render a line of assistant text, turning `**bold**` runs into bold spans.
/// An unmatched `**` is kept literally.
fn parse_markdown_line(text: &str) -> Line<'static> {
    let parts: Vec<&str> = text.split("**").collect();
    // An even number of parts means the last `**` has no partner
    let unmatched = parts.len() % 2 == 0;

    let mut spans = Vec::with_capacity(parts.len());
    for (i, part) in parts.iter().enumerate() {
        let is_last = i == parts.len() - 1;
        if unmatched && is_last {
            spans.push(Span::raw(format!("**{}", part)));
        } else if i % 2 == 1 && !part.is_empty() {
            spans.push(Span::styled(
                part.to_string(),
                Style::default().add_modifier(Modifier::BOLD),
            ));
        } else if !part.is_empty() {
            spans.push(Span::raw(part.to_string()));
        }
    }

    Line::from(spans)
}

fn agent_color(agent_type: Option<AgentType>) -> Color {
    match agent_type {
        Some(AgentType::Orchestrator) => Color::Gray,
        Some(AgentType::Sales) => Color::Green,
        Some(AgentType::Marketing) => Color::Magenta,
        Some(AgentType::TechnicalSupport) => Color::Blue,
        Some(AgentType::OrderLogistics) => Color::Yellow,
        Some(AgentType::CustomerService) | Some(AgentType::Unknown) | None => Color::Cyan,
    }
}

/// Lines for one message: user messages right-aligned, everything else
/// left-aligned under an agent badge.
fn message_lines(msg: &ChatMessage, now: chrono::DateTime<Local>) -> Vec<Line<'static>> {
    let when = relative_time(msg.timestamp, now);
    let meta_style = Style::default().fg(Color::DarkGray);
    let mut lines = Vec::new();

    match msg.role {
        ChatRole::User => {
            lines.push(
                Line::from(vec![
                    Span::styled(format!("{} · ", when), meta_style),
                    Span::styled("You", Style::default().fg(Color::Cyan).bold()),
                ])
                .alignment(Alignment::Right),
            );
            for line in msg.content.lines() {
                lines.push(Line::from(line.to_string()).alignment(Alignment::Right));
            }
        }
        ChatRole::Assistant => {
            let badge = agent_badge(msg.agent_type);
            let color = agent_color(msg.agent_type);
            let mut header = vec![
                Span::styled(
                    format!(" {} {} ", badge.icon, badge.label),
                    Style::default().bg(color).fg(Color::Black).bold(),
                ),
                Span::styled(format!(" {}", when), meta_style),
            ];
            if let Some(ticket_id) = escalation_ticket(&msg.content) {
                header.push(Span::styled(
                    format!("  ⚠ escalated · {}", ticket_id),
                    Style::default().fg(Color::Red).bold(),
                ));
            }
            lines.push(Line::from(header));
            for line in msg.content.lines() {
                lines.push(parse_markdown_line(line));
            }
        }
        ChatRole::System => {
            for line in msg.content.lines() {
                lines.push(
                    Line::from(Span::styled(line.to_string(), meta_style.italic()))
                        .alignment(Alignment::Center),
                );
            }
        }
    }

    lines.push(Line::default());
    lines
}

pub fn render(app: &mut App, frame: &mut Frame) {
    let area = frame.area();
    let state = app.conversation.state();

    let suggestions_height = if state.suggestions.is_empty() {
        0
    } else {
        state.suggestions.len().min(MAX_SHOWN_SUGGESTIONS) as u16 + 2 // +2 for borders
    };
    let status_height = u16::from(state.error.is_some() || app.notice.is_some());

    let [header_area, chat_area, suggestions_area, status_area, input_area, footer_area] =
        Layout::vertical([
            Constraint::Length(1),
            Constraint::Min(0),
            Constraint::Length(suggestions_height),
            Constraint::Length(status_height),
            Constraint::Length(3),
            Constraint::Length(1),
        ])
        .areas(area);

    render_header(app, frame, header_area);
    render_chat(app, frame, chat_area);
    if suggestions_height > 0 {
        render_suggestions(app, frame, suggestions_area);
    }
    if status_height > 0 {
        render_status(app, frame, status_area);
    }
    render_input(app, frame, input_area);
    render_footer(app, frame, footer_area);

    match app.popup {
        Popup::Feedback => render_feedback_popup(frame, area),
        Popup::Analytics => render_analytics_popup(app, frame, area),
        Popup::None => {}
    }
}

fn render_header(app: &App, frame: &mut Frame, area: Rect) {
    let session = app.conversation.session_id();
    let short_session: String = session.chars().take(16).collect();

    let (health_text, health_color) = match &app.backend_status {
        BackendStatus::Checking => ("● checking".to_string(), Color::DarkGray),
        BackendStatus::Healthy { version } => (format!("● online v{}", version), Color::Green),
        BackendStatus::Degraded { status } => (format!("● {}", status), Color::Yellow),
        BackendStatus::Unreachable => ("● offline".to_string(), Color::Red),
    };

    let title = Line::from(vec![
        Span::styled(" ElectroMart Assistant ", Style::default().fg(Color::Cyan).bold()),
        Span::styled(format!("[{}] ", short_session), Style::default().fg(Color::DarkGray)),
        Span::styled(health_text, Style::default().fg(health_color)),
    ]);

    frame.render_widget(Paragraph::new(title), area);
}

fn render_chat(app: &mut App, frame: &mut Frame, area: Rect) {
    // Store chat area dimensions for scroll calculations (inner size minus borders)
    app.chat_height = area.height.saturating_sub(2);
    app.chat_width = area.width.saturating_sub(2);

    let state = app.conversation.state();
    let focused = app.input_mode == InputMode::Normal && app.popup == Popup::None;
    let border_color = if focused { Color::Cyan } else { Color::DarkGray };

    let title = match app.last_confidence {
        Some(confidence) => format!(" Conversation · last reply {:.0}% confident ", confidence * 100.0),
        None => " Conversation ".to_string(),
    };
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color))
        .title(title);

    let text = if state.messages.is_empty() && !state.is_loading {
        Text::from(vec![
            Line::from(Span::styled(
                "Ask about products, orders, promotions or technical issues...",
                Style::default().fg(Color::DarkGray),
            )),
            Line::from(Span::styled(
                "e.g. \"Track my order #12345\"",
                Style::default().fg(Color::DarkGray).italic(),
            )),
        ])
    } else {
        let now = Local::now();
        let mut lines: Vec<Line> = state
            .messages
            .iter()
            .flat_map(|msg| message_lines(msg, now))
            .collect();

        if state.is_loading {
            lines.push(Line::from(Span::styled(
                " … ",
                Style::default().bg(Color::DarkGray).fg(Color::White),
            )));
            // Animated ellipsis: cycles through ".", "..", "..."
            let dots = ".".repeat((app.animation_frame as usize) + 1);
            lines.push(Line::from(Span::styled(
                format!("Thinking{}", dots),
                Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
            )));
        }

        Text::from(lines)
    };

    let chat = Paragraph::new(text)
        .block(block)
        .wrap(Wrap { trim: false })
        .scroll((app.chat_scroll, 0));

    frame.render_widget(chat, area);
}

fn render_suggestions(app: &App, frame: &mut Frame, area: Rect) {
    let state = app.conversation.state();
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Magenta))
        .title(format!(" Suggestions (1-{} or Tab) ", MAX_SHOWN_SUGGESTIONS));

    let lines: Vec<Line> = state
        .suggestions
        .iter()
        .take(MAX_SHOWN_SUGGESTIONS)
        .enumerate()
        .map(|(i, suggestion)| {
            let selected = state.input_value == *suggestion;
            let style = if selected {
                Style::default().fg(Color::Magenta).bold()
            } else {
                Style::default()
            };
            Line::from(vec![
                Span::styled(format!(" {} ", i + 1), Style::default().bg(Color::DarkGray).fg(Color::White)),
                Span::styled(format!(" {}", suggestion), style),
            ])
        })
        .collect();

    frame.render_widget(Paragraph::new(lines).block(block), area);
}

fn render_status(app: &App, frame: &mut Frame, area: Rect) {
    let line = match (&app.conversation.state().error, &app.notice) {
        (Some(error), _) => Line::from(vec![
            Span::styled(" ✖ ", Style::default().fg(Color::Red).bold()),
            Span::styled(error.clone(), Style::default().fg(Color::Red)),
            Span::styled("  (Esc in normal mode to dismiss)", Style::default().fg(Color::DarkGray)),
        ]),
        (None, Some(notice)) => Line::from(Span::styled(
            format!(" {}", notice),
            Style::default().fg(Color::Green),
        )),
        (None, None) => Line::default(),
    };
    frame.render_widget(Paragraph::new(line), area);
}

fn render_input(app: &App, frame: &mut Frame, area: Rect) {
    let state = app.conversation.state();
    let editing = app.input_mode == InputMode::Editing && app.popup == Popup::None;

    let (title, border_color) = if state.is_recording {
        let dots = ".".repeat((app.animation_frame as usize) + 1);
        (format!(" ● Listening{} (Ctrl+R to stop) ", dots), Color::Red)
    } else if state.is_loading {
        (" Waiting for the assistant... ".to_string(), Color::DarkGray)
    } else if editing {
        (" Message (Enter to send) ".to_string(), Color::Yellow)
    } else {
        (" Message (i to type) ".to_string(), Color::DarkGray)
    };

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color))
        .title(title);

    // Calculate visible portion of input with horizontal scrolling
    let inner_width = area.width.saturating_sub(2) as usize;
    let cursor_pos = app.input_cursor;
    let scroll_offset = if inner_width == 0 {
        0
    } else if cursor_pos >= inner_width {
        cursor_pos - inner_width + 1
    } else {
        0
    };

    let visible_text: String = state
        .input_value
        .chars()
        .skip(scroll_offset)
        .take(inner_width)
        .collect();

    let text_style = if state.is_recording {
        Style::default().fg(Color::DarkGray)
    } else {
        Style::default().fg(Color::Cyan)
    };
    frame.render_widget(Paragraph::new(visible_text).style(text_style).block(block), area);

    if editing && !state.is_recording {
        let cursor_x = (cursor_pos - scroll_offset) as u16;
        frame.set_cursor_position((area.x + cursor_x + 1, area.y + 1));
    }
}

fn render_footer(app: &App, frame: &mut Frame, area: Rect) {
    let (mode_text, mode_style) = match app.input_mode {
        InputMode::Normal => (" NORMAL ", Style::default().bg(Color::Blue).fg(Color::White)),
        InputMode::Editing => (" INSERT ", Style::default().bg(Color::Yellow).fg(Color::Black)),
    };

    // Key style: dark background with bright text for visibility on both light/dark terminals
    let key_style = Style::default().bg(Color::DarkGray).fg(Color::White);
    let label_style = Style::default().bg(Color::Black).fg(Color::White);

    let pairs: &[(&str, &str)] = match (app.popup, app.input_mode) {
        (Popup::Feedback, _) => &[(" 1-5 ", " rate "), (" Esc ", " cancel ")],
        (Popup::Analytics, _) => &[(" r ", " refresh "), (" Esc ", " close ")],
        (Popup::None, InputMode::Editing) => &[
            (" Enter ", " send "),
            (" Tab ", " suggestion "),
            (" Ctrl+R ", " voice "),
            (" Ctrl+L ", " new chat "),
            (" Esc ", " normal "),
        ],
        (Popup::None, InputMode::Normal) => &[
            (" i ", " type "),
            (" j/k ", " scroll "),
            (" 1-5 ", " suggestion "),
            (" r ", " voice "),
            (" c ", " new chat "),
            (" f ", " feedback "),
            (" a ", " analytics "),
            (" q ", " quit "),
        ],
    };

    let voice_available = app.conversation.voice_available();
    let mut spans = vec![Span::styled(mode_text, mode_style), Span::raw(" ")];
    for (key, label) in pairs {
        if label.trim() == "voice" && !voice_available {
            continue;
        }
        spans.push(Span::styled(*key, key_style));
        spans.push(Span::styled(*label, label_style));
    }

    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}

fn popup_area(area: Rect, width: u16, height: u16) -> Rect {
    let [area] = Layout::vertical([Constraint::Length(height)])
        .flex(Flex::Center)
        .areas(area);
    let [area] = Layout::horizontal([Constraint::Length(width)])
        .flex(Flex::Center)
        .areas(area);
    area
}

fn render_feedback_popup(frame: &mut Frame, area: Rect) {
    let popup = popup_area(area, 44, 5);
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Yellow))
        .title(" Rate this conversation ");

    let text = Text::from(vec![
        Line::from("How helpful was the assistant?"),
        Line::from(vec![
            Span::styled("1", Style::default().fg(Color::Red).bold()),
            Span::raw(" (poor) ... "),
            Span::styled("5", Style::default().fg(Color::Green).bold()),
            Span::raw(" (great)"),
        ]),
    ]);

    frame.render_widget(Clear, popup);
    frame.render_widget(Paragraph::new(text).block(block).alignment(Alignment::Center), popup);
}

fn render_analytics_popup(app: &App, frame: &mut Frame, area: Rect) {
    let popup = popup_area(area, 72.min(area.width), 16.min(area.height));
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan))
        .title(format!(" Analytics · last {} days ", app.analytics_days));

    frame.render_widget(Clear, popup);

    let Some(analytics) = &app.analytics else {
        let loading = Paragraph::new(Span::styled(
            "Loading analytics...",
            Style::default().fg(Color::DarkGray).italic(),
        ))
        .block(block);
        frame.render_widget(loading, popup);
        return;
    };

    let mut lines = vec![
        Line::from(vec![
            Span::styled("Conversations: ", Style::default().fg(Color::DarkGray)),
            Span::raw(analytics.total_conversations.to_string()),
            Span::styled("   Messages: ", Style::default().fg(Color::DarkGray)),
            Span::raw(analytics.total_messages.to_string()),
            Span::styled("   Avg sentiment: ", Style::default().fg(Color::DarkGray)),
            Span::raw(format!("{:+.2}", analytics.avg_sentiment_score)),
        ]),
        Line::default(),
        Line::from(Span::styled(
            format!("{:<24}{:>8}{:>10}{:>12}", "Agent", "Queries", "Success", "Avg ms"),
            Style::default().bold(),
        )),
    ];

    if analytics.agent_performance.is_empty() {
        lines.push(Line::from(Span::styled(
            "No agent activity recorded yet.",
            Style::default().fg(Color::DarkGray),
        )));
    }

    for perf in &analytics.agent_performance {
        let badge = agent_badge(Some(perf.agent_type));
        lines.push(Line::from(vec![
            Span::styled(
                format!("{:<24}", format!("{} {}", badge.icon, badge.label)),
                Style::default().fg(agent_color(Some(perf.agent_type))),
            ),
            Span::raw(format!(
                "{:>8}{:>9.0}%{:>12.0}",
                perf.total_queries,
                perf.success_rate * 100.0,
                perf.avg_response_time_ms
            )),
        ]));
    }

    frame.render_widget(Paragraph::new(lines).block(block), popup);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn span_texts(line: &Line) -> Vec<String> {
        line.spans.iter().map(|s| s.content.to_string()).collect()
    }

    #[test]
    fn test_markdown_bold() {
        let line = parse_markdown_line("The **iPhone 15 Pro** is in stock");
        assert_eq!(span_texts(&line), vec!["The ", "iPhone 15 Pro", " is in stock"]);
        assert!(line.spans[1].style.add_modifier.contains(Modifier::BOLD));
    }

    #[test]
    fn test_markdown_unmatched_marker_is_literal() {
        let line = parse_markdown_line("price **$999");
        assert_eq!(span_texts(&line), vec!["price ", "**$999"]);
    }

    #[test]
    fn test_user_messages_are_right_aligned() {
        let now = Local::now();
        let lines = message_lines(&ChatMessage::user("Track my order #12345"), now);
        assert_eq!(lines[0].alignment, Some(Alignment::Right));
        assert_eq!(lines[1].alignment, Some(Alignment::Right));
    }

    #[test]
    fn test_assistant_messages_carry_badge() {
        let now = Local::now();
        let msg = ChatMessage::assistant("Shipped!", Some(AgentType::OrderLogistics));
        let lines = message_lines(&msg, now);
        assert!(lines[0].spans[0].content.contains("Orders & Logistics"));
        assert_eq!(lines[0].alignment, None);
    }

    #[test]
    fn test_escalated_reply_shows_ticket() {
        let now = Local::now();
        let msg = ChatMessage::assistant(
            "Sorry about that.\n\n⚠️ Your case has been escalated to our human support team (Ticket #TKT-9F00BA12).",
            Some(AgentType::TechnicalSupport),
        );
        let header = span_texts(&message_lines(&msg, now)[0]);
        assert!(header.last().unwrap().contains("TKT-9F00BA12"));

        let plain = ChatMessage::assistant("All good", Some(AgentType::TechnicalSupport));
        assert_eq!(message_lines(&plain, now)[0].spans.len(), 2);
    }

    #[test]
    fn test_assistant_without_agent_uses_default_badge() {
        let now = Local::now();
        let lines = message_lines(&ChatMessage::assistant("Hi", None), now);
        assert!(lines[0].spans[0].content.contains("Customer Service"));
    }
}
