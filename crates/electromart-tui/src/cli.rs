//! One-shot commands that print to stdout instead of opening the chat screen.

use anyhow::{bail, Result};
use chrono::Local;
use colored::*;
use electromart_core::models::ChatRole;
use electromart_core::{
    agent_badge, escalation_ticket, relative_time, ApiClient, ChatMessage, Conversation,
    FeedbackRequest, SupportTicket,
};

use crate::Commands;

pub async fn run(command: Commands, client: &ApiClient) -> Result<()> {
    match command {
        Commands::Chat { .. } => unreachable!("chat runs the interactive console"),
        Commands::Ask { message, session } => ask(client, &message, session).await,
        Commands::History { session } => history(client, &session).await,
        Commands::Health => health(client).await,
        Commands::Analytics { days } => analytics(client, days).await,
        Commands::Tickets { session } => tickets(client, &session).await,
        Commands::Ticket { id } => ticket(client, &id).await,
        Commands::Feedback {
            session,
            rating,
            text,
            helpful,
        } => {
            let feedback = FeedbackRequest {
                session_id: session,
                rating,
                feedback_text: text,
                helpful: helpful.unwrap_or(rating >= 4),
            };
            let receipt = client.submit_feedback(&feedback).await?;
            println!("{} {}", "✓".green(), receipt.message);
            Ok(())
        }
    }
}

async fn ask(client: &ApiClient, message: &str, session: Option<String>) -> Result<()> {
    let mut conversation = Conversation::default();
    if let Some(session_id) = session {
        conversation.restore_history(client.get_conversation(&session_id).await?);
    }

    let before = conversation.state().messages.len();
    if !conversation.send_message(client, message).await {
        bail!("Nothing to send: the message is empty");
    }

    let state = conversation.state();
    if let Some(error) = &state.error {
        bail!("{}", error);
    }

    let now = Local::now();
    for msg in &state.messages[before..] {
        print_message(msg, now);
    }

    if !state.suggestions.is_empty() {
        println!("{}", "You might also ask:".dimmed());
        for suggestion in &state.suggestions {
            println!("  • {}", suggestion.cyan());
        }
    }
    println!(
        "\n{} {}",
        "session:".dimmed(),
        conversation.session_id().dimmed()
    );
    Ok(())
}

async fn history(client: &ApiClient, session_id: &str) -> Result<()> {
    let history = client.get_conversation(session_id).await?;

    println!(
        "\n{}",
        format!("💬 Session {} ({} messages)", history.session_id, history.total_messages)
            .bold()
            .blue()
    );
    println!("{}", "=".repeat(50).dimmed());

    if history.messages.is_empty() {
        println!("{}", "No messages in this session.".yellow());
        return Ok(());
    }

    let now = Local::now();
    for msg in &history.messages {
        print_message(msg, now);
    }
    Ok(())
}

async fn health(client: &ApiClient) -> Result<()> {
    match client.health_check().await {
        Ok(health) => {
            let status = if health.is_healthy() {
                health.status.green()
            } else {
                health.status.red()
            };
            println!("{} {} (v{})", "Backend:".bold(), status, health.version);
            println!("  database:  {}", colorize_status(&health.database_status));
            println!("  vector db: {}", colorize_status(&health.vector_db_status));
            Ok(())
        }
        Err(e) => {
            if e.is_timeout() {
                println!("{}", "Backend did not answer in time".red());
            } else {
                println!("{}: {}", "Error connecting to backend".red(), e);
            }
            println!("Checked: {}", client.base_url().bold());
            Err(e.into())
        }
    }
}

async fn analytics(client: &ApiClient, days: u32) -> Result<()> {
    let analytics = client.get_analytics(days).await?;

    println!("\n{}", format!("📊 Analytics (last {} days)", days).bold().blue());
    println!("{}", "=".repeat(50).dimmed());
    println!("Conversations:     {}", analytics.total_conversations.to_string().bold());
    println!("Messages:          {}", analytics.total_messages.to_string().bold());
    println!("Avg sentiment:     {:+.2}", analytics.avg_sentiment_score);

    if analytics.agent_performance.is_empty() {
        println!("\n{}", "No agent activity recorded yet.".yellow());
        return Ok(());
    }

    println!(
        "\n{}",
        format!("{:<24}{:>8}{:>10}{:>12}", "Agent", "Queries", "Success", "Avg ms").bold()
    );
    for perf in &analytics.agent_performance {
        let badge = agent_badge(Some(perf.agent_type));
        println!(
            "{:<24}{:>8}{:>9.0}%{:>12.0}",
            format!("{} {}", badge.icon, badge.label),
            perf.total_queries,
            perf.success_rate * 100.0,
            perf.avg_response_time_ms
        );
    }
    Ok(())
}

async fn tickets(client: &ApiClient, session_id: &str) -> Result<()> {
    let listing = client.get_session_tickets(session_id).await?;

    println!(
        "\n{}",
        format!("🎫 Tickets for {} ({})", listing.session_id, listing.total_tickets)
            .bold()
            .blue()
    );
    println!("{}", "=".repeat(50).dimmed());

    if listing.tickets.is_empty() {
        println!("{}", "No tickets for this session.".yellow());
        return Ok(());
    }

    let now = Local::now();
    for ticket in &listing.tickets {
        println!(
            "\n{} {} {} {}",
            ticket.ticket_id.bold(),
            colorize_ticket_status(ticket),
            format!("[{}]", ticket.priority).magenta(),
            relative_time(ticket.created_at, now).dimmed()
        );
        println!("  {}", ticket.description);
    }
    Ok(())
}

async fn ticket(client: &ApiClient, ticket_id: &str) -> Result<()> {
    let ticket = client.get_ticket(ticket_id).await?;

    println!("\n{}", format!("🎫 {}", ticket.ticket_id).bold().blue());
    println!("{}", "=".repeat(50).dimmed());
    println!("Status:    {}", colorize_ticket_status(&ticket));
    println!("Priority:  {}", ticket.priority);
    println!("Issue:     {}", ticket.issue_type);
    if let Some(session_id) = &ticket.session_id {
        println!("Session:   {}", session_id);
    }
    println!("Opened:    {}", ticket.created_at.format("%Y-%m-%d %H:%M"));
    if let Some(agent) = &ticket.assigned_agent {
        println!("Assigned:  {}", agent);
    }
    println!("\n{}", ticket.description);
    if let Some(resolution) = &ticket.resolution {
        println!("\n{} {}", "Resolution:".green().bold(), resolution);
    }
    Ok(())
}

fn print_message(msg: &ChatMessage, now: chrono::DateTime<Local>) {
    let when = relative_time(msg.timestamp, now);
    match msg.role {
        ChatRole::User => {
            println!("\n{} {}", "You".cyan().bold(), when.dimmed());
        }
        ChatRole::Assistant => {
            let badge = agent_badge(msg.agent_type);
            println!(
                "\n{} {}",
                format!("{} {}", badge.icon, badge.label).yellow().bold(),
                when.dimmed()
            );
        }
        ChatRole::System => {
            println!("\n{} {}", "System".dimmed().bold(), when.dimmed());
        }
    }
    println!("{}", msg.content);
    if msg.role == ChatRole::Assistant {
        if let Some(ticket_id) = escalation_ticket(&msg.content) {
            println!(
                "{}",
                format!("Follow up with: electromart ticket {}", ticket_id).dimmed()
            );
        }
    }
}

fn colorize_ticket_status(ticket: &SupportTicket) -> ColoredString {
    if ticket.is_open() {
        ticket.status.yellow()
    } else {
        ticket.status.green()
    }
}

fn colorize_status(status: &str) -> ColoredString {
    match status {
        "healthy" => status.green(),
        "unknown" => status.yellow(),
        _ => status.red(),
    }
}
