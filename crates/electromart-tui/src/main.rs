use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use electromart_core::{ApiClient, CommandVoiceCapture, Config, VoiceCapture};
use tracing::info;

mod app;
mod cli;
mod handler;
mod logging;
mod tui;
mod ui;

use app::App;
use tui::{EventHandler, Tui};

#[derive(Parser)]
#[command(name = "electromart")]
#[command(version, about = "Terminal chat console for the ElectroMart assistant")]
struct Cli {
    /// Backend base URL (overrides config and ELECTROMART_API_URL)
    #[arg(long, global = true)]
    api_url: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Interactive chat (default)
    Chat {
        /// Resume an existing server-side session
        #[arg(short, long)]
        session: Option<String>,
    },
    /// Send a single message and print the reply
    Ask {
        message: String,
        /// Session to continue
        #[arg(short, long)]
        session: Option<String>,
    },
    /// Print the history of a session
    History { session: String },
    /// Check backend health
    Health,
    /// Show agent analytics
    Analytics {
        /// Number of days to include
        #[arg(short, long, default_value = "7")]
        days: u32,
    },
    /// List the support tickets opened for a session
    Tickets { session: String },
    /// Show one support ticket
    Ticket { id: String },
    /// Rate a session from 1 to 5
    Feedback {
        session: String,
        rating: u8,
        /// Optional comment
        #[arg(short, long)]
        text: Option<String>,
        /// Mark the conversation as helpful (defaults to rating >= 4)
        #[arg(long)]
        helpful: Option<bool>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load().context("Failed to load configuration")?;
    if let Some(url) = cli.api_url {
        config.api_base_url = url;
    }

    let client = ApiClient::new(&config.api_base_url, config.timeout())?;

    match cli.command.unwrap_or(Commands::Chat { session: None }) {
        Commands::Chat { session } => {
            let log_path = logging::init_file(&config)?;
            info!(path = %log_path.display(), api = %client.base_url(), "starting chat console");
            run_chat(&config, client, session).await
        }
        command => {
            logging::init_stderr(&config);
            cli::run(command, &client).await
        }
    }
}

async fn run_chat(config: &Config, client: ApiClient, session: Option<String>) -> Result<()> {
    let voice = config
        .voice_command
        .as_ref()
        .map(|command| Box::new(CommandVoiceCapture::new(command.clone())) as Box<dyn VoiceCapture>);

    let mut app = App::new(client, voice);

    if let Some(session_id) = session {
        let history = app
            .client
            .get_conversation(&session_id)
            .await
            .with_context(|| format!("Failed to load session {}", session_id))?;
        app.conversation.restore_history(history);
    }
    app.spawn_health_check();

    tui::install_panic_hook();
    let mut terminal = tui::init()?;
    let mut events = EventHandler::new();

    app.scroll_chat_to_bottom();
    let result = run_loop(&mut app, &mut terminal, &mut events).await;

    tui::restore()?;
    result
}

async fn run_loop(app: &mut App, terminal: &mut Tui, events: &mut EventHandler) -> Result<()> {
    while !app.should_quit {
        terminal.draw(|frame| ui::render(app, frame))?;

        let Some(event) = events.next().await else {
            break;
        };
        handler::handle_event(app, event).await?;
    }
    Ok(())
}
