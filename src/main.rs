//! CLI for chatbus
//!
//! Subcommands:
//! - `server`: run the WebSocket broker
//! - `client`: run an interactive chat session against a broker

use std::process::ExitCode;
use std::sync::{Arc, Mutex};

use chatbus::broker::Broker;
use chatbus::config::{Settings, load_config};
use chatbus::session::client;
use chatbus::transport::start_websocket_server;
use chatbus::utils::logging;
use clap::Parser;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "chatbus")]
enum Command {
    /// Start the WebSocket broker
    Server,
    /// Start a chat session: stdin lines become conversation turns
    Client {
        /// Broker URL (overrides `session.url`)
        #[arg(long)]
        url: Option<String>,
        /// Text worker topic (overrides `session.conversation_topic`)
        #[arg(long)]
        topic: Option<String>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cmd = Command::parse();

    let mut settings = match load_config() {
        Ok(settings) => settings,
        Err(e) => {
            logging::init("info");
            error!("Failed to load configuration: {e}");
            return ExitCode::FAILURE;
        }
    };
    logging::init(&settings.log.level);

    let result = match cmd {
        Command::Server => run_server(settings).await,
        Command::Client { url, topic } => {
            if let Some(url) = url {
                settings.session.url = url;
            }
            if let Some(topic) = topic {
                settings.session.conversation_topic = topic;
            }
            client::run(&settings.session)
                .await
                .map_err(|e| Box::new(e) as Box<dyn std::error::Error>)
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

async fn run_server(settings: Settings) -> Result<(), Box<dyn std::error::Error>> {
    let addr = settings.server.addr();
    let broker = Arc::new(Mutex::new(Broker::new()));

    tokio::select! {
        res = start_websocket_server(&addr, broker, settings.broker) => {
            res?;
            error!("WebSocket server exited unexpectedly.");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received. Exiting gracefully.");
        }
    }

    Ok(())
}
