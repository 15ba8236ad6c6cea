//! Chatsock - Entry Point
//!
//! `serve` runs the relay with the operator console on this terminal.
//! `connect` joins a running relay as a participant.

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use chatsock::console::{self, RelayEnds};
use chatsock::{AcceptMode, ChatError, Client, Config, RelayServer};

#[derive(Parser, Debug)]
#[command(name = "chatsock")]
#[command(about = "Local chat relay over a Unix domain socket")]
struct Cli {
    /// Rendezvous socket path (overrides CHATSOCK_PATH)
    #[arg(long, global = true)]
    socket: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the relay with the operator console on this terminal
    Serve {
        /// Registry capacity (overrides CHATSOCK_MAX_PARTICIPANTS)
        #[arg(long)]
        max_participants: Option<usize>,

        /// Poll for connections between bounded waits instead of waiting on the listener
        #[arg(long)]
        poll: bool,
    },
    /// Join a running relay as a participant
    Connect,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();

    if let Err(err) = run(cli).await {
        error!("{:#}", err);
        eprintln!("chatsock: {:#}", err);
        let code = err
            .downcast_ref::<ChatError>()
            .map(ChatError::exit_code)
            .unwrap_or(1);
        std::process::exit(code);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = Config::from_env()?;
    init_tracing(&config);

    if let Some(socket) = cli.socket {
        config.relay.socket_path = socket;
    }

    match cli.command {
        Command::Serve {
            max_participants,
            poll,
        } => {
            if let Some(n) = max_participants {
                if n == 0 {
                    return Err(ChatError::InvalidConfig(
                        "--max-participants must be at least 1".into(),
                    )
                    .into());
                }
                config.relay.max_participants = n;
            }
            if poll {
                config.relay.accept_mode = AcceptMode::Poll;
            }
            serve(config).await
        }
        Command::Connect => connect(config).await,
    }
}

fn init_tracing(config: &Config) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| config.log_filter().into());
    let registry = tracing_subscriber::registry().with(filter);

    // Chat text owns stdout
    if config.log_json() {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

async fn serve(config: Config) -> anyhow::Result<()> {
    info!("Starting chat relay");

    let (relay_ends, console_ends) = console::channel_pair().context("creating console channels")?;
    let server = bind(config, relay_ends)?;

    let console = console::spawn_console(console_ends, || {
        (tokio::io::stdin(), tokio::io::stdout())
    })
    .context("starting console")?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let relay_task = tokio::spawn(server.run(shutdown_rx));

    shutdown_signal().await;
    info!("Shutdown signal received");
    let _ = shutdown_tx.send(true);

    match relay_task.await {
        Ok(Ok(stats)) => info!(
            participants = stats.participants,
            messages = stats.messages,
            "Relay finished"
        ),
        Ok(Err(e)) => error!("Relay error: {}", e),
        Err(e) => error!("Relay task failed: {}", e),
    }

    // Relay ends are closed by now, so the console sees end-of-stream
    match console.wait().await {
        Ok(end) => info!(reason = ?end, "Console stopped"),
        Err(e) => warn!("Console error: {}", e),
    }

    info!("Chat relay stopped");
    Ok(())
}

fn bind(config: Config, relay_ends: RelayEnds) -> anyhow::Result<RelayServer> {
    let path = config.relay.socket_path.clone();
    RelayServer::bind(config.relay, Some(relay_ends))
        .with_context(|| format!("starting relay at {}", path.display()))
}

async fn connect(config: Config) -> anyhow::Result<()> {
    let path = config.relay.socket_path;
    let client = Client::connect(&path)
        .await
        .with_context(|| format!("connecting to {}", path.display()))?;
    info!(path = %client.path().display(), "Joined chat, Ctrl+D to leave");

    tokio::select! {
        end = client.run(tokio::io::stdin(), tokio::io::stdout()) => {
            let end = end?;
            info!(reason = ?end, "Disconnected");
        }
        _ = shutdown_signal() => {
            info!("Shutdown signal received");
        }
    }
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
