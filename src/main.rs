use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use duplex_chat::bootstrap::{self, Role};
use duplex_chat::input::spawn_stdin_reader;
use duplex_chat::{Console, LineSink, Session, SessionConfig, Severity, StopReason};

/// Full-duplex text chat between two terminals over TCP.
#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    #[command(subcommand)]
    role: Mode,

    /// Name shown on our own status lines (defaults to the role).
    #[arg(long, global = true)]
    name: Option<String>,

    /// Name shown on lines from the peer (defaults to the other role).
    #[arg(long, global = true)]
    peer_name: Option<String>,

    /// Word that ends the session when either side sends it.
    #[arg(long, global = true, default_value = duplex_chat::session::DEFAULT_SENTINEL)]
    sentinel: String,

    /// Print plain text, no ANSI colors.
    #[arg(long, global = true)]
    no_color: bool,
}

#[derive(Subcommand)]
enum Mode {
    /// Wait for the peer to connect.
    Server {
        /// Local address to bind.
        #[arg(short, long, default_value = "0.0.0.0:5050")]
        bind: String,
    },
    /// Connect to a waiting peer.
    Client {
        /// Address of the peer.
        #[arg(short, long, default_value = "127.0.0.1:5050")]
        connect: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    // Diagnostics go to stderr, set RUST_LOG to see them
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if cli.no_color {
        colored::control::set_override(false);
    }

    let role = match cli.role {
        Mode::Server { .. } => Role::Server,
        Mode::Client { .. } => Role::Client,
    };
    let config = SessionConfig {
        name: cli.name.unwrap_or_else(|| role.label().to_owned()),
        peer_name: cli.peer_name.unwrap_or_else(|| role.peer().label().to_owned()),
        sentinel: cli.sentinel,
    };

    let console = Console;
    let transport = match &cli.role {
        Mode::Server { bind } => bootstrap::listen(bind, &config.name, &console).await,
        Mode::Client { connect } => bootstrap::connect(connect, &config.name, &console).await,
    };
    let transport = match transport {
        Ok(transport) => transport,
        Err(e) => {
            tracing::error!("{e}");
            return ExitCode::FAILURE;
        }
    };

    let name = config.name.clone();
    let input = spawn_stdin_reader(Some(format!("[{name}]: ")));
    let session = Session::with_sink(transport, config, Arc::new(console));

    // Ctrl-C closes the socket, which gets both loops out
    let interrupt = tokio::spawn({
        let session = session.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                session.stop(StopReason::Interrupted).await;
            }
        }
    });

    let result = session.start(input).await;
    interrupt.abort();

    match result {
        Ok(reason) => {
            tracing::info!(?reason, "session finished");
            ExitCode::SUCCESS
        }
        Err(e) => {
            console.log(&format!("Session failed: {e}"), &name, Severity::Error);
            ExitCode::FAILURE
        }
    }
}
