#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

//! # rc-host
//!
//! Single-tenant host daemon that multiplexes interactive shell and AI-agent
//! engine subprocesses as resumable HTTP/WebSocket sessions.
//!
//! ## Subcommands
//!
//! - `rc-host serve` — run the HTTP/WS server (the only subcommand today;
//!   running with no subcommand also serves, using flag defaults).

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use clap::{Args, Parser, Subcommand};
use tokio::net::TcpListener;
use tracing::info;

use rc_host::app::build_router;
use rc_host::auth::TicketStore;
use rc_host::config::{self, ServeArgs};
use rc_host::sessions::manager::SessionManager;
use rc_host::AppState;

#[derive(Parser)]
#[command(name = "rc-host", version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
    #[command(flatten)]
    serve: ServeFlags,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP/WS server.
    Serve(ServeFlags),
}

#[derive(Args, Clone)]
struct ServeFlags {
    /// Interface to bind.
    #[arg(long, default_value = "127.0.0.1")]
    bind: String,
    /// TCP port to listen on.
    #[arg(long, default_value_t = 8765)]
    port: u16,
    /// Bearer token clients must present. Overrides `RC_TOKEN`.
    #[arg(long)]
    token: Option<String>,
    /// Path to a file containing the bearer token.
    #[arg(long)]
    token_file: Option<PathBuf>,
    /// Directory for per-session logs and event stores.
    #[arg(long, default_value = "logs")]
    log_dir: PathBuf,
    /// Generate a dev token and write it to `<log-dir>/.dev-token` if no
    /// other token source is configured.
    #[arg(long, default_value_t = false)]
    generate_dev_token: bool,
    /// Directory of a static SPA to serve at `/`.
    #[arg(long)]
    web_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let flags = match cli.command {
        Some(Commands::Serve(flags)) => flags,
        None => cli.serve,
    };
    run_server(flags).await;
}

async fn run_server(flags: ServeFlags) {
    let log_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt().with_env_filter(log_filter).init();

    let args = ServeArgs {
        bind: flags.bind,
        port: flags.port,
        token: flags.token,
        token_file: flags.token_file,
        log_dir: flags.log_dir,
        generate_dev_token: flags.generate_dev_token,
        web_dir: flags.web_dir,
    };

    let config = match config::resolve(args) {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("{e}");
            std::process::exit(1);
        }
    };

    info!("rc-host v{} starting", env!("CARGO_PKG_VERSION"));
    info!(bind = %config.bind, port = config.port, "listening");

    let (_, removed) = rc_host::policy::engine_env(std::env::vars());
    if !removed.is_empty() {
        info!(removed = ?removed, "stripped *_API_KEY vars for engine subprocesses");
    }

    let log_dir = config.log_dir.clone();
    let state = AppState {
        config: Arc::new(config),
        start_time: Instant::now(),
        sessions: Arc::new(SessionManager::new(log_dir)),
        tickets: Arc::new(TicketStore::new()),
    };

    let bind_addr = format!("{}:{}", state.config.bind, state.config.port);
    let sessions = state.sessions.clone();
    let app = build_router(state);
    let listener = TcpListener::bind(&bind_addr)
        .await
        .unwrap_or_else(|e| panic!("failed to bind {bind_addr}: {e}"));

    info!("server ready on {bind_addr}");

    let shutdown = async {
        let ctrl_c = tokio::signal::ctrl_c();
        #[cfg(unix)]
        {
            let mut sigterm =
                tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                    .expect("failed to register SIGTERM handler");
            tokio::select! {
                _ = ctrl_c => info!("received SIGINT"),
                _ = sigterm.recv() => info!("received SIGTERM"),
            }
        }
        #[cfg(not(unix))]
        {
            ctrl_c.await.ok();
            info!("received SIGINT");
        }
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .expect("server error");

    info!("shutting down");
    for session in sessions.list().await {
        session.terminate().await;
    }
    info!("goodbye");
}
