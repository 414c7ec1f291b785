//! threadcast-server - Publish message batches as X reply threads over HTTP

use anyhow::{Context, Result};
use clap::Parser;
use libthreadcast::logging::{LogFormat, LoggingConfig};
use libthreadcast::platforms::x::XClient;
use libthreadcast::{Config, ThreadcastError};
use std::future::Future;
use std::net::SocketAddr;
use std::path::PathBuf;
use threadcast_server::{prepare_state, router};
use tokio::net::TcpListener;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "threadcast-server")]
#[command(version)]
#[command(about = "Publish message batches as X reply threads over HTTP")]
#[command(long_about = "\
threadcast-server - Publish message batches as X reply threads over HTTP

DESCRIPTION:
    Accepts POST /send-tweet with a list of messages and posts them, in
    order, as a reply chain from one X account. Each message is retried
    with exponential backoff; session failures trigger a fresh login.

    Requests must carry HTTP Basic credentials matching CLIENT_ID and
    CLIENT_SECRET.

USAGE:
    # Serve on the configured address (default 0.0.0.0:3000)
    threadcast-server

    # Serve on another address with debug logging
    threadcast-server --bind 127.0.0.1:8080 --verbose

    # Send a thread
    curl -u \"$CLIENT_ID:$CLIENT_SECRET\" -H 'Content-Type: application/json' \\
         -d '{\"messages\": [\"1/2 hello\", \"2/2 world\"]}' \\
         http://localhost:3000/send-tweet

SIGNALS:
    SIGTERM, SIGINT - Graceful shutdown (finishes in-flight requests)

CONFIGURATION:
    Configuration file: ~/.config/threadcast/config.toml (or THREADCAST_CONFIG)
    Environment: TWITTER_USERNAME, TWITTER_PASSWORD, TWITTER_EMAIL,
                 TWITTER_2FA_SECRET, CLIENT_ID, CLIENT_SECRET, THREADCAST_BIND

EXIT CODES:
    0 - Clean shutdown
    1 - Runtime or configuration error
    2 - Login failed at startup
")]
struct Cli {
    /// Address to listen on (overrides config)
    #[arg(long, value_name = "ADDR")]
    bind: Option<SocketAddr>,

    /// Path to the config file
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Enable verbose logging to stderr
    #[arg(short, long)]
    verbose: bool,

    /// Log output format (text, json, pretty)
    #[arg(long, value_name = "FORMAT", env = "THREADCAST_LOG_FORMAT", default_value = "text")]
    log_format: LogFormat,

    /// Minimum log level
    #[arg(long, value_name = "LEVEL", env = "THREADCAST_LOG_LEVEL", default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {:#}", e);
        let code = e
            .downcast_ref::<ThreadcastError>()
            .map(ThreadcastError::exit_code)
            .unwrap_or(1);
        std::process::exit(code);
    }
}

async fn run(cli: Cli) -> Result<()> {
    LoggingConfig::new(cli.log_format, cli.log_level.clone(), cli.verbose).init()?;

    let mut config = match &cli.config {
        Some(path) => Config::load_from_path(path),
        None => Config::load(),
    }?;
    if let Some(bind) = cli.bind {
        config.server.bind = bind;
    }

    info!("threadcast-server starting");

    let client = XClient::new(config.account, &config.platform)?;
    let state = prepare_state(Box::new(client), &config.retry, config.auth).await?;

    let shutdown = shutdown_signal()?;
    let listener = TcpListener::bind(config.server.bind)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.bind))?;
    info!("Listening on {}", listener.local_addr()?);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
        .context("Server error")?;

    info!("threadcast-server stopped");
    Ok(())
}

/// Resolves once SIGINT or SIGTERM arrives
#[cfg(unix)]
fn shutdown_signal() -> Result<impl Future<Output = ()> + Send + 'static> {
    use futures::StreamExt;
    use signal_hook::consts::{SIGINT, SIGTERM};
    use signal_hook_tokio::Signals;

    let mut signals = Signals::new([SIGINT, SIGTERM]).context("Signal setup failed")?;
    let handle = signals.handle();

    Ok(async move {
        if let Some(signal) = signals.next().await {
            info!("Received signal {}, shutting down gracefully...", signal);
        }
        handle.close();
    })
}

#[cfg(not(unix))]
fn shutdown_signal() -> Result<impl Future<Output = ()> + Send + 'static> {
    Ok(async {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl-C, shutting down gracefully...");
        }
    })
}
