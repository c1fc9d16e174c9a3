//! Bedtime CLI - one-sentence unicorn stories.
//!
//! Run `bedtime --help` for usage information.

use anyhow::Result;
use bedtime::Args;
use bedtime::cli;
use bedtime::config::load_env_file;
use bedtime::error::EXIT_SUCCESS;
use tracing::{Level, debug, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let args = Args::parse_args();

    // Setup logging
    setup_logging(&args);

    // Seed the environment before settings are read
    match load_env_file(args.env_file.as_deref()) {
        Ok(path) => debug!(?path, "Environment prepared"),
        Err(e) => std::process::exit(cli::report_config_error(&e)),
    }

    let mut stdout = std::io::stdout();
    let code = tokio::select! {
        biased;
        code = cli::run(&args, |key| std::env::var(key).ok(), &mut stdout) => code,
        signal = shutdown_signal() => {
            warn!(signal, "Interrupted, exiting");
            EXIT_SUCCESS
        }
    };

    std::process::exit(code);
}

fn setup_logging(args: &Args) {
    let level = if args.verbose { Level::DEBUG } else { Level::INFO };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("bedtime={level}")));

    if args.json_logs {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(false)
                    .with_thread_ids(false)
                    .compact(),
            )
            .init();
    }
}

/// Resolve on Ctrl-C, or on SIGTERM where available, naming the signal.
async fn shutdown_signal() -> &'static str {
    let ctrl_c = async {
        if tokio::signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => "SIGINT",
        () = terminate => "SIGTERM",
    }
}
