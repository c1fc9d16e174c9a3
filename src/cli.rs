//! Command-line flow: configure, generate, report.
//!
//! [`run`] takes its environment through a lookup function and writes the
//! user-facing result to any writer, so the whole flow can be driven from
//! tests. Signal handling and logging setup stay in the binary.

use crate::config::{Args, Settings};
use crate::error::{BedtimeError, EXIT_CONFIG, EXIT_SUCCESS, ErrorKind, Result};
use crate::metrics::{Metrics, MetricsServer};
use crate::story::StoryGenerator;
use console::style;
use std::io::Write;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Message printed when the API reports an exhausted quota or rate limit.
pub const QUOTA_MESSAGE: &str =
    "❌ Quota exceeded – please check your plan at https://platform.openai.com/account/billing/plan";

/// Prefix for any other API failure.
pub const API_ERROR_MARKER: &str = "API ERROR ▶";

/// Run one invocation and return the process exit code.
pub async fn run<F, W>(args: &Args, lookup: F, out: &mut W) -> i32
where
    F: Fn(&str) -> Option<String>,
    W: Write,
{
    let settings = match Settings::from_lookup(lookup) {
        Ok(settings) => settings,
        Err(e) => return report_config_error(&e),
    };
    info!(model = %settings.model, mock = args.mock, "Configuration loaded");

    let metrics = Arc::new(Metrics::new());
    if !args.no_metrics {
        start_metrics_server(settings.metrics_port, Arc::clone(&metrics)).await;
    }

    let result = StoryGenerator::new(&settings, metrics).generate(args.mock).await;
    report(&result, out)
}

async fn start_metrics_server(port: u16, metrics: Arc<Metrics>) {
    let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));
    match MetricsServer::bind(addr, metrics).await {
        Ok(server) => {
            server.spawn();
        }
        Err(e) => warn!(error = %e, "Metrics server disabled"),
    }
}

/// Print the outcome of a generation and return its exit code.
///
/// A successful story that cannot be written to `out` exits with
/// [`EXIT_CONFIG`] instead of success; failures keep their own code.
pub fn report<W: Write>(result: &Result<String>, out: &mut W) -> i32 {
    let (line, code) = match result {
        Ok(story) => (style(story.clone()).green(), EXIT_SUCCESS),
        Err(e) => match e.kind() {
            ErrorKind::QuotaExceeded => (style(QUOTA_MESSAGE.to_string()).red(), e.exit_code()),
            ErrorKind::Api => (style(format!("{API_ERROR_MARKER} {e}")).red(), e.exit_code()),
            ErrorKind::Config => return report_config_error(e),
        },
    };

    if let Err(e) = writeln!(out, "{line}").and_then(|()| out.flush()) {
        error!(error = %e, "Failed to write result");
        return if code == EXIT_SUCCESS { EXIT_CONFIG } else { code };
    }
    code
}

/// Log and print a configuration error, returning its exit code.
pub fn report_config_error(e: &BedtimeError) -> i32 {
    error!("Configuration error: {}", e);
    eprintln!("{} {}", style("Error:").red().bold(), e);
    e.exit_code()
}
