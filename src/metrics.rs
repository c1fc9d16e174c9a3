//! Request metrics and their HTTP exposition.
//!
//! Three series are tracked: a request counter, a request-latency histogram
//! and an error counter. [`Metrics::render`] produces the Prometheus text
//! format and [`MetricsServer`] serves it on `GET /metrics`.

use crate::error::{BedtimeError, Result};
use axum::{Router, extract::State, http::header, response::IntoResponse, routing::get};
use parking_lot::Mutex;
use std::fmt::Write as _;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Name of the request counter series.
pub const REQUEST_TOTAL: &str = "bedtime_request_total";
/// Name of the latency histogram series.
pub const REQUEST_LATENCY: &str = "bedtime_request_latency_seconds";
/// Name of the error counter series.
pub const ERRORS_TOTAL: &str = "bedtime_errors_total";

/// Default histogram bucket upper bounds, in seconds.
pub const DEFAULT_BUCKETS: [f64; 14] = [
    0.005, 0.01, 0.025, 0.05, 0.075, 0.1, 0.25, 0.5, 0.75, 1.0, 2.5, 5.0, 7.5, 10.0,
];

const CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Cumulative latency histogram.
#[derive(Debug)]
struct Histogram {
    bounds: Vec<f64>,
    /// One count per bound, plus a trailing `+Inf` bucket.
    counts: Vec<u64>,
    sum: f64,
    count: u64,
}

impl Histogram {
    fn new(bounds: &[f64]) -> Self {
        Self {
            bounds: bounds.to_vec(),
            counts: vec![0; bounds.len() + 1],
            sum: 0.0,
            count: 0,
        }
    }

    fn observe(&mut self, value: f64) {
        let index = self
            .bounds
            .iter()
            .position(|bound| value <= *bound)
            .unwrap_or(self.bounds.len());
        self.counts[index] += 1;
        self.sum += value;
        self.count += 1;
    }
}

/// Metrics for story requests.
#[derive(Debug)]
pub struct Metrics {
    requests: AtomicU64,
    errors: AtomicU64,
    latency: Mutex<Histogram>,
}

impl Metrics {
    /// Create a metrics set with the default latency buckets.
    pub fn new() -> Self {
        Self::with_buckets(&DEFAULT_BUCKETS)
    }

    /// Create a metrics set with custom latency bucket bounds (ascending, seconds).
    pub fn with_buckets(bounds: &[f64]) -> Self {
        Self {
            requests: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            latency: Mutex::new(Histogram::new(bounds)),
        }
    }

    /// Count one story request.
    pub fn record_request(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
    }

    /// Count one terminal failure.
    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Record the latency of one story request.
    pub fn observe_latency(&self, latency: Duration) {
        self.latency.lock().observe(latency.as_secs_f64());
    }

    /// Requests counted so far.
    pub fn requests(&self) -> u64 {
        self.requests.load(Ordering::Relaxed)
    }

    /// Errors counted so far.
    pub fn errors(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }

    /// Latency observations recorded so far.
    pub fn latency_count(&self) -> u64 {
        self.latency.lock().count
    }

    /// Render all series in the Prometheus text exposition format.
    pub fn render(&self) -> String {
        let mut out = String::new();

        write_counter(
            &mut out,
            REQUEST_TOTAL,
            "Total number of bedtime story requests",
            self.requests(),
        );

        {
            let histogram = self.latency.lock();
            let _ = writeln!(
                out,
                "# HELP {REQUEST_LATENCY} Latency for bedtime story API calls"
            );
            let _ = writeln!(out, "# TYPE {REQUEST_LATENCY} histogram");

            let mut cumulative = 0;
            for (bound, count) in histogram.bounds.iter().zip(&histogram.counts) {
                cumulative += count;
                let _ = writeln!(
                    out,
                    "{REQUEST_LATENCY}_bucket{{le=\"{bound:?}\"}} {cumulative}"
                );
            }
            let _ = writeln!(
                out,
                "{REQUEST_LATENCY}_bucket{{le=\"+Inf\"}} {}",
                histogram.count
            );
            let _ = writeln!(out, "{REQUEST_LATENCY}_sum {:?}", histogram.sum);
            let _ = writeln!(out, "{REQUEST_LATENCY}_count {}", histogram.count);
        }

        write_counter(
            &mut out,
            ERRORS_TOTAL,
            "Total number of errors during bedtime story requests",
            self.errors(),
        );

        out
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

fn write_counter(out: &mut String, name: &str, help: &str, value: u64) {
    let _ = writeln!(out, "# HELP {name} {help}");
    let _ = writeln!(out, "# TYPE {name} counter");
    let _ = writeln!(out, "{name} {value}");
}

async fn handle_metrics(State(metrics): State<Arc<Metrics>>) -> impl IntoResponse {
    debug!("Serving metrics scrape");
    ([(header::CONTENT_TYPE, CONTENT_TYPE)], metrics.render())
}

/// HTTP server exposing [`Metrics`] on `GET /metrics`.
pub struct MetricsServer {
    listener: TcpListener,
    metrics: Arc<Metrics>,
}

impl MetricsServer {
    /// Bind the server to `addr` without serving yet.
    pub async fn bind(addr: SocketAddr, metrics: Arc<Metrics>) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| BedtimeError::MetricsBind { addr, source })?;
        Ok(Self { listener, metrics })
    }

    /// Address the server is listening on.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.local_addr().ok()
    }

    /// Serve scrapes on a background task.
    pub fn spawn(self) -> JoinHandle<()> {
        let app = Router::new()
            .route("/metrics", get(handle_metrics))
            .with_state(self.metrics);

        if let Ok(addr) = self.listener.local_addr() {
            info!(%addr, "Metrics server listening");
        }

        let listener = self.listener;
        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                warn!(error = %e, "Metrics server stopped");
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters() {
        let metrics = Metrics::new();
        metrics.record_request();
        metrics.record_request();
        metrics.record_error();

        assert_eq!(metrics.requests(), 2);
        assert_eq!(metrics.errors(), 1);
        assert_eq!(metrics.latency_count(), 0);
    }

    #[test]
    fn test_histogram_buckets_are_cumulative() {
        let metrics = Metrics::with_buckets(&[0.1, 1.0]);
        metrics.observe_latency(Duration::from_micros(62_500));
        metrics.observe_latency(Duration::from_millis(500));
        metrics.observe_latency(Duration::from_secs(3));

        let text = metrics.render();
        assert!(text.contains("bedtime_request_latency_seconds_bucket{le=\"0.1\"} 1\n"));
        assert!(text.contains("bedtime_request_latency_seconds_bucket{le=\"1.0\"} 2\n"));
        assert!(text.contains("bedtime_request_latency_seconds_bucket{le=\"+Inf\"} 3\n"));
        assert!(text.contains("bedtime_request_latency_seconds_count 3\n"));
        assert!(text.contains("bedtime_request_latency_seconds_sum 3.5625\n"));
    }

    #[test]
    fn test_render_exposes_all_series() {
        let metrics = Metrics::new();
        metrics.record_request();

        let text = metrics.render();
        assert!(text.contains("# TYPE bedtime_request_total counter\n"));
        assert!(text.contains("bedtime_request_total 1\n"));
        assert!(text.contains("# TYPE bedtime_request_latency_seconds histogram\n"));
        assert!(text.contains("# TYPE bedtime_errors_total counter\n"));
        assert!(text.contains("bedtime_errors_total 0\n"));
    }

    #[tokio::test]
    async fn test_metrics_endpoint() {
        let metrics = Arc::new(Metrics::new());
        metrics.record_request();
        metrics.record_error();

        let server = MetricsServer::bind("127.0.0.1:0".parse().unwrap(), Arc::clone(&metrics))
            .await
            .unwrap();
        let addr = server.local_addr().unwrap();
        let handle = server.spawn();

        let response = reqwest::get(format!("http://{addr}/metrics")).await.unwrap();
        assert!(response.status().is_success());
        assert_eq!(
            response.headers()[reqwest::header::CONTENT_TYPE],
            CONTENT_TYPE
        );
        let body = response.text().await.unwrap();
        assert!(body.contains("bedtime_request_total 1\n"));
        assert!(body.contains("bedtime_errors_total 1\n"));

        let missing = reqwest::get(format!("http://{addr}/nope")).await.unwrap();
        assert_eq!(missing.status(), reqwest::StatusCode::NOT_FOUND);

        handle.abort();
    }

    #[tokio::test]
    async fn test_bind_conflict_is_reported() {
        let metrics = Arc::new(Metrics::new());
        let first = MetricsServer::bind("127.0.0.1:0".parse().unwrap(), Arc::clone(&metrics))
            .await
            .unwrap();
        let addr = first.local_addr().unwrap();

        let err = MetricsServer::bind(addr, metrics).await.err().unwrap();
        assert!(matches!(err, BedtimeError::MetricsBind { .. }));
    }
}
