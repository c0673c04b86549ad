use std::collections::VecDeque;
use std::fmt::Write;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use tokio::sync::Mutex;

/// Latencies kept for the percentile summary
const LATENCY_WINDOW: usize = 1000;

/// Request and WebSocket session counters for the push server.
///
/// Clones share the same counters.
#[derive(Clone, Debug, Default)]
pub struct Metrics {
    inner: Arc<Counters>,
}

#[derive(Debug)]
struct Counters {
    requests: AtomicU64,
    in_flight: AtomicUsize,
    /// 4xx/5xx responses
    errors: AtomicU64,
    sessions_open: AtomicUsize,
    sessions_total: AtomicU64,
    frames_sent: AtomicU64,
    bytes_sent: AtomicU64,
    bytes_received: AtomicU64,
    latencies: Mutex<LatencyWindow>,
    started: Instant,
}

impl Default for Counters {
    fn default() -> Self {
        Self {
            requests: AtomicU64::new(0),
            in_flight: AtomicUsize::new(0),
            errors: AtomicU64::new(0),
            sessions_open: AtomicUsize::new(0),
            sessions_total: AtomicU64::new(0),
            frames_sent: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            latencies: Mutex::new(LatencyWindow::new(LATENCY_WINDOW)),
            started: Instant::now(),
        }
    }
}

/// Sliding window over the most recent request latencies.
#[derive(Debug)]
struct LatencyWindow {
    samples: VecDeque<Duration>,
    cap: usize,
}

impl LatencyWindow {
    fn new(cap: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(cap),
            cap,
        }
    }

    fn push(&mut self, d: Duration) {
        if self.samples.len() == self.cap {
            self.samples.pop_front();
        }
        self.samples.push_back(d);
    }

    /// Nearest-rank quantile, `q` in `[0, 1]`.
    fn quantile(&self, q: f64) -> Option<Duration> {
        let mut sorted: Vec<Duration> = self.samples.iter().copied().collect();
        if sorted.is_empty() {
            return None;
        }
        sorted.sort_unstable();
        let rank = ((q * sorted.len() as f64) as usize).min(sorted.len() - 1);
        Some(sorted[rank])
    }

    fn mean(&self) -> Option<Duration> {
        let n = u32::try_from(self.samples.len()).ok().filter(|n| *n > 0)?;
        Some(self.samples.iter().sum::<Duration>() / n)
    }
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_start(&self) {
        self.inner.requests.fetch_add(1, Ordering::Relaxed);
        self.inner.in_flight.fetch_add(1, Ordering::Relaxed);
    }

    /// Called from the middleware's response future, which must not block on
    /// the latency lock; the sample is recorded on a separate task.
    pub fn request_end(&self, elapsed: Duration) {
        self.inner.in_flight.fetch_sub(1, Ordering::Relaxed);

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            inner.latencies.lock().await.push(elapsed);
        });
    }

    pub fn record_error(&self) {
        self.inner.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn ws_session_start(&self) {
        self.inner.sessions_total.fetch_add(1, Ordering::Relaxed);
        self.inner.sessions_open.fetch_add(1, Ordering::Relaxed);
    }

    pub fn ws_session_end(&self) {
        self.inner.sessions_open.fetch_sub(1, Ordering::Relaxed);
    }

    /// One update frame of `bytes` written to a session.
    pub fn record_frame_sent(&self, bytes: u64) {
        self.inner.frames_sent.fetch_add(1, Ordering::Relaxed);
        self.inner.bytes_sent.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn record_bytes_received(&self, bytes: u64) {
        self.inner.bytes_received.fetch_add(bytes, Ordering::Relaxed);
    }

    pub async fn snapshot(&self) -> MetricsSnapshot {
        let c = &self.inner;
        let window = c.latencies.lock().await;

        MetricsSnapshot {
            total_requests: c.requests.load(Ordering::Relaxed),
            active_requests: c.in_flight.load(Ordering::Relaxed),
            error_count: c.errors.load(Ordering::Relaxed),
            bytes_sent: c.bytes_sent.load(Ordering::Relaxed),
            bytes_received: c.bytes_received.load(Ordering::Relaxed),
            ws_sessions_active: c.sessions_open.load(Ordering::Relaxed),
            ws_sessions_total: c.sessions_total.load(Ordering::Relaxed),
            frames_sent: c.frames_sent.load(Ordering::Relaxed),
            uptime: c.started.elapsed(),
            latency_avg: window.mean(),
            latency_p50: window.quantile(0.50),
            latency_p95: window.quantile(0.95),
            latency_p99: window.quantile(0.99),
        }
    }

    /// Prometheus text exposition (format 0.0.4).
    pub async fn prometheus(&self) -> String {
        self.snapshot().await.to_prometheus()
    }
}

#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    pub total_requests: u64,
    pub active_requests: usize,
    pub error_count: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub ws_sessions_active: usize,
    pub ws_sessions_total: u64,
    pub frames_sent: u64,
    pub uptime: Duration,
    pub latency_avg: Option<Duration>,
    pub latency_p50: Option<Duration>,
    pub latency_p95: Option<Duration>,
    pub latency_p99: Option<Duration>,
}

fn secs(d: Option<Duration>) -> f64 {
    d.map(|d| d.as_secs_f64()).unwrap_or(0.0)
}

fn series(out: &mut String, name: &str, kind: &str, help: &str, value: impl std::fmt::Display) {
    let _ = writeln!(out, "# HELP {name} {help}");
    let _ = writeln!(out, "# TYPE {name} {kind}");
    let _ = writeln!(out, "{name} {value}\n");
}

impl MetricsSnapshot {
    pub fn error_rate(&self) -> f64 {
        if self.total_requests == 0 {
            return 0.0;
        }
        self.error_count as f64 * 100.0 / self.total_requests as f64
    }

    pub fn to_prometheus(&self) -> String {
        let mut out = String::with_capacity(1024);

        series(&mut out, "http_requests_total", "counter", "HTTP requests served", self.total_requests);
        series(&mut out, "http_active_requests", "gauge", "Requests in flight", self.active_requests);
        series(&mut out, "http_errors_total", "counter", "4xx and 5xx responses", self.error_count);
        series(&mut out, "ws_sessions_active", "gauge", "Open WebSocket sessions", self.ws_sessions_active);
        series(&mut out, "ws_sessions_total", "counter", "WebSocket sessions opened", self.ws_sessions_total);
        series(&mut out, "ws_frames_sent_total", "counter", "Update frames sent", self.frames_sent);
        series(&mut out, "ws_bytes_sent_total", "counter", "WebSocket payload bytes sent", self.bytes_sent);
        series(&mut out, "ws_bytes_received_total", "counter", "WebSocket payload bytes received", self.bytes_received);

        let name = "http_request_duration_seconds";
        let _ = writeln!(out, "# HELP {name} Request latency over the last {LATENCY_WINDOW} requests");
        let _ = writeln!(out, "# TYPE {name} summary");
        for (q, d) in [("0.5", self.latency_p50), ("0.95", self.latency_p95), ("0.99", self.latency_p99)] {
            let _ = writeln!(out, "{name}{{quantile=\"{q}\"}} {}", secs(d));
        }
        let _ = writeln!(out, "{name}_sum {}", secs(self.latency_avg) * self.total_requests as f64);
        let _ = writeln!(out, "{name}_count {}", self.total_requests);

        out
    }

    /// One-line summary for the shutdown log
    pub fn format(&self) -> String {
        format!(
            "up {:.0}s, {} requests, {} errors ({:.1}%), {} sessions ({} open), {} frames sent, avg {:.2}ms",
            self.uptime.as_secs_f64(),
            self.total_requests,
            self.error_count,
            self.error_rate(),
            self.ws_sessions_total,
            self.ws_sessions_active,
            self.frames_sent,
            secs(self.latency_avg) * 1000.0,
        )
    }
}
