/// Request and session accounting for the HTTP server
pub mod metrics;

pub use metrics::{Metrics, MetricsSnapshot};
