/// Tower middleware module
///
/// Layers wrapped around every HTTP connection:
/// - Metrics tracking
/// - Request timeouts
pub mod security;
pub mod tower_metrics;
pub mod tower_timeout_handler;

pub use tower_metrics::{MetricsLayer, MetricsService};
pub use tower_timeout_handler::{TimeoutLayer, TimeoutService};
