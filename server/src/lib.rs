//! Push server for the debt dashboard.
//!
//! Serves the `/ws` WebSocket that streams `debt_update` frames, a small JSON
//! API to inspect and publish updates, and health/metrics endpoints.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use hyper::server::conn::http1;
use hyper_util::rt::{TokioIo, TokioTimer};
use hyper_util::service::TowerToHyperService;
use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tracing::{debug, info, warn};

use shared::config::LiveConfig;
use shared::types::AppConfig;

pub mod feed;
pub mod handlers;
pub mod hub;
pub mod tower_middle;

use handlers::routes::{Router, build_router};
use hub::UpdateHub;
use tower_middle::security::Metrics;
use tower_middle::{MetricsLayer, TimeoutLayer};

/// State shared by every connection handler. Cheap to clone.
#[derive(Clone, Debug)]
pub struct AppState {
    pub config: LiveConfig,
    pub hub: Arc<UpdateHub>,
    pub metrics: Metrics,
    /// Unix timestamp captured at startup
    pub started_at: i64,
}

impl AppState {
    pub fn new(config: AppConfig) -> Self {
        let hub = UpdateHub::new(config.feed.broadcast_capacity);
        Self {
            config: LiveConfig::new(config),
            hub: Arc::new(hub),
            metrics: Metrics::new(),
            started_at: chrono::Utc::now().timestamp(),
        }
    }

    /// Swap in a re-read config file. Settings consumed once at startup (the
    /// whole `[server]` section, `channel.path` and `feed.broadcast_capacity`)
    /// keep their running values so stats keep describing the live server.
    pub async fn reload_config(&self, mut next: AppConfig) {
        {
            let current = self.config.read().await;
            next.server = current.server.clone();
            next.channel.path = current.channel.path.clone();
            next.feed.broadcast_capacity = current.feed.broadcast_capacity;
        }
        self.config.reload(next).await;
    }
}

/// Accept connections on `listener` until `shutdown` resolves.
///
/// Each TCP connection is served over HTTP/1.1 with upgrades enabled, behind
/// the metrics, timeout and CORS layers. At most `server.max_connections`
/// HTTP connections are served at once; further accepts wait for a slot.
pub async fn serve(
    listener: TcpListener,
    state: AppState,
    shutdown: impl Future<Output = ()>,
) -> Result<()> {
    let (max_connections, timeout, ws_path) = {
        let cfg = state.config.read().await;
        (
            cfg.server.max_connections,
            Duration::from_secs(cfg.server.request_timeout_secs),
            cfg.channel.path.clone(),
        )
    };

    let router: Arc<Router> = Arc::new(build_router(&ws_path));
    let limiter = Arc::new(Semaphore::new(max_connections));

    tokio::pin!(shutdown);

    loop {
        let permit = tokio::select! {
            _ = &mut shutdown => break,
            permit = limiter.clone().acquire_owned() => {
                permit.context("connection limiter closed")?
            }
        };

        let (stream, peer) = tokio::select! {
            _ = &mut shutdown => break,
            accepted = listener.accept() => match accepted {
                Ok(accepted) => accepted,
                Err(e) => {
                    warn!("Failed to accept connection: {}", e);
                    continue;
                }
            },
        };

        let router = router.clone();
        let conn_state = state.clone();
        let svc = ServiceBuilder::new()
            .layer(MetricsLayer::new(state.metrics.clone()))
            .layer(TimeoutLayer::new(timeout))
            .layer(CorsLayer::permissive())
            .service(tower::service_fn(move |req| {
                let router = router.clone();
                let state = conn_state.clone();
                async move { Ok::<_, std::convert::Infallible>(router.dispatch(req, state).await) }
            }));

        let io = TokioIo::new(stream);
        tokio::task::spawn(async move {
            let _permit = permit;
            if let Err(err) = http1::Builder::new()
                .timer(TokioTimer::new())
                .serve_connection(io, TowerToHyperService::new(svc))
                .with_upgrades()
                .await
            {
                debug!("Error serving connection from {}: {:?}", peer, err);
            }
        });
    }

    info!("Server stopped accepting connections");
    Ok(())
}
