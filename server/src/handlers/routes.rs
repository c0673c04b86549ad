use std::future::Future;
use std::pin::Pin;

use anyhow::Result;
use hyper::{Method, Request};
use tracing::{debug, error};

use super::json_response::{HttpResponse, deliver_error_json, internal_error};
use super::{health, updates, ws};
use crate::AppState;
use shared::types::ApiError;

// ---------------------------------------------------------------------------
// Handler type alias
// ---------------------------------------------------------------------------

type RouteHandler = Box<
    dyn Fn(
            Request<hyper::body::Incoming>,
            AppState,
        ) -> Pin<Box<dyn Future<Output = Result<HttpResponse>> + Send>>
        + Send
        + Sync,
>;

struct Route {
    method: Method,
    path: String,
    handler: RouteHandler,
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub struct Router {
    routes: Vec<Route>,
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("routes_count", &self.routes.len())
            .finish()
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

impl Router {
    pub fn new() -> Self {
        Self { routes: Vec::new() }
    }

    pub fn get<F, Fut>(self, path: &str, handler: F) -> Self
    where
        F: Fn(Request<hyper::body::Incoming>, AppState) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<HttpResponse>> + Send + 'static,
    {
        self.route(Method::GET, path, handler)
    }

    pub fn post<F, Fut>(self, path: &str, handler: F) -> Self
    where
        F: Fn(Request<hyper::body::Incoming>, AppState) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<HttpResponse>> + Send + 'static,
    {
        self.route(Method::POST, path, handler)
    }

    fn route<F, Fut>(mut self, method: Method, path: &str, handler: F) -> Self
    where
        F: Fn(Request<hyper::body::Incoming>, AppState) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<HttpResponse>> + Send + 'static,
    {
        self.routes.push(Route {
            method,
            path: path.to_string(),
            handler: Box::new(move |req, state| Box::pin(handler(req, state))),
        });
        self
    }

    /// Which registered route answers `method path`.
    fn resolve(&self, method: &Method, path: &str) -> Resolution<'_> {
        let mut path_known = false;
        for route in &self.routes {
            if route.path != path {
                continue;
            }
            if route.method == *method {
                return Resolution::Found(route);
            }
            path_known = true;
        }
        if path_known {
            Resolution::WrongMethod
        } else {
            Resolution::Missing
        }
    }

    // ── Dispatch ──────────────────────────────────────────────────────────────

    /// Run the matching handler. Never fails: handler errors become a JSON 500.
    pub async fn dispatch(&self, req: Request<hyper::body::Incoming>, state: AppState) -> HttpResponse {
        let method = req.method().clone();
        let path = req.uri().path().to_string();
        debug!("{} {}", method, path);

        let result = match self.resolve(&method, &path) {
            Resolution::Found(route) => (route.handler)(req, state).await,
            Resolution::WrongMethod => deliver_error_json(&ApiError::MethodNotAllowed),
            Resolution::Missing => deliver_error_json(&ApiError::NotFound),
        };

        match result {
            Ok(response) => response,
            Err(e) => {
                error!("Handler for {} {} failed: {:#}", method, path, e);
                deliver_error_json(&ApiError::InternalError).unwrap_or_else(|_| internal_error())
            }
        }
    }
}

enum Resolution<'a> {
    Found(&'a Route),
    WrongMethod,
    Missing,
}

/// The server's route table. `ws_path` is where the update stream is mounted.
pub fn build_router(ws_path: &str) -> Router {
    Router::new()
        .get(ws_path, ws::handle_upgrade)
        .get("/health", health::get_health)
        .get("/metrics", health::get_metrics)
        .get("/api/updates", updates::get_recent)
        .post("/api/updates", updates::post_update)
}
