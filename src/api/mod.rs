mod handlers;
pub mod middleware;

use std::sync::Arc;

use axum::{
    middleware::from_fn_with_state,
    routing::{any, get},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::access::{AccessPolicy, EditorPolicy};
use crate::db::Database;
use crate::registry::FeatureRegistry;
use middleware::{auth_middleware, rate_limit_middleware, SecurityConfig};

/// Shared request state. The registry is complete before the state is
/// built and read-only afterwards.
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub registry: Arc<FeatureRegistry>,
    pub access: Arc<dyn AccessPolicy>,
}

impl AppState {
    pub fn new(db: Database, registry: FeatureRegistry) -> Self {
        Self {
            db,
            registry: Arc::new(registry),
            access: Arc::new(EditorPolicy),
        }
    }

    pub fn with_access(mut self, access: impl AccessPolicy + 'static) -> Self {
        self.access = Arc::new(access);
        self
    }
}

/// Router without authentication: every caller is an editor.
pub fn create_router(state: AppState) -> Router {
    create_router_with_config(state, SecurityConfig::disabled())
}

pub fn create_router_with_config(state: AppState, config: SecurityConfig) -> Router {
    let api = Router::new()
        .route("/health", get(handlers::health))
        .route("/features", get(handlers::list_features))
        .route("/export", get(handlers::export_root))
        .route("/export/{*path}", get(handlers::export_path));

    let mut app = Router::new()
        .nest("/api/v1", api)
        .route("/", any(handlers::dispatch_root))
        .route("/{*path}", any(handlers::dispatch_path))
        .with_state(state)
        .layer(from_fn_with_state(config.clone(), auth_middleware));

    if let Some(rate_limiter) = config.rate_limiter.clone() {
        app = app.layer(from_fn_with_state(rate_limiter, rate_limit_middleware));
    }

    app.layer(TraceLayer::new_for_http())
        .layer(config.cors_layer())
}
