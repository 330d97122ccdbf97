use std::sync::Arc;

use axum::Router;

use crate::context::AppState;

mod health_sync;

pub fn app_router(state: Arc<AppState>) -> Router {
    Router::new()
        .nest("/api/v1", health_sync::router())
        .with_state(state)
}
