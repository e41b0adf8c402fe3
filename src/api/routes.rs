use crate::rpc::CallbackTable;
use axum::{routing::post, Router};
use std::sync::Arc;

/// Build the facade router over a callback table.
pub fn create_router(callbacks: Arc<CallbackTable>) -> Router {
    Router::new()
        .route("/call", post(crate::api::handlers::call))
        .with_state(callbacks)
}
