use crate::rpc::CallbackTable;
use crate::types::{Call, CallResult};
use axum::{extract::State, Json};
use std::sync::Arc;

/// Dispatch one call to the callback table.
///
/// Failures are encoded in the response body; the status is 200 for every
/// dispatched call. Malformed bodies are rejected by the JSON extractor
/// before this handler runs.
pub async fn call(
    State(callbacks): State<Arc<CallbackTable>>,
    Json(call): Json<Call>,
) -> Json<CallResult> {
    Json(
        callbacks
            .dispatch(&call.function, call.args, call.kwargs)
            .await,
    )
}
