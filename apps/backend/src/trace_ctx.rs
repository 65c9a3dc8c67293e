//! Task-local trace context for HTTP requests.
//!
//! `RequestTrace` scopes each request's trace id here so error responses can
//! report it without threading it through handlers. WebSocket events run
//! outside any request scope and report "unknown".

use std::cell::RefCell;

use tokio::task_local;

/// Request extension carrying the trace id for downstream middleware.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceId(pub String);

task_local! {
    static TRACE_ID: RefCell<Option<String>>;
}

/// Get the trace_id for the current task.
/// Returns "unknown" if no trace_id is set (e.g., outside of a request context).
pub fn trace_id() -> String {
    TRACE_ID
        .try_with(|cell| {
            cell.borrow()
                .as_ref()
                .cloned()
                .unwrap_or_else(|| "unknown".to_string())
        })
        .unwrap_or_else(|_| "unknown".to_string())
}

/// Run a future within a trace context.
/// This is used by middleware to establish the task-local scope.
pub async fn with_trace_id<F, R>(trace_id: String, future: F) -> R
where
    F: std::future::Future<Output = R>,
{
    TRACE_ID.scope(RefCell::new(Some(trace_id)), future).await
}
