//! Error taxonomy for the planning-validation-execution engine (spec §7).

use serde_json::Value;

/// Top-level failure of the `query` entrypoint before or during execution.
///
/// Variants map 1:1 onto the error taxonomy in spec §7: input/configuration
/// errors never reach the executor, validation errors carry the raw plan
/// text back for diagnosis, and handler/artifact/cancellation errors are
/// recorded on the offending step rather than propagated here.
#[derive(thiserror::Error, Debug)]
pub enum RouterError {
    #[error("input error: {0}")]
    InvalidInput(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("plan validation failed: {reason}")]
    ValidationFailed {
        reason: String,
        raw_plan: Option<Value>,
    },

    #[error("planner error: {0}")]
    Planner(String),

    #[error("summarizer error: {0}")]
    Summarizer(String),
}

/// Error returned by a local or upstream tool handler when the call itself
/// could not be dispatched (as opposed to the handler returning a logical
/// `is_error` result, which is recorded on the `ToolResult` instead).
#[derive(thiserror::Error, Debug, Clone)]
pub enum HandlerError {
    #[error("tool not found: {0}")]
    NotFound(String),

    #[error("invalid arguments: {0}")]
    InvalidArgs(String),

    #[error("upstream call failed: {0}")]
    Upstream(String),

    #[error("request cancelled: {0}")]
    Cancelled(String),
}

pub type RouterResultT<T> = std::result::Result<T, RouterError>;
