use std::time::Duration;

/// Core error type.
///
/// Adapter crates map their transport errors into `External` so the controller
/// can treat every failure the same way (generic reply + 500).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("external error: {0}")]
    External(String),

    #[error("error during {label}: [Code: {code}]: {message} (operation {operation_id})")]
    OperationFailed {
        label: String,
        code: String,
        message: String,
        operation_id: String,
    },

    #[error("{label} did not finish within {}s", timeout.as_secs())]
    OperationTimedOut { label: String, timeout: Duration },
}

pub type Result<T> = std::result::Result<T, Error>;
