use std::time::Duration;

use tracing::{error, info};

use crate::{
    ports::{LongRunningOperation, OperationReport},
    Result,
};

/// How a wait on a long-running operation ended.
#[derive(Debug)]
pub enum OperationOutcome {
    Success(OperationReport),
    Failed {
        code: String,
        message: String,
        operation_id: String,
    },
    TimedOut,
}

/// Blocks on a remote operation until it is done, fails, or runs out of time.
///
/// There is no retry: a failed operation is reported once and left to the
/// caller.
pub async fn wait(
    operation: &mut dyn LongRunningOperation,
    label: &str,
    timeout: Duration,
) -> Result<OperationOutcome> {
    let mut report = match tokio::time::timeout(timeout, operation.wait_done()).await {
        Ok(report) => report?,
        Err(_) => return Ok(OperationOutcome::TimedOut),
    };

    if let Some(err) = report.error.take() {
        error!(
            code = %err.code,
            operation_id = %operation.id(),
            "Error during {label}: [Code: {}]: {}",
            err.code,
            err.message
        );
        return Ok(OperationOutcome::Failed {
            code: err.code,
            message: err.message,
            operation_id: operation.id().to_string(),
        });
    }

    if !report.warnings.is_empty() {
        info!("Warnings during {label}:");
        for w in &report.warnings {
            info!(" - {}: {}", w.code, w.message);
        }
    }

    Ok(OperationOutcome::Success(report))
}
