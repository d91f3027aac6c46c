//! Hexagonal ports: the only ways the pipeline reaches the outside world.

use std::sync::Arc;

use async_trait::async_trait;

use crate::{config::BotConfig, domain::InstanceRef, Result};

/// Chat reply channel.
#[async_trait]
pub trait MessagingPort: Send + Sync {
    /// Send `text` rendered with Telegram's legacy Markdown.
    async fn send_markdown(&self, chat_id: &str, text: &str) -> Result<()>;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OperationError {
    pub code: String,
    pub message: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OperationWarning {
    pub code: String,
    pub message: String,
}

/// Final state of a long-running operation once it reports done.
#[derive(Clone, Debug, Default)]
pub struct OperationReport {
    pub error: Option<OperationError>,
    pub warnings: Vec<OperationWarning>,
    pub result: serde_json::Value,
}

/// Handle to an in-flight remote action (instance start/stop).
#[async_trait]
pub trait LongRunningOperation: Send {
    /// Provider-side operation id, used in logs.
    fn id(&self) -> &str;

    /// Resolve once the operation is done. Callers bound this with a timeout.
    async fn wait_done(&mut self) -> Result<OperationReport>;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InstanceView {
    pub status: String,
}

/// Compute-control channel.
#[async_trait]
pub trait ComputePort: Send + Sync {
    async fn start(&self, instance: &InstanceRef) -> Result<Box<dyn LongRunningOperation>>;
    async fn stop(&self, instance: &InstanceRef) -> Result<Box<dyn LongRunningOperation>>;
    async fn get(&self, instance: &InstanceRef) -> Result<InstanceView>;
}

/// Everything one invocation needs: config plus authenticated clients.
#[derive(Clone)]
pub struct Bot {
    pub cfg: Arc<BotConfig>,
    pub messenger: Arc<dyn MessagingPort>,
    pub compute: Arc<dyn ComputePort>,
}

/// Builds a fresh [`Bot`] per webhook call.
///
/// A failure here means there is no authenticated channel to reply through.
#[async_trait]
pub trait BotProvider: Send + Sync {
    async fn init(&self) -> Result<Bot>;
}
