use std::{sync::Arc, time::Duration};

use tracing::{debug, error, info};

use crate::{
    config::BotConfig,
    errors::Error,
    ports::{Bot, ComputePort, LongRunningOperation, MessagingPort},
    waiter::{self, OperationOutcome},
    Result,
};

pub const HELP_TEXT: &str = "The following is a list of available commands:\n\
- *start*: Starts server\n\
- *stop*: Stops server\n\
- *status*: Shows the server status";

/// The privileged instance operations plus `help`.
///
/// Each one replies in the configured chat; failures of the remote operation
/// are returned as errors and never answered here.
pub struct ComputeActions {
    cfg: Arc<BotConfig>,
    messenger: Arc<dyn MessagingPort>,
    compute: Arc<dyn ComputePort>,
    timeout: Duration,
}

impl ComputeActions {
    pub fn new(
        cfg: Arc<BotConfig>,
        messenger: Arc<dyn MessagingPort>,
        compute: Arc<dyn ComputePort>,
    ) -> Self {
        let timeout = cfg.operation_timeout;
        Self {
            cfg,
            messenger,
            compute,
            timeout,
        }
    }

    pub fn from_bot(bot: &Bot) -> Self {
        Self::new(bot.cfg.clone(), bot.messenger.clone(), bot.compute.clone())
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub async fn reply(&self, text: &str) -> Result<()> {
        self.messenger.send_markdown(&self.cfg.chat_id, text).await
    }

    pub async fn start(&self) -> Result<()> {
        debug!("Starting server.");
        self.reply("The server is starting... It may take a few minutes.")
            .await?;

        let op = self.compute.start(&self.cfg.instance()).await?;
        self.finish(op, "instance starting").await?;

        info!(
            "An instance {}/{} was successfully started.",
            self.cfg.project_id, self.cfg.instance_id
        );
        self.reply("The server was started! Please, wait until it is ready.")
            .await
    }

    pub async fn stop(&self) -> Result<()> {
        debug!("Stopping server.");
        self.reply("The server is stopping... It may take a few minutes.")
            .await?;

        let op = self.compute.stop(&self.cfg.instance()).await?;
        self.finish(op, "instance stopping").await?;

        info!(
            "An instance {}/{} was successfully stopped.",
            self.cfg.project_id, self.cfg.instance_id
        );
        self.reply("The server was stopped!").await
    }

    pub async fn status(&self) -> Result<()> {
        debug!("Getting server status.");
        let view = self.compute.get(&self.cfg.instance()).await?;
        debug!("Result {}", view.status);

        match view.status.as_str() {
            "RUNNING" => self.reply("The server is running.").await,
            "TERMINATED" => self.reply("The server is stopped.").await,
            other => {
                error!("Unknown server status: {other}");
                self.reply(&format!("The server status: {other}")).await
            }
        }
    }

    pub async fn help(&self) -> Result<()> {
        self.reply(HELP_TEXT).await
    }

    async fn finish(&self, mut op: Box<dyn LongRunningOperation>, label: &str) -> Result<()> {
        match waiter::wait(op.as_mut(), label, self.timeout).await? {
            OperationOutcome::Success(_) => Ok(()),
            OperationOutcome::Failed {
                code,
                message,
                operation_id,
            } => Err(Error::OperationFailed {
                label: label.to_string(),
                code,
                message,
                operation_id,
            }),
            OperationOutcome::TimedOut => Err(Error::OperationTimedOut {
                label: label.to_string(),
                timeout: self.timeout,
            }),
        }
    }
}
