use std::{backtrace::Backtrace, sync::Arc};

use tracing::{error, info};

use crate::{
    actions::ComputeActions,
    authorizer::{RejectionReason, RequestAuthorizer, Verdict},
    commands::CommandRegistry,
    domain::InboundRequest,
    ports::{Bot, BotProvider},
    Result,
};

pub const GENERIC_FAILURE_REPLY: &str = "Sorry, a server side exception has occurred.";

/// Status code returned to the webhook caller.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WebhookResponse {
    /// Processed, or deliberately ignored.
    Ok,
    /// Addressed to the bot with an unknown command.
    BadRequest,
    /// Initialization failure or unhandled error.
    ServerError,
}

impl WebhookResponse {
    pub fn code(self) -> u16 {
        match self {
            WebhookResponse::Ok => 200,
            WebhookResponse::BadRequest => 400,
            WebhookResponse::ServerError => 500,
        }
    }
}

/// Entry point for one webhook delivery.
///
/// Stateless across calls: every `handle` builds its own [`Bot`].
pub struct WebhookController {
    provider: Arc<dyn BotProvider>,
    registry: CommandRegistry,
}

impl WebhookController {
    pub fn new(provider: Arc<dyn BotProvider>) -> Self {
        Self {
            provider,
            registry: CommandRegistry::new(),
        }
    }

    pub async fn handle(&self, req: InboundRequest) -> WebhookResponse {
        let bot = match self.provider.init().await {
            Ok(bot) => bot,
            Err(e) => {
                error!("Bot initialization failed: {e}");
                return WebhookResponse::ServerError;
            }
        };

        let actions = ComputeActions::from_bot(&bot);
        match self.process(&bot, &actions, &req).await {
            Ok(resp) => resp,
            Err(e) => {
                error!("{e}; {:?}\n{}", e, Backtrace::capture());
                if let Err(reply_err) = actions.reply(GENERIC_FAILURE_REPLY).await {
                    error!("Failed to send failure reply: {reply_err}");
                }
                WebhookResponse::ServerError
            }
        }
    }

    async fn process(
        &self,
        bot: &Bot,
        actions: &ComputeActions,
        req: &InboundRequest,
    ) -> Result<WebhookResponse> {
        let verdict = RequestAuthorizer::new(&bot.cfg, &self.registry).authorize(req)?;

        match verdict {
            Verdict::Rejected(RejectionReason::NotAddressedToBot(detail)) => {
                info!("{detail}");
                Ok(WebhookResponse::Ok)
            }
            Verdict::Rejected(RejectionReason::NotValidCommand(detail)) => {
                actions.reply(&detail).await?;
                Ok(WebhookResponse::BadRequest)
            }
            Verdict::Authorized(cmd) => {
                self.registry.invoke(cmd.as_str(), actions).await?;
                Ok(WebhookResponse::Ok)
            }
        }
    }
}
