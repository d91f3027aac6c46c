//! Telegram adapter (teloxide).
//!
//! Implements the `msb-core` MessagingPort over the Telegram Bot API.

use async_trait::async_trait;

use teloxide::{
    prelude::*,
    types::{ParseMode, Recipient},
};

use msb_core::{errors::Error, ports::MessagingPort, Result};

#[derive(Clone)]
pub struct TelegramMessenger {
    bot: Bot,
}

impl TelegramMessenger {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            bot: Bot::new(token),
        }
    }

    pub fn from_bot(bot: Bot) -> Self {
        Self { bot }
    }

    fn map_err(e: teloxide::RequestError) -> Error {
        Error::External(format!("telegram error: {e}"))
    }
}

/// Numeric ids address a chat directly; anything else is a `@channel` username.
pub fn recipient(chat_id: &str) -> Recipient {
    match chat_id.trim().parse::<i64>() {
        Ok(id) => Recipient::Id(teloxide::types::ChatId(id)),
        Err(_) => Recipient::ChannelUsername(chat_id.trim().to_string()),
    }
}

#[async_trait]
impl MessagingPort for TelegramMessenger {
    // Replies use the legacy Markdown mode; the bot's texts are written for it.
    #[allow(deprecated)]
    async fn send_markdown(&self, chat_id: &str, text: &str) -> Result<()> {
        tracing::debug!("Replying to chat {chat_id}.");
        self.bot
            .send_message(recipient(chat_id), text.to_string())
            .parse_mode(ParseMode::Markdown)
            .await
            .map_err(Self::map_err)?;
        Ok(())
    }
}
