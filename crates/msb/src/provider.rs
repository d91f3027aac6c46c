use std::sync::Arc;

use async_trait::async_trait;

use msb_core::{
    config::BotConfig,
    ports::{Bot, BotProvider},
    Result,
};
use msb_gce::GceClient;
use msb_telegram::TelegramMessenger;

/// Reads the environment and builds fresh clients on every call.
pub struct EnvBotProvider;

#[async_trait]
impl BotProvider for EnvBotProvider {
    async fn init(&self) -> Result<Bot> {
        let cfg = BotConfig::load()?;
        let messenger = TelegramMessenger::new(cfg.telegram_token.clone());
        let compute = GceClient::new(
            cfg.compute_api_base.clone(),
            cfg.compute_access_token.clone(),
        )?;

        Ok(Bot {
            cfg: Arc::new(cfg),
            messenger: Arc::new(messenger),
            compute: Arc::new(compute),
        })
    }
}
