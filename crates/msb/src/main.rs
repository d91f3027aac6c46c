use std::sync::Arc;

use msb_core::{config, controller::WebhookController};

mod provider;
mod server;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    msb_core::logging::init("msb", config::debug_from_env())?;

    let settings = server::ServerSettings::from_env()?;
    let controller = Arc::new(WebhookController::new(Arc::new(provider::EnvBotProvider)));

    server::serve(settings, controller).await
}
