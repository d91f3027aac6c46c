use tracing_subscriber::{fmt, EnvFilter};

use crate::{errors::Error, Result};

/// Initialize tracing for the bot.
///
/// `debug` raises the default level to DEBUG; `RUST_LOG` always wins.
pub fn init(service_name: &str, debug: bool) -> Result<()> {
    let level = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "warn,msb={level},msb_core={level},msb_gce={level},msb_telegram={level},{service_name}={level}"
        ))
    });

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(false)
        .try_init()
        .map_err(|e| Error::Config(format!("failed to install log subscriber: {e}")))
}
