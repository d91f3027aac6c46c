use std::{env, fs, path::Path, sync::Once, time::Duration};

use crate::{domain::InstanceRef, errors::Error, Result};

/// How long start/stop may take before the wait gives up.
pub const OPERATION_TIMEOUT: Duration = Duration::from_secs(90);

/// Typed, immutable bot configuration.
///
/// Built once per invocation and shared by reference; nothing here changes
/// after `load`.
#[derive(Clone, Debug)]
pub struct BotConfig {
    // Telegram
    pub telegram_token: String,
    pub telegram_bot_name: String,
    /// Only chat allowed to issue commands. Compared as a string.
    pub chat_id: String,

    // Compute target
    pub instance_id: String,
    pub project_id: String,
    pub zone_id: String,

    // Compute credentials
    pub compute_access_token: Option<String>,
    pub compute_api_base: Option<String>,

    pub operation_timeout: Duration,
}

impl BotConfig {
    /// Load from the process environment (and `.env`, if present).
    pub fn load() -> Result<Self> {
        load_dotenv_once();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let required = |key: &str| -> Result<String> {
            lookup(key)
                .map(|v| v.trim().to_string())
                .and_then(non_empty)
                .ok_or_else(|| Error::Config(format!("{key} environment variable is required")))
        };

        let telegram_token = required("TELEGRAM_TOKEN")?;
        let telegram_bot_name = required("TELEGRAM_BOT_NAME")?;
        let chat_id = required("CHAT_ID")?;
        let instance_id = required("INSTANCE_ID")?;
        let project_id = required("PROJECT_ID")?;
        let zone_id = required("ZONE_ID")?;

        let optional = |key: &str| -> Option<String> {
            lookup(key)
                .map(|v| v.trim().to_string())
                .and_then(non_empty)
        };
        let compute_access_token = optional("GCE_ACCESS_TOKEN");
        let compute_api_base = optional("COMPUTE_API_BASE");

        Ok(Self {
            telegram_token,
            telegram_bot_name,
            chat_id,
            instance_id,
            project_id,
            zone_id,
            compute_access_token,
            compute_api_base,
            operation_timeout: OPERATION_TIMEOUT,
        })
    }

    pub fn instance(&self) -> InstanceRef {
        InstanceRef {
            project: self.project_id.clone(),
            zone: self.zone_id.clone(),
            instance: self.instance_id.clone(),
        }
    }

    /// The `@name` token a message must contain to be addressed to the bot.
    pub fn bot_tag(&self) -> String {
        format!("@{}", self.telegram_bot_name)
    }
}

/// Whether DEBUG logging was requested.
///
/// Read once at startup, separately from [`BotConfig`]: logging must come up
/// even when the bot config is incomplete.
pub fn debug_from_env() -> bool {
    load_dotenv_once();
    debug_from_lookup(|key| env::var(key).ok())
}

pub fn debug_from_lookup(lookup: impl Fn(&str) -> Option<String>) -> bool {
    lookup("DEBUG").map(|v| parse_bool(&v)).unwrap_or(false)
}

/// `.env` in the working directory, read at most once per process.
fn load_dotenv_once() {
    static DOTENV: Once = Once::new();
    DOTENV.call_once(|| load_dotenv_if_present(Path::new(".env")));
}

pub fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim();
        if key.is_empty() {
            continue;
        }
        if env::var_os(key).is_some() {
            continue; // do not override existing env
        }

        let mut val = v.trim().to_string();
        // Strip optional surrounding quotes.
        if val.len() >= 2
            && ((val.starts_with('"') && val.ends_with('"'))
                || (val.starts_with('\'') && val.ends_with('\'')))
        {
            val = val[1..val.len() - 1].to_string();
        }

        env::set_var(key, val);
    }
}

fn parse_bool(s: &str) -> bool {
    matches!(
        s.trim().to_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn full() -> HashMap<String, String> {
        vars(&[
            ("TELEGRAM_TOKEN", "123:abc"),
            ("TELEGRAM_BOT_NAME", "McBot"),
            ("CHAT_ID", "-1001"),
            ("INSTANCE_ID", "mc-1"),
            ("PROJECT_ID", "proj"),
            ("ZONE_ID", "europe-west1-b"),
        ])
    }

    #[test]
    fn loads_required_values() {
        let env = full();
        let cfg = BotConfig::from_lookup(|k| env.get(k).cloned()).unwrap();
        assert_eq!(cfg.chat_id, "-1001");
        assert_eq!(cfg.bot_tag(), "@McBot");
        assert_eq!(cfg.operation_timeout, Duration::from_secs(90));
        assert!(cfg.compute_access_token.is_none());
        assert_eq!(
            cfg.instance(),
            InstanceRef {
                project: "proj".into(),
                zone: "europe-west1-b".into(),
                instance: "mc-1".into(),
            }
        );
    }

    #[test]
    fn missing_value_names_the_variable() {
        let mut env = full();
        env.remove("ZONE_ID");
        let err = BotConfig::from_lookup(|k| env.get(k).cloned()).unwrap_err();
        assert!(err.to_string().contains("ZONE_ID"));
    }

    #[test]
    fn blank_value_is_missing() {
        let mut env = full();
        env.insert("CHAT_ID".into(), "   ".into());
        assert!(matches!(
            BotConfig::from_lookup(|k| env.get(k).cloned()),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn debug_flag_parses_truthy_values() {
        let cases = [
            ("Yes", true),
            ("1", true),
            ("on", true),
            ("0", false),
            ("", false),
        ];
        for (raw, want) in cases {
            let env = vars(&[("DEBUG", raw)]);
            assert_eq!(debug_from_lookup(|k| env.get(k).cloned()), want, "{raw:?}");
        }
        assert!(!debug_from_lookup(|_| None));
    }

    #[test]
    fn optional_values_are_trimmed() {
        let mut env = full();
        env.insert("GCE_ACCESS_TOKEN".into(), "ya29.token\n".into());
        env.insert("COMPUTE_API_BASE".into(), "  http://localhost:9000/v1 ".into());
        let cfg = BotConfig::from_lookup(|k| env.get(k).cloned()).unwrap();
        assert_eq!(cfg.compute_access_token.as_deref(), Some("ya29.token"));
        assert_eq!(
            cfg.compute_api_base.as_deref(),
            Some("http://localhost:9000/v1")
        );
    }

    #[test]
    fn blank_optional_value_is_absent() {
        let mut env = full();
        env.insert("GCE_ACCESS_TOKEN".into(), " \t".into());
        let cfg = BotConfig::from_lookup(|k| env.get(k).cloned()).unwrap();
        assert!(cfg.compute_access_token.is_none());
    }
}
