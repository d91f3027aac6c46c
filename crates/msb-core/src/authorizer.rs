//! Ordered checks that decide whether a webhook call may run a command.
//!
//! Cheap shape checks run first; the chat id is verified before any text is
//! trusted, so a foreign chat never reaches dispatch.

use std::fmt;

use tracing::{debug, error, info};

use crate::{
    commands::{CommandName, CommandRegistry},
    config::BotConfig,
    domain::{ChatUpdate, InboundRequest},
    formatting::escape_markdown,
    Result,
};

/// Why a request was turned away.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RejectionReason {
    /// Noise not meant for the bot. Acknowledged silently.
    NotAddressedToBot(String),
    /// Addressed to the bot but not a known command. Shown to the user.
    NotValidCommand(String),
}

impl fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectionReason::NotAddressedToBot(d) | RejectionReason::NotValidCommand(d) => {
                f.write_str(d)
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Verdict {
    Authorized(CommandName),
    Rejected(RejectionReason),
}

pub struct RequestAuthorizer<'a> {
    cfg: &'a BotConfig,
    registry: &'a CommandRegistry,
}

impl<'a> RequestAuthorizer<'a> {
    pub fn new(cfg: &'a BotConfig, registry: &'a CommandRegistry) -> Self {
        Self { cfg, registry }
    }

    /// Run every check in order. `Err` is reserved for unparseable payloads.
    pub fn authorize(&self, req: &InboundRequest) -> Result<Verdict> {
        if let Some(reason) = self.verify_method(req) {
            return Ok(Verdict::Rejected(reason));
        }

        debug!("Verifying chat.");
        let update = ChatUpdate::parse(&req.body)?;
        debug!("Update:\n{update:?}");

        let Some(message) = update.message else {
            debug!("The request was caused by message editing, ignoring.");
            return Ok(Verdict::Rejected(RejectionReason::NotAddressedToBot(
                "The request was caused by message editing, ignoring.".to_string(),
            )));
        };

        let sender = message.chat.id.0.to_string();
        if sender != self.cfg.chat_id {
            debug!("The chat_id \"{sender}\" is not eligible for receiving commands, ignoring.");
            debug!("Valid chat_id: {}", self.cfg.chat_id);
            return Ok(Verdict::Rejected(RejectionReason::NotAddressedToBot(
                format!("The chat_id \"{sender}\" is not eligible for receiving commands, ignoring."),
            )));
        }
        info!("The chat_id is correct, proceeding with the request.");

        let text = message.text.unwrap_or_default();
        Ok(self.verify_message(&text))
    }

    fn verify_method(&self, req: &InboundRequest) -> Option<RejectionReason> {
        if req.method == "POST" {
            debug!("The method is valid.");
            return None;
        }
        debug!(
            "Request method is different from POST \"{}\", ignoring.",
            req.method
        );
        Some(RejectionReason::NotAddressedToBot(format!(
            "Request method is different from POST \"{}\", ignoring.",
            req.method
        )))
    }

    fn verify_message(&self, text: &str) -> Verdict {
        let tag = self.cfg.bot_tag();
        debug!("Checking if tag {tag} is present in the message \"{text}\".");

        if !text.contains(&tag) {
            debug!("Message wasn't addressed to the bot, ignoring.");
            return Verdict::Rejected(RejectionReason::NotAddressedToBot(
                "Message wasn't addressed to the bot, ignoring.".to_string(),
            ));
        }

        let command = strip_tags(text);
        debug!("Retrieved command: {command}");

        match self.registry.lookup(&command) {
            Some(cmd) => {
                debug!("The command \"{command}\" is valid.");
                Verdict::Authorized(cmd)
            }
            None => {
                error!("The command {command} is not valid.");
                // Legacy Markdown has no escapes inside an entity, so the
                // echoed command stays outside the bold span.
                Verdict::Rejected(RejectionReason::NotValidCommand(format!(
                    "The command {} is not valid. Use *help* to see valid commands.",
                    escape_markdown(&command)
                )))
            }
        }
    }
}

/// Drop every whitespace-separated token starting with `@`, keep the rest in order.
pub fn strip_tags(text: &str) -> String {
    text.split_whitespace()
        .filter(|tok| !tok.starts_with('@'))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{edited_update, message_update, test_config};

    fn run(req: InboundRequest) -> Verdict {
        let cfg = test_config();
        let registry = CommandRegistry::new();
        RequestAuthorizer::new(&cfg, &registry)
            .authorize(&req)
            .unwrap()
    }

    fn ignored(v: &Verdict) -> bool {
        matches!(v, Verdict::Rejected(RejectionReason::NotAddressedToBot(_)))
    }

    #[test]
    fn strip_tags_preserves_order() {
        assert_eq!(strip_tags("@McBot   status now"), "status now");
        assert_eq!(strip_tags("stop @McBot @other please"), "stop please");
        assert_eq!(strip_tags("@McBot"), "");
    }

    #[test]
    fn non_post_is_ignored_before_parsing() {
        for method in ["GET", "PUT", "DELETE", "post"] {
            let v = run(InboundRequest::new(method, "garbage"));
            assert!(ignored(&v), "{method}");
        }
    }

    #[test]
    fn edits_are_ignored() {
        let v = run(InboundRequest::post_json(&edited_update(-1001, "@McBot start")));
        assert!(ignored(&v));
    }

    #[test]
    fn foreign_chat_is_ignored_even_with_valid_command() {
        let v = run(InboundRequest::post_json(&message_update(42, "@McBot start")));
        assert_eq!(
            v,
            Verdict::Rejected(RejectionReason::NotAddressedToBot(
                "The chat_id \"42\" is not eligible for receiving commands, ignoring.".into()
            ))
        );
    }

    #[test]
    fn untagged_message_is_ignored() {
        let v = run(InboundRequest::post_json(&message_update(-1001, "start")));
        assert!(ignored(&v));
        let v = run(InboundRequest::post_json(&message_update(-1001, "@OtherBot start")));
        assert!(ignored(&v));
    }

    #[test]
    fn message_without_text_is_ignored() {
        let body = serde_json::json!({
            "update_id": 3,
            "message": { "message_id": 1, "chat": { "id": -1001 } }
        });
        assert!(ignored(&run(InboundRequest::post_json(&body))));
    }

    #[test]
    fn tagged_known_command_is_authorized() {
        let v = run(InboundRequest::post_json(&message_update(-1001, "@McBot stop")));
        assert_eq!(v, Verdict::Authorized(CommandName::Stop));
        let v = run(InboundRequest::post_json(&message_update(-1001, "status @McBot")));
        assert_eq!(v, Verdict::Authorized(CommandName::Status));
    }

    #[test]
    fn unknown_command_names_it() {
        let v = run(InboundRequest::post_json(&message_update(-1001, "@McBot restart")));
        match v {
            Verdict::Rejected(RejectionReason::NotValidCommand(detail)) => {
                assert_eq!(
                    detail,
                    "The command restart is not valid. Use *help* to see valid commands."
                );
            }
            other => panic!("unexpected verdict {other:?}"),
        }
    }

    /// Legacy Markdown: `\` escapes only outside an entity, and an entity
    /// runs literally to its closing marker.
    fn legacy_markdown_balanced(text: &str) -> bool {
        let mut open: Option<char> = None;
        let mut chars = text.chars();
        while let Some(c) = chars.next() {
            match open {
                Some(marker) => {
                    if c == marker {
                        open = None;
                    }
                }
                None => match c {
                    '\\' => {
                        chars.next();
                    }
                    '*' | '_' | '`' => open = Some(c),
                    _ => {}
                },
            }
        }
        open.is_none()
    }

    fn invalid_detail(text: &str) -> String {
        match run(InboundRequest::post_json(&message_update(-1001, text))) {
            Verdict::Rejected(RejectionReason::NotValidCommand(detail)) => detail,
            other => panic!("unexpected verdict {other:?}"),
        }
    }

    #[test]
    fn echoed_command_with_markup_chars_stays_parseable() {
        let detail = invalid_detail("@McBot re*start");
        assert!(legacy_markdown_balanced(&detail), "{detail}");
        assert!(detail.starts_with("The command re\\*start is not valid."));

        let detail = invalid_detail("@McBot re_start");
        assert!(legacy_markdown_balanced(&detail), "{detail}");
        assert!(detail.starts_with("The command re\\_start is not valid."));

        let detail = invalid_detail("@McBot `x` [y");
        assert!(legacy_markdown_balanced(&detail), "{detail}");
    }

    #[test]
    fn markdown_checker_flags_broken_bold() {
        assert!(!legacy_markdown_balanced(
            "The command *re\\*start* is not valid. Use *help* to see valid commands."
        ));
    }

    #[test]
    fn multi_word_command_is_not_valid() {
        let v = run(InboundRequest::post_json(&message_update(
            -1001,
            "@McBot   status now",
        )));
        assert!(matches!(
            v,
            Verdict::Rejected(RejectionReason::NotValidCommand(ref d)) if d.contains("status now")
        ));
    }

    #[test]
    fn malformed_body_is_an_error() {
        let cfg = test_config();
        let registry = CommandRegistry::new();
        let res = RequestAuthorizer::new(&cfg, &registry)
            .authorize(&InboundRequest::new("POST", "{not json"));
        assert!(res.is_err());
    }
}
