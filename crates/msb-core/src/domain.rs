//! Inbound Telegram update shapes.
//!
//! Only the fields the pipeline reads are modelled; everything else in the
//! Bot API payload is ignored by serde.

use serde::Deserialize;

/// Telegram chat id (numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize)]
#[serde(transparent)]
pub struct ChatId(pub i64);

#[derive(Clone, Debug, Deserialize)]
pub struct Chat {
    pub id: ChatId,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Message {
    pub chat: Chat,
    #[serde(default)]
    pub text: Option<String>,
}

/// A single webhook delivery.
///
/// Edits arrive with `edited_message` set and `message` absent.
#[derive(Clone, Debug, Deserialize)]
pub struct ChatUpdate {
    #[serde(default)]
    pub update_id: Option<i64>,
    #[serde(default)]
    pub message: Option<Message>,
    #[serde(default)]
    pub edited_message: Option<serde_json::Value>,
}

impl ChatUpdate {
    pub fn parse(body: &[u8]) -> crate::Result<Self> {
        Ok(serde_json::from_slice(body)?)
    }
}

/// Raw webhook call as seen by the controller, independent of the HTTP stack.
#[derive(Clone, Debug)]
pub struct InboundRequest {
    pub method: String,
    pub body: Vec<u8>,
}

impl InboundRequest {
    pub fn new(method: impl Into<String>, body: impl Into<Vec<u8>>) -> Self {
        Self {
            method: method.into(),
            body: body.into(),
        }
    }

    pub fn post_json(body: &serde_json::Value) -> Self {
        Self::new("POST", body.to_string())
    }
}

/// Fully-qualified compute instance.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InstanceRef {
    pub project: String,
    pub zone: String,
    pub instance: String,
}
