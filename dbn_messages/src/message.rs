use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use crate::decorators::thread::ThreadDecorator;

#[derive(Error, Debug)]
pub enum MessageError {
    #[error("message is missing required field `{0}`")]
    MissingField(&'static str),
    #[error("failed to parse DIDComm message")]
    Parse(#[source] serde_json::Error),
    #[error("failed to serialize DIDComm message")]
    Serialize(#[source] serde_json::Error),
}

/// A plaintext DIDComm message, as it exists before encryption or after decryption.
///
/// See <https://identity.foundation/didcomm-messaging/spec/#plaintext-message-structure>.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DidCommMessage {
    pub id: String,
    #[serde(rename = "type")]
    pub type_: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to: Option<Vec<String>>,
    #[serde(flatten)]
    pub thread: ThreadDecorator,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_time: Option<i64>,
    pub body: Value,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
}

impl DidCommMessage {
    pub fn new(type_: impl Into<String>, body: Value) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            type_: type_.into(),
            from: None,
            to: None,
            thread: ThreadDecorator::default(),
            created_time: Some(Utc::now().timestamp()),
            body,
            attachments: vec![],
        }
    }

    #[must_use]
    pub fn from_did(mut self, did: impl Into<String>) -> Self {
        self.from = Some(did.into());
        self
    }

    #[must_use]
    pub fn to_did(mut self, did: impl Into<String>) -> Self {
        self.to = Some(vec![did.into()]);
        self
    }

    #[must_use]
    pub fn in_thread(mut self, thid: impl Into<String>) -> Self {
        self.thread.thid = Some(thid.into());
        self
    }

    /// The protocol family this message belongs to, i.e. the type URI with the
    /// final `/<message-name>` segment stripped off.
    ///
    /// `https://didcomm.org/basicmessage/2.0/message` -> `https://didcomm.org/basicmessage/2.0`
    pub fn protocol_uri(&self) -> &str {
        self.type_.rsplit_once('/').map_or(self.type_.as_str(), |(prefix, _)| prefix)
    }

    pub fn to_json_string(&self) -> Result<String, MessageError> {
        serde_json::to_string(self).map_err(MessageError::Serialize)
    }

    pub fn from_json_str(raw: &str) -> Result<Self, MessageError> {
        let message: Self = serde_json::from_str(raw).map_err(MessageError::Parse)?;
        message.validate()?;
        Ok(message)
    }

    /// Minimal structural validation required before a message may be correlated or
    /// dispatched: a present `id`, `type`, and `body`. Serde already enforces this for
    /// `id`/`type` (required string fields); `body` is a `Value` that defaults to `Null`
    /// if absent, so it must be checked explicitly.
    pub fn validate(&self) -> Result<(), MessageError> {
        if self.id.trim().is_empty() {
            return Err(MessageError::MissingField("id"));
        }
        if self.type_.trim().is_empty() {
            return Err(MessageError::MissingField("type"));
        }
        if self.body.is_null() {
            return Err(MessageError::MissingField("body"));
        }
        Ok(())
    }
}

impl std::fmt::Display for DidCommMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "DIDComm Message {{ id: {}, type: {} }}", self.id, self.type_)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Attachment {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub data: AttachmentData,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub json: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base64: Option<String>,
}

impl AttachmentData {
    /// Decodes this attachment's payload as a JSON value regardless of whether it was
    /// carried inline (`json`) or base64-encoded (`base64`).
    pub fn as_json(&self) -> Option<Value> {
        if let Some(json) = &self.json {
            return Some(json.clone());
        }
        let encoded = self.base64.as_ref()?;
        use base64::Engine;
        let decoded = base64::engine::general_purpose::URL_SAFE_NO_PAD
            .decode(encoded)
            .or_else(|_| base64::engine::general_purpose::STANDARD.decode(encoded))
            .ok()?;
        serde_json::from_slice(&decoded).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn protocol_uri_strips_message_name() {
        crate::test_init();
        let msg = DidCommMessage::new("https://didcomm.org/basicmessage/2.0/message", json!({}));
        assert_eq!(msg.protocol_uri(), "https://didcomm.org/basicmessage/2.0");
    }

    #[test]
    fn validate_rejects_null_body() {
        let raw = r#"{"id":"m1","type":"https://didcomm.org/basicmessage/2.0/message"}"#;
        let err = DidCommMessage::from_json_str(raw).unwrap_err();
        assert!(matches!(err, MessageError::MissingField("body")));
    }

    #[test]
    fn round_trips_through_json() {
        let msg = DidCommMessage::new("https://didcomm.org/trust-ping/2.0/ping", json!({"comment": "hi"}))
            .from_did("did:peer:alice")
            .to_did("did:peer:bob")
            .in_thread("thread-1");
        let encoded = msg.to_json_string().expect("serializes");
        let decoded = DidCommMessage::from_json_str(&encoded).expect("parses");
        assert_eq!(msg, decoded);
    }
}
