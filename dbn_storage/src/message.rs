use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum MessageRecordTagKeys {
    MessageId,
    ConnectionId,
    ThreadId,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageDirection {
    Inbound,
    Outbound,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageState {
    Pending,
    Sent,
    Delivered,
    Failed,
    Processed,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MessageMetadata {
    pub transport: Option<String>,
    pub encrypted: Option<bool>,
    pub lang: Option<String>,
    #[serde(default)]
    pub attachments_out_of_scope: bool,
    #[serde(default)]
    pub extra: HashMap<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageRecordData {
    pub message_id: String,
    pub thread_id: Option<String>,
    pub parent_id: Option<String>,
    pub connection_id: Option<String>,
    #[serde(rename = "type")]
    pub type_: String,
    pub direction: MessageDirection,
    pub from_did: Option<String>,
    #[serde(default)]
    pub to_dids: Vec<String>,
    pub body: Value,
    #[serde(default)]
    pub attachments: Vec<Value>,
    pub state: MessageState,
    pub error_message: Option<String>,
    #[serde(default)]
    pub retry_count: u32,
    #[serde(default)]
    pub metadata: MessageMetadata,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

impl MessageRecordData {
    pub fn new_outbound(message_id: String, type_: String, from_did: String, to_did: String, body: Value) -> Self {
        Self {
            message_id,
            thread_id: None,
            parent_id: None,
            connection_id: None,
            type_,
            direction: MessageDirection::Outbound,
            from_did: Some(from_did),
            to_dids: vec![to_did],
            body,
            attachments: vec![],
            state: MessageState::Pending,
            error_message: None,
            retry_count: 0,
            metadata: MessageMetadata::default(),
            created_at: Utc::now(),
            processed_at: None,
        }
    }

    pub fn new_inbound(message_id: String, type_: String, from_did: Option<String>, body: Value) -> Self {
        Self {
            message_id,
            thread_id: None,
            parent_id: None,
            connection_id: None,
            type_,
            direction: MessageDirection::Inbound,
            from_did,
            to_dids: vec![],
            body,
            attachments: vec![],
            state: MessageState::Processed,
            error_message: None,
            retry_count: 0,
            metadata: MessageMetadata::default(),
            created_at: Utc::now(),
            processed_at: Some(Utc::now()),
        }
    }

    pub fn mark_sent(&mut self) {
        self.state = MessageState::Sent;
        self.error_message = None;
        self.processed_at = Some(Utc::now());
    }

    pub fn mark_failed(&mut self, error_message: impl Into<String>) {
        self.state = MessageState::Failed;
        self.error_message = Some(error_message.into());
    }
}
