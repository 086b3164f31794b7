use std::sync::Arc;

use async_trait::async_trait;
use dbn_messages::{
    protocols::{basic_message::BasicMessageBody, uris},
    DidCommMessage,
};
use dbn_storage::{MessageRecordData, MessageRepository};

use crate::{
    error::CoreError,
    events::{BasicMessageEvent, BasicMessageEventBus, EventEmitter},
    registry::{MessageContext, ProtocolHandler},
};

/// Records an inbound `basicmessage/2.0/message` and republishes it on the
/// `basicmessage.received` event bus. A missing or empty `content` is dropped
/// silently with a warning rather than erroring, since a basic message has no
/// response to send back and an empty chat bubble isn't worth failing dispatch over.
pub struct BasicMessageHandler {
    messages: Arc<MessageRepository>,
    events: Arc<BasicMessageEventBus>,
}

impl BasicMessageHandler {
    pub fn new(messages: Arc<MessageRepository>, events: Arc<BasicMessageEventBus>) -> Self {
        Self { messages, events }
    }
}

#[async_trait]
impl ProtocolHandler for BasicMessageHandler {
    fn name(&self) -> &'static str {
        "basic_message"
    }

    fn supports(&self, message_type: &str) -> bool {
        message_type.starts_with(uris::BASIC_MESSAGE_2_0)
    }

    async fn handle(&self, message: DidCommMessage, context: MessageContext) -> Result<(), CoreError> {
        let body: BasicMessageBody = serde_json::from_value(message.body.clone())
            .map_err(|err| CoreError::InvalidMessage(format!("malformed basicmessage body: {err}")))?;

        let Some(content) = body.non_empty_content() else {
            warn!("Dropping basic message `{}` with missing or empty content", message.id);
            return Ok(());
        };
        let content = content.to_string();

        if !context.encrypted {
            warn!("Basic message `{}` arrived unencrypted", message.id);
        }

        let created_time = message.created_time.unwrap_or_else(|| chrono::Utc::now().timestamp());

        if self.messages.find_by_message_id(&message.id)?.is_none() {
            let mut data = MessageRecordData::new_inbound(message.id.clone(), message.type_.clone(), message.from.clone(), message.body.clone());
            data.connection_id = context.connection_id.clone();
            data.thread_id = message.thread.thid.clone();
            data.metadata.lang = body.effective_lang().map(str::to_string);
            data.metadata.encrypted = Some(context.encrypted);
            data.metadata.transport = Some(context.transport.to_string());
            if !message.attachments.is_empty() {
                data.metadata.attachments_out_of_scope = true;
            }
            self.messages.create(data)?;

            self.events.emit_event(BasicMessageEvent {
                message_id: message.id.clone(),
                connection_id: context.connection_id,
                from_did: message.from.clone(),
                content,
                lang: body.effective_lang().map(str::to_string),
                created_time: Some(created_time),
                encrypted: context.encrypted,
                attachments_count: message.attachments.len(),
            });

            info!("Received basic message `{}`", message.id);
        } else {
            debug!("Dropping duplicate basic message `{}`", message.id);
        }

        Ok(())
    }
}
