//! Local echo backend. Never touches the network: every message is
//! serialized to JSON and handed back in the delivery info.

use super::{DeliveryInfo, MailBackend};
use crate::message::OutgoingMessage;
use async_trait::async_trait;
use eyre::{Result, WrapErr};
use serde::Serialize;
use tracing::debug;

/// Echo backend, the default when no backend options are given
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonBackend;

/// Shape of the serialized message
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct JsonMessage<'a> {
    message_id: &'a str,
    from: &'a str,
    to: &'a [String],
    subject: &'a str,
    text: &'a str,
}

impl JsonBackend {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl MailBackend for JsonBackend {
    async fn send(&self, message: &OutgoingMessage) -> Result<DeliveryInfo> {
        let message_id = message.message_id_header();

        let raw = serde_json::to_string(&JsonMessage {
            message_id: &message_id,
            from: &message.from,
            to: &message.to,
            subject: &message.subject,
            text: &message.text,
        })
        .wrap_err("Failed to serialize message")?;

        debug!(message_id = %message_id, bytes = raw.len(), "Echoed message as JSON");

        Ok(DeliveryInfo {
            envelope: message.envelope(),
            message_id,
            message: Some(raw),
            response: None,
        })
    }

    fn name(&self) -> &'static str {
        "json"
    }
}
