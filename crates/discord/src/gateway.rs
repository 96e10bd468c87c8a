use async_trait::async_trait;
use thiserror::Error;

use crate::blocks::MessageTemplate;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MessageRef {
    pub channel_id: u64,
    pub message_id: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct InteractionRef {
    pub interaction_id: u64,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum GatewayError {
    #[error("message or channel was not found")]
    NotFound,
    #[error("missing permission: {0}")]
    Forbidden(String),
    #[error("interaction `{0}` is no longer available")]
    UnknownInteraction(u64),
    #[error("chat gateway request failed: {0}")]
    Request(String),
}

/// Outbound operations the workflow needs from the chat service.
///
/// Interactions are acknowledged once, on receipt. Anything said afterwards
/// goes through `follow_up_private`, which only the pressing user can see.
#[async_trait]
pub trait ChatGateway: Send + Sync {
    async fn send_message(
        &self,
        channel_id: u64,
        message: &MessageTemplate,
    ) -> Result<MessageRef, GatewayError>;

    async fn reply(&self, to: &MessageRef, text: &str) -> Result<MessageRef, GatewayError>;

    async fn delete_message(&self, message: &MessageRef) -> Result<(), GatewayError>;

    async fn acknowledge(&self, interaction: &InteractionRef) -> Result<(), GatewayError>;

    async fn follow_up_private(
        &self,
        interaction: &InteractionRef,
        text: &str,
    ) -> Result<(), GatewayError>;
}
