use std::sync::Arc;

use async_trait::async_trait;
use gatekeeper_core::{ActionParseError, ApprovalAction, CommandExecutor, ExecutorError};
use tracing::{info, warn};

use crate::{
    blocks::{text_message, ACTION_NOT_RECOGNIZED},
    events::{
        ActionSelectedEvent, ComponentKind, EventContext, EventHandler, EventHandlerError,
        GatewayEnvelope, GatewayEvent, GatewayEventType, HandlerResult,
    },
    gateway::{ChatGateway, GatewayError},
};

/// Where a pending approval request ended up after one button press.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ApprovalOutcome {
    /// Executor succeeded; the request was removed and a confirmation posted.
    Resolved(ApprovalAction),
    /// Executor failed; the request stays up so a moderator can retry.
    Failed { action: ApprovalAction, error: ExecutorError },
    Unrecognized(ActionParseError),
}

/// Handles Whitelist/Reject presses. The interaction has already been
/// acknowledged at ingress, so every private answer is a follow-up.
pub struct ApprovalActionHandler {
    gateway: Arc<dyn ChatGateway>,
    executor: Arc<dyn CommandExecutor>,
}

impl ApprovalActionHandler {
    pub fn new(gateway: Arc<dyn ChatGateway>, executor: Arc<dyn CommandExecutor>) -> Self {
        Self { gateway, executor }
    }

    async fn resolve(
        &self,
        event: &ActionSelectedEvent,
        ctx: &EventContext,
    ) -> Result<ApprovalOutcome, EventHandlerError> {
        let action = match ApprovalAction::parse(&event.custom_id) {
            Ok(action) => action,
            Err(parse_error) => {
                warn!(
                    event_name = "approval.action.unrecognized",
                    correlation_id = %ctx.correlation_id,
                    user_id = %event.user_id,
                    custom_id = %event.custom_id,
                    error = %parse_error,
                    "action identifier not recognized"
                );
                self.gateway.follow_up_private(&event.interaction, ACTION_NOT_RECOGNIZED).await?;
                return Ok(ApprovalOutcome::Unrecognized(parse_error));
            }
        };

        let command = action.command();
        match self.executor.execute(&command).await {
            Ok(receipt) => {
                info!(
                    event_name = "approval.executor.succeeded",
                    correlation_id = %ctx.correlation_id,
                    user_id = %event.user_id,
                    action = action.kind.as_str(),
                    player_name = %action.name,
                    executor_message = receipt.message.as_deref().unwrap_or(""),
                    "command executed"
                );

                match self.gateway.delete_message(&event.message).await {
                    Ok(()) | Err(GatewayError::NotFound) => {}
                    Err(delete_error) => warn!(
                        event_name = "approval.request.delete_failed",
                        correlation_id = %ctx.correlation_id,
                        error = %delete_error,
                        "approval request could not be removed"
                    ),
                }
                self.gateway
                    .send_message(event.message.channel_id, &text_message(action.confirmation()))
                    .await?;
                Ok(ApprovalOutcome::Resolved(action))
            }
            Err(executor_error) => {
                warn!(
                    event_name = "approval.executor.failed",
                    correlation_id = %ctx.correlation_id,
                    user_id = %event.user_id,
                    action = action.kind.as_str(),
                    player_name = %action.name,
                    transient = executor_error.is_transient(),
                    error = %executor_error,
                    "command execution failed; approval request left in place"
                );
                self.gateway
                    .follow_up_private(&event.interaction, &executor_error.user_message())
                    .await?;
                Ok(ApprovalOutcome::Failed { action, error: executor_error })
            }
        }
    }
}

#[async_trait]
impl EventHandler for ApprovalActionHandler {
    fn event_type(&self) -> GatewayEventType {
        GatewayEventType::ActionSelected
    }

    async fn handle(
        &self,
        envelope: &GatewayEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let GatewayEvent::ActionSelected(event) = &envelope.event else {
            return Ok(HandlerResult::Ignored);
        };

        if event.component_kind != ComponentKind::Button {
            return Ok(HandlerResult::Ignored);
        }

        self.resolve(event, ctx).await.map(HandlerResult::Approval)
    }
}
