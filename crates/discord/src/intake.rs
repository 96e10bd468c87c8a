use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use gatekeeper_core::{
    config::{DiscordConfig, IntakeConfig},
    NameError, PlayerName, SubmissionRegistry,
};
use tracing::{error, info, warn};

use crate::{
    blocks::{
        approval_request_message, invalid_name_warning, DUPLICATE_SUBMISSION_WARNING,
        SUBMISSION_NOT_FORWARDED, SUBMISSION_NOT_SAVED,
    },
    cleanup::CleanupScheduler,
    events::{
        EventContext, EventHandler, EventHandlerError, GatewayEnvelope, GatewayEvent,
        GatewayEventType, HandlerResult, MessageCreatedEvent,
    },
    gateway::{ChatGateway, MessageRef},
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IntakePolicy {
    pub input_channel_id: u64,
    pub output_channel_id: u64,
    pub rejected_message_delay: Duration,
    pub warning_delay: Duration,
}

impl IntakePolicy {
    pub fn for_channels(input_channel_id: u64, output_channel_id: u64) -> Self {
        Self {
            input_channel_id,
            output_channel_id,
            rejected_message_delay: Duration::from_millis(500),
            warning_delay: Duration::from_millis(3_000),
        }
    }

    pub fn from_config(discord: &DiscordConfig, intake: &IntakeConfig) -> Self {
        Self {
            input_channel_id: discord.input_channel_id,
            output_channel_id: discord.output_channel_id,
            rejected_message_delay: Duration::from_millis(intake.duplicate_message_delete_ms),
            warning_delay: Duration::from_millis(intake.warning_delete_ms),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum IntakeOutcome {
    /// First submission: sender recorded and approval request posted.
    Submitted { name: PlayerName, request: MessageRef },
    Duplicate,
    InvalidName(NameError),
    /// The registry could not persist the sender; nothing was published.
    NotSaved,
    /// The sender was recorded but the approval request could not be posted.
    NotPublished { name: PlayerName },
}

pub struct SubmissionIntakeHandler {
    registry: Arc<SubmissionRegistry>,
    gateway: Arc<dyn ChatGateway>,
    cleanup: CleanupScheduler,
    policy: IntakePolicy,
}

impl SubmissionIntakeHandler {
    pub fn new(
        registry: Arc<SubmissionRegistry>,
        gateway: Arc<dyn ChatGateway>,
        cleanup: CleanupScheduler,
        policy: IntakePolicy,
    ) -> Self {
        Self { registry, gateway, cleanup, policy }
    }

    async fn intake(
        &self,
        event: &MessageCreatedEvent,
        ctx: &EventContext,
    ) -> Result<IntakeOutcome, EventHandlerError> {
        if self.registry.has(&event.author_id) {
            info!(
                event_name = "intake.submission.duplicate",
                correlation_id = %ctx.correlation_id,
                user_id = %event.author_id,
                "duplicate submission rejected"
            );
            self.reject_with_warning(event, DUPLICATE_SUBMISSION_WARNING).await?;
            return Ok(IntakeOutcome::Duplicate);
        }

        let name = match PlayerName::parse(&event.content) {
            Ok(name) => name,
            Err(name_error) => {
                info!(
                    event_name = "intake.submission.invalid_name",
                    correlation_id = %ctx.correlation_id,
                    user_id = %event.author_id,
                    error = %name_error,
                    "submission rejected: invalid player name"
                );
                self.reject_with_warning(event, &invalid_name_warning(&name_error)).await?;
                return Ok(IntakeOutcome::InvalidName(name_error));
            }
        };

        let registry = self.registry.clone();
        let author_id = event.author_id.clone();
        let recorded = tokio::task::spawn_blocking(move || registry.record(&author_id)).await?;
        match recorded {
            Ok(true) => {}
            Ok(false) => {
                self.reject_with_warning(event, DUPLICATE_SUBMISSION_WARNING).await?;
                return Ok(IntakeOutcome::Duplicate);
            }
            Err(registry_error) => {
                error!(
                    event_name = "intake.registry.append_failed",
                    correlation_id = %ctx.correlation_id,
                    user_id = %event.author_id,
                    error = %registry_error,
                    "could not persist submitter; submission dropped"
                );
                self.gateway.reply(&event.message, SUBMISSION_NOT_SAVED).await?;
                return Ok(IntakeOutcome::NotSaved);
            }
        }

        let request = approval_request_message(&name);
        match self.gateway.send_message(self.policy.output_channel_id, &request).await {
            Ok(posted) => {
                info!(
                    event_name = "intake.submission.accepted",
                    correlation_id = %ctx.correlation_id,
                    user_id = %event.author_id,
                    player_name = %name,
                    request_message_id = posted.message_id,
                    "approval request posted"
                );
                Ok(IntakeOutcome::Submitted { name, request: posted })
            }
            Err(gateway_error) => {
                error!(
                    event_name = "intake.publish.failed",
                    correlation_id = %ctx.correlation_id,
                    user_id = %event.author_id,
                    player_name = %name,
                    output_channel_id = self.policy.output_channel_id,
                    error = %gateway_error,
                    "could not post approval request to output channel"
                );
                if let Err(reply_error) =
                    self.gateway.reply(&event.message, SUBMISSION_NOT_FORWARDED).await
                {
                    warn!(
                        correlation_id = %ctx.correlation_id,
                        error = %reply_error,
                        "could not notify submitter about publish failure"
                    );
                }
                Ok(IntakeOutcome::NotPublished { name })
            }
        }
    }

    /// Warns the sender, then removes their message and the warning on the configured delays.
    async fn reject_with_warning(
        &self,
        event: &MessageCreatedEvent,
        warning: &str,
    ) -> Result<(), EventHandlerError> {
        self.cleanup.schedule(event.message, self.policy.rejected_message_delay);
        let posted = self.gateway.reply(&event.message, warning).await?;
        self.cleanup.schedule(posted, self.policy.warning_delay);
        Ok(())
    }
}

#[async_trait]
impl EventHandler for SubmissionIntakeHandler {
    fn event_type(&self) -> GatewayEventType {
        GatewayEventType::MessageCreated
    }

    async fn handle(
        &self,
        envelope: &GatewayEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let GatewayEvent::MessageCreated(event) = &envelope.event else {
            return Ok(HandlerResult::Ignored);
        };

        if event.author_is_bot || event.message.channel_id != self.policy.input_channel_id {
            return Ok(HandlerResult::Ignored);
        }

        self.intake(event, ctx).await.map(HandlerResult::Intake)
    }
}
