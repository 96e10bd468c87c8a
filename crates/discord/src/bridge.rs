//! serenity-backed implementations of [`ChatGateway`] and [`GatewayTransport`].
//!
//! serenity delivers gateway events to its handler concurrently, so
//! [`BridgeHandler`] only normalizes them and forwards them over a channel;
//! the [`GatewayRunner`](crate::runner::GatewayRunner) drains that channel one
//! event at a time. Component interactions are acknowledged here on receipt,
//! since Discord expects an answer within three seconds and the runner may
//! still be busy with earlier events.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serenity::all::{
    ButtonStyle as SerenityButtonStyle, ChannelId, ComponentInteraction,
    ComponentInteractionDataKind, Context as SerenityContext, CreateActionRow, CreateButton,
    CreateInteractionResponse, CreateInteractionResponseFollowup, CreateMessage, GatewayIntents, Http, Interaction,
    InteractionId, Message, MessageId, Ready, ShardManager,
};
use serenity::prelude::EventHandler as SerenityEventHandler;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::{
    blocks::{ButtonStyle, MessageTemplate},
    events::{ActionSelectedEvent, ComponentKind, GatewayEnvelope, GatewayEvent, MessageCreatedEvent},
    gateway::{ChatGateway, GatewayError, InteractionRef, MessageRef},
    runner::{GatewayTransport, TransportError},
};

/// Discord keeps interaction tokens valid for fifteen minutes.
const INTERACTION_TTL: Duration = Duration::from_secs(15 * 60);
const EVENT_BUFFER: usize = 256;

pub fn intents() -> GatewayIntents {
    GatewayIntents::GUILDS | GatewayIntents::GUILD_MESSAGES | GatewayIntents::MESSAGE_CONTENT
}

struct PendingInteraction {
    token: String,
    received_at: Instant,
}

pub struct SerenityGateway {
    http: Arc<Http>,
    interactions: Mutex<HashMap<u64, PendingInteraction>>,
}

impl SerenityGateway {
    pub fn new(token: &SecretString) -> Self {
        Self::with_http(Arc::new(Http::new(token.expose_secret())))
    }

    pub fn with_http(http: Arc<Http>) -> Self {
        Self { http, interactions: Mutex::new(HashMap::new()) }
    }

    /// Keeps the interaction token so the handlers can answer it later by id.
    pub fn remember(&self, interaction: &ComponentInteraction) {
        self.remember_token(interaction.id.get(), interaction.token.clone(), Instant::now());
    }

    fn remember_token(&self, interaction_id: u64, token: String, received_at: Instant) {
        let mut interactions = self.interactions();
        interactions.retain(|_, pending| pending.received_at.elapsed() < INTERACTION_TTL);
        interactions.insert(interaction_id, PendingInteraction { token, received_at });
    }

    fn token_for(&self, interaction: &InteractionRef) -> Result<String, GatewayError> {
        self.interactions()
            .get(&interaction.interaction_id)
            .filter(|pending| pending.received_at.elapsed() < INTERACTION_TTL)
            .map(|pending| pending.token.clone())
            .ok_or(GatewayError::UnknownInteraction(interaction.interaction_id))
    }

    fn interactions(&self) -> MutexGuard<'_, HashMap<u64, PendingInteraction>> {
        self.interactions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn respond(
        &self,
        interaction: &InteractionRef,
        response: CreateInteractionResponse,
    ) -> Result<(), GatewayError> {
        let token = self.token_for(interaction)?;
        self.http
            .create_interaction_response(
                InteractionId::new(interaction.interaction_id),
                &token,
                &response,
                Vec::new(),
            )
            .await
            .map_err(map_error)
    }
}

#[async_trait]
impl ChatGateway for SerenityGateway {
    async fn send_message(
        &self,
        channel_id: u64,
        message: &MessageTemplate,
    ) -> Result<MessageRef, GatewayError> {
        let posted = ChannelId::new(channel_id)
            .send_message(&*self.http, render_message(message))
            .await
            .map_err(map_error)?;
        Ok(message_ref(&posted))
    }

    async fn reply(&self, to: &MessageRef, text: &str) -> Result<MessageRef, GatewayError> {
        let channel = ChannelId::new(to.channel_id);
        let builder = CreateMessage::new()
            .content(text)
            .reference_message((channel, MessageId::new(to.message_id)));
        let posted = channel.send_message(&*self.http, builder).await.map_err(map_error)?;
        Ok(message_ref(&posted))
    }

    async fn delete_message(&self, message: &MessageRef) -> Result<(), GatewayError> {
        ChannelId::new(message.channel_id)
            .delete_message(&*self.http, MessageId::new(message.message_id))
            .await
            .map_err(map_error)
    }

    async fn acknowledge(&self, interaction: &InteractionRef) -> Result<(), GatewayError> {
        self.respond(interaction, CreateInteractionResponse::Acknowledge).await
    }

    async fn follow_up_private(
        &self,
        interaction: &InteractionRef,
        text: &str,
    ) -> Result<(), GatewayError> {
        let token = self.token_for(interaction)?;
        let builder = CreateInteractionResponseFollowup::new().content(text).ephemeral(true);
        self.http
            .create_followup_message(&token, &builder, Vec::new())
            .await
            .map(|_| ())
            .map_err(map_error)
    }
}

enum TransportSignal {
    Event(GatewayEnvelope),
    Stopped(Option<String>),
}

/// Forwards serenity callbacks into the transport channel.
pub struct BridgeHandler {
    gateway: Arc<SerenityGateway>,
    sender: mpsc::Sender<TransportSignal>,
}

async fn forward(sender: &mpsc::Sender<TransportSignal>, envelope: GatewayEnvelope) {
    let envelope_id = envelope.envelope_id.clone();
    if sender.send(TransportSignal::Event(envelope)).await.is_err() {
        warn!(
            event_name = "ingress.gateway.event_dropped",
            envelope_id = %envelope_id,
            "gateway runner is gone; dropping event"
        );
    }
}

/// Defers the interaction, then queues it for the runner. Handlers answer
/// through follow-ups.
async fn acknowledge_then_forward(
    gateway: &dyn ChatGateway,
    sender: &mpsc::Sender<TransportSignal>,
    interaction: InteractionRef,
    envelope: GatewayEnvelope,
) {
    if let Err(error) = gateway.acknowledge(&interaction).await {
        warn!(
            event_name = "ingress.gateway.acknowledge_failed",
            interaction_id = interaction.interaction_id,
            error = %error,
            "interaction could not be acknowledged"
        );
    }
    forward(sender, envelope).await;
}

#[async_trait]
impl SerenityEventHandler for BridgeHandler {
    async fn ready(&self, _ctx: SerenityContext, ready: Ready) {
        info!(
            event_name = "ingress.gateway.ready",
            bot_user = %ready.user.name,
            guilds = ready.guilds.len(),
            "discord gateway session ready"
        );
    }

    async fn message(&self, _ctx: SerenityContext, message: Message) {
        forward(&self.sender, message_envelope(&message)).await;
    }

    async fn interaction_create(&self, _ctx: SerenityContext, interaction: Interaction) {
        match interaction {
            Interaction::Component(component) => {
                self.gateway.remember(&component);
                let interaction = InteractionRef { interaction_id: component.id.get() };
                acknowledge_then_forward(
                    self.gateway.as_ref(),
                    &self.sender,
                    interaction,
                    component_envelope(&component),
                )
                .await;
            }
            other => {
                let envelope = GatewayEnvelope {
                    envelope_id: other.id().get().to_string(),
                    event: GatewayEvent::Unsupported { event_type: format!("{:?}", other.kind()) },
                };
                forward(&self.sender, envelope).await;
            }
        }
    }
}

pub struct SerenityTransport {
    token: SecretString,
    gateway: Arc<SerenityGateway>,
    sender: mpsc::Sender<TransportSignal>,
    receiver: tokio::sync::Mutex<mpsc::Receiver<TransportSignal>>,
    shard_manager: Mutex<Option<Arc<ShardManager>>>,
}

impl SerenityTransport {
    pub fn new(token: SecretString, gateway: Arc<SerenityGateway>) -> Self {
        let (sender, receiver) = mpsc::channel(EVENT_BUFFER);
        Self {
            token,
            gateway,
            sender,
            receiver: tokio::sync::Mutex::new(receiver),
            shard_manager: Mutex::new(None),
        }
    }

    fn shard_manager(&self) -> MutexGuard<'_, Option<Arc<ShardManager>>> {
        self.shard_manager.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl GatewayTransport for SerenityTransport {
    async fn connect(&self) -> Result<(), TransportError> {
        let handler = BridgeHandler { gateway: self.gateway.clone(), sender: self.sender.clone() };
        let mut client = serenity::Client::builder(self.token.expose_secret(), intents())
            .event_handler(handler)
            .await
            .map_err(|error| TransportError::Connect(error.to_string()))?;

        *self.shard_manager() = Some(client.shard_manager.clone());

        let sender = self.sender.clone();
        tokio::spawn(async move {
            let outcome = client.start().await.err().map(|error| error.to_string());
            let _ = sender.send(TransportSignal::Stopped(outcome)).await;
        });
        Ok(())
    }

    async fn next_envelope(&self) -> Result<Option<GatewayEnvelope>, TransportError> {
        match self.receiver.lock().await.recv().await {
            Some(TransportSignal::Event(envelope)) => Ok(Some(envelope)),
            Some(TransportSignal::Stopped(None)) | None => Ok(None),
            Some(TransportSignal::Stopped(Some(error))) => Err(TransportError::Receive(error)),
        }
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        let shard_manager = self.shard_manager().take();
        if let Some(shard_manager) = shard_manager {
            debug!("shutting down discord shards");
            shard_manager.shutdown_all().await;
        }
        Ok(())
    }
}

fn message_ref(message: &Message) -> MessageRef {
    MessageRef { channel_id: message.channel_id.get(), message_id: message.id.get() }
}

fn message_envelope(message: &Message) -> GatewayEnvelope {
    GatewayEnvelope {
        envelope_id: message.id.get().to_string(),
        event: GatewayEvent::MessageCreated(MessageCreatedEvent {
            message: message_ref(message),
            author_id: message.author.id.get().to_string(),
            author_is_bot: message.author.bot,
            content: message.content.clone(),
        }),
    }
}

fn component_envelope(component: &ComponentInteraction) -> GatewayEnvelope {
    GatewayEnvelope {
        envelope_id: component.id.get().to_string(),
        event: GatewayEvent::ActionSelected(ActionSelectedEvent {
            interaction: InteractionRef { interaction_id: component.id.get() },
            message: message_ref(&component.message),
            user_id: component.user.id.get().to_string(),
            custom_id: component.data.custom_id.clone(),
            component_kind: component_kind(&component.data.kind),
        }),
    }
}

fn component_kind(kind: &ComponentInteractionDataKind) -> ComponentKind {
    match kind {
        ComponentInteractionDataKind::Button => ComponentKind::Button,
        _ => ComponentKind::Other,
    }
}

fn render_message(template: &MessageTemplate) -> CreateMessage {
    let builder = CreateMessage::new().content(&template.content);
    if template.action_rows.is_empty() {
        return builder;
    }

    let rows = template
        .action_rows
        .iter()
        .map(|row| {
            CreateActionRow::Buttons(
                row.iter()
                    .map(|button| {
                        CreateButton::new(&button.custom_id)
                            .label(&button.label)
                            .style(button_style(button.style))
                    })
                    .collect(),
            )
        })
        .collect();
    builder.components(rows)
}

fn button_style(style: Option<ButtonStyle>) -> SerenityButtonStyle {
    match style {
        Some(ButtonStyle::Success) => SerenityButtonStyle::Success,
        Some(ButtonStyle::Danger) => SerenityButtonStyle::Danger,
        None => SerenityButtonStyle::Primary,
    }
}

fn map_error(error: serenity::Error) -> GatewayError {
    if let serenity::Error::Http(http_error) = &error {
        match http_error.status_code().map(|status| status.as_u16()) {
            Some(404) => return GatewayError::NotFound,
            Some(403) => return GatewayError::Forbidden(error.to_string()),
            _ => {}
        }
    }
    GatewayError::Request(error.to_string())
}
