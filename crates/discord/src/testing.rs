use std::collections::{HashSet, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use gatekeeper_core::{CommandExecutor, ExecutionReceipt, ExecutorError};

use crate::{
    blocks::MessageTemplate,
    events::{ActionSelectedEvent, ComponentKind, GatewayEvent, MessageCreatedEvent},
    gateway::{ChatGateway, GatewayError, InteractionRef, MessageRef},
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GatewayCall {
    Sent { channel_id: u64, message: MessageTemplate, posted: MessageRef },
    Replied { to: MessageRef, text: String, posted: MessageRef },
    Deleted(MessageRef),
    Acknowledged(InteractionRef),
    FollowedUpPrivately { interaction: InteractionRef, text: String },
}

#[derive(Default)]
struct GatewayState {
    calls: Vec<GatewayCall>,
    live: HashSet<MessageRef>,
    next_message_id: u64,
    fail_sends_to: HashSet<u64>,
}

/// In-memory chat surface: tracks which messages currently exist and every call made.
#[derive(Default)]
pub struct RecordingGateway {
    state: Mutex<GatewayState>,
}

impl RecordingGateway {
    /// Marks a user-authored message as present so it can be deleted later.
    pub fn seed(&self, message: MessageRef) {
        self.state().live.insert(message);
    }

    pub fn fail_sends_to(&self, channel_id: u64) {
        self.state().fail_sends_to.insert(channel_id);
    }

    pub fn calls(&self) -> Vec<GatewayCall> {
        self.state().calls.clone()
    }

    pub fn is_live(&self, message: &MessageRef) -> bool {
        self.state().live.contains(message)
    }

    pub fn sent_to(&self, channel_id: u64) -> Vec<MessageTemplate> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                GatewayCall::Sent { channel_id: target, message, .. } if target == channel_id => {
                    Some(message)
                }
                _ => None,
            })
            .collect()
    }

    pub fn replies(&self) -> Vec<(MessageRef, String, MessageRef)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                GatewayCall::Replied { to, text, posted } => Some((to, text, posted)),
                _ => None,
            })
            .collect()
    }

    pub fn private_messages(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                GatewayCall::FollowedUpPrivately { text, .. } => Some(text),
                _ => None,
            })
            .collect()
    }

    fn post(&self, channel_id: u64) -> MessageRef {
        let mut state = self.state();
        state.next_message_id += 1;
        let posted = MessageRef { channel_id, message_id: 9_000 + state.next_message_id };
        state.live.insert(posted);
        posted
    }

    fn state(&self) -> std::sync::MutexGuard<'_, GatewayState> {
        self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[async_trait]
impl ChatGateway for RecordingGateway {
    async fn send_message(
        &self,
        channel_id: u64,
        message: &MessageTemplate,
    ) -> Result<MessageRef, GatewayError> {
        if self.state().fail_sends_to.contains(&channel_id) {
            return Err(GatewayError::NotFound);
        }
        let posted = self.post(channel_id);
        self.state().calls.push(GatewayCall::Sent { channel_id, message: message.clone(), posted });
        Ok(posted)
    }

    async fn reply(&self, to: &MessageRef, text: &str) -> Result<MessageRef, GatewayError> {
        let posted = self.post(to.channel_id);
        self.state().calls.push(GatewayCall::Replied { to: *to, text: text.to_owned(), posted });
        Ok(posted)
    }

    async fn delete_message(&self, message: &MessageRef) -> Result<(), GatewayError> {
        let mut state = self.state();
        if !state.live.remove(message) {
            return Err(GatewayError::NotFound);
        }
        state.calls.push(GatewayCall::Deleted(*message));
        Ok(())
    }

    async fn acknowledge(&self, interaction: &InteractionRef) -> Result<(), GatewayError> {
        self.state().calls.push(GatewayCall::Acknowledged(*interaction));
        Ok(())
    }

    async fn follow_up_private(
        &self,
        interaction: &InteractionRef,
        text: &str,
    ) -> Result<(), GatewayError> {
        self.state().calls.push(GatewayCall::FollowedUpPrivately {
            interaction: *interaction,
            text: text.to_owned(),
        });
        Ok(())
    }
}

/// Executor that replays queued results (success when the queue is empty) and records commands.
#[derive(Default)]
pub struct ScriptedExecutor {
    results: Mutex<VecDeque<Result<ExecutionReceipt, ExecutorError>>>,
    commands: Mutex<Vec<String>>,
}

impl ScriptedExecutor {
    pub fn with_results(results: Vec<Result<ExecutionReceipt, ExecutorError>>) -> Self {
        Self { results: Mutex::new(results.into()), commands: Mutex::new(Vec::new()) }
    }

    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().unwrap_or_else(std::sync::PoisonError::into_inner).clone()
    }
}

#[async_trait]
impl CommandExecutor for ScriptedExecutor {
    async fn execute(&self, command: &str) -> Result<ExecutionReceipt, ExecutorError> {
        self.commands
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(command.to_owned());
        self.results
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .pop_front()
            .unwrap_or_else(|| Ok(ExecutionReceipt::default()))
    }
}

pub fn message_event(channel_id: u64, message_id: u64, author_id: &str, content: &str) -> GatewayEvent {
    GatewayEvent::MessageCreated(MessageCreatedEvent {
        message: MessageRef { channel_id, message_id },
        author_id: author_id.to_owned(),
        author_is_bot: false,
        content: content.to_owned(),
    })
}

pub fn button_event(request: MessageRef, interaction_id: u64, custom_id: &str) -> GatewayEvent {
    GatewayEvent::ActionSelected(ActionSelectedEvent {
        interaction: InteractionRef { interaction_id },
        message: request,
        user_id: "MOD1".to_owned(),
        custom_id: custom_id.to_owned(),
        component_kind: ComponentKind::Button,
    })
}

/// Polls `condition` until it holds or a generous deadline passes.
pub async fn eventually<F>(mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    for _ in 0..200 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}
