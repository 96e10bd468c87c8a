use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::gateway::{ChatGateway, GatewayError, MessageRef};

struct PendingCleanup {
    generation: u64,
    token: CancellationToken,
}

/// Deletes messages after a delay.
///
/// Every scheduled deletion runs on its own task holding a child of one root
/// token, so a single message can be unscheduled with [`CleanupScheduler::cancel`]
/// and everything can be dropped at shutdown. Scheduling the same message twice
/// replaces the earlier deletion.
#[derive(Clone)]
pub struct CleanupScheduler {
    gateway: Arc<dyn ChatGateway>,
    root: CancellationToken,
    pending: Arc<Mutex<HashMap<MessageRef, PendingCleanup>>>,
    generation: Arc<AtomicU64>,
}

impl CleanupScheduler {
    pub fn new(gateway: Arc<dyn ChatGateway>) -> Self {
        Self {
            gateway,
            root: CancellationToken::new(),
            pending: Arc::new(Mutex::new(HashMap::new())),
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn schedule(&self, message: MessageRef, delay: Duration) -> CancellationToken {
        let token = self.root.child_token();
        let generation = self.generation.fetch_add(1, Ordering::Relaxed);
        let previous = self
            .pending()
            .insert(message, PendingCleanup { generation, token: token.clone() });
        if let Some(previous) = previous {
            previous.token.cancel();
        }

        let gateway = self.gateway.clone();
        let pending = self.pending.clone();
        let task_token = token.clone();
        tokio::spawn(async move {
            tokio::select! {
                biased;
                _ = task_token.cancelled() => {
                    debug!(
                        event_name = "cleanup.deletion.cancelled",
                        channel_id = message.channel_id,
                        message_id = message.message_id,
                        "scheduled deletion cancelled"
                    );
                }
                _ = tokio::time::sleep(delay) => {
                    release(&pending, &message, generation);
                    delete_quietly(gateway.as_ref(), &message).await;
                }
            }
        });

        token
    }

    /// Returns `true` when a pending deletion for `message` was cancelled.
    pub fn cancel(&self, message: &MessageRef) -> bool {
        match self.pending().remove(message) {
            Some(pending) => {
                pending.token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn pending_count(&self) -> usize {
        self.pending().len()
    }

    pub fn shutdown(&self) {
        self.root.cancel();
        self.pending().clear();
    }

    fn pending(&self) -> MutexGuard<'_, HashMap<MessageRef, PendingCleanup>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn release(
    pending: &Mutex<HashMap<MessageRef, PendingCleanup>>,
    message: &MessageRef,
    generation: u64,
) {
    let mut pending = pending.lock().unwrap_or_else(PoisonError::into_inner);
    if pending.get(message).is_some_and(|entry| entry.generation == generation) {
        pending.remove(message);
    }
}

async fn delete_quietly(gateway: &dyn ChatGateway, message: &MessageRef) {
    match gateway.delete_message(message).await {
        Ok(()) => debug!(
            event_name = "cleanup.deletion.completed",
            channel_id = message.channel_id,
            message_id = message.message_id,
            "scheduled deletion completed"
        ),
        Err(GatewayError::NotFound) => debug!(
            event_name = "cleanup.deletion.already_gone",
            channel_id = message.channel_id,
            message_id = message.message_id,
            "message was already removed"
        ),
        Err(error) => warn!(
            event_name = "cleanup.deletion.failed",
            channel_id = message.channel_id,
            message_id = message.message_id,
            error = %error,
            "scheduled deletion failed"
        ),
    }
}
