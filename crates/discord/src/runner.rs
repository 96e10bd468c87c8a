use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use anyhow::Result;
use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::events::{EventContext, EventDispatcher, GatewayEnvelope, GatewayEvent, HandlerResult};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("gateway failed to connect: {0}")]
    Connect(String),
    #[error("gateway read failed: {0}")]
    Receive(String),
    #[error("gateway disconnect failed: {0}")]
    Disconnect(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self { max_retries: 5, base_delay_ms: 250, max_delay_ms: 5_000 }
    }
}

impl ReconnectPolicy {
    fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(16);
        let multiplier = 1_u64 << exponent;
        let delay_ms = self.base_delay_ms.saturating_mul(multiplier).min(self.max_delay_ms);
        Duration::from_millis(delay_ms)
    }
}

/// Source of inbound gateway events. `next_envelope` yields `None` once the
/// connection has been closed for good.
#[async_trait]
pub trait GatewayTransport: Send + Sync {
    async fn connect(&self) -> Result<(), TransportError>;
    async fn next_envelope(&self) -> Result<Option<GatewayEnvelope>, TransportError>;
    async fn disconnect(&self) -> Result<(), TransportError>;
}

/// Shared view of whether the runner is still pumping events. Flips to
/// stopped for good once `start` returns.
#[derive(Clone, Debug, Default)]
pub struct RunnerStatus {
    stopped: Arc<AtomicBool>,
}

impl RunnerStatus {
    pub fn is_running(&self) -> bool {
        !self.stopped.load(Ordering::SeqCst)
    }

    fn mark_stopped(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }
}

struct PumpFailure {
    error: TransportError,
    delivered: u64,
}

/// Pulls events off the transport and handles them one at a time, in arrival order.
pub struct GatewayRunner {
    transport: Arc<dyn GatewayTransport>,
    dispatcher: EventDispatcher,
    reconnect_policy: ReconnectPolicy,
    status: RunnerStatus,
}

impl GatewayRunner {
    pub fn new(
        transport: Arc<dyn GatewayTransport>,
        dispatcher: EventDispatcher,
        reconnect_policy: ReconnectPolicy,
    ) -> Self {
        Self { transport, dispatcher, reconnect_policy, status: RunnerStatus::default() }
    }

    pub fn status(&self) -> RunnerStatus {
        self.status.clone()
    }

    /// Runs until the event stream closes or reconnects are exhausted. The
    /// retry budget only counts consecutive failures: a session that
    /// delivered events starts the count over.
    pub async fn start(&self) -> Result<()> {
        let result = self.pump_with_reconnects().await;
        self.status.mark_stopped();
        result
    }

    async fn pump_with_reconnects(&self) -> Result<()> {
        let mut attempt = 0;
        loop {
            let failure = match self.connect_and_pump(attempt).await {
                Ok(()) => return Ok(()),
                Err(failure) => failure,
            };
            if failure.delivered > 0 {
                attempt = 0;
            }

            warn!(
                attempt,
                max_retries = self.reconnect_policy.max_retries,
                delivered = failure.delivered,
                error = %failure.error,
                "gateway transport failed"
            );

            if attempt >= self.reconnect_policy.max_retries {
                warn!(
                    event_name = "ingress.gateway.retries_exhausted",
                    max_retries = self.reconnect_policy.max_retries,
                    "gateway retries exhausted; continuing process without crash"
                );
                return Ok(());
            }

            let delay = self.reconnect_policy.backoff(attempt);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            attempt += 1;
        }
    }

    pub async fn stop(&self) -> Result<(), TransportError> {
        self.transport.disconnect().await
    }

    async fn connect_and_pump(&self, attempt: u32) -> Result<(), PumpFailure> {
        let mut delivered = 0;
        let fail = |error: TransportError, delivered: u64| PumpFailure { error, delivered };

        info!(attempt, "opening gateway connection");
        self.transport.connect().await.map_err(|error| fail(error, delivered))?;
        info!(attempt, "gateway connected");

        loop {
            let next = self.transport.next_envelope().await.map_err(|error| fail(error, delivered))?;
            let Some(envelope) = next else {
                info!(attempt, delivered, "gateway event stream closed");
                self.transport.disconnect().await.map_err(|error| fail(error, delivered))?;
                return Ok(());
            };
            delivered += 1;
            let (channel_id, user_id) = correlation_fields(&envelope);

            info!(
                event_name = "ingress.gateway.event_received",
                envelope_id = %envelope.envelope_id,
                event_type = ?envelope.event.event_type(),
                correlation_id = %envelope.envelope_id,
                channel_id = channel_id.unwrap_or_default(),
                user_id = user_id.unwrap_or("unknown"),
                "received gateway event"
            );

            let context = EventContext { correlation_id: envelope.envelope_id.clone() };
            match self.dispatcher.dispatch(&envelope, &context).await {
                Ok(HandlerResult::Ignored) => debug!(
                    event_name = "ingress.gateway.event_ignored",
                    correlation_id = %envelope.envelope_id,
                    "no handler acted on gateway event"
                ),
                Ok(result) => debug!(
                    event_name = "ingress.gateway.event_handled",
                    correlation_id = %envelope.envelope_id,
                    result = ?result,
                    "gateway event handled"
                ),
                Err(error) => warn!(
                    envelope_id = %envelope.envelope_id,
                    correlation_id = %envelope.envelope_id,
                    channel_id = channel_id.unwrap_or_default(),
                    user_id = user_id.unwrap_or("unknown"),
                    error = %error,
                    "event dispatch failed; continuing gateway loop"
                ),
            }
        }
    }
}

fn correlation_fields(envelope: &GatewayEnvelope) -> (Option<u64>, Option<&str>) {
    match &envelope.event {
        GatewayEvent::MessageCreated(event) => {
            (Some(event.message.channel_id), Some(event.author_id.as_str()))
        }
        GatewayEvent::ActionSelected(event) => {
            (Some(event.message.channel_id), Some(event.user_id.as_str()))
        }
        GatewayEvent::Unsupported { .. } => (None, None),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Arc;

    use async_trait::async_trait;
    use gatekeeper_core::SubmissionRegistry;
    use tempfile::TempDir;
    use tokio::sync::Mutex;

    use super::{GatewayRunner, GatewayTransport, ReconnectPolicy, TransportError};
    use crate::{
        cleanup::CleanupScheduler,
        events::{
            EventContext, EventDispatcher, EventHandler, EventHandlerError, GatewayEnvelope,
            GatewayEvent, GatewayEventType, HandlerResult,
        },
        gateway::MessageRef,
        intake::{IntakePolicy, SubmissionIntakeHandler},
        testing::{message_event, RecordingGateway},
    };

    #[derive(Default)]
    struct ScriptedTransport {
        state: Mutex<ScriptedState>,
    }

    #[derive(Default)]
    struct ScriptedState {
        connect_results: VecDeque<Result<(), TransportError>>,
        envelopes: VecDeque<Result<Option<GatewayEnvelope>, TransportError>>,
        connect_attempts: usize,
        disconnect_calls: usize,
    }

    impl ScriptedTransport {
        fn with_script(
            connect_results: Vec<Result<(), TransportError>>,
            envelopes: Vec<Result<Option<GatewayEnvelope>, TransportError>>,
        ) -> Self {
            Self {
                state: Mutex::new(ScriptedState {
                    connect_results: connect_results.into(),
                    envelopes: envelopes.into(),
                    ..ScriptedState::default()
                }),
            }
        }

        async fn connect_attempts(&self) -> usize {
            self.state.lock().await.connect_attempts
        }

        async fn disconnect_calls(&self) -> usize {
            self.state.lock().await.disconnect_calls
        }
    }

    #[async_trait]
    impl GatewayTransport for ScriptedTransport {
        async fn connect(&self) -> Result<(), TransportError> {
            let mut state = self.state.lock().await;
            state.connect_attempts += 1;
            state.connect_results.pop_front().unwrap_or(Ok(()))
        }

        async fn next_envelope(&self) -> Result<Option<GatewayEnvelope>, TransportError> {
            let mut state = self.state.lock().await;
            state.envelopes.pop_front().unwrap_or(Ok(None))
        }

        async fn disconnect(&self) -> Result<(), TransportError> {
            self.state.lock().await.disconnect_calls += 1;
            Ok(())
        }
    }

    fn no_delay(max_retries: u32) -> ReconnectPolicy {
        ReconnectPolicy { max_retries, base_delay_ms: 0, max_delay_ms: 0 }
    }

    fn envelope(id: &str, event: GatewayEvent) -> Result<Option<GatewayEnvelope>, TransportError> {
        Ok(Some(GatewayEnvelope { envelope_id: id.to_owned(), event }))
    }

    fn typing(id: &str) -> Result<Option<GatewayEnvelope>, TransportError> {
        envelope(id, GatewayEvent::Unsupported { event_type: "typing".to_owned() })
    }

    #[derive(Clone, Default)]
    struct RecordingHandler {
        seen: Arc<std::sync::Mutex<Vec<String>>>,
    }

    impl RecordingHandler {
        fn seen(&self) -> Vec<String> {
            self.seen.lock().expect("seen lock").clone()
        }
    }

    #[async_trait]
    impl EventHandler for RecordingHandler {
        fn event_type(&self) -> GatewayEventType {
            GatewayEventType::Unsupported
        }

        async fn handle(
            &self,
            envelope: &GatewayEnvelope,
            _ctx: &EventContext,
        ) -> Result<HandlerResult, EventHandlerError> {
            self.seen.lock().expect("seen lock").push(envelope.envelope_id.clone());
            Ok(HandlerResult::Ignored)
        }
    }

    #[tokio::test]
    async fn reconnects_after_initial_connect_failure() {
        let transport = Arc::new(ScriptedTransport::with_script(
            vec![Err(TransportError::Connect("network down".to_owned())), Ok(())],
            vec![envelope("1", GatewayEvent::Unsupported { event_type: "typing".to_owned() }), Ok(None)],
        ));

        let runner = GatewayRunner::new(transport.clone(), EventDispatcher::default(), no_delay(2));

        runner.start().await.expect("runner should recover");

        assert_eq!(transport.connect_attempts().await, 2);
        assert_eq!(transport.disconnect_calls().await, 1);
    }

    #[tokio::test]
    async fn exhausts_retries_without_crashing() {
        let transport = Arc::new(ScriptedTransport::with_script(
            vec![
                Err(TransportError::Connect("fail-1".to_owned())),
                Err(TransportError::Connect("fail-2".to_owned())),
                Err(TransportError::Connect("fail-3".to_owned())),
            ],
            vec![],
        ));

        let runner = GatewayRunner::new(transport.clone(), EventDispatcher::default(), no_delay(2));

        runner.start().await.expect("runner should degrade gracefully");
        assert_eq!(transport.connect_attempts().await, 3);
    }

    #[tokio::test]
    async fn receive_failure_triggers_reconnect() {
        let transport = Arc::new(ScriptedTransport::with_script(
            vec![Ok(()), Ok(())],
            vec![Err(TransportError::Receive("socket reset".to_owned())), Ok(None)],
        ));

        let runner = GatewayRunner::new(transport.clone(), EventDispatcher::default(), no_delay(3));

        runner.start().await.expect("runner should recover");
        assert_eq!(transport.connect_attempts().await, 2);
    }

    #[tokio::test]
    async fn productive_sessions_do_not_use_up_the_retry_budget() {
        let mut envelopes = Vec::new();
        for cycle in 0..8 {
            envelopes.push(typing(&cycle.to_string()));
            envelopes.push(Err(TransportError::Receive(format!("socket reset {cycle}"))));
        }
        envelopes.push(Ok(None));
        let transport = Arc::new(ScriptedTransport::with_script(vec![], envelopes));
        let handler = RecordingHandler::default();
        let mut dispatcher = EventDispatcher::new();
        dispatcher.register(handler.clone());

        let runner = GatewayRunner::new(transport.clone(), dispatcher, no_delay(5));
        runner.start().await.expect("runner should keep reconnecting");

        assert_eq!(handler.seen(), (0..8).map(|cycle| cycle.to_string()).collect::<Vec<_>>());
        assert_eq!(transport.connect_attempts().await, 9);
        assert_eq!(transport.disconnect_calls().await, 1);
    }

    #[tokio::test]
    async fn consecutive_failures_still_exhaust_the_budget() {
        let transport = Arc::new(ScriptedTransport::with_script(
            vec![],
            vec![
                typing("1"),
                Err(TransportError::Receive("reset-1".to_owned())),
                Err(TransportError::Receive("reset-2".to_owned())),
                Err(TransportError::Receive("reset-3".to_owned())),
                typing("never-pumped"),
            ],
        ));

        let runner = GatewayRunner::new(transport.clone(), EventDispatcher::default(), no_delay(1));
        runner.start().await.expect("runner should degrade gracefully");

        assert_eq!(transport.connect_attempts().await, 2);
    }

    #[tokio::test]
    async fn status_reports_stopped_once_the_pump_gives_up() {
        let transport = Arc::new(ScriptedTransport::with_script(
            vec![Err(TransportError::Connect("down".to_owned()))],
            vec![],
        ));
        let runner = GatewayRunner::new(transport, EventDispatcher::default(), no_delay(0));
        let status = runner.status();
        assert!(status.is_running());

        runner.start().await.expect("runner should degrade gracefully");

        assert!(!status.is_running());
    }

    #[tokio::test]
    async fn events_are_handled_in_arrival_order() {
        let dir = TempDir::new().expect("tempdir");
        let registry =
            Arc::new(SubmissionRegistry::load(dir.path().join("used_users.txt")).expect("load"));
        let gateway = Arc::new(RecordingGateway::default());
        for message_id in 1..=3 {
            gateway.seed(MessageRef { channel_id: 10, message_id });
        }

        let mut dispatcher = EventDispatcher::new();
        dispatcher.register(SubmissionIntakeHandler::new(
            registry.clone(),
            gateway.clone(),
            CleanupScheduler::new(gateway.clone()),
            IntakePolicy::for_channels(10, 20),
        ));

        let transport = Arc::new(ScriptedTransport::with_script(
            vec![Ok(())],
            vec![
                envelope("1", message_event(10, 1, "U1", "Alex")),
                envelope("2", message_event(10, 2, "U1", "Bob")),
                envelope("3", message_event(10, 3, "U2", "Carol")),
                Ok(None),
            ],
        ));

        GatewayRunner::new(transport, dispatcher, no_delay(0))
            .start()
            .await
            .expect("runner should drain the script");

        let requests: Vec<String> =
            gateway.sent_to(20).into_iter().map(|message| message.content).collect();
        assert_eq!(requests.len(), 2);
        assert!(requests[0].contains("Alex"));
        assert!(requests[1].contains("Carol"));
        assert!(registry.has("U1"));
        assert!(registry.has("U2"));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn extracts_channel_and_user_correlation_fields() {
        let envelope = GatewayEnvelope {
            envelope_id: "env-2".to_owned(),
            event: message_event(10, 4, "U9", "Steve"),
        };

        let (channel_id, user_id) = super::correlation_fields(&envelope);
        assert_eq!(channel_id, Some(10));
        assert_eq!(user_id, Some("U9"));
    }

    #[test]
    fn backoff_is_capped() {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.backoff(0).as_millis(), 250);
        assert_eq!(policy.backoff(2).as_millis(), 1_000);
        assert_eq!(policy.backoff(10).as_millis(), 5_000);
    }
}
