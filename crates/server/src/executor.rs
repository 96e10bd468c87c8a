use std::time::Duration;

use async_trait::async_trait;
use gatekeeper_core::{config::ExecutorConfig, CommandExecutor, ExecutionReceipt, ExecutorError};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

#[derive(Serialize)]
struct CommandRequest<'a> {
    command: &'a str,
}

#[derive(Deserialize)]
struct ExecutorReply {
    message: Option<String>,
    error: Option<String>,
}

/// Posts commands to the game server's command endpoint.
pub struct HttpCommandExecutor {
    client: Client,
    url: String,
    max_retries: u32,
    retry_delay: Duration,
}

impl HttpCommandExecutor {
    pub fn from_config(config: &ExecutorConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(Duration::from_secs(config.timeout_secs)).build()?;
        Ok(Self {
            client,
            url: config.url.clone(),
            max_retries: config.max_retries,
            retry_delay: Duration::from_millis(config.retry_delay_ms),
        })
    }

    async fn attempt(&self, command: &str) -> Result<ExecutionReceipt, ExecutorError> {
        let response = self
            .client
            .post(&self.url)
            .json(&CommandRequest { command })
            .send()
            .await
            .map_err(|error| ExecutorError::Unavailable { detail: error.to_string() })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|error| ExecutorError::Unavailable { detail: error.to_string() })?;

        classify(status, &body)
    }
}

#[async_trait]
impl CommandExecutor for HttpCommandExecutor {
    async fn execute(&self, command: &str) -> Result<ExecutionReceipt, ExecutorError> {
        let mut attempt = 0;
        loop {
            match self.attempt(command).await {
                Ok(receipt) => {
                    debug!(
                        event_name = "executor.request.succeeded",
                        attempt,
                        command,
                        "executor accepted command"
                    );
                    return Ok(receipt);
                }
                Err(error) if error.is_transient() && attempt < self.max_retries => {
                    warn!(
                        event_name = "executor.request.retrying",
                        attempt,
                        max_retries = self.max_retries,
                        error = %error,
                        "transient executor failure; retrying"
                    );
                    attempt += 1;
                    if !self.retry_delay.is_zero() {
                        tokio::time::sleep(self.retry_delay).await;
                    }
                }
                Err(error) => return Err(error),
            }
        }
    }
}

fn classify(status: StatusCode, body: &str) -> Result<ExecutionReceipt, ExecutorError> {
    if status.is_success() {
        if body.trim().is_empty() {
            return Ok(ExecutionReceipt::default());
        }
        return serde_json::from_str::<ExecutorReply>(body)
            .map(|reply| ExecutionReceipt { message: reply.message })
            .map_err(|error| ExecutorError::Malformed(error.to_string()));
    }

    let detail = serde_json::from_str::<ExecutorReply>(body)
        .ok()
        .and_then(|reply| reply.error)
        .filter(|detail| !detail.trim().is_empty());

    if status.is_server_error() {
        Err(ExecutorError::ServerError { status: status.as_u16(), detail })
    } else {
        Err(ExecutorError::Rejected { status: status.as_u16(), detail })
    }
}
