use async_trait::async_trait;
use thiserror::Error;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExecutionReceipt {
    pub message: Option<String>,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ExecutorError {
    #[error("command executor is unreachable: {detail}")]
    Unavailable { detail: String },
    #[error("command executor failed with status {status}")]
    ServerError { status: u16, detail: Option<String> },
    #[error("command executor rejected the command with status {status}")]
    Rejected { status: u16, detail: Option<String> },
    #[error("command executor returned a malformed response: {0}")]
    Malformed(String),
}

impl ExecutorError {
    /// Upstream `error` field, when the executor supplied one.
    pub fn detail(&self) -> Option<&str> {
        match self {
            Self::ServerError { detail, .. } | Self::Rejected { detail, .. } => detail.as_deref(),
            Self::Unavailable { .. } | Self::Malformed(_) => None,
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable { .. } | Self::ServerError { .. })
    }

    pub fn user_message(&self) -> String {
        format!("Error executing the command: {}", self.detail().unwrap_or("Unknown"))
    }
}

#[async_trait]
pub trait CommandExecutor: Send + Sync {
    async fn execute(&self, command: &str) -> Result<ExecutionReceipt, ExecutorError>;
}
