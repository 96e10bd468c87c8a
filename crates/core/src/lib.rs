//! Core workflow types for the gatekeeper whitelist bridge.
//!
//! - **Config** (`config`) - layered defaults/file/env configuration
//! - **Registry** (`registry`) - append-only record of users who already submitted
//! - **Approval** (`approval`) - player names and encoded approval action identifiers
//! - **Executor** (`executor`) - contract for the external command executor

pub mod approval;
pub mod config;
pub mod executor;
pub mod registry;

pub use approval::{ActionParseError, ApprovalAction, ApprovalKind, NameError, PlayerName};
pub use executor::{CommandExecutor, ExecutionReceipt, ExecutorError};
pub use registry::{RegistryError, SubmissionRegistry};
