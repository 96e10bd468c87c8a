//! Discord Integration - whitelist submission and approval bot
//!
//! This crate provides the chat-facing half of gatekeeper:
//! - **Gateway** (`gateway`) - `ChatGateway` trait for posting, replying, deleting and answering interactions
//! - **Events** (`events`) - normalized gateway events and the `EventDispatcher`
//! - **Intake** (`intake`) - one name per user from the input channel, approval request to the output channel
//! - **Approval** (`approval`) - Whitelist/Reject buttons forwarded to the command executor
//! - **Cleanup** (`cleanup`) - cancellable delayed message deletion
//! - **Runner** (`runner`) - sequential event pump with reconnection logic
//! - **Bridge** (`bridge`) - serenity-backed gateway and transport
//!
//! # Architecture
//!
//! ```text
//! Discord gateway → SerenityTransport → GatewayRunner → EventDispatcher
//!                                                          ├─ SubmissionIntakeHandler → SubmissionRegistry
//!                                                          └─ ApprovalActionHandler   → CommandExecutor
//! ```

pub mod approval;
pub mod blocks;
pub mod bridge;
pub mod cleanup;
pub mod events;
pub mod gateway;
pub mod intake;
pub mod runner;

#[cfg(test)]
pub(crate) mod testing;
