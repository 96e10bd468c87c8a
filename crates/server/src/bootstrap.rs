use std::sync::Arc;

use gatekeeper_core::config::{AppConfig, ConfigError};
use gatekeeper_core::{CommandExecutor, RegistryError, SubmissionRegistry};
use gatekeeper_discord::{
    approval::ApprovalActionHandler,
    bridge::{SerenityGateway, SerenityTransport},
    cleanup::CleanupScheduler,
    events::EventDispatcher,
    gateway::ChatGateway,
    intake::{IntakePolicy, SubmissionIntakeHandler},
    runner::{GatewayRunner, GatewayTransport, ReconnectPolicy},
};
use thiserror::Error;
use tracing::info;

use crate::executor::HttpCommandExecutor;

pub struct Application {
    pub config: AppConfig,
    pub registry: Arc<SubmissionRegistry>,
    pub cleanup: CleanupScheduler,
    pub runner: GatewayRunner,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error("command executor client could not be built: {0}")]
    ExecutorClient(#[source] reqwest::Error),
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let executor =
        HttpCommandExecutor::from_config(&config.executor).map_err(BootstrapError::ExecutorClient)?;
    let gateway = Arc::new(SerenityGateway::new(&config.discord.bot_token));
    let transport = Arc::new(SerenityTransport::new(config.discord.bot_token.clone(), gateway.clone()));

    assemble(config, gateway, transport, Arc::new(executor))
}

/// Loads the registry and wires both handlers onto one runner.
pub fn assemble(
    config: AppConfig,
    gateway: Arc<dyn ChatGateway>,
    transport: Arc<dyn GatewayTransport>,
    executor: Arc<dyn CommandExecutor>,
) -> Result<Application, BootstrapError> {
    let registry = Arc::new(SubmissionRegistry::load(config.registry.path.clone())?);
    info!(
        event_name = "system.bootstrap.registry_loaded",
        correlation_id = "bootstrap",
        path = %registry.path().display(),
        registered_users = registry.len(),
        "submission registry loaded"
    );

    let cleanup = CleanupScheduler::new(gateway.clone());
    let mut dispatcher = EventDispatcher::new();
    dispatcher.register(SubmissionIntakeHandler::new(
        registry.clone(),
        gateway.clone(),
        cleanup.clone(),
        IntakePolicy::from_config(&config.discord, &config.intake),
    ));
    dispatcher.register(ApprovalActionHandler::new(gateway, executor));
    info!(
        event_name = "system.bootstrap.handlers_registered",
        correlation_id = "bootstrap",
        handlers = dispatcher.handler_count(),
        input_channel_id = config.discord.input_channel_id,
        output_channel_id = config.discord.output_channel_id,
        "event handlers registered"
    );

    let runner = GatewayRunner::new(transport, dispatcher, ReconnectPolicy::default());

    Ok(Application { config, registry, cleanup, runner })
}
