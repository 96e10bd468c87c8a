use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub discord: DiscordConfig,
    pub executor: ExecutorConfig,
    pub registry: RegistryConfig,
    pub intake: IntakeConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DiscordConfig {
    pub bot_token: SecretString,
    pub token_file: Option<PathBuf>,
    pub input_channel_id: u64,
    pub output_channel_id: u64,
}

#[derive(Clone, Debug)]
pub struct ExecutorConfig {
    pub url: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
}

#[derive(Clone, Debug)]
pub struct RegistryConfig {
    pub path: PathBuf,
}

/// Cleanup delays applied to rejected submissions and the warning posted about them.
#[derive(Clone, Debug)]
pub struct IntakeConfig {
    pub duplicate_message_delete_ms: u64,
    pub warning_delete_ms: u64,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub health_check_port: u16,
    pub health_enabled: bool,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub bot_token: Option<String>,
    pub input_channel_id: Option<u64>,
    pub output_channel_id: Option<u64>,
    pub executor_url: Option<String>,
    pub registry_path: Option<PathBuf>,
    pub log_level: Option<String>,
    pub health_enabled: Option<bool>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("could not read discord token file `{path}`: {source}")]
    ReadTokenFile { path: PathBuf, source: std::io::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            discord: DiscordConfig {
                bot_token: String::new().into(),
                token_file: None,
                input_channel_id: 0,
                output_channel_id: 0,
            },
            executor: ExecutorConfig {
                url: "http://localhost:3000/execute-command".to_string(),
                timeout_secs: 10,
                max_retries: 1,
                retry_delay_ms: 250,
            },
            registry: RegistryConfig { path: PathBuf::from("used_users.txt") },
            intake: IntakeConfig { duplicate_message_delete_ms: 500, warning_delete_ms: 3_000 },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                health_check_port: 8080,
                health_enabled: true,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected =
                options.config_path.unwrap_or_else(|| PathBuf::from("gatekeeper.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.resolve_token_file()?;
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(discord) = patch.discord {
            if let Some(bot_token_value) = discord.bot_token {
                self.discord.bot_token = secret_value(bot_token_value);
            }
            if let Some(token_file) = discord.token_file {
                self.discord.token_file = Some(token_file);
            }
            if let Some(input_channel_id) = discord.input_channel_id {
                self.discord.input_channel_id = input_channel_id;
            }
            if let Some(output_channel_id) = discord.output_channel_id {
                self.discord.output_channel_id = output_channel_id;
            }
        }

        if let Some(executor) = patch.executor {
            if let Some(url) = executor.url {
                self.executor.url = url;
            }
            if let Some(timeout_secs) = executor.timeout_secs {
                self.executor.timeout_secs = timeout_secs;
            }
            if let Some(max_retries) = executor.max_retries {
                self.executor.max_retries = max_retries;
            }
            if let Some(retry_delay_ms) = executor.retry_delay_ms {
                self.executor.retry_delay_ms = retry_delay_ms;
            }
        }

        if let Some(registry) = patch.registry {
            if let Some(path) = registry.path {
                self.registry.path = path;
            }
        }

        if let Some(intake) = patch.intake {
            if let Some(delay) = intake.duplicate_message_delete_ms {
                self.intake.duplicate_message_delete_ms = delay;
            }
            if let Some(delay) = intake.warning_delete_ms {
                self.intake.warning_delete_ms = delay;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(health_check_port) = server.health_check_port {
                self.server.health_check_port = health_check_port;
            }
            if let Some(health_enabled) = server.health_enabled {
                self.server.health_enabled = health_enabled;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("GATEKEEPER_DISCORD_BOT_TOKEN") {
            self.discord.bot_token = secret_value(value);
        }
        if let Some(value) = read_env("GATEKEEPER_DISCORD_TOKEN_FILE") {
            self.discord.token_file = Some(PathBuf::from(value));
        }
        if let Some(value) = read_env("GATEKEEPER_INPUT_CHANNEL_ID") {
            self.discord.input_channel_id = parse_u64("GATEKEEPER_INPUT_CHANNEL_ID", &value)?;
        }
        if let Some(value) = read_env("GATEKEEPER_OUTPUT_CHANNEL_ID") {
            self.discord.output_channel_id = parse_u64("GATEKEEPER_OUTPUT_CHANNEL_ID", &value)?;
        }

        if let Some(value) = read_env("GATEKEEPER_EXECUTOR_URL") {
            self.executor.url = value;
        }
        if let Some(value) = read_env("GATEKEEPER_EXECUTOR_TIMEOUT_SECS") {
            self.executor.timeout_secs = parse_u64("GATEKEEPER_EXECUTOR_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("GATEKEEPER_EXECUTOR_MAX_RETRIES") {
            self.executor.max_retries = parse_u32("GATEKEEPER_EXECUTOR_MAX_RETRIES", &value)?;
        }
        if let Some(value) = read_env("GATEKEEPER_EXECUTOR_RETRY_DELAY_MS") {
            self.executor.retry_delay_ms =
                parse_u64("GATEKEEPER_EXECUTOR_RETRY_DELAY_MS", &value)?;
        }

        if let Some(value) = read_env("GATEKEEPER_REGISTRY_PATH") {
            self.registry.path = PathBuf::from(value);
        }

        if let Some(value) = read_env("GATEKEEPER_INTAKE_DUPLICATE_MESSAGE_DELETE_MS") {
            self.intake.duplicate_message_delete_ms =
                parse_u64("GATEKEEPER_INTAKE_DUPLICATE_MESSAGE_DELETE_MS", &value)?;
        }
        if let Some(value) = read_env("GATEKEEPER_INTAKE_WARNING_DELETE_MS") {
            self.intake.warning_delete_ms =
                parse_u64("GATEKEEPER_INTAKE_WARNING_DELETE_MS", &value)?;
        }

        if let Some(value) = read_env("GATEKEEPER_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("GATEKEEPER_SERVER_HEALTH_CHECK_PORT") {
            self.server.health_check_port =
                parse_u16("GATEKEEPER_SERVER_HEALTH_CHECK_PORT", &value)?;
        }
        if let Some(value) = read_env("GATEKEEPER_SERVER_HEALTH_ENABLED") {
            self.server.health_enabled = parse_bool("GATEKEEPER_SERVER_HEALTH_ENABLED", &value)?;
        }

        let log_level =
            read_env("GATEKEEPER_LOGGING_LEVEL").or_else(|| read_env("GATEKEEPER_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("GATEKEEPER_LOGGING_FORMAT").or_else(|| read_env("GATEKEEPER_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(bot_token) = overrides.bot_token {
            self.discord.bot_token = secret_value(bot_token);
        }
        if let Some(input_channel_id) = overrides.input_channel_id {
            self.discord.input_channel_id = input_channel_id;
        }
        if let Some(output_channel_id) = overrides.output_channel_id {
            self.discord.output_channel_id = output_channel_id;
        }
        if let Some(executor_url) = overrides.executor_url {
            self.executor.url = executor_url;
        }
        if let Some(registry_path) = overrides.registry_path {
            self.registry.path = registry_path;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(health_enabled) = overrides.health_enabled {
            self.server.health_enabled = health_enabled;
        }
    }

    /// An explicit token always wins over `discord.token_file`.
    fn resolve_token_file(&mut self) -> Result<(), ConfigError> {
        if !self.discord.bot_token.expose_secret().trim().is_empty() {
            return Ok(());
        }
        let Some(path) = &self.discord.token_file else {
            return Ok(());
        };

        let raw = fs::read_to_string(path)
            .map_err(|source| ConfigError::ReadTokenFile { path: path.clone(), source })?;
        self.discord.bot_token = secret_value(raw.trim().to_string());
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_discord(&self.discord)?;
        validate_executor(&self.executor)?;
        validate_registry(&self.registry)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("gatekeeper.toml"), PathBuf::from("config/gatekeeper.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_discord(discord: &DiscordConfig) -> Result<(), ConfigError> {
    if discord.bot_token.expose_secret().trim().is_empty() {
        return Err(ConfigError::Validation(
            "discord.bot_token is required (or point discord.token_file at a file containing it). Get it from https://discord.com/developers/applications > Your App > Bot".to_string(),
        ));
    }

    if discord.input_channel_id == 0 {
        return Err(ConfigError::Validation(
            "discord.input_channel_id must be set to the channel where players post their name"
                .to_string(),
        ));
    }

    if discord.output_channel_id == 0 {
        return Err(ConfigError::Validation(
            "discord.output_channel_id must be set to the channel where approval requests are posted"
                .to_string(),
        ));
    }

    Ok(())
}

fn validate_executor(executor: &ExecutorConfig) -> Result<(), ConfigError> {
    let url = executor.url.trim();
    if !url.starts_with("http://") && !url.starts_with("https://") {
        return Err(ConfigError::Validation(
            "executor.url must start with http:// or https://".to_string(),
        ));
    }

    if executor.timeout_secs == 0 || executor.timeout_secs > 120 {
        return Err(ConfigError::Validation(
            "executor.timeout_secs must be in range 1..=120".to_string(),
        ));
    }

    if executor.max_retries > 3 {
        return Err(ConfigError::Validation(
            "executor.max_retries must be at most 3".to_string(),
        ));
    }

    Ok(())
}

fn validate_registry(registry: &RegistryConfig) -> Result<(), ConfigError> {
    if registry.path.as_os_str().is_empty() {
        return Err(ConfigError::Validation("registry.path must not be empty".to_string()));
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.health_enabled && server.health_check_port == 0 {
        return Err(ConfigError::Validation(
            "server.health_check_port must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.trim().parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    value.parse::<bool>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    discord: Option<DiscordPatch>,
    executor: Option<ExecutorPatch>,
    registry: Option<RegistryPatch>,
    intake: Option<IntakePatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DiscordPatch {
    bot_token: Option<String>,
    token_file: Option<PathBuf>,
    input_channel_id: Option<u64>,
    output_channel_id: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ExecutorPatch {
    url: Option<String>,
    timeout_secs: Option<u64>,
    max_retries: Option<u32>,
    retry_delay_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct RegistryPatch {
    path: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
struct IntakePatch {
    duplicate_message_delete_ms: Option<u64>,
    warning_delete_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    health_check_port: Option<u16>,
    health_enabled: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
