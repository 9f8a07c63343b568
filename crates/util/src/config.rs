use std::{env, fmt, net::SocketAddr};

use super::server_bind_address;

pub const DEFAULT_QUEUE_CAPACITY: usize = 256;
pub const MAX_QUEUE_CAPACITY: usize = 1 << 20;
pub const DEFAULT_DISCORD_API_BASE: &str = "https://discord.com/api/v10/";

/// Application runtime environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
    Test,
}

impl Environment {
    fn from_str(value: &str) -> Result<Self, ConfigError> {
        match value {
            "development" | "dev" => Ok(Self::Development),
            "production" | "prod" => Ok(Self::Production),
            "test" => Ok(Self::Test),
            other => Err(ConfigError::InvalidEnvironment(other.to_string())),
        }
    }

    /// Returns the canonical name used for logging/metrics labels.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
            Self::Test => "test",
        }
    }
}

/// Settings for the GitHub to Discord relay.
#[derive(Clone)]
pub struct RelayConfig {
    pub discord_token: String,
    pub channel_id: u64,
    /// Empty when unset; every webhook is then rejected.
    pub webhook_secret: String,
    pub queue_capacity: usize,
    pub discord_api_base: String,
}

impl fmt::Debug for RelayConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelayConfig")
            .field("discord_token", &"<redacted>")
            .field("channel_id", &self.channel_id)
            .field("webhook_secret", &"<redacted>")
            .field("queue_capacity", &self.queue_capacity)
            .field("discord_api_base", &self.discord_api_base)
            .finish()
    }
}

impl RelayConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let discord_token = env::var("DISCORD_TOKEN")
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .ok_or(ConfigError::Missing("DISCORD_TOKEN"))?;

        let channel_raw = env::var("DISCORD_CHANNEL_ID")
            .map_err(|_| ConfigError::Missing("DISCORD_CHANNEL_ID"))?;
        let channel_id = channel_raw
            .trim()
            .parse::<u64>()
            .map_err(|_| ConfigError::InvalidChannelId(channel_raw.clone()))?;

        let webhook_secret = env::var("GITHUB_WEBHOOK_SECRET").unwrap_or_default();

        let queue_capacity = match env::var("RELAY_QUEUE_CAPACITY") {
            Ok(raw) => match raw.trim().parse::<usize>() {
                Ok(value) if (1..=MAX_QUEUE_CAPACITY).contains(&value) => value,
                _ => return Err(ConfigError::InvalidQueueCapacity(raw)),
            },
            Err(_) => DEFAULT_QUEUE_CAPACITY,
        };

        // Relative API paths are joined onto the base, which drops its last segment
        // unless the base ends with a slash.
        let mut discord_api_base = env::var("DISCORD_API_BASE")
            .map(|value| value.trim().to_string())
            .ok()
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| DEFAULT_DISCORD_API_BASE.to_string());
        if !discord_api_base.ends_with('/') {
            discord_api_base.push('/');
        }

        Ok(Self {
            discord_token,
            channel_id,
            webhook_secret,
            queue_capacity,
            discord_api_base,
        })
    }
}

/// Runtime configuration resolved from environment variables.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub environment: Environment,
    pub relay: RelayConfig,
}

impl AppConfig {
    /// Constructs the configuration by reading and validating environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let env_value = env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());
        let environment = Environment::from_str(&env_value)?;
        let bind_addr = server_bind_address().map_err(ConfigError::BindAddress)?;
        let relay = RelayConfig::from_env()?;

        Ok(Self {
            bind_addr,
            environment,
            relay,
        })
    }
}

/// Errors that can occur during configuration loading.
#[derive(Debug)]
pub enum ConfigError {
    InvalidEnvironment(String),
    BindAddress(std::net::AddrParseError),
    Missing(&'static str),
    InvalidChannelId(String),
    InvalidQueueCapacity(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidEnvironment(value) => write!(
                f,
                "APP_ENV must be one of 'development', 'production', or 'test' (got {value})"
            ),
            Self::BindAddress(err) => write!(f, "invalid APP_BIND_ADDR/PORT value: {err}"),
            Self::Missing(name) => write!(f, "{name} must be set"),
            Self::InvalidChannelId(value) => {
                write!(f, "DISCORD_CHANNEL_ID must be a numeric id (got {value})")
            }
            Self::InvalidQueueCapacity(value) => write!(
                f,
                "RELAY_QUEUE_CAPACITY must be between 1 and {MAX_QUEUE_CAPACITY} (got {value})"
            ),
        }
    }
}

impl std::error::Error for ConfigError {}
