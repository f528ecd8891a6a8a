pub mod render;

use serde::{Deserialize, Serialize};
use std::time::Duration;

pub use render::{RenderConfig, RenderHooks, ShellTemplate};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OrderingMode {
    Fifo,
    Priority,
    #[default]
    Completion,
}

impl std::fmt::Display for OrderingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderingMode::Fifo => write!(f, "fifo"),
            OrderingMode::Priority => write!(f, "priority"),
            OrderingMode::Completion => write!(f, "completion"),
        }
    }
}

impl std::str::FromStr for OrderingMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "fifo" => Ok(OrderingMode::Fifo),
            "priority" => Ok(OrderingMode::Priority),
            "completion" => Ok(OrderingMode::Completion),
            _ => Err(ConfigError::InvalidOrderingMode(s.to_string())),
        }
    }
}

/// `boundary_timeout_ms = None` lets a unit render forever. In priority mode
/// that would hold every lower-ranked completed unit for good, so
/// `validate` requires a timeout there.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub concurrency_limit: usize,
    pub shell_timeout_ms: Option<u64>,
    pub boundary_timeout_ms: Option<u64>,
    pub ordering_mode: OrderingMode,
    pub out_of_order: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            concurrency_limit: 10,
            shell_timeout_ms: Some(8000),
            boundary_timeout_ms: Some(10_000),
            ordering_mode: OrderingMode::Completion,
            out_of_order: true,
        }
    }
}

impl SchedulerConfig {
    pub fn shell_timeout(&self) -> Option<Duration> {
        self.shell_timeout_ms.map(Duration::from_millis)
    }

    pub fn boundary_timeout(&self) -> Option<Duration> {
        self.boundary_timeout_ms.map(Duration::from_millis)
    }

    pub fn with_concurrency_limit(mut self, limit: usize) -> Self {
        self.concurrency_limit = limit;
        self
    }

    pub fn with_ordering(mut self, mode: OrderingMode) -> Self {
        self.ordering_mode = mode;
        self
    }

    pub fn with_boundary_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.boundary_timeout_ms = timeout.map(duration_to_ms);
        self
    }

    pub fn with_shell_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.shell_timeout_ms = timeout.map(duration_to_ms);
        self
    }

    pub fn in_order(mut self) -> Self {
        self.out_of_order = false;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.concurrency_limit == 0 {
            return Err(ConfigError::InvalidConfig("concurrency_limit must be at least 1".into()));
        }
        if self.shell_timeout_ms == Some(0) {
            return Err(ConfigError::InvalidTimeout("shell_timeout_ms".into()));
        }
        if self.boundary_timeout_ms == Some(0) {
            return Err(ConfigError::InvalidTimeout("boundary_timeout_ms".into()));
        }
        if self.out_of_order
            && self.ordering_mode == OrderingMode::Priority
            && self.boundary_timeout_ms.is_none()
        {
            return Err(ConfigError::InvalidTimeout(
                "boundary_timeout_ms is required in priority mode".into(),
            ));
        }
        Ok(())
    }
}

fn duration_to_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolConfig {
    pub verbose_errors: bool,
    pub error_message: String,
    pub runtime_name_prefix: String,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            verbose_errors: false,
            error_message: "Something went wrong while loading this section.".to_string(),
            runtime_name_prefix: "__weft_".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    pub channel_capacity: usize,
    pub resumable: bool,
    pub slow_render_threshold_ms: u64,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self { channel_capacity: 64, resumable: false, slow_render_threshold_ms: 2000 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { host: "127.0.0.1".to_string(), port: 3000 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub scheduler: SchedulerConfig,
    pub protocol: ProtocolConfig,
    pub stream: StreamConfig,
    pub server: ServerConfig,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env_vars()?;
        Ok(config)
    }

    /// Overlays `WEFT_*` environment variables onto this config.
    pub fn apply_env_vars(&mut self) -> Result<(), ConfigError> {
        self.apply_env(|key| std::env::var(key).ok())
    }

    pub(crate) fn apply_env<F>(&mut self, var: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = var("WEFT_HOST") {
            self.server.host = host;
        }

        if let Some(port_str) = var("WEFT_PORT") {
            self.server.port = port_str.parse().map_err(|_| ConfigError::InvalidPort(port_str))?;
        }

        if let Some(limit_str) = var("WEFT_CONCURRENCY_LIMIT") {
            self.scheduler.concurrency_limit = limit_str
                .parse()
                .map_err(|_| ConfigError::InvalidConfig("WEFT_CONCURRENCY_LIMIT".to_string()))?;
        }

        if let Some(timeout_str) = var("WEFT_SHELL_TIMEOUT_MS") {
            self.scheduler.shell_timeout_ms = parse_optional_ms(&timeout_str)?;
        }

        if let Some(timeout_str) = var("WEFT_BOUNDARY_TIMEOUT_MS") {
            self.scheduler.boundary_timeout_ms = parse_optional_ms(&timeout_str)?;
        }

        if let Some(mode_str) = var("WEFT_ORDERING_MODE") {
            self.scheduler.ordering_mode = mode_str.parse()?;
        }

        if let Some(out_of_order) = var("WEFT_OUT_OF_ORDER") {
            self.scheduler.out_of_order = is_truthy(&out_of_order);
        }

        if let Some(verbose) = var("WEFT_VERBOSE_ERRORS") {
            self.protocol.verbose_errors = is_truthy(&verbose);
        }

        if let Some(resumable) = var("WEFT_RESUMABLE") {
            self.stream.resumable = is_truthy(&resumable);
        }

        if let Some(capacity_str) = var("WEFT_CHANNEL_CAPACITY") {
            self.stream.channel_capacity = capacity_str
                .parse()
                .map_err(|_| ConfigError::InvalidConfig("WEFT_CHANNEL_CAPACITY".to_string()))?;
        }

        Ok(())
    }

    pub fn from_file<P: AsRef<std::path::Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(ConfigError::FileRead)?;

        let config: Self = toml::from_str(&contents).map_err(ConfigError::TomlParse)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save_to_file<P: AsRef<std::path::Path>>(&self, path: P) -> Result<(), ConfigError> {
        let contents = toml::to_string_pretty(self).map_err(ConfigError::TomlSerialize)?;

        std::fs::write(path, contents).map_err(ConfigError::FileWrite)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.scheduler.validate()?;
        if self.stream.channel_capacity == 0 {
            return Err(ConfigError::InvalidConfig("channel_capacity must be at least 1".into()));
        }
        Ok(())
    }

    pub fn server_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

fn parse_optional_ms(value: &str) -> Result<Option<u64>, ConfigError> {
    match value.to_lowercase().as_str() {
        "" | "none" | "off" => Ok(None),
        other => other
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidTimeout(value.to_string())),
    }
}

fn is_truthy(value: &str) -> bool {
    let lower = value.to_lowercase();
    lower == "true" || lower == "1" || lower == "yes"
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid ordering mode: {0}")]
    InvalidOrderingMode(String),

    #[error("Invalid port: {0}")]
    InvalidPort(String),

    #[error("Invalid timeout: {0}")]
    InvalidTimeout(String),

    #[error("Invalid config value for {0}")]
    InvalidConfig(String),

    #[error("Failed to read config file: {0}")]
    FileRead(std::io::Error),

    #[error("Failed to write config file: {0}")]
    FileWrite(std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    TomlParse(toml::de::Error),

    #[error("Failed to serialize TOML: {0}")]
    TomlSerialize(toml::ser::Error),
}
