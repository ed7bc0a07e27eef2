use crate::schedule;
use chrono_tz::Tz;
use config::{builder::DefaultState, Config, ConfigBuilder, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const ENV_PREFIX: &str = "MAKEUPD";

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub workspace: Option<PathBuf>,
    #[serde(default = "default_time_zone")]
    pub time_zone: String,
    #[serde(default = "default_code_attempts")]
    pub code_attempts: usize,
    #[serde(default)]
    pub reject_expired: bool,
    #[serde(default = "default_recent_activity_limit")]
    pub recent_activity_limit: usize,
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

fn default_time_zone() -> String {
    "UTC".to_string()
}

fn default_code_attempts() -> usize {
    5
}

fn default_recent_activity_limit() -> usize {
    5
}

fn default_busy_timeout_ms() -> u64 {
    5000
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            workspace: None,
            time_zone: default_time_zone(),
            code_attempts: default_code_attempts(),
            reject_expired: false,
            recent_activity_limit: default_recent_activity_limit(),
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }
}

impl Settings {
    /// Loads `path` (or an optional `makeupd.toml` in the working directory),
    /// then applies `MAKEUPD__*` environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let file = match path {
            Some(p) => File::from(p).required(true),
            None => File::with_name("makeupd").required(false),
        };
        let builder = Config::builder()
            .add_source(file)
            .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));
        Self::from_builder(builder)
    }

    fn from_builder(builder: ConfigBuilder<DefaultState>) -> Result<Self, ConfigError> {
        let settings: Settings = builder.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        schedule::parse_time_zone(&self.time_zone)
            .map_err(|e| ConfigError::Message(e.to_string()))?;
        if self.code_attempts == 0 {
            return Err(ConfigError::Message(
                "code_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// The configured zone. `validate` has already rejected unknown names.
    pub fn tz(&self) -> Tz {
        schedule::parse_time_zone(&self.time_zone).unwrap_or(Tz::UTC)
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}
