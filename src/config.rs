use crate::errors::AppResult;
use config::{Config, Environment, Map};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_DB_PATH: &str = "gpr_defects.db";
pub const DEFAULT_AGENT_BINARY: &str = "claude";
pub const DEFAULT_AGENT_MODEL: &str = "sonnet";
pub const DEFAULT_LOG_DIR: &str = "logs";
pub const DEFAULT_STATS_TTL_SECS: u64 = 60;

/// Every `GPR_<FIELD>` variable maps onto the matching `AppConfig` field.
pub const ENV_PREFIX: &str = "GPR";
/// The credential keeps the name the agent CLI itself reads.
pub const ENV_API_KEY: &str = "ANTHROPIC_API_KEY";
const API_KEY_PREFIX: &str = "ANTHROPIC";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub db_path: PathBuf,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub agent_binary: String,
    pub agent_model: String,
    pub agent_timeout_secs: Option<u64>,
    pub stats_ttl_secs: u64,
    /// Interactive history capacity; unbounded when unset.
    pub history_limit: Option<usize>,
    pub log_dir: PathBuf,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from(DEFAULT_DB_PATH),
            api_key: None,
            agent_binary: DEFAULT_AGENT_BINARY.to_string(),
            agent_model: DEFAULT_AGENT_MODEL.to_string(),
            agent_timeout_secs: None,
            stats_ttl_secs: DEFAULT_STATS_TTL_SECS,
            history_limit: None,
            log_dir: PathBuf::from(DEFAULT_LOG_DIR),
        }
    }
}

/// Values supplied explicitly on the command line; they win over the environment.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub db_path: Option<PathBuf>,
    pub api_key: Option<String>,
    pub agent_binary: Option<String>,
    pub agent_model: Option<String>,
}

impl AppConfig {
    pub fn from_env() -> AppResult<Self> {
        Self::load(None)
    }

    /// Same as [`AppConfig::from_env`] but reads `vars` instead of the process environment.
    pub fn from_vars(vars: &HashMap<String, String>) -> AppResult<Self> {
        Self::load(Some(vars.iter().map(|(key, value)| (key.clone(), value.clone())).collect()))
    }

    fn load(vars: Option<Map<String, String>>) -> AppResult<Self> {
        let config = Config::builder()
            .add_source(Environment::with_prefix(ENV_PREFIX).ignore_empty(true).source(vars.clone()))
            .add_source(Environment::with_prefix(API_KEY_PREFIX).ignore_empty(true).source(vars))
            .build()?
            .try_deserialize()?;
        Ok(config)
    }

    pub fn apply(mut self, overrides: ConfigOverrides) -> Self {
        if let Some(path) = overrides.db_path {
            self.db_path = path;
        }
        if let Some(key) = overrides.api_key {
            self.api_key = Some(key);
        }
        if let Some(binary) = overrides.agent_binary {
            self.agent_binary = binary;
        }
        if let Some(model) = overrides.agent_model {
            self.agent_model = model;
        }
        self
    }

    pub fn agent_timeout(&self) -> Option<Duration> {
        self.agent_timeout_secs.map(Duration::from_secs)
    }

    pub fn stats_ttl(&self) -> Duration {
        Duration::from_secs(self.stats_ttl_secs)
    }
}
