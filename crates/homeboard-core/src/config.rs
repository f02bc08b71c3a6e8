use std::collections::BTreeMap;

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::types::Schedule;

pub const DEFAULT_PORT: u16 = 8642;
pub const DEFAULT_BIND: &str = "127.0.0.1";

/// Top-level config (homeboard.toml + HOMEBOARD_* env overrides).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HomeboardConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    /// One entry per recurring task, keyed by task name. The schedule
    /// parameters here are what `ensure_scheduled` persists at startup.
    #[serde(default)]
    pub tasks: BTreeMap<String, TaskEntry>,
}

impl Default for HomeboardConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            database: DatabaseConfig::default(),
            tasks: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: DEFAULT_BIND.to_string(),
            port: DEFAULT_PORT,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

/// One configured dashboard task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskEntry {
    pub schedule: Schedule,
    /// Disabled entries are neither persisted nor armed at startup.
    #[serde(default = "bool_true")]
    pub enabled: bool,
    /// Opaque settings forwarded to the registered runnable.
    #[serde(default)]
    pub settings: serde_json::Value,
}

fn bool_true() -> bool {
    true
}

fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}
fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_db_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.homeboard/homeboard.db", home)
}

impl HomeboardConfig {
    /// Load config from a TOML file with HOMEBOARD_* env var overrides.
    ///
    /// Checks in order:
    ///   1. Explicit path argument
    ///   2. ~/.homeboard/homeboard.toml
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        let config: HomeboardConfig = Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed("HOMEBOARD_").split("_"))
            .extract()
            .map_err(|e| crate::error::HomeboardError::Config(e.to_string()))?;

        Ok(config)
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.homeboard/homeboard.toml", home)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn from_toml(raw: &str) -> HomeboardConfig {
        Figment::new()
            .merge(Toml::string(raw))
            .extract()
            .expect("parse failed")
    }

    #[test]
    fn parses_task_table() {
        let raw = r#"
            [server]
            port = 9000

            [tasks.weather]
            schedule = { kind = "interval_seconds", interval_seconds = 3600 }
            settings = { city = "Dallas" }

            [tasks.prayer]
            schedule = { kind = "daily", time = "04:30" }
            enabled = false
        "#;
        let config = from_toml(raw);
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.bind, DEFAULT_BIND);

        let weather = &config.tasks["weather"];
        assert!(weather.enabled);
        assert_eq!(
            weather.schedule,
            Schedule::IntervalSeconds {
                interval_seconds: 3600
            }
        );
        assert_eq!(weather.settings["city"], "Dallas");

        assert!(!config.tasks["prayer"].enabled);
    }

    #[test]
    fn defaults_when_empty() {
        let config = from_toml("");
        assert_eq!(config.server.port, DEFAULT_PORT);
        assert!(config.tasks.is_empty());
        assert!(config.database.path.ends_with("homeboard.db"));
    }
}
