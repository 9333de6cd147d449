//! System configuration parsing.

use std::path::Path;
use std::time::Duration;

use crate::{ConfigError, ConfigResult};
use kdl::{KdlDocument, KdlNode};
use serde::{Deserialize, Serialize};
use sysupgrade_core::DEFAULT_HASH_LENGTH;

/// System-wide configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SystemConfig {
    pub database: DatabaseConfig,
    pub queue: QueueConfig,
    pub worker: WorkerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Connection URL. `DATABASE_URL` takes precedence when set.
    pub url: Option<String>,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Number of hex digits kept from the request hash.
    pub hash_length: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            hash_length: DEFAULT_HASH_LENGTH,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// How long a worker sleeps when the queue is empty.
    pub idle_interval: Duration,
    /// How long a worker sleeps after a store error.
    pub error_backoff: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            idle_interval: Duration::from_secs(1),
            error_backoff: Duration::from_secs(5),
        }
    }
}

/// Read and parse a configuration file.
pub fn load_system_config(path: impl AsRef<Path>) -> ConfigResult<SystemConfig> {
    let content = std::fs::read_to_string(path)?;
    parse_system_config(&content)
}

/// Parse system configuration from KDL text.
///
/// Every section is optional; missing values keep their defaults.
pub fn parse_system_config(kdl: &str) -> ConfigResult<SystemConfig> {
    let doc: KdlDocument = kdl.parse()?;
    let mut config = SystemConfig::default();
    let mut seen = Vec::new();

    for node in doc.nodes() {
        let section = node.name().value();
        if seen.contains(&section) {
            return Err(ConfigError::Duplicate(section.to_string()));
        }
        seen.push(section);

        match section {
            "database" => parse_database(node, &mut config.database)?,
            "queue" => parse_queue(node, &mut config.queue)?,
            "worker" => parse_worker(node, &mut config.worker)?,
            _ => {} // Ignore unknown nodes
        }
    }

    Ok(config)
}

fn parse_database(node: &KdlNode, database: &mut DatabaseConfig) -> ConfigResult<()> {
    for child in children(node) {
        match child.name().value() {
            "url" => {
                let url = get_first_string_arg(child)
                    .ok_or_else(|| ConfigError::MissingField("database.url".to_string()))?;
                database.url = Some(url);
            }
            "max-connections" => {
                let value = get_integer_arg(child, "database.max-connections")?;
                database.max_connections = u32::try_from(value)
                    .ok()
                    .filter(|n| *n > 0)
                    .ok_or_else(|| ConfigError::InvalidValue {
                        field: "database.max-connections".to_string(),
                        message: format!("expected a positive integer, got {}", value),
                    })?;
            }
            _ => {}
        }
    }
    Ok(())
}

fn parse_queue(node: &KdlNode, queue: &mut QueueConfig) -> ConfigResult<()> {
    for child in children(node) {
        if child.name().value() == "hash-length" {
            let value = get_integer_arg(child, "queue.hash-length")?;
            let length = usize::try_from(value).unwrap_or(0);
            sysupgrade_core::fingerprint::check_length(length).map_err(|e| {
                ConfigError::InvalidValue {
                    field: "queue.hash-length".to_string(),
                    message: e.to_string(),
                }
            })?;
            queue.hash_length = length;
        }
    }
    Ok(())
}

fn parse_worker(node: &KdlNode, worker: &mut WorkerConfig) -> ConfigResult<()> {
    for child in children(node) {
        match child.name().value() {
            "idle-interval" => {
                worker.idle_interval = get_seconds_arg(child, "worker.idle-interval")?;
            }
            "error-backoff" => {
                worker.error_backoff = get_seconds_arg(child, "worker.error-backoff")?;
            }
            _ => {}
        }
    }
    Ok(())
}

// Helper functions for extracting values from KDL nodes

fn children(node: &KdlNode) -> impl Iterator<Item = &KdlNode> {
    node.children()
        .into_iter()
        .flat_map(|children| children.nodes().iter())
}

fn get_first_string_arg(node: &KdlNode) -> Option<String> {
    node.entries()
        .iter()
        .find(|e| e.name().is_none())
        .and_then(|e| e.value().as_string())
        .map(|s| s.to_string())
}

fn get_integer_arg(node: &KdlNode, field: &str) -> ConfigResult<i128> {
    node.entries()
        .iter()
        .find(|e| e.name().is_none())
        .ok_or_else(|| ConfigError::MissingField(field.to_string()))?
        .value()
        .as_integer()
        .ok_or_else(|| ConfigError::InvalidValue {
            field: field.to_string(),
            message: "expected an integer".to_string(),
        })
}

fn get_seconds_arg(node: &KdlNode, field: &str) -> ConfigResult<Duration> {
    let value = get_integer_arg(node, field)?;
    u64::try_from(value)
        .map(Duration::from_secs)
        .map_err(|_| ConfigError::InvalidValue {
            field: field.to_string(),
            message: format!("expected a non-negative number of seconds, got {}", value),
        })
}
