// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::cache::{CacheConfig, CacheKey};
use crate::config::validation::validate_registry_config;
use crate::errors::ConfigError;

/// Declarative settings for a registry.
///
/// Service bodies and dependencies are code; everything else about a service
/// can be set here and applied with [`Registry::apply_config`](crate::registry::Registry::apply_config).
///
/// # Example
/// ```yaml
/// executor_options:
///   max_concurrency: 4
/// services:
///   user:
///     description: "Fetch a user"
///     metadata: { owner: "accounts" }
///     cache:
///       key: "id"
///       max_age_ms: 60000
///       max_size: 100
///     on_error: null
/// ```
#[derive(Debug, Default, Deserialize, PartialEq)]
pub struct RegistryConfig {
    #[serde(default)]
    pub executor_options: ExecutorOptions,
    #[serde(default)]
    pub services: HashMap<String, ServiceSettings>,
}

/// Options for the scheduler.
///
/// # Fields
/// * `max_concurrency` - Maximum number of service bodies executing at once (optional)
#[derive(Debug, Default, Deserialize, PartialEq)]
pub struct ExecutorOptions {
    pub max_concurrency: Option<usize>,
}

#[derive(Debug, Default, Deserialize, PartialEq)]
pub struct ServiceSettings {
    pub description: Option<String>,
    pub metadata: Option<Value>,
    pub cache: Option<CacheSettings>,
    /// Present (even as `null`) means errors are replaced by this value.
    #[serde(default, deserialize_with = "present")]
    pub on_error: Option<Value>,
}

fn present<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

/// Cache policy for one service. Omitted limits are unbounded.
#[derive(Debug, Default, Deserialize, PartialEq)]
pub struct CacheSettings {
    pub key: Option<KeySetting>,
    pub max_age_ms: Option<u64>,
    pub max_size: Option<usize>,
}

/// A top-level field name, or a path into nested config.
#[derive(Debug, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum KeySetting {
    Field(String),
    Path(Vec<String>),
}

impl CacheSettings {
    pub fn to_cache_config(&self) -> CacheConfig {
        let key = match &self.key {
            None => CacheKey::Constant,
            Some(KeySetting::Field(name)) => CacheKey::field(name.clone()),
            Some(KeySetting::Path(segments)) => CacheKey::path(segments.clone()),
        };
        CacheConfig {
            key,
            max_age: self.max_age_ms.map(Duration::from_millis),
            max_size: self.max_size,
        }
    }
}

/// Load a config from a YAML (`.yaml`, `.yml`) or TOML (`.toml`) file.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<RegistryConfig, ConfigError> {
    let path = path.as_ref();
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);

    let is_toml = match extension.as_deref() {
        Some("yaml") | Some("yml") => false,
        Some("toml") => true,
        _ => return Err(ConfigError::UnsupportedFormat(path.to_path_buf())),
    };

    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let cfg = if is_toml {
        toml::from_str(&content)?
    } else {
        serde_yaml::from_str(&content)?
    };
    Ok(cfg)
}

/// Load a config and reject values that cannot be applied.
pub fn load_and_validate_config<P: AsRef<Path>>(path: P) -> Result<RegistryConfig, ConfigError> {
    let cfg = load_config(path)?;
    validate_registry_config(&cfg).map_err(ConfigError::Validation)?;
    Ok(cfg)
}
