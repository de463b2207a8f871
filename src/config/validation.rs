// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Validation of loaded registry configuration.
//!
//! Every service is checked and every problem is reported, so a single pass
//! over a broken file lists all of its mistakes. Services are visited in name
//! order to keep the error list stable.
//!
//! # Checks
//!
//! * service names are not empty
//! * `cache.max_size` and `cache.max_age_ms` are not zero
//! * `cache.key` is not an empty field name, an empty path, or a path with an
//!   empty segment
//! * `executor_options.max_concurrency` is not zero

use crate::config::loader::{CacheSettings, KeySetting, RegistryConfig};
use crate::errors::ConfigError;

const EXECUTOR_OPTIONS: &str = "executor_options";

pub fn validate_registry_config(config: &RegistryConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    if config.executor_options.max_concurrency == Some(0) {
        errors.push(invalid(EXECUTOR_OPTIONS, "max_concurrency must be greater than 0"));
    }

    let mut names: Vec<&String> = config.services.keys().collect();
    names.sort();

    for name in names {
        if name.trim().is_empty() {
            errors.push(invalid(name, "service name must not be empty"));
        }
        if let Some(cache) = &config.services[name].cache {
            validate_cache(name, cache, &mut errors);
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_cache(service: &str, cache: &CacheSettings, errors: &mut Vec<ConfigError>) {
    if cache.max_size == Some(0) {
        errors.push(invalid(service, "cache.max_size must be greater than 0"));
    }
    if cache.max_age_ms == Some(0) {
        errors.push(invalid(service, "cache.max_age_ms must be greater than 0"));
    }
    match &cache.key {
        Some(KeySetting::Field(field)) if field.is_empty() => {
            errors.push(invalid(service, "cache.key must not be empty"));
        }
        Some(KeySetting::Path(segments)) if segments.is_empty() => {
            errors.push(invalid(service, "cache.key path must not be empty"));
        }
        Some(KeySetting::Path(segments)) if segments.iter().any(String::is_empty) => {
            errors.push(invalid(service, "cache.key path has an empty segment"));
        }
        _ => {}
    }
}

fn invalid(service: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        service: service.to_string(),
        reason: reason.to_string(),
    }
}
