// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Key used when a cache is configured without a key: a single slot.
pub const DEFAULT_CACHE_KEY: &str = "_default";

pub type KeyFn = dyn Fn(&Value) -> String + Send + Sync;

/// How a cache key is derived from a run-time configuration.
#[derive(Clone, Default)]
pub enum CacheKey {
    /// Every configuration maps to the same key.
    #[default]
    Constant,
    /// The value of one top-level field.
    Field(String),
    /// The value found by walking nested fields (array segments may be indices).
    Path(Vec<String>),
    /// An arbitrary function of the whole configuration.
    Custom(Arc<KeyFn>),
}

impl CacheKey {
    pub fn field(name: impl Into<String>) -> Self {
        CacheKey::Field(name.into())
    }

    pub fn path<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        CacheKey::Path(segments.into_iter().map(Into::into).collect())
    }

    pub fn custom<F>(key_fn: F) -> Self
    where
        F: Fn(&Value) -> String + Send + Sync + 'static,
    {
        CacheKey::Custom(Arc::new(key_fn))
    }

    /// Derive the key for `config`.
    ///
    /// Strings are used as-is; any other value, structured or not, is rendered
    /// as JSON. A missing field derives the key `null`.
    pub fn derive(&self, config: &Value) -> String {
        match self {
            CacheKey::Constant => DEFAULT_CACHE_KEY.to_string(),
            CacheKey::Field(name) => render(config.get(name.as_str())),
            CacheKey::Path(segments) => {
                let found = segments
                    .iter()
                    .try_fold(config, |value, segment| lookup(value, segment));
                render(found)
            }
            CacheKey::Custom(key_fn) => key_fn(config),
        }
    }
}

fn lookup<'v>(value: &'v Value, segment: &str) -> Option<&'v Value> {
    match value {
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        other => other.get(segment),
    }
}

fn render(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(text)) => text.clone(),
        Some(other) => other.to_string(),
        None => Value::Null.to_string(),
    }
}

impl fmt::Debug for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheKey::Constant => f.write_str("Constant"),
            CacheKey::Field(name) => f.debug_tuple("Field").field(name).finish(),
            CacheKey::Path(segments) => f.debug_tuple("Path").field(segments).finish(),
            CacheKey::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}
