// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Message types for per-service cache activity.

use crate::errors::ServiceError;
use crate::observability::messages::StructuredLog;
use std::fmt::{Display, Formatter};
use tracing::Span;

/// A lookup found a stored value; the node will not run its body.
///
/// # Log Level
/// `debug!`
pub struct CacheHit<'a> {
    pub service: &'a str,
    pub key: &'a str,
}

impl Display for CacheHit<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Cache hit for '{}' (key={})", self.service, self.key)
    }
}

impl StructuredLog for CacheHit<'_> {
    fn log(&self) {
        tracing::debug!(service = self.service, key = self.key, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::debug_span!("cache_hit", span_name = name, service = self.service, key = self.key)
    }
}

/// A value was stored under a new key.
///
/// # Log Level
/// `debug!`
pub struct CacheStored<'a> {
    pub service: &'a str,
    pub key: &'a str,
    pub entries: usize,
}

impl Display for CacheStored<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Cached value for '{}' (key={}, entries={})",
            self.service, self.key, self.entries
        )
    }
}

impl StructuredLog for CacheStored<'_> {
    fn log(&self) {
        tracing::debug!(
            service = self.service,
            key = self.key,
            entries = self.entries,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::debug_span!(
            "cache_stored",
            span_name = name,
            service = self.service,
            key = self.key,
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvictionReason {
    Expired,
    OverCapacity,
}

impl Display for EvictionReason {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            EvictionReason::Expired => f.write_str("expired"),
            EvictionReason::OverCapacity => f.write_str("over capacity"),
        }
    }
}

/// An entry was purged.
///
/// # Log Level
/// `debug!`
pub struct CacheEvicted<'a> {
    pub service: &'a str,
    pub key: &'a str,
    pub reason: EvictionReason,
}

impl Display for CacheEvicted<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Evicted cache entry for '{}' (key={}): {}",
            self.service, self.key, self.reason
        )
    }
}

impl StructuredLog for CacheEvicted<'_> {
    fn log(&self) {
        tracing::debug!(
            service = self.service,
            key = self.key,
            reason = %self.reason,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::debug_span!(
            "cache_evicted",
            span_name = name,
            service = self.service,
            key = self.key,
        )
    }
}

/// Deriving the key for a fresh value panicked; the value was not stored.
///
/// # Log Level
/// `warn!`
pub struct CacheWriteFailed<'a> {
    pub service: &'a str,
    pub error: &'a ServiceError,
}

impl Display for CacheWriteFailed<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Could not cache value for '{}': {}", self.service, self.error)
    }
}

impl StructuredLog for CacheWriteFailed<'_> {
    fn log(&self) {
        tracing::warn!(service = self.service, error = %self.error, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::warn_span!("cache_write_failed", span_name = name, service = self.service)
    }
}
