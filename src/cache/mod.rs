// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

mod key;
mod store;

pub use key::{CacheKey, KeyFn, DEFAULT_CACHE_KEY};
pub use store::CacheStore;

use std::time::Duration;

/// Caching policy for one service. Unset limits are unbounded.
#[derive(Debug, Clone, Default)]
pub struct CacheConfig {
    pub key: CacheKey,
    pub max_age: Option<Duration>,
    pub max_size: Option<usize>,
}

impl CacheConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_key(mut self, key: CacheKey) -> Self {
        self.key = key;
        self
    }

    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = Some(max_age);
        self
    }

    pub fn with_max_size(mut self, max_size: usize) -> Self {
        self.max_size = Some(max_size);
        self
    }
}
