// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Per-service result cache with age and size eviction.
//!
//! Entries are kept newest-first in insertion order. Eviction is pull-based:
//! stale and surplus entries are purged when the cache is read or written,
//! never by a background timer. Size eviction keeps the newest `max_size`
//! insertions; reads do not refresh an entry's position.
//!
//! A store is shared by every run that references its service, so all state
//! sits behind one mutex and `get`, `put` and `purge` each run under a single
//! lock acquisition.

use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use tokio::time::Instant;

use crate::cache::CacheConfig;
use crate::observability::messages::cache::{CacheEvicted, CacheHit, CacheStored, EvictionReason};
use crate::observability::messages::StructuredLog;

#[derive(Debug)]
struct CacheEntry {
    value: Value,
    inserted_at: Instant,
}

#[derive(Debug, Default)]
struct CacheState {
    entries: HashMap<String, CacheEntry>,
    /// Keys of `entries`, newest first.
    order: VecDeque<String>,
    paused: bool,
    disabled: bool,
}

#[derive(Debug)]
pub struct CacheStore {
    service: String,
    config: CacheConfig,
    state: Mutex<CacheState>,
}

impl CacheStore {
    pub fn new(service: impl Into<String>, config: CacheConfig) -> Self {
        Self {
            service: service.into(),
            config,
            state: Mutex::new(CacheState::default()),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn key_for(&self, config: &Value) -> String {
        self.config.key.derive(config)
    }

    /// Look up the value stored for `config`. Paused or disabled caches always miss.
    pub fn get(&self, config: &Value) -> Option<Value> {
        let key = self.key_for(config);
        let mut state = self.state.lock();
        self.purge_locked(&mut state);
        if state.paused || state.disabled {
            return None;
        }

        let hit = state.entries.get(&key).map(|entry| entry.value.clone());
        if hit.is_some() {
            CacheHit {
                service: &self.service,
                key: &key,
            }
            .log();
        }
        hit
    }

    /// Store `value` for `config`. The first value stored under a key wins.
    pub fn put(&self, config: &Value, value: Value) {
        let key = self.key_for(config);
        let mut state = self.state.lock();
        if state.disabled {
            return;
        }

        if state.entries.contains_key(&key) {
            return;
        }
        state.entries.insert(
            key.clone(),
            CacheEntry {
                value,
                inserted_at: Instant::now(),
            },
        );
        state.order.push_front(key.clone());
        self.purge_locked(&mut state);

        CacheStored {
            service: &self.service,
            key: &key,
            entries: state.entries.len(),
        }
        .log();
    }

    pub fn purge(&self) {
        let mut state = self.state.lock();
        self.purge_locked(&mut state);
    }

    fn purge_locked(&self, state: &mut CacheState) {
        if let Some(max_age) = self.config.max_age {
            let now = Instant::now();
            let CacheState { entries, order, .. } = state;
            order.retain(|key| {
                let expired = entries
                    .get(key)
                    .map(|entry| now.duration_since(entry.inserted_at) > max_age)
                    .unwrap_or(true);
                if expired {
                    entries.remove(key);
                    CacheEvicted {
                        service: &self.service,
                        key,
                        reason: EvictionReason::Expired,
                    }
                    .log();
                }
                !expired
            });
        }

        if let Some(max_size) = self.config.max_size {
            while state.order.len() > max_size {
                if let Some(key) = state.order.pop_back() {
                    state.entries.remove(&key);
                    CacheEvicted {
                        service: &self.service,
                        key: &key,
                        reason: EvictionReason::OverCapacity,
                    }
                    .log();
                }
            }
        }
    }

    pub fn pause(&self) {
        self.state.lock().paused = true;
    }

    pub fn resume(&self) {
        self.state.lock().paused = false;
    }

    /// Drop every entry; pause and disable flags are kept.
    pub fn reset(&self) {
        let mut state = self.state.lock();
        state.entries.clear();
        state.order.clear();
    }

    /// Turn the cache off for good: drops every entry, reads miss and writes are ignored.
    pub fn disable(&self) {
        let mut state = self.state.lock();
        state.disabled = true;
        state.entries.clear();
        state.order.clear();
    }

    pub fn is_paused(&self) -> bool {
        self.state.lock().paused
    }

    pub fn is_enabled(&self) -> bool {
        !self.state.lock().disabled
    }

    pub fn contains(&self, config: &Value) -> bool {
        let key = self.key_for(config);
        self.state.lock().entries.contains_key(&key)
    }

    /// Stored keys, newest first.
    pub fn keys(&self) -> Vec<String> {
        self.state.lock().order.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
