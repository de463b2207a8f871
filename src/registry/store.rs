// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::registry::Registry;

pub type SharedRegistry = Arc<RwLock<Registry>>;

/// Named registries shared between the parts of an application.
///
/// Construct one where the application starts and pass it to whoever needs a
/// registry by name.
#[derive(Default, Clone)]
pub struct RegistryStore {
    registries: Arc<Mutex<HashMap<String, SharedRegistry>>>,
}

impl RegistryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The registry named `name`, created empty if it does not exist.
    pub fn get_or_init(&self, name: &str) -> SharedRegistry {
        let mut registries = self.registries.lock();
        Arc::clone(
            registries
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(RwLock::new(Registry::new()))),
        )
    }

    pub fn lookup(&self, name: &str) -> Option<SharedRegistry> {
        self.registries.lock().get(name).cloned()
    }

    /// Forget the registry named `name`. Holders of the returned handle keep it alive.
    pub fn teardown(&self, name: &str) -> Option<SharedRegistry> {
        self.registries.lock().remove(name)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.registries.lock().keys().cloned().collect();
        names.sort();
        names
    }
}
