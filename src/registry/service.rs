// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Service definitions and their config-selected variants.

use serde_json::Value;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::cache::{CacheConfig, CacheStore};
use crate::engine::{Executable, ResolvedNode};
use crate::errors::ServiceError;
use crate::traits::{Variant, VariantSelector};

/// Converts any error reaching a service into a substitute value.
pub type RecoveryHook = Arc<dyn Fn(&Value) -> Value + Send + Sync>;

pub type PredicateFn = dyn Fn(&Value) -> bool + Send + Sync;
pub type DependencyFn = dyn Fn(&Value) -> Vec<String> + Send + Sync;

/// A test on the run-time configuration guarding a rule.
#[derive(Clone)]
pub struct Predicate {
    test: Arc<PredicateFn>,
}

impl Predicate {
    /// Matches every configuration.
    pub fn any() -> Self {
        Self::new(|_| true)
    }

    pub fn new<F>(test: F) -> Self
    where
        F: Fn(&Value) -> bool + Send + Sync + 'static,
    {
        Self {
            test: Arc::new(test),
        }
    }

    pub fn has_field(name: impl Into<String>) -> Self {
        let name = name.into();
        Self::new(move |config| config.get(name.as_str()).is_some())
    }

    pub fn field_eq(name: impl Into<String>, expected: Value) -> Self {
        let name = name.into();
        Self::new(move |config| config.get(name.as_str()) == Some(&expected))
    }

    pub fn matches(&self, config: &Value) -> bool {
        (self.test)(config)
    }
}

impl fmt::Debug for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Predicate(..)")
    }
}

#[derive(Clone)]
enum DependencySource {
    Fixed(Vec<String>),
    Computed(Arc<DependencyFn>),
}

impl DependencySource {
    fn names(&self, config: &Value) -> Vec<String> {
        match self {
            DependencySource::Fixed(names) => names.clone(),
            DependencySource::Computed(compute) => compute(config),
        }
    }
}

#[derive(Clone)]
struct ExecutableRule {
    predicate: Predicate,
    executable: Executable,
    /// Set for one-shot rules; flips to `true` once the rule has been selected.
    spent: Option<Arc<AtomicBool>>,
}

impl ExecutableRule {
    fn is_spent(&self) -> bool {
        self.spent
            .as_ref()
            .map(|flag| flag.load(Ordering::Acquire))
            .unwrap_or(false)
    }

    fn claim(&self) -> bool {
        match &self.spent {
            None => true,
            Some(flag) => flag
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .is_ok(),
        }
    }
}

#[derive(Clone)]
struct DependencyRule {
    predicate: Predicate,
    source: DependencySource,
}

/// Ordered `(predicate, handler)` rules for a service's body and dependencies.
///
/// Rules are tried in the order they were added and the first match wins, so
/// register specific rules before catch-alls.
#[derive(Clone, Default)]
pub struct VariantRules {
    executables: Vec<ExecutableRule>,
    dependencies: Vec<DependencyRule>,
}

impl VariantRules {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_executable(&mut self, predicate: Predicate, executable: Executable) {
        self.executables.push(ExecutableRule {
            predicate,
            executable,
            spent: None,
        });
    }

    /// Add a rule that is selected at most once across all runs.
    pub fn add_executable_once(&mut self, predicate: Predicate, executable: Executable) {
        self.executables.push(ExecutableRule {
            predicate,
            executable,
            spent: Some(Arc::new(AtomicBool::new(false))),
        });
    }

    pub fn add_dependencies(&mut self, predicate: Predicate, names: Vec<String>) {
        self.dependencies.push(DependencyRule {
            predicate,
            source: DependencySource::Fixed(names),
        });
    }

    pub fn add_dependency_fn(&mut self, predicate: Predicate, compute: Arc<DependencyFn>) {
        self.dependencies.push(DependencyRule {
            predicate,
            source: DependencySource::Computed(compute),
        });
    }

    /// Dependencies for `config`; empty when no dependency rule matches.
    pub fn dependencies_for(&self, config: &Value) -> Vec<String> {
        self.dependencies
            .iter()
            .find(|rule| rule.predicate.matches(config))
            .map(|rule| rule.source.names(config))
            .unwrap_or_default()
    }

    pub fn has_executable_for(&self, config: &Value) -> bool {
        self.executables
            .iter()
            .any(|rule| !rule.is_spent() && rule.predicate.matches(config))
    }

    pub fn len(&self) -> usize {
        self.executables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.executables.is_empty()
    }
}

impl VariantSelector for VariantRules {
    fn select(&self, service: &str, config: &Value) -> Result<Variant, ServiceError> {
        let executable = self
            .executables
            .iter()
            .filter(|rule| !rule.is_spent() && rule.predicate.matches(config))
            .find(|rule| rule.claim())
            .map(|rule| rule.executable.clone())
            .ok_or_else(|| ServiceError::NotFound(service.to_string()))?;

        Ok(Variant {
            executable,
            dependencies: self.dependencies_for(config),
        })
    }

    fn inspect(&self, service: &str, config: &Value) -> Result<Vec<String>, ServiceError> {
        if self.has_executable_for(config) {
            Ok(self.dependencies_for(config))
        } else {
            Err(ServiceError::NotFound(service.to_string()))
        }
    }
}

/// A named unit of work and everything the engine needs to run it.
#[derive(Clone)]
pub struct ServiceDefinition {
    name: String,
    description: String,
    metadata: Option<Value>,
    rules: VariantRules,
    selector: Option<Arc<dyn VariantSelector>>,
    cache: Option<Arc<CacheStore>>,
    recovery: Option<RecoveryHook>,
}

impl ServiceDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            metadata: None,
            rules: VariantRules::new(),
            selector: None,
            cache: None,
            recovery: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn set_description(&mut self, description: impl Into<String>) -> &mut Self {
        self.description = description.into();
        self
    }

    pub fn metadata(&self) -> Option<&Value> {
        self.metadata.as_ref()
    }

    pub fn set_metadata(&mut self, metadata: Value) -> &mut Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn rules(&self) -> &VariantRules {
        &self.rules
    }

    // ---- bodies -------------------------------------------------------------

    pub fn returns(&mut self, executable: Executable) -> &mut Self {
        self.rules.add_executable(Predicate::any(), executable);
        self
    }

    pub fn returns_when(&mut self, predicate: Predicate, executable: Executable) -> &mut Self {
        self.rules.add_executable(predicate, executable);
        self
    }

    pub fn returns_value(&mut self, value: Value) -> &mut Self {
        self.returns(Executable::Constant(value))
    }

    pub fn returns_value_when(&mut self, predicate: Predicate, value: Value) -> &mut Self {
        self.returns_when(predicate, Executable::Constant(value))
    }

    pub fn returns_once(&mut self, executable: Executable) -> &mut Self {
        self.rules.add_executable_once(Predicate::any(), executable);
        self
    }

    pub fn returns_once_when(&mut self, predicate: Predicate, executable: Executable) -> &mut Self {
        self.rules.add_executable_once(predicate, executable);
        self
    }

    pub fn returns_value_once(&mut self, value: Value) -> &mut Self {
        self.returns_once(Executable::Constant(value))
    }

    // ---- dependencies -------------------------------------------------------

    pub fn depends_on<I, S>(&mut self, names: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.depends_on_when(Predicate::any(), names)
    }

    pub fn depends_on_when<I, S>(&mut self, predicate: Predicate, names: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names = names.into_iter().map(Into::into).collect();
        self.rules.add_dependencies(predicate, names);
        self
    }

    pub fn depends_on_fn<F>(&mut self, compute: F) -> &mut Self
    where
        F: Fn(&Value) -> Vec<String> + Send + Sync + 'static,
    {
        self.rules.add_dependency_fn(Predicate::any(), Arc::new(compute));
        self
    }

    pub fn depends_on_fn_when<F>(&mut self, predicate: Predicate, compute: F) -> &mut Self
    where
        F: Fn(&Value) -> Vec<String> + Send + Sync + 'static,
    {
        self.rules.add_dependency_fn(predicate, Arc::new(compute));
        self
    }

    /// Replace the built-in rules with an external selector.
    pub fn with_selector(&mut self, selector: Arc<dyn VariantSelector>) -> &mut Self {
        self.selector = Some(selector);
        self
    }

    fn selector(&self) -> &dyn VariantSelector {
        match &self.selector {
            Some(selector) => selector.as_ref(),
            None => &self.rules,
        }
    }

    // ---- caching ------------------------------------------------------------

    /// Start caching with a fresh store, discarding any previous one.
    pub fn cache_on(&mut self, config: CacheConfig) -> &mut Self {
        self.cache = Some(Arc::new(CacheStore::new(self.name.clone(), config)));
        self
    }

    pub fn cache_off(&mut self) -> &mut Self {
        if let Some(cache) = self.cache.take() {
            cache.disable();
        }
        self
    }

    pub fn cache_pause(&mut self) -> &mut Self {
        if let Some(cache) = &self.cache {
            cache.pause();
        }
        self
    }

    pub fn cache_resume(&mut self) -> &mut Self {
        if let Some(cache) = &self.cache {
            cache.resume();
        }
        self
    }

    pub fn cache_reset(&mut self) -> &mut Self {
        if let Some(cache) = &self.cache {
            cache.reset();
        }
        self
    }

    pub fn cache(&self) -> Option<&Arc<CacheStore>> {
        self.cache.as_ref()
    }

    pub fn is_cached(&self) -> bool {
        self.cache.as_ref().map(|c| c.is_enabled()).unwrap_or(false)
    }

    // ---- error recovery -----------------------------------------------------

    pub fn on_error_return(&mut self, value: Value) -> &mut Self {
        self.recovery = Some(Arc::new(move |_| value.clone()));
        self
    }

    pub fn on_error_execute<F>(&mut self, hook: F) -> &mut Self
    where
        F: Fn(&Value) -> Value + Send + Sync + 'static,
    {
        self.recovery = Some(Arc::new(hook));
        self
    }

    /// Let errors propagate to dependents again.
    pub fn on_error_throw(&mut self) -> &mut Self {
        self.recovery = None;
        self
    }

    pub fn recovers(&self) -> bool {
        self.recovery.is_some()
    }

    // ---- resolution ---------------------------------------------------------

    /// Resolve this service for one run. A cache hit short-circuits selection
    /// and contributes no dependencies. A panic in a predicate, dependency
    /// function or cache key leaves the node unresolved with an `Execution`
    /// error.
    pub fn resolve(&self, config: &Value) -> ResolvedNode {
        let mut node = panic::catch_unwind(AssertUnwindSafe(|| self.select_node(config)))
            .unwrap_or_else(|payload| {
                ResolvedNode::unresolved(self.name.clone(), ServiceError::from_panic(payload))
            });
        if node.cached {
            return node;
        }
        node.recovery = self.recovery.clone();
        node.cache = self.cache.clone();
        node
    }

    fn select_node(&self, config: &Value) -> ResolvedNode {
        if let Some(hit) = self.cache.as_ref().and_then(|cache| cache.get(config)) {
            return ResolvedNode::cache_hit(self.name.clone(), hit);
        }

        match self.selector().select(&self.name, config) {
            Ok(variant) => ResolvedNode::new(self.name.clone(), variant.dependencies, variant.executable),
            Err(error) => ResolvedNode::unresolved(self.name.clone(), error),
        }
    }

    /// Dependencies for `config`, ignoring the cache and consuming nothing.
    pub fn inspect(&self, config: &Value) -> Result<Vec<String>, ServiceError> {
        panic::catch_unwind(AssertUnwindSafe(|| self.selector().inspect(&self.name, config)))
            .unwrap_or_else(|payload| Err(ServiceError::from_panic(payload)))
    }
}

impl fmt::Debug for ServiceDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceDefinition")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("metadata", &self.metadata)
            .field("variants", &self.rules.len())
            .field("cached", &self.is_cached())
            .field("recovers", &self.recovers())
            .finish()
    }
}
