// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! The service registry: definitions plus the entry points that run them.
//!
//! A run resolves every service reachable from the target against the run's
//! configuration, builds an execution order and hands both to the scheduler.
//! Runs are independent of each other; the only state they share is the
//! registry's cache stores and one-shot rules.

mod service;
mod store;

pub use service::{
    DependencyFn, Predicate, PredicateFn, RecoveryHook, ServiceDefinition, VariantRules,
};
pub use store::RegistryStore;

use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::Instrument;

use crate::config::RegistryConfig;
use crate::engine::graph::NodeResolver;
use crate::engine::scheduler::Scheduler;
use crate::engine::{build_execution_order, Executable, ResolvedNode, RunOutput, MAIN_NODE};
use crate::errors::ServiceError;
use crate::observability::messages::engine::{BuildFailed, RunStarted};
use crate::observability::messages::StructuredLog;
use crate::traits::Notifier;

#[derive(Default, Clone)]
pub struct Registry {
    services: HashMap<String, ServiceDefinition>,
    notifier: Option<Arc<dyn Notifier>>,
    max_concurrency: Option<usize>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The definition named `name`, created empty on first reference.
    pub fn service(&mut self, name: &str) -> &mut ServiceDefinition {
        self.services
            .entry(name.to_string())
            .or_insert_with(|| ServiceDefinition::new(name))
    }

    pub fn get(&self, name: &str) -> Option<&ServiceDefinition> {
        self.services.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.services.contains_key(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<ServiceDefinition> {
        self.services.remove(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.services.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn services(&self) -> impl Iterator<Item = &ServiceDefinition> {
        self.services.values()
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Bound the number of service bodies executing at the same time within
    /// one run. Each run gets its own permits, so a body that starts a nested
    /// run on the same registry does not wait on its own permit.
    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.set_max_concurrency(Some(max_concurrency));
        self
    }

    pub fn set_max_concurrency(&mut self, max_concurrency: Option<usize>) {
        self.max_concurrency = max_concurrency.filter(|n| *n > 0);
    }

    pub fn max_concurrency(&self) -> Option<usize> {
        self.max_concurrency
    }

    // ---- cache --------------------------------------------------------------

    pub fn cache_reset(&mut self) {
        for service in self.services.values_mut() {
            service.cache_reset();
        }
    }

    pub fn cache_off(&mut self) {
        for service in self.services.values_mut() {
            service.cache_off();
        }
    }

    pub fn cache_pause(&mut self) {
        for service in self.services.values_mut() {
            service.cache_pause();
        }
    }

    pub fn cache_resume(&mut self) {
        for service in self.services.values_mut() {
            service.cache_resume();
        }
    }

    pub fn is_cached(&self, name: &str) -> bool {
        self.get(name).map(|s| s.is_cached()).unwrap_or(false)
    }

    /// A new registry with this registry's services overlaid by each of
    /// `others` in turn. Merged services keep sharing their cache stores.
    pub fn merge(&self, others: &[&Registry]) -> Registry {
        let mut merged = self.clone();
        for other in others {
            for (name, service) in &other.services {
                merged.services.insert(name.clone(), service.clone());
            }
        }
        merged
    }

    /// Apply descriptions, metadata, caching, recovery values and executor
    /// options from a loaded configuration. Unknown services are created.
    pub fn apply_config(&mut self, config: &RegistryConfig) {
        if config.executor_options.max_concurrency.is_some() {
            self.set_max_concurrency(config.executor_options.max_concurrency);
        }

        for (name, settings) in &config.services {
            let service = self.service(name);
            if let Some(description) = &settings.description {
                service.set_description(description.clone());
            }
            if let Some(metadata) = &settings.metadata {
                service.set_metadata(metadata.clone());
            }
            if let Some(cache) = &settings.cache {
                service.cache_on(cache.to_cache_config());
            }
            if let Some(value) = &settings.on_error {
                service.on_error_return(value.clone());
            }
        }
    }

    // ---- introspection ------------------------------------------------------

    /// The order a run of `target` would use, ignoring caches and without
    /// spending one-shot rules.
    pub fn execution_order(&self, target: &str, config: &Value) -> Result<Vec<String>, ServiceError> {
        build_execution_order(target, |name| {
            self.get(name)
                .map(|service| service.inspect(config).unwrap_or_default())
        })
    }

    // ---- runs ---------------------------------------------------------------

    /// Run `target` with `config` and deliver its value.
    pub async fn run(&self, target: &str, config: Value) -> Result<RunOutput, ServiceError> {
        self.execute(target, config, None).await
    }

    /// Run several targets at once; the value is an object keyed by target name.
    pub async fn run_all(&self, targets: &[&str], config: Value) -> Result<RunOutput, ServiceError> {
        if targets.is_empty() {
            return Err(ServiceError::InvalidTarget("empty target list".to_string()));
        }
        let targets: Vec<String> = targets.iter().map(|t| t.to_string()).collect();
        if targets.iter().any(|t| t == MAIN_NODE) {
            return Err(ServiceError::InvalidTarget(format!(
                "'{MAIN_NODE}' is reserved"
            )));
        }

        let main = ResolvedNode::new(
            MAIN_NODE,
            targets,
            Executable::sync(|_, deps| Ok(deps.to_object())),
        );
        self.execute(MAIN_NODE, config, Some(main)).await
    }

    /// Run `target` on a spawned task and hand the outcome to `on_done` once.
    pub fn spawn_run<F>(self: &Arc<Self>, target: &str, config: Value, on_done: F) -> tokio::task::JoinHandle<()>
    where
        F: FnOnce(Result<RunOutput, ServiceError>) + Send + 'static,
    {
        let registry = Arc::clone(self);
        let target = target.to_string();
        tokio::spawn(async move {
            let outcome = registry.run(&target, config).await;
            on_done(outcome);
        })
    }

    async fn execute(
        &self,
        target: &str,
        config: Value,
        main: Option<ResolvedNode>,
    ) -> Result<RunOutput, ServiceError> {
        let mut main = main;
        let mut resolver = NodeResolver::new(|name: &str| {
            if name == MAIN_NODE {
                if let Some(node) = main.take() {
                    return Some(node);
                }
            }
            self.get(name).map(|service| service.resolve(&config))
        });

        let order = match build_execution_order(target, |name| resolver.dependencies_of(name)) {
            Ok(order) => order,
            Err(error) => {
                BuildFailed {
                    target,
                    error: &error,
                }
                .log();
                return Err(error);
            }
        };
        let nodes = resolver.into_nodes();

        let started = RunStarted {
            target,
            node_count: order.len(),
        };
        started.log();
        let span = started.span("run");

        let limiter = self.max_concurrency.map(|n| Arc::new(Semaphore::new(n)));
        Scheduler::new(config, nodes, self.notifier.clone(), limiter)
            .run(target, order)
            .instrument(span)
            .await
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("services", &self.names())
            .field("notifier", &self.notifier.is_some())
            .field("max_concurrency", &self.max_concurrency)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheConfig;
    use serde_json::json;

    fn chain() -> Registry {
        let mut registry = Registry::new();
        registry.service("a").returns_value(json!(1));
        registry.service("b").depends_on(["a"]).returns(Executable::sync(|_, deps| {
            Ok(json!(deps.get("a").and_then(Value::as_i64).unwrap_or(0) + 1))
        }));
        registry
    }

    #[test]
    fn test_service_is_created_on_first_reference() {
        let mut registry = Registry::new();
        assert!(!registry.contains("x"));
        registry.service("x").set_description("first");
        registry.service("x").set_metadata(json!({"owner": "me"}));

        let x = registry.get("x").unwrap();
        assert_eq!(x.description(), "first");
        assert_eq!(x.metadata(), Some(&json!({"owner": "me"})));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_names_are_sorted_and_remove_works() {
        let mut registry = Registry::new();
        registry.service("b");
        registry.service("a");
        assert_eq!(registry.names(), vec!["a", "b"]);

        assert!(registry.remove("a").is_some());
        assert_eq!(registry.names(), vec!["b"]);
        assert!(registry.remove("a").is_none());
    }

    #[test]
    fn test_execution_order_ignores_cache() {
        let mut registry = chain();
        registry.service("b").cache_on(CacheConfig::new());
        registry.get("b").unwrap().cache().unwrap().put(&json!({}), json!(99));

        let order = registry.execution_order("b", &json!({})).unwrap();
        assert_eq!(order, vec!["a", "b"]);
    }

    #[test]
    fn test_execution_order_reports_missing() {
        let mut registry = Registry::new();
        registry.service("a").returns_value(json!(1)).depends_on(["ghost"]);
        assert_eq!(
            registry.execution_order("a", &json!({})).unwrap_err(),
            ServiceError::MissingDependency("ghost".into())
        );
    }

    #[test]
    fn test_merge_overlays_and_shares_cache() {
        let mut base = Registry::new();
        base.service("a").returns_value(json!("base"));
        base.service("b").returns_value(json!("b")).cache_on(CacheConfig::new());

        let mut overlay = Registry::new();
        overlay.service("a").returns_value(json!("overlay"));

        let merged = base.merge(&[&overlay]);
        assert_eq!(merged.names(), vec!["a", "b"]);

        let shared = merged.get("b").unwrap().cache().unwrap();
        assert!(Arc::ptr_eq(shared, base.get("b").unwrap().cache().unwrap()));
    }

    #[test]
    fn test_registry_wide_cache_operations() {
        let mut registry = Registry::new();
        registry.service("a").returns_value(json!(1)).cache_on(CacheConfig::new());
        registry.service("b").returns_value(json!(2)).cache_on(CacheConfig::new());
        registry.get("a").unwrap().cache().unwrap().put(&json!({}), json!(1));

        registry.cache_pause();
        assert!(registry.get("a").unwrap().cache().unwrap().is_paused());
        registry.cache_resume();
        assert!(!registry.get("a").unwrap().cache().unwrap().is_paused());

        registry.cache_reset();
        assert!(registry.get("a").unwrap().cache().unwrap().is_empty());

        registry.cache_off();
        assert!(!registry.is_cached("a"));
        assert!(!registry.is_cached("b"));
    }

    #[test]
    fn test_max_concurrency_zero_means_unbounded() {
        let registry = Registry::new().with_max_concurrency(0);
        assert_eq!(registry.max_concurrency(), None);
        let registry = Registry::new().with_max_concurrency(2);
        assert_eq!(registry.max_concurrency(), Some(2));
    }

    #[tokio::test]
    async fn test_run_chain() {
        let output = chain().run("b", json!({})).await.unwrap();
        assert_eq!(output.value, json!(2));
        assert_eq!(output.resolved.len(), 2);
    }

    #[tokio::test]
    async fn test_run_all_rejects_reserved_and_empty_targets() {
        let registry = chain();
        assert!(matches!(
            registry.run_all(&[], json!({})).await,
            Err(ServiceError::InvalidTarget(_))
        ));
        assert!(matches!(
            registry.run_all(&["a", MAIN_NODE], json!({})).await,
            Err(ServiceError::InvalidTarget(_))
        ));
    }
}
