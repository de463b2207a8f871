// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::cache::{CacheConfig, CacheKey};
use crate::config::RegistryConfig;
use crate::engine::{Executable, MAIN_NODE, RUN_TRACE_KEY};
use crate::errors::ServiceError;
use crate::events::EventBus;
use crate::registry::{Predicate, Registry};

/// Integration tests running whole registries through the scheduler
#[cfg(test)]
mod tests {
    use super::*;

    /// Records the order in which bodies start and finish.
    #[derive(Clone, Default)]
    struct Journal {
        entries: Arc<Mutex<Vec<String>>>,
        calls: Arc<Mutex<HashMap<String, usize>>>,
    }

    impl Journal {
        fn record(&self, entry: String) {
            self.entries.lock().push(entry);
        }

        fn called(&self, name: &str) {
            *self.calls.lock().entry(name.to_string()).or_insert(0) += 1;
        }

        fn calls(&self, name: &str) -> usize {
            self.calls.lock().get(name).copied().unwrap_or(0)
        }

        fn total_calls(&self) -> usize {
            self.calls.lock().values().sum()
        }

        fn position(&self, entry: &str) -> usize {
            self.entries
                .lock()
                .iter()
                .position(|e| e == entry)
                .unwrap_or_else(|| panic!("'{entry}' never happened"))
        }
    }

    /// An async body that logs start/end, sleeps, and returns its own name.
    fn traced(journal: &Journal, name: &'static str, delay_ms: u64) -> Executable {
        let journal = journal.clone();
        Executable::future(move |_, _| {
            let journal = journal.clone();
            async move {
                journal.called(name);
                journal.record(format!("start:{name}"));
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                journal.record(format!("end:{name}"));
                Ok(json!(name))
            }
        })
    }

    fn counting(counter: &Arc<AtomicUsize>, value: Value) -> Executable {
        let counter = Arc::clone(counter);
        Executable::sync(move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(value.clone())
        })
    }

    fn diamond(journal: &Journal) -> Registry {
        let mut registry = Registry::new();
        registry.service("a").returns(traced(journal, "a", 10));
        registry.service("m").depends_on(["a"]).returns(traced(journal, "m", 20));
        registry.service("n").depends_on(["a"]).returns(traced(journal, "n", 5));
        registry.service("z").depends_on(["m", "n"]).returns(traced(journal, "z", 1));
        registry
    }

    #[tokio::test]
    async fn test_diamond_runs_each_body_once_in_dependency_order() {
        let journal = Journal::default();
        let output = diamond(&journal).run("z", json!({})).await.unwrap();

        assert_eq!(output.value, json!("z"));
        for name in ["a", "m", "n", "z"] {
            assert_eq!(journal.calls(name), 1, "{name} ran more than once");
        }

        assert!(journal.position("end:a") < journal.position("start:m"));
        assert!(journal.position("end:a") < journal.position("start:n"));
        assert!(journal.position("end:m") < journal.position("start:z"));
        assert!(journal.position("end:n") < journal.position("start:z"));
    }

    #[tokio::test]
    async fn test_independent_nodes_overlap() {
        let journal = Journal::default();
        diamond(&journal).run("z", json!({})).await.unwrap();

        // n is shorter than m, so it starts and finishes while m is running.
        assert!(journal.position("start:n") < journal.position("end:m"));
        assert!(journal.position("end:n") < journal.position("end:m"));
    }

    #[tokio::test]
    async fn test_dependencies_are_passed_by_name() {
        let mut registry = Registry::new();
        registry.service("x").returns_value(json!(2));
        registry.service("y").returns_value(json!(3));
        registry
            .service("product")
            .depends_on(["x", "y"])
            .returns(Executable::sync(|config, deps| {
                let x = deps.get("x").and_then(Value::as_i64).unwrap_or(0);
                let y = deps.get("y").and_then(Value::as_i64).unwrap_or(0);
                let scale = config["scale"].as_i64().unwrap_or(1);
                Ok(json!(x * y * scale))
            }));

        let output = registry.run("product", json!({"scale": 10})).await.unwrap();
        assert_eq!(output.value, json!(60));
        assert_eq!(output.resolved["x"], Ok(json!(2)));
        assert!(output.trace.total().is_some());
        assert!(output.trace.get(RUN_TRACE_KEY).is_some());
        assert!(output.trace.get("product").and_then(|e| e.duration).is_some());
    }

    #[tokio::test]
    async fn test_cycle_fails_before_anything_runs() {
        let journal = Journal::default();
        let mut registry = Registry::new();
        registry.service("a").depends_on(["b"]).returns(traced(&journal, "a", 0));
        registry.service("b").depends_on(["c"]).returns(traced(&journal, "b", 0));
        registry.service("c").depends_on(["a"]).returns(traced(&journal, "c", 0));

        let err = registry.run("a", json!({})).await.unwrap_err();
        assert!(matches!(err, ServiceError::CircularDependency(_)));
        assert_eq!(journal.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_missing_dependency_is_named_and_nothing_runs() {
        let journal = Journal::default();
        let mut registry = Registry::new();
        registry.service("a").returns(traced(&journal, "a", 0));
        registry.service("b").depends_on(["a", "ghost"]).returns(traced(&journal, "b", 0));

        let err = registry.run("b", json!({})).await.unwrap_err();
        assert_eq!(err, ServiceError::MissingDependency("ghost".into()));
        assert_eq!(journal.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_unknown_target_is_missing() {
        let registry = Registry::new();
        assert_eq!(
            registry.run("nope", json!({})).await.unwrap_err(),
            ServiceError::MissingDependency("nope".into())
        );
    }

    #[tokio::test]
    async fn test_error_propagates_unchanged_without_running_dependents() {
        let y_calls = Arc::new(AtomicUsize::new(0));
        let mut registry = Registry::new();
        registry
            .service("x")
            .returns(Executable::sync(|_, _| Err(ServiceError::execution("x broke"))));
        registry.service("y").depends_on(["x"]).returns(counting(&y_calls, json!("y")));
        registry.service("top").depends_on(["y"]).returns_value(json!("top"));

        let err = registry.run("top", json!({})).await.unwrap_err();
        assert_eq!(err, ServiceError::execution("x broke"));
        assert_eq!(y_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_recovery_hook_value_feeds_dependents() {
        let mut registry = Registry::new();
        registry
            .service("x")
            .returns(Executable::sync(|_, _| Err(ServiceError::execution("x broke"))))
            .on_error_execute(|config| json!({"fallback": config["id"]}));
        registry
            .service("y")
            .depends_on(["x"])
            .returns(Executable::sync(|_, deps| Ok(deps.get("x").cloned().unwrap_or_default())));

        let output = registry.run("y", json!({"id": 5})).await.unwrap();
        assert_eq!(output.value, json!({"fallback": 5}));
    }

    #[tokio::test]
    async fn test_recovery_hook_catches_inherited_errors() {
        let mut registry = Registry::new();
        registry
            .service("x")
            .returns(Executable::sync(|_, _| Err(ServiceError::execution("down"))));
        registry
            .service("y")
            .depends_on(["x"])
            .returns_value(json!("never"))
            .on_error_return(json!("degraded"));

        let output = registry.run("y", json!({})).await.unwrap();
        assert_eq!(output.value, json!("degraded"));
        assert_eq!(output.resolved["x"], Err(ServiceError::execution("down")));
    }

    #[tokio::test]
    async fn test_failed_branch_does_not_stop_independent_branch() {
        let n_calls = Arc::new(AtomicUsize::new(0));
        let mut registry = Registry::new();
        registry
            .service("m")
            .returns(Executable::sync(|_, _| Err(ServiceError::execution("m failed"))));
        let counter = Arc::clone(&n_calls);
        registry.service("n").returns(Executable::future(move |_, _| {
            let counter = Arc::clone(&counter);
            async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(json!("n"))
            }
        }));
        registry.service("z").depends_on(["m", "n"]).returns_value(json!("z"));

        let err = registry.run("z", json!({})).await.unwrap_err();
        assert_eq!(err, ServiceError::execution("m failed"));
        assert_eq!(n_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_no_matching_variant_is_not_found() {
        let mut registry = Registry::new();
        registry
            .service("user")
            .returns_value_when(Predicate::has_field("id"), json!("found"));
        registry.service("page").depends_on(["user"]).returns_value(json!("page"));

        assert_eq!(
            registry.run("page", json!({})).await.unwrap_err(),
            ServiceError::NotFound("user".into())
        );
        assert_eq!(
            registry.run("page", json!({"id": 1})).await.unwrap().value,
            json!("page")
        );
    }

    #[tokio::test]
    async fn test_no_matching_variant_is_recovered_by_own_hook() {
        let mut registry = Registry::new();
        registry
            .service("user")
            .returns_value_when(Predicate::has_field("id"), json!("found"))
            .on_error_return(json!("guest"));
        registry
            .service("page")
            .depends_on(["user"])
            .returns(Executable::sync(|_, deps| Ok(json!({ "viewer": deps.get("user") }))));

        let output = registry.run("page", json!({})).await.unwrap();
        assert_eq!(output.value, json!({ "viewer": "guest" }));
        assert_eq!(output.resolved["user"], Ok(json!("guest")));
    }

    #[tokio::test]
    async fn test_panicking_body_becomes_execution_error() {
        let mut registry = Registry::new();
        registry
            .service("boom")
            .returns(Executable::sync(|_, _| panic!("kaboom")));

        match registry.run("boom", json!({})).await {
            Err(ServiceError::Execution(message)) => assert!(message.contains("kaboom")),
            other => panic!("expected an execution error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_panicking_recovery_hook_becomes_execution_error() {
        let mut registry = Registry::new();
        registry
            .service("x")
            .returns(Executable::sync(|_, _| Err(ServiceError::execution("first"))))
            .on_error_execute(|_| panic!("hook exploded"));

        match registry.run("x", json!({})).await {
            Err(ServiceError::Execution(message)) => assert!(message.contains("hook exploded")),
            other => panic!("expected an execution error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_panicking_dependency_fn_fails_the_run() {
        let mut registry = Registry::new();
        registry.service("a").returns_value(json!("a"));
        registry
            .service("b")
            .depends_on_fn(|config| vec![config["dep"].as_str().expect("dep is required").to_string()])
            .returns_value(json!("b"));
        registry.service("top").depends_on(["b"]).returns_value(json!("top"));
        let registry = Arc::new(registry);

        let spawned = Arc::clone(&registry);
        let outcome = tokio::spawn(async move { spawned.run("top", json!({})).await })
            .await
            .expect("run must not panic");
        match outcome {
            Err(ServiceError::Execution(message)) => assert!(message.contains("dep is required")),
            other => panic!("expected an execution error, got {other:?}"),
        }

        assert_eq!(
            registry.run("top", json!({"dep": "a"})).await.unwrap().value,
            json!("top")
        );
        assert!(registry.execution_order("top", &json!({})).is_ok());
    }

    #[tokio::test]
    async fn test_panicking_predicate_is_recoverable() {
        let mut registry = Registry::new();
        registry
            .service("flag")
            .returns_value_when(
                Predicate::new(|config| config["on"].as_bool().expect("on must be a bool")),
                json!("on"),
            )
            .on_error_return(json!("off"));

        let output = registry.run("flag", json!({})).await.unwrap();
        assert_eq!(output.value, json!("off"));
    }

    #[tokio::test]
    async fn test_panicking_cache_key_fails_the_run() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut registry = Registry::new();
        registry
            .service("user")
            .returns(counting(&calls, json!("u")))
            .cache_on(CacheConfig::new().with_key(CacheKey::custom(|config| {
                config["id"].as_str().expect("id must be a string").to_string()
            })));
        let registry = Arc::new(registry);

        let spawned = Arc::clone(&registry);
        let outcome = tokio::spawn(async move { spawned.run("user", json!({})).await })
            .await
            .expect("run must not panic");
        match outcome {
            Err(ServiceError::Execution(message)) => assert!(message.contains("id must be a string")),
            other => panic!("expected an execution error, got {other:?}"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        registry.run("user", json!({"id": "7"})).await.unwrap();
        registry.run("user", json!({"id": "7"})).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_recovered_value_with_panicking_cache_key_is_not_stored() {
        let mut registry = Registry::new();
        registry
            .service("user")
            .returns_value(json!("u"))
            .cache_on(CacheConfig::new().with_key(CacheKey::custom(|config| {
                config["id"].as_str().expect("id must be a string").to_string()
            })))
            .on_error_return(json!("anonymous"));

        let output = registry.run("user", json!({})).await.unwrap();
        assert_eq!(output.value, json!("anonymous"));
        let cache = registry.get("user").and_then(|s| s.cache()).unwrap();
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_callback_completion_counts_only_once() {
        let mut registry = Registry::new();
        registry.service("cb").returns(Executable::callback(|_, _, done| {
            assert!(done.succeed(json!("first")));
            assert!(!done.fail(ServiceError::execution("second")));
            assert!(!done.succeed(json!("third")));
        }));

        assert_eq!(registry.run("cb", json!({})).await.unwrap().value, json!("first"));
    }

    #[tokio::test]
    async fn test_callback_completed_from_another_task() {
        let mut registry = Registry::new();
        registry.service("cb").returns(Executable::callback(|config, _, done| {
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(5)).await;
                done.succeed(config["echo"].clone());
            });
        }));

        let output = registry.run("cb", json!({"echo": "hi"})).await.unwrap();
        assert_eq!(output.value, json!("hi"));
    }

    #[tokio::test]
    async fn test_dropped_completion_resolves_as_dropped() {
        let mut registry = Registry::new();
        registry
            .service("cb")
            .returns(Executable::callback(|_, _, done| drop(done)));

        assert_eq!(
            registry.run("cb", json!({})).await.unwrap_err(),
            ServiceError::CompletionDropped("cb".into())
        );
    }

    #[tokio::test]
    async fn test_cache_short_circuits_second_run() {
        let base_calls = Arc::new(AtomicUsize::new(0));
        let top_calls = Arc::new(AtomicUsize::new(0));
        let mut registry = Registry::new();
        registry.service("base").returns(counting(&base_calls, json!(1)));
        registry
            .service("top")
            .depends_on(["base"])
            .returns(counting(&top_calls, json!("top")))
            .cache_on(CacheConfig::new());

        let first = registry.run("top", json!({})).await.unwrap();
        assert_eq!(first.resolved.len(), 2);

        let second = registry.run("top", json!({})).await.unwrap();
        assert_eq!(second.value, json!("top"));
        assert_eq!(second.resolved.len(), 1);
        assert_eq!(top_calls.load(Ordering::SeqCst), 1);
        assert_eq!(base_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cache_keeps_newest_entries_within_max_size() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut registry = Registry::new();
        let counter = Arc::clone(&calls);
        registry
            .service("user")
            .returns(Executable::sync(move |config, _| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(config["id"].clone())
            }))
            .cache_on(
                CacheConfig::new()
                    .with_key(CacheKey::field("id"))
                    .with_max_size(2),
            );

        for id in ["k1", "k2", "k3"] {
            registry.run("user", json!({"id": id})).await.unwrap();
        }
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        let store = registry.get("user").unwrap().cache().unwrap();
        assert_eq!(store.keys(), vec!["k3", "k2"]);

        registry.run("user", json!({"id": "k3"})).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        registry.run("user", json!({"id": "k1"})).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cache_entries_expire() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut registry = Registry::new();
        registry
            .service("quote")
            .returns(counting(&calls, json!(42)))
            .cache_on(CacheConfig::new().with_max_age(Duration::from_millis(100)));

        registry.run("quote", json!({})).await.unwrap();
        tokio::time::advance(Duration::from_millis(50)).await;
        registry.run("quote", json!({})).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        tokio::time::advance(Duration::from_millis(100)).await;
        registry.run("quote", json!({})).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_paused_cache_runs_body_and_reset_clears() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut registry = Registry::new();
        registry
            .service("s")
            .returns(counting(&calls, json!(1)))
            .cache_on(CacheConfig::new());

        registry.run("s", json!({})).await.unwrap();
        registry.cache_pause();
        registry.run("s", json!({})).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        registry.cache_resume();
        registry.run("s", json!({})).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        registry.cache_reset();
        registry.run("s", json!({})).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_run_all_builds_an_object_of_targets() {
        let journal = Journal::default();
        let registry = diamond(&journal);

        let output = registry.run_all(&["m", "n"], json!({})).await.unwrap();
        assert_eq!(output.value, json!({"m": "m", "n": "n"}));
        assert_eq!(journal.calls("a"), 1);
        assert_eq!(journal.calls("z"), 0);
        assert!(output.resolved.contains_key(MAIN_NODE));
    }

    #[tokio::test]
    async fn test_run_all_fails_with_first_failed_target() {
        let mut registry = Registry::new();
        registry.service("ok").returns_value(json!(1));
        registry
            .service("bad")
            .returns(Executable::sync(|_, _| Err(ServiceError::execution("bad"))));

        assert_eq!(
            registry.run_all(&["ok", "bad"], json!({})).await.unwrap_err(),
            ServiceError::execution("bad")
        );
    }

    #[tokio::test]
    async fn test_notifier_sees_fresh_values_only() {
        let bus = EventBus::new();
        let mut events = bus.subscribe();
        let mut registry = Registry::new();
        registry.service("a").returns_value(json!(1));
        registry
            .service("b")
            .depends_on(["a"])
            .returns_value(json!(2))
            .cache_on(CacheConfig::new());
        let registry = registry.with_notifier(Arc::new(bus));

        registry.run("b", json!({"run": 1})).await.unwrap();
        let mut seen = Vec::new();
        for _ in 0..2 {
            let event = tokio::time::timeout(Duration::from_secs(1), events.recv())
                .await
                .unwrap()
                .unwrap();
            assert_eq!(event.config, json!({"run": 1}));
            seen.push(event.service);
        }
        seen.sort();
        assert_eq!(seen, vec!["a", "b"]);

        // Second run is a cache hit on b and never reaches a.
        registry.run("b", json!({"run": 1})).await.unwrap();
        let next = tokio::time::timeout(Duration::from_millis(50), events.recv()).await;
        assert!(next.is_err());
    }

    #[tokio::test]
    async fn test_run_all_does_not_notify_main_node() {
        let bus = EventBus::new();
        let mut events = bus.subscribe();
        let mut registry = Registry::new();
        registry.service("only").returns_value(json!(1));
        let registry = registry.with_notifier(Arc::new(bus));

        registry.run_all(&["only"], json!({})).await.unwrap();
        let event = tokio::time::timeout(Duration::from_secs(1), events.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.service, "only");
        let next = tokio::time::timeout(Duration::from_millis(50), events.recv()).await;
        assert!(next.is_err());
    }

    #[tokio::test]
    async fn test_spawn_run_delivers_outcome_once() {
        let mut registry = Registry::new();
        registry.service("s").returns_value(json!("spawned"));
        let registry = Arc::new(registry);

        let (tx, rx) = tokio::sync::oneshot::channel();
        let handle = registry.spawn_run("s", json!({}), move |outcome| {
            let _ = tx.send(outcome);
        });
        handle.await.unwrap();

        let output = rx.await.unwrap().unwrap();
        assert_eq!(output.value, json!("spawned"));
    }

    #[tokio::test]
    async fn test_concurrent_runs_are_independent() {
        let mut registry = Registry::new();
        registry.service("echo").returns(Executable::future(|config, _| async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            Ok(config["v"].clone())
        }));

        let (a, b) = tokio::join!(
            registry.run("echo", json!({"v": "a"})),
            registry.run("echo", json!({"v": "b"}))
        );
        assert_eq!(a.unwrap().value, json!("a"));
        assert_eq!(b.unwrap().value, json!("b"));
    }

    #[tokio::test]
    async fn test_max_concurrency_bounds_running_bodies() {
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let mut registry = Registry::new();
        let names: Vec<String> = (0..6).map(|i| format!("leaf{i}")).collect();

        for name in &names {
            let running = Arc::clone(&running);
            let peak = Arc::clone(&peak);
            registry.service(name).returns(Executable::future(move |_, _| {
                let running = Arc::clone(&running);
                let peak = Arc::clone(&peak);
                async move {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    running.fetch_sub(1, Ordering::SeqCst);
                    Ok(json!(null))
                }
            }));
        }
        registry.service("root").depends_on(names.clone()).returns_value(json!("done"));
        let registry = registry.with_max_concurrency(2);

        let output = registry.run("root", json!({})).await.unwrap();
        assert_eq!(output.value, json!("done"));
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_nested_run_under_max_concurrency_one() {
        let slot: Arc<std::sync::OnceLock<Arc<Registry>>> = Arc::new(std::sync::OnceLock::new());
        let mut registry = Registry::new();
        registry.service("inner").returns_value(json!("inner"));
        let outer_slot = Arc::clone(&slot);
        registry.service("outer").returns(Executable::future(move |config, _| {
            let slot = Arc::clone(&outer_slot);
            async move {
                match slot.get().cloned() {
                    Some(registry) => registry.run("inner", config).await.map(|output| output.value),
                    None => Err(ServiceError::execution("registry not set")),
                }
            }
        }));
        let registry = Arc::new(registry.with_max_concurrency(1));
        assert!(slot.set(Arc::clone(&registry)).is_ok());

        let output = tokio::time::timeout(Duration::from_secs(5), registry.run("outer", json!({})))
            .await
            .expect("nested run must not wait on the outer run's permit")
            .unwrap();
        assert_eq!(output.value, json!("inner"));
    }

    #[tokio::test]
    async fn test_long_chain_runs_without_recursion() {
        let mut registry = Registry::new();
        registry.service("n0").returns_value(json!(0));
        for i in 1..2_000 {
            let previous = format!("n{}", i - 1);
            let key = previous.clone();
            registry
                .service(&format!("n{i}"))
                .depends_on([previous])
                .returns(Executable::sync(move |_, deps| {
                    Ok(json!(deps.get(&key).and_then(Value::as_i64).unwrap_or(0) + 1))
                }));
        }

        let output = registry.run("n1999", json!({})).await.unwrap();
        assert_eq!(output.value, json!(1999));
    }

    #[tokio::test]
    async fn test_config_selects_dependencies() {
        let journal = Journal::default();
        let mut registry = Registry::new();
        registry.service("cheap").returns(traced(&journal, "cheap", 0));
        registry.service("costly").returns(traced(&journal, "costly", 0));
        registry
            .service("report")
            .depends_on_when(Predicate::field_eq("detail", json!(true)), ["cheap", "costly"])
            .depends_on(["cheap"])
            .returns(Executable::sync(|_, deps| Ok(json!(deps.len()))));

        assert_eq!(registry.run("report", json!({})).await.unwrap().value, json!(1));
        assert_eq!(journal.calls("costly"), 0);

        let output = registry.run("report", json!({"detail": true})).await.unwrap();
        assert_eq!(output.value, json!(2));
        assert_eq!(journal.calls("costly"), 1);
    }

    #[tokio::test]
    async fn test_applied_config_sets_cache_and_recovery() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut registry = Registry::new();
        registry.service("user").returns(counting(&calls, json!("u")));
        registry
            .service("flaky")
            .returns(Executable::sync(|_, _| Err(ServiceError::execution("flaky"))));

        let config: RegistryConfig = serde_yaml::from_str(
            r#"
executor_options:
  max_concurrency: 3
services:
  user:
    description: "cached user"
    cache:
      key: id
  flaky:
    on_error: null
"#,
        )
        .unwrap();
        registry.apply_config(&config);

        assert_eq!(registry.max_concurrency(), Some(3));
        assert_eq!(registry.get("user").unwrap().description(), "cached user");
        assert!(registry.is_cached("user"));

        registry.run("user", json!({"id": 1})).await.unwrap();
        registry.run("user", json!({"id": 1})).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        assert_eq!(registry.run("flaky", json!({})).await.unwrap().value, Value::Null);
    }

    #[tokio::test]
    async fn test_merged_registry_shares_cache_with_source() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut base = Registry::new();
        base.service("s").returns(counting(&calls, json!(1))).cache_on(CacheConfig::new());
        let extra = Registry::new();

        let merged = base.merge(&[&extra]);
        base.run("s", json!({})).await.unwrap();
        merged.run("s", json!({})).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
