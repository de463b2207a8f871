// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use anyhow::{Context, Result};
use serde_json::{json, Value};
use std::env;
use std::sync::Arc;
use std::time::Duration;
use service_dag::cache::{CacheConfig, CacheKey};
use service_dag::config::load_and_validate_config;
use service_dag::engine::{Executable, RUN_TRACE_KEY};
use service_dag::events::EventBus;
use service_dag::registry::{Predicate, Registry};

/// A small storefront: a dashboard built from a user, their orders and a
/// recommendation feed that is allowed to fail.
fn demo_registry() -> Registry {
    let mut registry = Registry::new();

    registry
        .service("user")
        .set_description("Look up a user by id")
        .returns(Executable::sync(|config, _| {
            let id = config.get("id").cloned().unwrap_or(Value::Null);
            Ok(json!({ "id": id, "name": format!("user-{id}") }))
        }))
        .cache_on(
            CacheConfig::new()
                .with_key(CacheKey::field("id"))
                .with_max_age(Duration::from_secs(60))
                .with_max_size(100),
        );

    registry
        .service("orders")
        .set_description("Orders placed by the user")
        .depends_on(["user"])
        .returns(Executable::future(|_, deps| async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            let user = deps.get("user").cloned().unwrap_or(Value::Null);
            Ok(json!({ "user": user["id"], "orders": [101, 102] }))
        }));

    registry
        .service("recommendations")
        .set_description("Suggestions; degraded to an empty list on failure")
        .depends_on(["user"])
        .returns(Executable::callback(|config, _, done| {
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(10)).await;
                if config.get("offline") == Some(&Value::Bool(true)) {
                    done.fail(service_dag::errors::ServiceError::execution("feed offline"));
                } else {
                    done.succeed(json!(["socks", "tea"]));
                }
            });
        }))
        .on_error_return(json!([]));

    registry
        .service("dashboard")
        .depends_on_when(Predicate::field_eq("compact", json!(true)), ["user", "orders"])
        .depends_on(["user", "orders", "recommendations"])
        .returns(Executable::sync(|_, deps| Ok(deps.to_object())));

    registry
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = env::args().skip(1).collect();
    let mut registry = demo_registry();

    if let Some(path) = args.first() {
        let config = load_and_validate_config(path)
            .with_context(|| format!("failed to load registry config {path}"))?;
        registry.apply_config(&config);
    }

    let bus = EventBus::new();
    let mut user_events = bus.subscribe_to("user");
    let registry = Arc::new(registry.with_notifier(Arc::new(bus)));

    println!(
        "Execution order: {:?}",
        registry.execution_order("dashboard", &json!({ "id": 7 }))?
    );

    for config in [
        json!({ "id": 7 }),
        json!({ "id": 7, "offline": true }),
        json!({ "id": 8, "compact": true }),
    ] {
        let output = registry
            .run("dashboard", config.clone())
            .await
            .with_context(|| format!("run failed for {config}"))?;
        println!("{config} => {}", serde_json::to_string_pretty(&output.value)?);
        if let Some(total) = output.trace.total() {
            println!("  {RUN_TRACE_KEY}: {total:?}");
        }
    }

    let both = registry.run_all(&["user", "orders"], json!({ "id": 9 })).await?;
    println!("run_all => {}", both.value);

    let (tx, rx) = tokio::sync::oneshot::channel();
    registry.spawn_run("user", json!({ "id": 7 }), move |outcome| {
        let _ = tx.send(outcome);
    });
    let cached = rx.await.context("spawned run dropped its result")??;
    println!("spawned run (cached) => {}", cached.value);

    if let Ok(Some(event)) = tokio::time::timeout(Duration::from_millis(50), user_events.recv()).await {
        println!("first 'user' event: {}", event.value);
    }

    Ok(())
}
