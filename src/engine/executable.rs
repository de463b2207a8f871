// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! The unified completion contract shared by every service body.
//!
//! A service body is declared with an explicit [`ExecutionMode`] instead of being
//! inspected for its shape. Whatever the mode, the engine awaits exactly one
//! [`NodeOutcome`] from it:
//!
//! * **Sync** - the return value is the outcome.
//! * **Future** - the resolved future is the outcome.
//! * **Callback** - the body receives a [`Completion`] and must call it once;
//!   later calls are ignored.
//! * **Constant** - a fixed value, used for `returns_value` rules and cache hits.

use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::oneshot;

use crate::errors::{NodeOutcome, ServiceError};

pub type SyncFn = dyn Fn(&Value, &Dependencies) -> NodeOutcome + Send + Sync;
pub type FutureFn = dyn Fn(Value, Dependencies) -> BoxFuture<'static, NodeOutcome> + Send + Sync;
pub type CallbackFn = dyn Fn(Value, Dependencies, Completion) + Send + Sync;

/// Resolved values of a node's declared dependencies, keyed by service name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dependencies(pub HashMap<String, Value>);

impl Dependencies {
    pub fn new() -> Self {
        Self(HashMap::new())
    }

    pub fn insert(&mut self, name: String, value: Value) {
        self.0.insert(name, value);
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// Collect the values into a JSON object keyed by dependency name.
    pub fn to_object(&self) -> Value {
        let map: Map<String, Value> = self
            .0
            .iter()
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();
        Value::Object(map)
    }
}

impl From<HashMap<String, Value>> for Dependencies {
    fn from(map: HashMap<String, Value>) -> Self {
        Self(map)
    }
}

impl From<Dependencies> for HashMap<String, Value> {
    fn from(deps: Dependencies) -> Self {
        deps.0
    }
}

/// Handle a callback-mode body uses to deliver its outcome.
///
/// Clones share one slot: the first `complete` wins and returns `true`, every
/// later call returns `false` and is dropped.
#[derive(Clone)]
pub struct Completion {
    sender: Arc<Mutex<Option<oneshot::Sender<NodeOutcome>>>>,
}

impl Completion {
    pub(crate) fn channel() -> (Self, oneshot::Receiver<NodeOutcome>) {
        let (tx, rx) = oneshot::channel();
        let completion = Self {
            sender: Arc::new(Mutex::new(Some(tx))),
        };
        (completion, rx)
    }

    pub fn complete(&self, outcome: NodeOutcome) -> bool {
        match self.sender.lock().take() {
            Some(tx) => tx.send(outcome).is_ok(),
            None => false,
        }
    }

    pub fn succeed(&self, value: Value) -> bool {
        self.complete(Ok(value))
    }

    pub fn fail(&self, error: ServiceError) -> bool {
        self.complete(Err(error))
    }

    pub fn is_completed(&self) -> bool {
        self.sender.lock().is_none()
    }
}

impl fmt::Debug for Completion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Completion")
            .field("completed", &self.is_completed())
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    Sync,
    Future,
    Callback,
    Constant,
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ExecutionMode::Sync => "sync",
            ExecutionMode::Future => "future",
            ExecutionMode::Callback => "callback",
            ExecutionMode::Constant => "constant",
        };
        f.write_str(label)
    }
}

/// A service body together with its declared execution mode.
#[derive(Clone)]
pub enum Executable {
    Sync(Arc<SyncFn>),
    Future(Arc<FutureFn>),
    Callback(Arc<CallbackFn>),
    Constant(Value),
}

impl Executable {
    pub fn sync<F>(body: F) -> Self
    where
        F: Fn(&Value, &Dependencies) -> NodeOutcome + Send + Sync + 'static,
    {
        Executable::Sync(Arc::new(body))
    }

    pub fn future<F, Fut>(body: F) -> Self
    where
        F: Fn(Value, Dependencies) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = NodeOutcome> + Send + 'static,
    {
        Executable::Future(Arc::new(move |config, deps| body(config, deps).boxed()))
    }

    pub fn callback<F>(body: F) -> Self
    where
        F: Fn(Value, Dependencies, Completion) + Send + Sync + 'static,
    {
        Executable::Callback(Arc::new(body))
    }

    pub fn constant(value: Value) -> Self {
        Executable::Constant(value)
    }

    pub fn mode(&self) -> ExecutionMode {
        match self {
            Executable::Sync(_) => ExecutionMode::Sync,
            Executable::Future(_) => ExecutionMode::Future,
            Executable::Callback(_) => ExecutionMode::Callback,
            Executable::Constant(_) => ExecutionMode::Constant,
        }
    }

    /// Run the body to completion. Panics are not caught here; the scheduler
    /// wraps this future with `catch_unwind`.
    pub(crate) async fn invoke(&self, service: &str, config: Value, deps: Dependencies) -> NodeOutcome {
        match self {
            Executable::Sync(body) => body(&config, &deps),
            Executable::Future(body) => body(config, deps).await,
            Executable::Callback(body) => {
                let (completion, receiver) = Completion::channel();
                body(config, deps, completion);
                receiver
                    .await
                    .unwrap_or_else(|_| Err(ServiceError::CompletionDropped(service.to_string())))
            }
            Executable::Constant(value) => Ok(value.clone()),
        }
    }
}

impl fmt::Debug for Executable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Executable::Constant(value) => f.debug_tuple("Constant").field(value).finish(),
            other => write!(f, "Executable({})", other.mode()),
        }
    }
}
