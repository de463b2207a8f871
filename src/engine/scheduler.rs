// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Scan-and-dispatch scheduler for one run.
//!
//! The scheduler walks the pending part of the execution order, launches every
//! node that can make progress, then waits for any launched node to finish and
//! scans again. Nodes are launched on their own tokio task so that a long chain
//! of ready nodes never grows the call stack and independent nodes interleave
//! freely. Finished nodes report back over an unbounded channel; the run state
//! itself is only touched by the scanning loop.
//!
//! ```text
//! Idle -> Scanning -> Dispatching -> (Scanning | Done)
//! ```
//!
//! A node whose own variant failed to resolve, or one of whose dependencies
//! resolved to an error, does not run its body. It resolves to its recovery
//! hook's value when it has one, otherwise to the error unchanged.

use futures::FutureExt;
use serde_json::Value;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tracing::Instrument;

use crate::engine::context::{Readiness, RunContext, Trace, RUN_TRACE_KEY};
use crate::engine::graph::ResolvedNode;
use crate::engine::{Dependencies, Executable};
use crate::errors::{NodeOutcome, ServiceError};
use crate::observability::messages::cache::CacheWriteFailed;
use crate::observability::messages::engine::{
    NodeCompleted, NodeDispatched, NodeFailed, NodeRecovered, RunCompleted, RunFailed,
};
use crate::observability::messages::StructuredLog;
use crate::registry::RecoveryHook;
use crate::traits::Notifier;

/// Name of the implicit terminal node of a run over several targets.
pub const MAIN_NODE: &str = "__main__";

/// Everything a successful run delivers.
#[derive(Debug, Clone)]
pub struct RunOutput {
    /// The target's value.
    pub value: Value,
    /// Outcome of every node in the execution order, failures of
    /// independent branches included.
    pub resolved: HashMap<String, NodeOutcome>,
    pub trace: Trace,
}

enum Job {
    Inherit(ServiceError),
    Invoke {
        executable: Executable,
        deps: Dependencies,
    },
}

struct Finished {
    name: String,
    outcome: NodeOutcome,
    cached: bool,
    recovered_from: Option<ServiceError>,
}

pub(crate) struct Scheduler {
    config: Value,
    nodes: HashMap<String, ResolvedNode>,
    notifier: Option<Arc<dyn Notifier>>,
    limiter: Option<Arc<Semaphore>>,
}

impl Scheduler {
    pub(crate) fn new(
        config: Value,
        nodes: HashMap<String, ResolvedNode>,
        notifier: Option<Arc<dyn Notifier>>,
        limiter: Option<Arc<Semaphore>>,
    ) -> Self {
        Self {
            config,
            nodes,
            notifier,
            limiter,
        }
    }

    /// Execute `order` (which must end with `target`) and deliver the target's outcome.
    pub(crate) async fn run(self, target: &str, order: Vec<String>) -> Result<RunOutput, ServiceError> {
        let node_count = order.len();
        let mut ctx = RunContext::new(order);
        ctx.trace.start(RUN_TRACE_KEY);

        let (tx, mut rx) = mpsc::unbounded_channel::<Finished>();
        let mut in_flight = 0usize;

        loop {
            in_flight += self.scan(&mut ctx, &tx);
            if in_flight == 0 {
                break;
            }
            let Some(finished) = rx.recv().await else {
                break;
            };
            in_flight -= 1;
            self.record(&mut ctx, finished);
        }

        let duration = ctx.trace.finish(RUN_TRACE_KEY);
        match ctx.resolved.get(target).cloned() {
            Some(Ok(value)) => {
                RunCompleted {
                    target,
                    node_count,
                    duration,
                }
                .log();
                Ok(RunOutput {
                    value,
                    resolved: ctx.resolved,
                    trace: ctx.trace,
                })
            }
            Some(Err(error)) => {
                RunFailed {
                    target,
                    error: &error,
                }
                .log();
                Err(error)
            }
            None if ctx.is_drained() => Err(ServiceError::execution(format!(
                "run ended before '{target}' resolved"
            ))),
            None => Err(ServiceError::execution(format!(
                "run stalled before '{target}' resolved; still pending: {}",
                ctx.pending.join(", ")
            ))),
        }
    }

    /// Launch every pending node that can make progress; returns how many were launched.
    fn scan(&self, ctx: &mut RunContext, tx: &mpsc::UnboundedSender<Finished>) -> usize {
        let mut launched = 0;
        let mut index = 0;

        while index < ctx.pending.len() {
            let name = &ctx.pending[index];
            let job = match self.nodes.get(name) {
                None => Job::Inherit(ServiceError::MissingDependency(name.clone())),
                Some(node) => match (ctx.readiness(node), &node.body) {
                    (Readiness::Waiting, _) => {
                        index += 1;
                        continue;
                    }
                    (Readiness::Ready(deps), Ok(executable)) => Job::Invoke {
                        executable: executable.clone(),
                        deps,
                    },
                    (Readiness::Ready(_), Err(error)) => Job::Inherit(error.clone()),
                    (Readiness::Inherit(error), _) => Job::Inherit(error),
                },
            };

            let name = ctx.pending.remove(index);
            ctx.trace.start(&name);
            self.dispatch(name, job, tx.clone());
            launched += 1;
        }

        launched
    }

    fn dispatch(&self, name: String, job: Job, tx: mpsc::UnboundedSender<Finished>) {
        let node = self.nodes.get(&name);
        let cached = node.map(|n| n.cached).unwrap_or(false);
        let recovery: Option<RecoveryHook> = node.and_then(|n| n.recovery.clone());

        let message = NodeDispatched {
            service: &name,
            mode: match &job {
                Job::Invoke { executable, .. } => Some(executable.mode()),
                Job::Inherit(_) => None,
            },
            cached,
        };
        message.log();
        let span = message.span("dispatch");

        let config = self.config.clone();
        let limiter = self.limiter.clone();

        tokio::spawn(
            async move {
                let raw = match job {
                    Job::Inherit(error) => Err(error),
                    Job::Invoke { executable, deps } => {
                        let _permit = match limiter {
                            Some(semaphore) => semaphore.acquire_owned().await.ok(),
                            None => None,
                        };
                        AssertUnwindSafe(executable.invoke(&name, config.clone(), deps))
                            .catch_unwind()
                            .await
                            .unwrap_or_else(|panic| Err(ServiceError::from_panic(panic)))
                    }
                };

                let (outcome, recovered_from) = match (raw, recovery) {
                    (Err(error), Some(hook)) => {
                        match std::panic::catch_unwind(AssertUnwindSafe(|| hook(&config))) {
                            Ok(value) => (Ok(value), Some(error)),
                            Err(panic) => (Err(ServiceError::from_panic(panic)), None),
                        }
                    }
                    (raw, _) => (raw, None),
                };

                // The receiver only closes once the run has returned.
                let _ = tx.send(Finished {
                    name,
                    outcome,
                    cached,
                    recovered_from,
                });
            }
            .instrument(span),
        );
    }

    fn record(&self, ctx: &mut RunContext, finished: Finished) {
        let Finished {
            name,
            outcome,
            cached,
            recovered_from,
        } = finished;

        if let Some(error) = &recovered_from {
            NodeRecovered {
                service: &name,
                error,
            }
            .log();
        }

        let duration = ctx.resolve(&name, outcome);
        let Some(outcome) = ctx.resolved.get(&name) else {
            return;
        };

        match outcome {
            Ok(value) => {
                NodeCompleted {
                    service: &name,
                    cached,
                    duration,
                }
                .log();
                if !cached {
                    self.store_and_notify(&name, value);
                }
            }
            Err(error) => NodeFailed {
                service: &name,
                error,
            }
            .log(),
        }
    }

    fn store_and_notify(&self, name: &str, value: &Value) {
        if let Some(cache) = self.nodes.get(name).and_then(|n| n.cache.as_ref()) {
            let stored = std::panic::catch_unwind(AssertUnwindSafe(|| {
                cache.put(&self.config, value.clone())
            }));
            if let Err(payload) = stored {
                CacheWriteFailed {
                    service: name,
                    error: &ServiceError::from_panic(payload),
                }
                .log();
            }
        }

        if name == MAIN_NODE {
            return;
        }
        if let Some(notifier) = &self.notifier {
            let notifier = Arc::clone(notifier);
            let service = name.to_string();
            let value = value.clone();
            let config = self.config.clone();
            tokio::spawn(async move {
                notifier.notify(&service, &value, &config).await;
            });
        }
    }
}
