// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;

use crate::engine::graph::ResolvedNode;
use crate::engine::Dependencies;
use crate::errors::{NodeOutcome, ServiceError};

/// Trace key of the entry covering the whole run.
pub const RUN_TRACE_KEY: &str = "__all__";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TraceEntry {
    pub start: Instant,
    pub end: Option<Instant>,
    pub duration: Option<Duration>,
}

/// Per-node timing of one run plus the aggregate [`RUN_TRACE_KEY`] entry.
#[derive(Debug, Clone, Default)]
pub struct Trace {
    entries: HashMap<String, TraceEntry>,
}

impl Trace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(&mut self, name: &str) {
        self.entries.insert(
            name.to_string(),
            TraceEntry {
                start: Instant::now(),
                end: None,
                duration: None,
            },
        );
    }

    /// Close the entry for `name` and return its duration.
    pub fn finish(&mut self, name: &str) -> Duration {
        let now = Instant::now();
        let entry = self.entries.entry(name.to_string()).or_insert(TraceEntry {
            start: now,
            end: None,
            duration: None,
        });
        let duration = now.duration_since(entry.start);
        entry.end = Some(now);
        entry.duration = Some(duration);
        duration
    }

    pub fn get(&self, name: &str) -> Option<&TraceEntry> {
        self.entries.get(name)
    }

    pub fn total(&self) -> Option<Duration> {
        self.get(RUN_TRACE_KEY).and_then(|entry| entry.duration)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &TraceEntry)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// What the scheduler can do with a pending node right now.
#[derive(Debug, PartialEq)]
pub(crate) enum Readiness {
    /// A dependency has not resolved yet.
    Waiting,
    /// The node cannot run its body: no variant matched, or a dependency failed.
    Inherit(ServiceError),
    /// Every dependency resolved to a value.
    Ready(Dependencies),
}

/// Mutable state of a single run, owned by that run alone.
#[derive(Debug)]
pub struct RunContext {
    pub resolved: HashMap<String, NodeOutcome>,
    /// Names not yet dispatched, in execution order.
    pub pending: Vec<String>,
    pub trace: Trace,
}

impl RunContext {
    pub fn new(order: Vec<String>) -> Self {
        Self {
            resolved: HashMap::new(),
            pending: order,
            trace: Trace::new(),
        }
    }

    pub(crate) fn readiness(&self, node: &ResolvedNode) -> Readiness {
        if let Err(error) = &node.body {
            return Readiness::Inherit(error.clone());
        }

        let mut deps = Dependencies::new();
        let mut failed = None;
        for name in &node.dependencies {
            match self.resolved.get(name) {
                None => return Readiness::Waiting,
                Some(Ok(value)) => deps.insert(name.clone(), value.clone()),
                Some(Err(error)) => {
                    if failed.is_none() {
                        failed = Some(error.clone());
                    }
                }
            }
        }

        match failed {
            Some(error) => Readiness::Inherit(error),
            None => Readiness::Ready(deps),
        }
    }

    /// Record a node's outcome. An outcome, once recorded, is never replaced.
    pub(crate) fn resolve(&mut self, name: &str, outcome: NodeOutcome) -> Duration {
        let duration = self.trace.finish(name);
        self.resolved.entry(name.to_string()).or_insert(outcome);
        duration
    }

    pub fn is_drained(&self) -> bool {
        self.pending.is_empty()
    }
}
