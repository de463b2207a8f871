// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Execution order construction.
//!
//! The graph is never materialized up front: the dependencies of a service depend
//! on the configuration of the run, so they are discovered while walking from
//! the target. The walk is an iterative depth-first search over an explicit
//! stack (service graphs are user-defined and may be arbitrarily deep) that
//! tracks two sets:
//!
//! * **visited** - names that have been on top of the stack at least once
//! * **backtracked** - names whose dependencies are all placed in the order
//!
//! An edge to a name that is visited but not backtracked is a back-edge, i.e. a
//! cycle. A name is appended to the order when it backtracks, so every name
//! follows its dependencies and the target comes last.

use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::cache::CacheStore;
use crate::engine::Executable;
use crate::errors::ServiceError;
use crate::registry::RecoveryHook;

/// One service as it appears within a single run.
#[derive(Clone)]
pub struct ResolvedNode {
    pub name: String,
    /// Declared dependencies; always empty for cache hits and unresolved variants.
    pub dependencies: Vec<String>,
    /// The body to run, or why no variant applies to this run's configuration.
    pub body: Result<Executable, ServiceError>,
    pub cached: bool,
    pub(crate) recovery: Option<RecoveryHook>,
    pub(crate) cache: Option<Arc<CacheStore>>,
}

impl ResolvedNode {
    pub fn new(name: impl Into<String>, dependencies: Vec<String>, body: Executable) -> Self {
        Self {
            name: name.into(),
            dependencies,
            body: Ok(body),
            cached: false,
            recovery: None,
            cache: None,
        }
    }

    pub fn unresolved(name: impl Into<String>, error: ServiceError) -> Self {
        Self {
            name: name.into(),
            dependencies: Vec::new(),
            body: Err(error),
            cached: false,
            recovery: None,
            cache: None,
        }
    }

    pub fn cache_hit(name: impl Into<String>, value: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            dependencies: Vec::new(),
            body: Ok(Executable::Constant(value)),
            cached: true,
            recovery: None,
            cache: None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.body.is_ok()
    }
}

impl std::fmt::Debug for ResolvedNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedNode")
            .field("name", &self.name)
            .field("dependencies", &self.dependencies)
            .field("body", &self.body)
            .field("cached", &self.cached)
            .field("recovers", &self.recovery.is_some())
            .finish()
    }
}

/// Resolves each name at most once per run and remembers the result.
pub(crate) struct NodeResolver<F> {
    lookup: F,
    nodes: HashMap<String, ResolvedNode>,
}

impl<F> NodeResolver<F>
where
    F: FnMut(&str) -> Option<ResolvedNode>,
{
    pub(crate) fn new(lookup: F) -> Self {
        Self {
            lookup,
            nodes: HashMap::new(),
        }
    }

    /// Dependencies of `name`, or `None` when no such service is registered.
    pub(crate) fn dependencies_of(&mut self, name: &str) -> Option<Vec<String>> {
        let node = match self.nodes.entry(name.to_string()) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => entry.insert((self.lookup)(name)?),
        };
        Some(node.dependencies.clone())
    }

    pub(crate) fn into_nodes(self) -> HashMap<String, ResolvedNode> {
        self.nodes
    }
}

/// Build the execution order for `target`.
///
/// `dependencies_of` returns a name's dependency list, or `None` if the name is
/// not registered. It is called every time a name is on top of the stack, so
/// callers should memoize (see [`NodeResolver`]).
///
/// Fails with `MissingDependency` for an unregistered name and
/// `CircularDependency` for the first back-edge found; both abort the build.
pub fn build_execution_order<F>(target: &str, mut dependencies_of: F) -> Result<Vec<String>, ServiceError>
where
    F: FnMut(&str) -> Option<Vec<String>>,
{
    let mut visited: HashSet<String> = HashSet::new();
    let mut backtracked: HashSet<String> = HashSet::new();
    let mut stack: Vec<String> = vec![target.to_string()];
    let mut order: Vec<String> = Vec::new();

    while let Some(current) = stack.last().cloned() {
        visited.insert(current.clone());

        let dependencies = dependencies_of(&current)
            .ok_or_else(|| ServiceError::MissingDependency(current.clone()))?;

        let mut next = None;
        for dependency in dependencies {
            if visited.contains(&dependency) {
                if !backtracked.contains(&dependency) {
                    return Err(ServiceError::CircularDependency(dependency));
                }
            } else if next.is_none() {
                next = Some(dependency);
            }
        }

        match next {
            Some(dependency) => stack.push(dependency),
            None => {
                backtracked.insert(current.clone());
                order.push(current);
                stack.pop();
            }
        }
    }

    Ok(order)
}
