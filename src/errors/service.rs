// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Errors produced while building an execution order or running a node.
//!
//! Build-time errors (`MissingDependency`, `CircularDependency`, `InvalidTarget`)
//! abort a run before any node executes. Every other variant is node-local: it is
//! stored in the run's resolved map and flows to dependents unchanged unless a
//! recovery hook replaces it.

use serde_json::Value;
use thiserror::Error;

/// The value a node resolves to within one run.
pub type NodeOutcome = Result<Value, ServiceError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceError {
    /// A dependency edge points at a name that is not registered.
    #[error("missing dependency: {0}")]
    MissingDependency(String),

    /// A back-edge was found while walking the dependency graph.
    #[error("circular dependency: {0}")]
    CircularDependency(String),

    /// No variant rule matches the configuration for this service.
    #[error("no variant of service '{0}' matches the configuration")]
    NotFound(String),

    /// The executable failed: returned an error, rejected its future or panicked.
    #[error("execution failed: {0}")]
    Execution(String),

    /// Every completion handle of a callback executable was dropped unused.
    #[error("service '{0}' dropped its completion handle without completing")]
    CompletionDropped(String),

    /// The run target cannot be used (empty target list, reserved name).
    #[error("invalid run target: {0}")]
    InvalidTarget(String),
}

impl ServiceError {
    /// Shorthand used by executables to report a failure.
    pub fn execution(message: impl Into<String>) -> Self {
        ServiceError::Execution(message.into())
    }

    pub(crate) fn from_panic(payload: Box<dyn std::any::Any + Send>) -> Self {
        let message = if let Some(text) = payload.downcast_ref::<&str>() {
            (*text).to_string()
        } else if let Some(text) = payload.downcast_ref::<String>() {
            text.clone()
        } else {
            "service panicked".to_string()
        };
        ServiceError::Execution(message)
    }
}
