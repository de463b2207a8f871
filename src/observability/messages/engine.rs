// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Message types for run lifecycle and node execution events.
//!
//! This module contains message types for logging events related to:
//! * Execution order construction and build-time failures
//! * Run lifecycle (start, completion, failure)
//! * Node dispatch, completion, failure and recovery

use crate::engine::ExecutionMode;
use crate::errors::ServiceError;
use crate::observability::messages::StructuredLog;
use std::fmt::{Display, Formatter};
use std::time::Duration;
use tracing::Span;

/// A run started after its execution order was built.
///
/// # Log Level
/// `info!` - Important operational event
///
/// # Example
/// ```
/// use service_dag::observability::messages::engine::RunStarted;
///
/// let msg = RunStarted {
///     target: "dashboard",
///     node_count: 5,
/// };
///
/// tracing::info!("{}", msg);
/// ```
pub struct RunStarted<'a> {
    pub target: &'a str,
    pub node_count: usize,
}

impl Display for RunStarted<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Starting run for '{}': {} nodes in execution order",
            self.target, self.node_count
        )
    }
}

impl StructuredLog for RunStarted<'_> {
    fn log(&self) {
        tracing::info!(
            target_service = self.target,
            node_count = self.node_count,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!(
            "run",
            span_name = name,
            target_service = self.target,
            node_count = self.node_count,
        )
    }
}

/// A run delivered the target's value.
///
/// # Log Level
/// `info!` - Important operational event
pub struct RunCompleted<'a> {
    pub target: &'a str,
    pub node_count: usize,
    pub duration: Duration,
}

impl Display for RunCompleted<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Run for '{}' completed: {} nodes resolved in {:?}",
            self.target, self.node_count, self.duration
        )
    }
}

impl StructuredLog for RunCompleted<'_> {
    fn log(&self) {
        tracing::info!(
            target_service = self.target,
            node_count = self.node_count,
            duration_ms = self.duration.as_millis() as u64,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!(
            "run_completed",
            span_name = name,
            target_service = self.target,
            node_count = self.node_count,
            duration = ?self.duration,
        )
    }
}

/// A run finished with the target resolved to an error.
///
/// # Log Level
/// `warn!` - The run finished, but not with a value
pub struct RunFailed<'a> {
    pub target: &'a str,
    pub error: &'a ServiceError,
}

impl Display for RunFailed<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Run for '{}' resolved to an error: {}", self.target, self.error)
    }
}

impl StructuredLog for RunFailed<'_> {
    fn log(&self) {
        tracing::warn!(
            target_service = self.target,
            error = %self.error,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::warn_span!(
            "run_failed",
            span_name = name,
            target_service = self.target,
            error = %self.error,
        )
    }
}

/// Building the execution order failed; nothing was executed.
///
/// # Log Level
/// `error!` - Failure requiring attention (broken registry or config)
///
/// # Example
/// ```
/// use service_dag::observability::messages::engine::BuildFailed;
/// use service_dag::errors::ServiceError;
///
/// let error = ServiceError::CircularDependency("a".into());
/// let msg = BuildFailed {
///     target: "a",
///     error: &error,
/// };
///
/// assert_eq!(msg.to_string(), "Cannot build execution order for 'a': circular dependency: a");
/// ```
pub struct BuildFailed<'a> {
    pub target: &'a str,
    pub error: &'a ServiceError,
}

impl Display for BuildFailed<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Cannot build execution order for '{}': {}",
            self.target, self.error
        )
    }
}

impl StructuredLog for BuildFailed<'_> {
    fn log(&self) {
        tracing::error!(
            target_service = self.target,
            error = %self.error,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::error_span!(
            "build_failed",
            span_name = name,
            target_service = self.target,
            error = %self.error,
        )
    }
}

/// A node's dispatch closure was built and scheduled.
///
/// # Log Level
/// `debug!` - Per-node scheduling detail
pub struct NodeDispatched<'a> {
    pub service: &'a str,
    pub mode: Option<ExecutionMode>,
    pub cached: bool,
}

impl Display for NodeDispatched<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self.mode {
            Some(mode) => write!(
                f,
                "Dispatching '{}' ({} body, cached={})",
                self.service, mode, self.cached
            ),
            None => write!(f, "Dispatching '{}' without running its body", self.service),
        }
    }
}

impl StructuredLog for NodeDispatched<'_> {
    fn log(&self) {
        tracing::debug!(
            service = self.service,
            mode = ?self.mode,
            cached = self.cached,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::debug_span!(
            "node",
            span_name = name,
            service = self.service,
            cached = self.cached,
        )
    }
}

/// A node resolved to a value.
///
/// # Log Level
/// `debug!` - Per-node execution detail
pub struct NodeCompleted<'a> {
    pub service: &'a str,
    pub cached: bool,
    pub duration: Duration,
}

impl Display for NodeCompleted<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Service '{}' resolved in {:?} (cached={})",
            self.service, self.duration, self.cached
        )
    }
}

impl StructuredLog for NodeCompleted<'_> {
    fn log(&self) {
        tracing::debug!(
            service = self.service,
            cached = self.cached,
            duration_us = self.duration.as_micros() as u64,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::debug_span!(
            "node_completed",
            span_name = name,
            service = self.service,
            duration = ?self.duration,
        )
    }
}

/// A node resolved to an error, its own or one inherited from a dependency.
///
/// # Log Level
/// `warn!` - Node-local failure; independent branches keep running
pub struct NodeFailed<'a> {
    pub service: &'a str,
    pub error: &'a ServiceError,
}

impl Display for NodeFailed<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Service '{}' resolved to an error: {}", self.service, self.error)
    }
}

impl StructuredLog for NodeFailed<'_> {
    fn log(&self) {
        tracing::warn!(
            service = self.service,
            error = %self.error,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::warn_span!(
            "node_failed",
            span_name = name,
            service = self.service,
            error = %self.error,
        )
    }
}

/// A node's recovery hook replaced an error with a value.
///
/// # Log Level
/// `warn!` - The error was absorbed, but it still happened
pub struct NodeRecovered<'a> {
    pub service: &'a str,
    pub error: &'a ServiceError,
}

impl Display for NodeRecovered<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Service '{}' recovered from error: {}",
            self.service, self.error
        )
    }
}

impl StructuredLog for NodeRecovered<'_> {
    fn log(&self) {
        tracing::warn!(
            service = self.service,
            error = %self.error,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::warn_span!(
            "node_recovered",
            span_name = name,
            service = self.service,
            error = %self.error,
        )
    }
}
