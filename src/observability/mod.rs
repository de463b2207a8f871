// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Observability module for structured logging and tracing.
//!
//! This module provides centralized message types for all diagnostic and operational
//! logging in the service graph engine. Message types follow a struct-based pattern
//! with a `Display` implementation so that:
//!
//! * Log text is not scattered through the engine as magic strings
//! * Every message carries the same structured fields wherever it is emitted
//! * Spans and events for one subsystem share their field names
//!
//! # Architecture
//!
//! Messages are organized by subsystem:
//! * `messages::engine` - run lifecycle, graph building and node execution events
//! * `messages::cache` - cache hits, stores and evictions
//!
//! # Usage
//!
//! ```rust
//! use service_dag::observability::messages::engine::NodeFailed;
//! use service_dag::observability::messages::StructuredLog;
//! use service_dag::errors::ServiceError;
//!
//! let error = ServiceError::execution("upstream timed out");
//! NodeFailed {
//!     service: "user_profile",
//!     error: &error,
//! }
//! .log();
//! ```

pub mod messages;
