// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

pub mod cache;         // per-service result caching
pub mod config;        // registry configuration files
pub mod engine;        // execution order + scheduler
pub mod errors;        // error handling
pub mod events;        // broadcast notifier
pub mod observability;
pub mod registry;      // service definitions and run entry points
pub mod traits;        // seams: variant selection, notification
