// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

pub mod context;
pub mod executable;
pub mod graph;
pub mod scheduler;
#[cfg(test)]
mod integration_tests;

pub use context::{RunContext, Trace, TraceEntry, RUN_TRACE_KEY};
pub use executable::{Completion, Dependencies, Executable, ExecutionMode};
pub use graph::{build_execution_order, ResolvedNode};
pub use scheduler::{RunOutput, MAIN_NODE};
