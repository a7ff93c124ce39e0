// Copyright (c) 2026 Chorus Systems, Inc.
// SPDX-License-Identifier: AGPL-3.0
//! Application Layer
//!
//! Use-case services composing the domain model: the supervisor wraps
//! single agent calls with the resilience policy, the coordinator drives
//! the two-stage pipeline, the recorder annotates outcomes, and the
//! orchestrator owns session lifecycles end to end.

pub mod coordinator;
pub mod orchestrator;
pub mod recorder;
pub mod supervisor;

pub use coordinator::{AgentCoordinator, CoordinationError};
pub use orchestrator::{builtin_orchestrator, Orchestrator, ResultStatus, SubmitError};
pub use recorder::ExplainabilityRecorder;
pub use supervisor::invoke_supervised;
