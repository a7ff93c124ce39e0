// Copyright (c) 2026 Chorus Systems, Inc.
// SPDX-License-Identifier: AGPL-3.0

pub mod config;
pub mod scenario;
pub mod serve;

pub use config::ConfigCommand;
pub use scenario::ScenarioCommand;
