// Copyright (c) 2026 Chorus Systems, Inc.
// SPDX-License-Identifier: AGPL-3.0
//! Mod
//!
//! Provides mod functionality for the system.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Implements mod

pub mod agent;
pub mod audit;
pub mod config;
pub mod events;
pub mod explain;
pub mod negotiation;
pub mod proposal;
pub mod repository;
pub mod scenario;
pub mod session;
pub mod snapshot;
