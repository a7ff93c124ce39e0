// Copyright (c) 2026 Chorus Systems, Inc.
// SPDX-License-Identifier: AGPL-3.0
//! Mod
//!
//! Provides mod functionality for the system.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure
//! - **Purpose:** Implements mod

pub mod agents;
pub mod audit_store;
pub mod event_bus;
pub mod manifest;
pub mod repositories;
pub mod snapshot;
