//! # Orchestrator Testing Utils
//!
//! Shared testing utilities for the orchestration control plane.
//! This crate provides doubles for every collaborator port together with
//! builders and helpers used across all other crates in the workspace.
//!
//! ## Features
//!
//! - **Virtual time**: `ManualClock` and `ManualTicker` so tests advance time explicitly
//! - **Recording doubles**: event sink, provisioner, metrics source, failure handler
//! - **Test Data Builders**: tasks, workers and pool metrics snapshots
//!
//! ## Usage
//!
//! ```toml
//! [dev-dependencies]
//! orchestrator-testing-utils = { path = "../testing-utils" }
//! ```

pub mod builders;
pub mod helpers;
pub mod mocks;

pub use builders::*;
pub use helpers::*;
pub use mocks::*;
