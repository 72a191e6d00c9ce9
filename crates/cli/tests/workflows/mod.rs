//! Workflow integration tests
//!
//! Tests for complete workflows that run the built `settle` binary
//! and validate end-to-end behavior.

pub mod config_commands;
pub mod watch_copy;
