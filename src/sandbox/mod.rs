//! Sandbox module - Ephemeral working directories
//!
//! This module provides the isolated directories a grading run works in:
//! - `SandboxDir`: one temporary directory tree, deleted on drop or `cleanup`
//! - `SandboxPair`: the submission sandbox and the reference sandbox
//! - `ScratchGuard`: per-test scratch files removed on every exit path
//!
//! The sandbox module does NOT:
//! - Run commands (that's the runner's job)
//! - Decide which files a test needs

pub mod config;
pub mod scratch;
pub mod temp_box;

// Re-exports for convenience
pub use config::SandboxConfig;
pub use scratch::ScratchGuard;
pub use temp_box::{SandboxDir, SandboxPair};
