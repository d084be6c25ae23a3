//! Sandbox configuration
//!
//! Fixed limits used by the pipeline for its own build steps.

use std::time::Duration;

/// Sandbox configuration
#[derive(Debug, Clone)]
pub struct SandboxConfig {
    /// Directory name prefix for created sandboxes
    pub prefix: String,
    /// Time limit of the build check (default: 3s)
    pub build_timeout: Duration,
    /// Time limit of the reference build (default: 10s)
    pub reference_build_timeout: Duration,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            prefix: "Autograder_".to_string(),
            build_timeout: Duration::from_secs(3),
            reference_build_timeout: Duration::from_secs(10),
        }
    }
}

impl SandboxConfig {
    /// Create config with a specific build timeout
    pub fn with_build_timeout(mut self, timeout: Duration) -> Self {
        self.build_timeout = timeout;
        self
    }

    /// Create config with a specific reference build timeout
    pub fn with_reference_build_timeout(mut self, timeout: Duration) -> Self {
        self.reference_build_timeout = timeout;
        self
    }
}
