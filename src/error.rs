//! Error types for the network bootstrap layer.
//!
//! The taxonomy follows the propagation policy: probe failures never get a
//! variant (they are swallowed at their origin), cleanup failures are values
//! the caller logs and moves past, and anything that would leave the node
//! network-unreachable is fatal and propagates to the top level.

use std::time::Duration;

/// Result type alias for bootstrap operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during network bootstrap.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Node configuration is invalid or incomplete.
    #[error("invalid configuration for '{field}': {reason}")]
    ConfigInvalid { field: String, reason: String },

    // =========================================================================
    // Host Network Errors
    // =========================================================================
    /// Stale network deletion failed. Non-fatal: callers log it and
    /// continue the sweep.
    #[error("failed to delete stale network '{network}': {reason}")]
    CleanupFailed { network: String, reason: String },

    /// Host network creation failed. Fatal: without the pod network the
    /// node is unreachable.
    #[error("failed to create network '{network}': {reason}")]
    NetworkCreateFailed { network: String, reason: String },

    // =========================================================================
    // Routing Errors
    // =========================================================================
    /// Management IP did not parse as an IP address.
    #[error("not a valid IP address: '{0}'")]
    InvalidAddress(String),

    /// Could not resolve the outbound route toward the metadata service.
    #[error("failed to resolve outbound route: {0}")]
    RouteResolutionFailed(String),

    /// Could not install the metadata-service route.
    #[error("failed to install metadata route: {0}")]
    RouteInstallFailed(String),

    // =========================================================================
    // Supervision Errors
    // =========================================================================
    /// Supervised process could not be started. Fatal for that role only.
    #[error("failed to launch {role}: {reason}")]
    LaunchFailed { role: String, reason: String },

    /// The shared startup deadline elapsed.
    #[error("deadline exceeded after {duration:?}: {operation}")]
    DeadlineExceeded {
        operation: String,
        duration: Duration,
    },

    // =========================================================================
    // Collaborator Errors
    // =========================================================================
    /// A host shell invocation failed or timed out.
    #[error("host command '{command}' failed: {message}")]
    HostApi { command: String, message: String },

    /// Generic I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Returns true if this error halts the whole bootstrap.
    ///
    /// Cleanup failures are absorbed by the lifecycle manager; everything
    /// else that reaches a caller is fatal.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::CleanupFailed { .. })
    }
}
