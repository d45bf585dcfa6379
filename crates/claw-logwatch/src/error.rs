//! Error types for the log watcher.
//!
//! Variants fall into three policy groups that the monitor treats differently:
//!
//! - transient per-target failures ([`WatchError::Fetch`], [`WatchError::Discovery`],
//!   [`WatchError::Timeout`], [`WatchError::Http`]) skip the pod or namespace
//!   for the current tick;
//! - provider failures ([`WatchError::Provider`]) degrade an advisory to
//!   "unavailable";
//! - configuration failures ([`WatchError::Config`], [`WatchError::InvalidPattern`],
//!   [`WatchError::Io`], [`WatchError::Serialization`]) are fatal at startup.

use thiserror::Error;

/// Errors that can occur while watching pod logs.
#[derive(Debug, Error)]
pub enum WatchError {
    /// Invalid or missing configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// A pattern definition could not be compiled.
    #[error("invalid pattern '{name}': {reason}")]
    InvalidPattern {
        /// Name of the offending pattern.
        name: String,
        /// Why it was rejected.
        reason: String,
    },

    /// Listing pods in a namespace failed.
    #[error("pod discovery failed for namespace {namespace}: {reason}")]
    Discovery {
        /// Namespace being listed.
        namespace: String,
        /// Underlying failure.
        reason: String,
    },

    /// Fetching logs for a pod failed.
    #[error("log fetch failed for {target}: {reason}")]
    Fetch {
        /// `namespace/pod` of the target.
        target: String,
        /// Underlying failure.
        reason: String,
    },

    /// The advisory provider call failed.
    #[error("advisory provider error: {0}")]
    Provider(String),

    /// An external call exceeded its deadline.
    #[error("operation timed out after {0}s")]
    Timeout(u64),

    /// HTTP transport error.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization or deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl WatchError {
    /// Returns true for failures that only affect the current poll of one target.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Fetch { .. } | Self::Discovery { .. } | Self::Timeout(_) | Self::Http(_)
        )
    }

    /// Returns true for failures that must stop the process before monitoring starts.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Config(_) | Self::InvalidPattern { .. } | Self::Io(_) | Self::Serialization(_)
        )
    }
}

/// Result type alias for watcher operations.
pub type Result<T> = std::result::Result<T, WatchError>;
