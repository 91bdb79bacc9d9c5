//! M2J-prefixed error types with structured error codes.

#![allow(missing_docs)]

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Shared `Result` alias for the project.
pub type Result<T> = std::result::Result<T, M2jError>;

/// Top-level error type for m2_janitor.
#[derive(Debug, Error)]
pub enum M2jError {
    #[error("[M2J-1001] invalid configuration: {details}")]
    InvalidConfig { details: String },

    #[error("[M2J-1002] missing configuration file: {path}")]
    MissingConfig { path: PathBuf },

    #[error("[M2J-1003] configuration parse failure in {context}: {details}")]
    ConfigParse {
        context: &'static str,
        details: String,
    },

    #[error("[M2J-2001] artifact cache root missing: {path}")]
    CacheRootMissing { path: PathBuf },

    #[error("[M2J-2002] not an artifact path: {path} ({reason})")]
    NotAnArtifact { path: PathBuf, reason: &'static str },

    #[error("[M2J-2101] serialization failure in {context}: {details}")]
    Serialization {
        context: &'static str,
        details: String,
    },

    #[error("[M2J-3001] permission denied for {path}")]
    PermissionDenied { path: PathBuf },

    #[error("[M2J-3002] IO failure at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("[M2J-3003] channel closed in component {component}")]
    ChannelClosed { component: &'static str },

    #[error("[M2J-4001] build tool unavailable: {tool}")]
    ToolUnavailable { tool: String },

    #[error("[M2J-4002] dependency listing produced no rows for {module}")]
    ListingEmpty { module: PathBuf },

    #[error("[M2J-4003] dependency listing timed out after {secs}s for {module}")]
    ListingTimeout { module: PathBuf, secs: u64 },

    #[error("[M2J-5001] deletion failed for {path}: {details}")]
    DeletionFailed { path: PathBuf, details: String },

    #[error("[M2J-3900] runtime failure: {details}")]
    Runtime { details: String },
}

impl M2jError {
    /// Stable machine-parseable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidConfig { .. } => "M2J-1001",
            Self::MissingConfig { .. } => "M2J-1002",
            Self::ConfigParse { .. } => "M2J-1003",
            Self::CacheRootMissing { .. } => "M2J-2001",
            Self::NotAnArtifact { .. } => "M2J-2002",
            Self::Serialization { .. } => "M2J-2101",
            Self::PermissionDenied { .. } => "M2J-3001",
            Self::Io { .. } => "M2J-3002",
            Self::ChannelClosed { .. } => "M2J-3003",
            Self::ToolUnavailable { .. } => "M2J-4001",
            Self::ListingEmpty { .. } => "M2J-4002",
            Self::ListingTimeout { .. } => "M2J-4003",
            Self::DeletionFailed { .. } => "M2J-5001",
            Self::Runtime { .. } => "M2J-3900",
        }
    }

    /// Whether retrying might resolve the failure.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Io { .. }
                | Self::ChannelClosed { .. }
                | Self::ListingEmpty { .. }
                | Self::ListingTimeout { .. }
                | Self::DeletionFailed { .. }
                | Self::Runtime { .. }
        )
    }

    /// Whether the run can continue after this failure (degraded, not fatal).
    ///
    /// Everything in the listing/scan taxonomy recovers locally; only
    /// configuration problems abort the run.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            Self::InvalidConfig { .. } | Self::MissingConfig { .. } | Self::ConfigParse { .. }
        )
    }

    /// Convenience constructor for IO errors with a known path.
    #[must_use]
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }
}

impl From<serde_json::Error> for M2jError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization {
            context: "serde_json",
            details: value.to_string(),
        }
    }
}

impl From<toml::de::Error> for M2jError {
    fn from(value: toml::de::Error) -> Self {
        Self::ConfigParse {
            context: "toml",
            details: value.to_string(),
        }
    }
}
