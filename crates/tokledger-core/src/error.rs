//! Error types for tokledger operations.
//!
//! This module defines [`LedgerError`], the error enum shared by every
//! tokledger crate. Per-record and per-file problems never reach this type;
//! they are skipped and counted where they occur. What remains here are the
//! conditions a command has to report to the user.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using [`LedgerError`].
pub type Result<T> = std::result::Result<T, LedgerError>;

/// Error type for all tokledger operations.
#[derive(Debug, Error)]
pub enum LedgerError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Configuration file not found
    #[error("Configuration not found at {path}")]
    ConfigNotFound {
        path: PathBuf,
        #[source]
        source: Option<std::io::Error>,
    },

    /// Configuration file is invalid YAML
    #[error("Invalid configuration at {path}: {message}")]
    ConfigInvalid { path: PathBuf, message: String },

    /// Configuration validation failed
    #[error("Configuration validation failed: {message}")]
    ConfigValidation { message: String },

    /// Missing required configuration field
    #[error("Missing required config field: {field}")]
    ConfigMissingField { field: String },

    // =========================================================================
    // I/O Errors
    // =========================================================================
    /// Generic I/O error with context
    #[error("I/O error {operation}: {path}")]
    Io {
        operation: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Directory creation failed
    #[error("Failed to create directory: {path}")]
    DirectoryCreation {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // =========================================================================
    // Parsing Errors
    // =========================================================================
    /// JSON parsing error
    #[error("JSON parse error in {context}: {message}")]
    JsonParse {
        context: String,
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    /// YAML parsing error
    #[error("YAML parse error in {context}: {message}")]
    YamlParse { context: String, message: String },

    // =========================================================================
    // Ledger Errors
    // =========================================================================
    /// The persisted ledger exists but cannot be decoded
    #[error("Ledger file {path} is corrupt: {message}")]
    LedgerCorrupt { path: PathBuf, message: String },

    /// Peak snapshot file is unusable
    #[error("Invalid peak snapshot {path}: {message}")]
    SnapshotInvalid { path: PathBuf, message: String },

    // =========================================================================
    // Cross-device Data Errors
    // =========================================================================
    /// Device export directory is missing
    #[error("Data directory not found: {path}")]
    DataDirNotFound { path: PathBuf },

    /// Device export directory holds no usable exports
    #[error("No usage data found in {path}")]
    NoUsageData { path: PathBuf },
}

impl LedgerError {
    // =========================================================================
    // Constructor helpers for common error patterns
    // =========================================================================

    /// Create a ConfigNotFound error
    pub fn config_not_found(path: impl Into<PathBuf>) -> Self {
        Self::ConfigNotFound {
            path: path.into(),
            source: None,
        }
    }

    /// Create a ConfigNotFound error with source
    pub fn config_not_found_with_source(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::ConfigNotFound {
            path: path.into(),
            source: Some(source),
        }
    }

    /// Create an I/O error
    pub fn io(operation: impl Into<String>, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            operation: operation.into(),
            path: path.into(),
            source,
        }
    }

    /// Create a JSON parse error
    pub fn json_parse(context: impl Into<String>, source: serde_json::Error) -> Self {
        Self::JsonParse {
            context: context.into(),
            message: source.to_string(),
            source: Some(source),
        }
    }

    /// Create a corrupt ledger error
    pub fn ledger_corrupt(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::LedgerCorrupt {
            path: path.into(),
            message: message.into(),
        }
    }

    // =========================================================================
    // Error classification helpers
    // =========================================================================

    /// Returns true if this error means the ledger must not be touched until
    /// an operator looks at it
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::LedgerCorrupt { .. })
    }

    /// Returns true if this is a configuration error
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::ConfigNotFound { .. }
                | Self::ConfigInvalid { .. }
                | Self::ConfigValidation { .. }
                | Self::ConfigMissingField { .. }
        )
    }

    /// Returns true if there was nothing to report on
    pub fn is_missing_data(&self) -> bool {
        matches!(self, Self::DataDirNotFound { .. } | Self::NoUsageData { .. })
    }

    /// Returns actionable guidance for the user
    pub fn guidance(&self) -> Option<&'static str> {
        match self {
            Self::ConfigNotFound { .. } => {
                Some("Run 'tokledger init' to create a configuration file")
            }
            Self::ConfigInvalid { .. } | Self::ConfigValidation { .. } => {
                Some("Check ~/.tokledger/config.yaml for typos or out-of-range values")
            }
            Self::LedgerCorrupt { .. } => Some(
                "Restore the ledger from a backup or run 'tokledger reseed' with a trusted snapshot",
            ),
            Self::DataDirNotFound { .. } => {
                Some("Check data_dir in ~/.tokledger/config.yaml")
            }
            Self::NoUsageData { .. } => {
                Some("Run 'tokledger sync' on each device first")
            }
            _ => None,
        }
    }
}
