//! Application-wide error types.
//!
//! This module provides a unified error hierarchy for the application.
//! Library modules use specific error types via `thiserror`, while
//! CLI/main uses `anyhow` for convenient error propagation.
//!
//! # Design
//!
//! - [`Error`]: Top-level application error enum
//! - Module-specific errors ([`PlaybackError`], [`CatalogError`],
//!   [`ConfigError`]) for detailed handling
//! - All errors implement `std::error::Error` for compatibility
//!
//! # Example
//!
//! ```ignore
//! use soundshelf::error::{Error, Result, ResultExt};
//!
//! fn open_catalog(path: &Path) -> Result<JsonCatalog> {
//!     let catalog = JsonCatalog::load(path)?; // Catalog errors auto-convert
//!     Ok(catalog)
//! }
//! ```

use crate::catalog::CatalogError;
use crate::config::ConfigError;
use crate::player::PlaybackError;

/// Application-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level application error.
///
/// Aggregates errors from all subsystems for unified handling.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// File I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Audio playback error
    #[error("Playback error: {0}")]
    Playback(#[from] PlaybackError),

    /// Catalog lookup error
    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    /// Config file error
    #[error("Config file error: {0}")]
    ConfigFile(#[from] ConfigError),

    /// Invalid configuration value
    #[error("Configuration error: {0}")]
    Config(String),

    /// Generic error with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Create a config error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Add context to an error.
    pub fn context(self, ctx: impl Into<String>) -> Self {
        Self::WithContext {
            context: ctx.into(),
            source: Box::new(self),
        }
    }
}

/// Extension trait for adding context to Results.
pub trait ResultExt<T> {
    /// Add context to an error result.
    fn with_context(self, ctx: impl Into<String>) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn with_context(self, ctx: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.context(ctx))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, std::io::Error> {
    fn with_context(self, ctx: impl Into<String>) -> Result<T> {
        self.map_err(|e| Error::Io(e).context(ctx))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, CatalogError> {
    fn with_context(self, ctx: impl Into<String>) -> Result<T> {
        self.map_err(|e| Error::Catalog(e).context(ctx))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, PlaybackError> {
    fn with_context(self, ctx: impl Into<String>) -> Result<T> {
        self.map_err(|e| Error::Playback(e).context(ctx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::from(CatalogError::TrackNotFound("t9".into()));
        assert!(err.to_string().contains("t9"));
    }

    #[test]
    fn test_error_with_context() {
        let err = Error::from(PlaybackError::ResourceLoadFailure("HTTP 404".into()))
            .context("while playing track t1");
        let msg = err.to_string();
        assert!(msg.contains("while playing track t1"));
        assert!(msg.contains("HTTP 404"));
    }

    #[test]
    fn test_config_error() {
        let err = Error::config("volume out of range");
        assert!(err.to_string().contains("volume out of range"));
    }

    #[test]
    fn test_result_ext() {
        let result: std::result::Result<(), CatalogError> =
            Err(CatalogError::Network("timed out".into()));
        let with_ctx = result.with_context("loading tracks");
        let msg = with_ctx.unwrap_err().to_string();
        assert!(msg.contains("loading tracks"));
        assert!(msg.contains("timed out"));
    }
}
