//! Error types for the preview pipeline
//!
//! Only render failures ever change what the user sees. Everything else is
//! logged and recovered where it happens.

use std::path::PathBuf;
use thiserror::Error;

/// Failure reported by a markup converter
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConvertError {
    #[error("conversion failed: {0}")]
    Failed(String),
    #[error("unsupported input: {0}")]
    Unsupported(&'static str),
}

/// Pipeline-level error taxonomy
#[derive(Debug, Clone, Error, PartialEq)]
pub enum PreviewError {
    /// The converter could not produce HTML for the current source
    #[error("render failed: {0}")]
    RenderFailure(#[from] ConvertError),

    /// The converter panicked on the worker thread
    #[error("render worker panicked: {0}")]
    WorkerPanicked(String),

    /// The worker thread is gone and can no longer accept requests
    #[error("render worker disconnected")]
    WorkerDisconnected,

    /// The worker thread could not be started
    #[error("failed to spawn render worker: {0}")]
    WorkerSpawn(String),

    /// Viewport geometry could not produce a line range
    #[error("degenerate viewport (line height {line_height})")]
    ViewportDegenerate { line_height: f32 },

    /// Scroll synchronisation kept bouncing between editor and preview
    #[error("scroll sync loop aborted after {iterations} iterations")]
    ScrollLoopDetected { iterations: u32 },

    /// The hardware render surface could not be used
    #[error("accelerated backend unavailable: {0}")]
    BackendUnavailable(String),
}

impl PreviewError {
    /// Whether this error replaces the preview with an error page
    pub fn is_user_visible(&self) -> bool {
        matches!(
            self,
            PreviewError::RenderFailure(_)
                | PreviewError::WorkerPanicked(_)
                | PreviewError::WorkerDisconnected
        )
    }
}

/// Accelerated surface construction failure
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("no hardware adapter: {0}")]
    NoAdapter(String),
    #[error("surface creation failed: {0}")]
    SurfaceCreation(String),
}

/// Configuration loading failure
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config value for `{field}`: {reason}")]
    Invalid {
        field: &'static str,
        reason: String,
    },
}
