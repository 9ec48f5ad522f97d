// src/error.rs

use thiserror::Error;

/// Errors raised by the detectors.
///
/// Configuration and capability errors are fatal and surface at construction.
/// Only `Inference` is a per-frame condition.
#[derive(Debug, Error)]
pub enum DetectorError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("backend '{backend}' is not available on this machine")]
    BackendUnavailable { backend: String },

    #[error("failed to load model '{path}': {reason}")]
    ModelLoad { path: String, reason: String },

    #[error("'{operation}' is not supported for model variant '{variant}'")]
    Unsupported {
        operation: &'static str,
        variant: String,
    },

    #[error("invalid frame dimensions {width}x{height}")]
    InvalidFrame { width: usize, height: usize },

    #[error("inference failed: {0}")]
    Inference(String),
}

impl DetectorError {
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig(reason.into())
    }

    /// True for errors that must abort pipeline startup rather than skip a frame.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::Inference(_))
    }
}

impl From<ort::Error> for DetectorError {
    fn from(err: ort::Error) -> Self {
        Self::Inference(err.to_string())
    }
}

impl From<opencv::Error> for DetectorError {
    fn from(err: opencv::Error) -> Self {
        Self::Inference(err.to_string())
    }
}

pub type DetectorResult<T> = std::result::Result<T, DetectorError>;
