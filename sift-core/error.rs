use thiserror::Error;

/// Coarse classification of a [`SiftError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Absent, empty or malformed image / mask data
    InvalidInput,
    /// Parameters that cannot produce a scale space
    InvalidConfiguration,
    /// Caller requested cancellation between octaves
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SiftError {
    #[error("Invalid image dimensions: {width}x{height} (must be > 0)")]
    InvalidImageSize { width: usize, height: usize },

    #[error("Image data length mismatch: expected {expected_len}, got {actual_len}")]
    InvalidImageData { expected_len: usize, actual_len: usize },

    #[error("Mask {mask_width}x{mask_height} does not match image {width}x{height}")]
    MaskSizeMismatch {
        width: usize,
        height: usize,
        mask_width: usize,
        mask_height: usize,
    },

    #[error("Pyramid mismatch: {0}")]
    PyramidMismatch(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Detection cancelled")]
    Cancelled,
}

impl SiftError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SiftError::InvalidImageSize { .. }
            | SiftError::InvalidImageData { .. }
            | SiftError::MaskSizeMismatch { .. }
            | SiftError::PyramidMismatch(_) => ErrorKind::InvalidInput,
            SiftError::InvalidConfiguration(_) => ErrorKind::InvalidConfiguration,
            SiftError::Cancelled => ErrorKind::Cancelled,
        }
    }

    pub(crate) fn config(msg: impl Into<String>) -> Self {
        SiftError::InvalidConfiguration(msg.into())
    }
}

pub type SiftResult<T> = Result<T, SiftError>;
