//! Error types for the scanning pipeline.
//!
//! None of these are fatal to the host: frame errors cause a frame to be
//! skipped, decode errors are logged by the worker and the loop continues.

use std::any::Any;

/// Errors that can occur while constructing or converting frames.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// Frame has zero width or height.
    #[error("Frame has zero area ({width}x{height})")]
    ZeroArea { width: u32, height: u32 },

    /// Raw buffer length does not match the declared geometry.
    #[error("Frame buffer size mismatch: expected {expected} bytes, got {actual}")]
    SizeMismatch { expected: usize, actual: usize },

    /// Frame dimensions overflow addressable memory.
    #[error("Frame dimensions too large: {width}x{height}")]
    TooLarge { width: u32, height: u32 },
}

/// Errors reported by a symbol decoder.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// Decoder backend returned an error for the whole frame.
    #[error("Decoder '{backend}' failed: {message}")]
    Backend { backend: String, message: String },

    /// Decoder panicked while processing a frame.
    #[error("Decoder panicked: {0}")]
    Panicked(String),
}

impl DecodeError {
    /// Create a backend error.
    pub fn backend(backend: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Backend {
            backend: backend.into(),
            message: message.into(),
        }
    }
}

/// Top-level errors surfaced by pipeline construction.
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    /// Failed to spawn a pipeline thread.
    #[error("Failed to spawn {thread} thread: {source}")]
    SpawnFailed {
        thread: &'static str,
        source: std::io::Error,
    },

    /// Frame error.
    #[error("Frame error: {0}")]
    Frame(#[from] FrameError),

    /// Decode error.
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),
}

/// Result type for pipeline operations.
pub type ScanResult<T> = Result<T, ScanError>;

/// Text of a caught panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
