//! Clipboard errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClipboardError {
    #[error("clipboard read failed: {0}")]
    Read(String),

    #[error("clipboard write failed: {0}")]
    Write(String),

    #[error("clipboard content of {size} bytes exceeds maximum {max}")]
    TooLarge { size: usize, max: usize },
}
