//! Clipboard access for mouseshare.
//!
//! Defines the [`ClipboardProvider`] trait for platform clipboard backends
//! and a mock implementation for tests. The polling bridge that relays
//! changes between peers lives in the daemon.

use async_trait::async_trait;

use mouseshare_types::ClipboardFormat;

pub mod error;
pub mod mock;

pub use error::ClipboardError;
pub use mock::MockClipboard;

/// Clipboard content with format metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClipboardContent {
    pub format: ClipboardFormat,
    pub data: Vec<u8>,
}

impl ClipboardContent {
    /// Create text clipboard content.
    #[must_use]
    pub fn text(s: &str) -> Self {
        Self {
            format: ClipboardFormat::PlainText,
            data: s.as_bytes().to_vec(),
        }
    }

    /// Try to interpret the data as UTF-8 text.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        if self.format == ClipboardFormat::PlainText {
            std::str::from_utf8(&self.data).ok()
        } else {
            None
        }
    }

    /// Size of the content in bytes.
    #[must_use]
    pub fn size(&self) -> usize {
        self.data.len()
    }
}

/// Platform clipboard access.
#[async_trait]
pub trait ClipboardProvider: Send + 'static {
    /// Current content in the preferred format, if any.
    async fn get(&mut self) -> Result<Option<ClipboardContent>, ClipboardError>;

    /// Replace the clipboard content.
    async fn set(&mut self, content: ClipboardContent) -> Result<(), ClipboardError>;

    /// Monotonic change counter. The polling bridge compares counters to
    /// avoid reading the full content on every tick.
    async fn change_count(&mut self) -> Result<u64, ClipboardError>;
}
