//! Mock clipboard backend for testing.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::error::ClipboardError;
use crate::{ClipboardContent, ClipboardProvider};

#[derive(Debug, Default)]
struct MockState {
    content: Option<ClipboardContent>,
    change_count: u64,
}

/// In-memory clipboard for tests.
#[derive(Default)]
pub struct MockClipboard {
    state: Arc<Mutex<MockState>>,
}

impl MockClipboard {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Observer/driver handle: tests use it to simulate a local copy and to
    /// inspect what a remote update wrote.
    pub fn handle(&self) -> MockClipboardHandle {
        MockClipboardHandle {
            state: Arc::clone(&self.state),
        }
    }
}

/// Clonable handle for [`MockClipboard`].
#[derive(Clone)]
pub struct MockClipboardHandle {
    state: Arc<Mutex<MockState>>,
}

impl MockClipboardHandle {
    /// Simulate the user copying something locally.
    pub fn copy(&self, content: ClipboardContent) {
        let mut state = self.state.lock().unwrap();
        state.content = Some(content);
        state.change_count += 1;
    }

    pub fn content(&self) -> Option<ClipboardContent> {
        self.state.lock().unwrap().content.clone()
    }

    pub fn change_count(&self) -> u64 {
        self.state.lock().unwrap().change_count
    }
}

#[async_trait]
impl ClipboardProvider for MockClipboard {
    async fn get(&mut self) -> Result<Option<ClipboardContent>, ClipboardError> {
        Ok(self.state.lock().unwrap().content.clone())
    }

    async fn set(&mut self, content: ClipboardContent) -> Result<(), ClipboardError> {
        let mut state = self.state.lock().unwrap();
        state.content = Some(content);
        state.change_count += 1;
        Ok(())
    }

    async fn change_count(&mut self) -> Result<u64, ClipboardError> {
        Ok(self.state.lock().unwrap().change_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn copy_bumps_change_count() {
        let mut clipboard = MockClipboard::new();
        let handle = clipboard.handle();
        assert_eq!(clipboard.change_count().await.unwrap(), 0);

        handle.copy(ClipboardContent::text("copied"));
        assert_eq!(clipboard.change_count().await.unwrap(), 1);
        assert_eq!(
            clipboard.get().await.unwrap().unwrap().as_text(),
            Some("copied")
        );
    }
}
