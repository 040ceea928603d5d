//! Clipboard polling bridge.
//!
//! Polls the local clipboard on a fixed interval and reports changes to the
//! controller, which broadcasts them. Remote updates are applied through
//! the command channel under a self-update guard: the bridge remembers the
//! change count its own write produced and skips it on the next poll.

use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use mouseshare_clipboard::{ClipboardContent, ClipboardProvider};

use crate::daemon::DaemonEvent;

/// Poll cadence.
pub const CLIPBOARD_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Payloads above this size are dropped locally, never broadcast.
pub const MAX_CLIPBOARD_SIZE: usize = 10 * 1024 * 1024;

/// Commands from the controller to the bridge.
#[derive(Debug)]
pub enum ClipboardCommand {
    /// Apply a remote peer's clipboard to the local one.
    Apply(ClipboardContent),
}

/// Spawn the bridge task. Returns the command sender the controller uses to
/// apply remote updates.
pub fn spawn(
    mut provider: Box<dyn ClipboardProvider>,
    events: mpsc::Sender<DaemonEvent>,
) -> mpsc::Sender<ClipboardCommand> {
    let (command_tx, mut command_rx) = mpsc::channel::<ClipboardCommand>(16);

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(CLIPBOARD_POLL_INTERVAL);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        // Last change count seen, and whether it came from our own write.
        let mut last_count = provider.change_count().await.unwrap_or(0);

        loop {
            tokio::select! {
                command = command_rx.recv() => {
                    let Some(ClipboardCommand::Apply(content)) = command else {
                        break;
                    };
                    if content.size() > MAX_CLIPBOARD_SIZE {
                        warn!(size = content.size(), "dropping oversized remote clipboard");
                        continue;
                    }
                    if let Err(e) = provider.set(content).await {
                        warn!(error = %e, "failed to apply remote clipboard");
                        continue;
                    }
                    // Swallow our own change so it is not rebroadcast.
                    last_count = provider.change_count().await.unwrap_or(last_count);
                    debug!("applied remote clipboard update");
                }
                _ = interval.tick() => {
                    let count = match provider.change_count().await {
                        Ok(count) => count,
                        Err(e) => {
                            warn!(error = %e, "clipboard change-count read failed");
                            continue;
                        }
                    };
                    if count == last_count {
                        continue;
                    }
                    last_count = count;

                    let content = match provider.get().await {
                        Ok(Some(content)) => content,
                        Ok(None) => continue,
                        Err(e) => {
                            warn!(error = %e, "clipboard read failed");
                            continue;
                        }
                    };
                    if content.size() > MAX_CLIPBOARD_SIZE {
                        warn!(size = content.size(), "local clipboard too large, not broadcasting");
                        continue;
                    }
                    if events
                        .send(DaemonEvent::ClipboardChanged(content))
                        .await
                        .is_err()
                    {
                        break;
                    }
                }
            }
        }
    });

    command_tx
}
