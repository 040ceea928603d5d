//! Input event types.
//!
//! Platform-agnostic representations of the events relayed between peers.
//! Mouse motion is always expressed as deltas: absolute coordinates from a
//! host with different screen geometry are meaningless on the receiving side.

use std::time::{SystemTime, UNIX_EPOCH};

use bincode::{Decode, Encode};
use serde::{Deserialize, Serialize};

use crate::screen::Edge;

/// Virtual keycode as reported by the OS event tap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Encode, Decode)]
pub struct KeyCode(pub u16);

/// The escape key that hands control back to the local host.
pub const ESCAPE_KEYCODE: KeyCode = KeyCode(53);

/// Modifier key mask active at the time of an event.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Encode, Decode,
)]
pub struct Modifiers(pub u16);

impl Modifiers {
    pub const SHIFT: u16 = 1 << 0;
    pub const CONTROL: u16 = 1 << 1;
    pub const ALT: u16 = 1 << 2;
    pub const META: u16 = 1 << 3;
    pub const CAPS_LOCK: u16 = 1 << 4;
    pub const FUNCTION: u16 = 1 << 5;

    #[must_use]
    pub fn contains(self, mask: u16) -> bool {
        self.0 & mask != 0
    }

    #[must_use]
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

/// Mouse button identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Encode, Decode)]
pub enum MouseButton {
    Left,
    Right,
    Middle,
    /// Extra buttons beyond the standard three.
    Other(u16),
}

/// Format of a relayed clipboard payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Encode, Decode)]
pub enum ClipboardFormat {
    /// Plain UTF-8 text.
    PlainText,
    /// HTML content.
    Html,
    /// PNG image data.
    Png,
}

/// A platform-agnostic input event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Encode, Decode)]
pub enum InputEvent {
    /// Relative mouse motion.
    MouseMove { dx: i32, dy: i32, modifiers: Modifiers },

    /// Mouse button press.
    MouseDown {
        button: MouseButton,
        click_count: u8,
        modifiers: Modifiers,
    },

    /// Mouse button release.
    MouseUp {
        button: MouseButton,
        click_count: u8,
        modifiers: Modifiers,
    },

    /// Relative mouse motion with a button held.
    MouseDrag {
        dx: i32,
        dy: i32,
        button: MouseButton,
        modifiers: Modifiers,
    },

    /// Scroll wheel, pixel units.
    Scroll { dx: f64, dy: f64 },

    /// Key press. `chars` carries the translated text when the tap provides it.
    KeyDown {
        code: KeyCode,
        chars: Option<String>,
        modifiers: Modifiers,
    },

    /// Key release.
    KeyUp { code: KeyCode, modifiers: Modifiers },

    /// Modifier mask changed without a key event.
    FlagsChanged { modifiers: Modifiers },

    /// Clipboard contents changed on the sending host.
    ClipboardUpdate {
        format: ClipboardFormat,
        data: Vec<u8>,
    },

    /// Cursor is crossing onto the receiving host at the given edge.
    /// Entry coordinates are normalised to [0, 1] along the screen axes.
    ScreenEnter { edge: Edge, entry_x: f64, entry_y: f64 },

    /// Cursor is leaving the receiving host through the given edge.
    ScreenLeave { edge: Edge },

    /// Acknowledge a `ScreenEnter`; the receiver is ready for input.
    ScreenEnterAck { edge: Edge },

    /// Keepalive.
    Heartbeat,
}

impl InputEvent {
    /// Session-control events that are consumed by the controller rather
    /// than injected: enter/leave/ack, heartbeats, clipboard.
    #[must_use]
    pub fn is_meta(&self) -> bool {
        matches!(
            self,
            Self::ScreenEnter { .. }
                | Self::ScreenLeave { .. }
                | Self::ScreenEnterAck { .. }
                | Self::Heartbeat
                | Self::ClipboardUpdate { .. }
        )
    }

    /// Button and key transitions must not sit in the batch queue; they are
    /// flushed to the wire as soon as they are captured.
    #[must_use]
    pub fn forces_flush(&self) -> bool {
        matches!(
            self,
            Self::MouseDown { .. } | Self::MouseUp { .. } | Self::KeyDown { .. } | Self::KeyUp { .. }
        )
    }
}

/// An input event with its capture timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Encode, Decode)]
pub struct TimedEvent {
    /// Microseconds since the Unix epoch.
    pub timestamp_us: u64,
    pub event: InputEvent,
}

impl TimedEvent {
    /// Stamp an event with the current wall-clock time.
    #[must_use]
    pub fn now(event: InputEvent) -> Self {
        Self {
            timestamp_us: timestamp_us(),
            event,
        }
    }
}

/// Current wall-clock time in microseconds since the Unix epoch.
#[must_use]
pub fn timestamp_us() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_micros()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(event: &InputEvent) -> InputEvent {
        let config = bincode::config::standard();
        let bytes = bincode::encode_to_vec(event, config).unwrap();
        let (decoded, _): (InputEvent, _) = bincode::decode_from_slice(&bytes, config).unwrap();
        decoded
    }

    #[test]
    fn mouse_move_roundtrip() {
        let event = InputEvent::MouseMove {
            dx: -42,
            dy: 100,
            modifiers: Modifiers(Modifiers::SHIFT),
        };
        assert_eq!(roundtrip(&event), event);
    }

    #[test]
    fn key_down_with_chars_roundtrip() {
        let event = InputEvent::KeyDown {
            code: KeyCode(0),
            chars: Some("a".to_string()),
            modifiers: Modifiers::default(),
        };
        assert_eq!(roundtrip(&event), event);
    }

    #[test]
    fn key_down_without_chars_roundtrip() {
        let event = InputEvent::KeyDown {
            code: KeyCode(126),
            chars: None,
            modifiers: Modifiers(Modifiers::FUNCTION),
        };
        assert_eq!(roundtrip(&event), event);
    }

    #[test]
    fn screen_enter_roundtrip() {
        let event = InputEvent::ScreenEnter {
            edge: Edge::Right,
            entry_x: 1.0,
            entry_y: 0.5,
        };
        assert_eq!(roundtrip(&event), event);
    }

    #[test]
    fn meta_set_matches_session_control_events() {
        assert!(InputEvent::Heartbeat.is_meta());
        assert!(InputEvent::ScreenLeave { edge: Edge::Left }.is_meta());
        assert!(InputEvent::ClipboardUpdate {
            format: ClipboardFormat::PlainText,
            data: vec![],
        }
        .is_meta());
        assert!(!InputEvent::MouseMove {
            dx: 1,
            dy: 1,
            modifiers: Modifiers::default(),
        }
        .is_meta());
    }

    #[test]
    fn buttons_and_keys_force_flush() {
        assert!(InputEvent::MouseDown {
            button: MouseButton::Left,
            click_count: 1,
            modifiers: Modifiers::default(),
        }
        .forces_flush());
        assert!(InputEvent::KeyUp {
            code: KeyCode(4),
            modifiers: Modifiers::default(),
        }
        .forces_flush());
        assert!(!InputEvent::Scroll { dx: 0.0, dy: 3.0 }.forces_flush());
    }

    #[test]
    fn timed_event_carries_recent_timestamp() {
        let event = TimedEvent::now(InputEvent::Heartbeat);
        assert!(event.timestamp_us > 0);
    }
}
