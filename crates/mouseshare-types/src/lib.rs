//! Shared types for mouseshare.
//!
//! This crate contains all types shared across the mouseshare workspace:
//! input events, peer identity, screen edges, packets, and handshake
//! messages.

pub mod event;
pub mod message;
pub mod peer;
pub mod screen;

pub use event::{
    ClipboardFormat, InputEvent, KeyCode, Modifiers, MouseButton, TimedEvent, ESCAPE_KEYCODE,
};
pub use message::{
    HandshakeRequest, HandshakeResponse, InputPacket, Message, PACKET_VERSION, PROTOCOL_VERSION,
};
pub use event::timestamp_us;
pub use peer::PeerId;
pub use screen::{combined_bounds, DisplayBounds, Edge, Rect};
