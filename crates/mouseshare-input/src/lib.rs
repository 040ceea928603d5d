//! Platform-abstracted input capture and injection for mouseshare.
//!
//! This crate defines the [`EventTap`] and [`Injector`] traits that
//! platform-specific backends implement, plus the pure edge-arrival
//! detector. Mock backends for tests live in [`mock`].

use async_trait::async_trait;
use tokio::sync::mpsc;

use mouseshare_types::{DisplayBounds, Edge, InputEvent, Rect, TimedEvent};

pub mod edge;
pub mod error;
pub mod mock;

pub use edge::{EdgeDetector, EdgeRules};
pub use error::InputError;

/// How far inside an edge the cursor lands when warped to it, in pixels.
pub const EDGE_WARP_INSET: f64 = 2.0;

/// The point [`EDGE_WARP_INSET`] pixels inside `edge` of `bounds`, at the
/// given relative position along the edge.
#[must_use]
pub fn edge_warp_point(bounds: &Rect, edge: Edge, relative: f64) -> (f64, f64) {
    let relative = relative.clamp(0.0, 1.0);
    match edge {
        Edge::Left => (
            bounds.x + EDGE_WARP_INSET,
            bounds.y + relative * (bounds.height - 1.0),
        ),
        Edge::Right => (
            bounds.right() - EDGE_WARP_INSET,
            bounds.y + relative * (bounds.height - 1.0),
        ),
        Edge::Top => (
            bounds.x + relative * (bounds.width - 1.0),
            bounds.y + EDGE_WARP_INSET,
        ),
        Edge::Bottom => (
            bounds.x + relative * (bounds.width - 1.0),
            bounds.bottom() - EDGE_WARP_INSET,
        ),
    }
}

/// Events emitted by a capture backend.
#[derive(Debug, Clone)]
pub enum CaptureEvent {
    /// A captured, suppressed input event (only while grabbed).
    Input(TimedEvent),
    /// The cursor arrived at an edge of the combined display
    /// (only while released).
    EdgeReached { edge: Edge, x: f64, y: f64 },
    /// The escape key was pressed while grabbed. The key itself is
    /// suppressed and never forwarded.
    Escape,
}

/// Captures the host input stream and detects edge arrival.
///
/// Backends register a system-wide interceptor. The interceptor callback
/// must never block: events go into a large queue and the callback returns
/// promptly. While *released*, events pass through to the OS unchanged and
/// edge detection runs; while *grabbed*, all mouse and keyboard events are
/// suppressed locally and delivered as [`CaptureEvent::Input`].
#[async_trait]
pub trait EventTap: Send + 'static {
    /// Register the interceptor and start delivering events to `tx`.
    async fn start(&mut self, tx: mpsc::Sender<CaptureEvent>) -> Result<(), InputError>;

    /// Suppress local delivery and forward everything (entering remote
    /// control of a peer).
    async fn grab(&mut self) -> Result<(), InputError>;

    /// Resume local passthrough with edge detection.
    async fn release(&mut self) -> Result<(), InputError>;

    /// Replace the edge-detection rules (settings or display change).
    async fn update_edge_rules(&mut self, rules: EdgeRules) -> Result<(), InputError>;

    /// Unregister the interceptor and release all resources.
    async fn shutdown(&mut self) -> Result<(), InputError>;
}

/// Writes synthetic input and moves the cursor at the OS boundary.
///
/// Invoked only by the controller; the OS cursor is mutated nowhere else.
#[async_trait]
pub trait Injector: Send + 'static {
    /// Translate an event into a synthetic OS event. Mouse motion events
    /// are applied as deltas to the current cursor position, clamped to the
    /// main display bounds; button events use the current position.
    async fn inject(&mut self, event: InputEvent) -> Result<(), InputError>;

    /// Absolute warp, used when a remote session enters this screen.
    async fn move_to(&mut self, x: f64, y: f64) -> Result<(), InputError>;

    /// Warp to the display centre and break the mouse-to-cursor
    /// association so the physical device moves without the hidden cursor.
    async fn park_cursor(&mut self) -> Result<(), InputError>;

    /// Snap to a point [`EDGE_WARP_INSET`] pixels inside the given edge, at
    /// the given relative position along it.
    async fn warp_to_edge(&mut self, edge: Edge, relative: f64) -> Result<(), InputError>;

    async fn set_cursor_visible(&mut self, visible: bool) -> Result<(), InputError>;

    /// Restore or break the mouse-to-cursor association.
    async fn set_mouse_association(&mut self, associated: bool) -> Result<(), InputError>;

    async fn shutdown(&mut self) -> Result<(), InputError>;
}

/// Enumerates local displays.
///
/// Reconfiguration is observed by re-querying; backends that receive OS
/// notifications surface them through the daemon's command channel.
pub trait DisplayProvider: Send + Sync + 'static {
    fn displays(&self) -> Vec<DisplayBounds>;
}
