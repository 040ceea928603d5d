//! Mock input backends for testing.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;

use mouseshare_types::{Edge, InputEvent, Rect, TimedEvent, ESCAPE_KEYCODE};

use crate::edge::{EdgeDetector, EdgeRules};
use crate::error::InputError;
use crate::{CaptureEvent, EventTap, Injector};

// ---------------------------------------------------------------------------
// MockTap
// ---------------------------------------------------------------------------

struct TapState {
    grabbed: bool,
    cursor_x: f64,
    cursor_y: f64,
    detector: EdgeDetector,
    bounds: Rect,
    shutdown: bool,
}

/// Mock event tap for testing.
///
/// Tests feed OS-level events through the returned sender. While released,
/// mouse deltas move a simulated cursor and edge arrival is reported; while
/// grabbed, events are forwarded as captured input with the escape key
/// raised as a distinguished signal.
pub struct MockTap {
    feed_rx: Option<mpsc::Receiver<TimedEvent>>,
    state: Arc<Mutex<TapState>>,
}

impl MockTap {
    /// Create a mock tap with the given edge rules and starting cursor
    /// position, plus a sender for injecting OS events.
    pub fn new(rules: EdgeRules, start: (f64, f64)) -> (Self, mpsc::Sender<TimedEvent>) {
        let (feed_tx, feed_rx) = mpsc::channel(4096);
        let bounds = rules.bounds;
        let tap = Self {
            feed_rx: Some(feed_rx),
            state: Arc::new(Mutex::new(TapState {
                grabbed: false,
                cursor_x: start.0,
                cursor_y: start.1,
                detector: EdgeDetector::new(rules),
                bounds,
                shutdown: false,
            })),
        };
        (tap, feed_tx)
    }

    /// Observer handle for assertions and cursor repositioning.
    pub fn handle(&self) -> MockTapHandle {
        MockTapHandle {
            state: Arc::clone(&self.state),
        }
    }
}

/// Clonable observer handle for [`MockTap`].
#[derive(Clone)]
pub struct MockTapHandle {
    state: Arc<Mutex<TapState>>,
}

impl MockTapHandle {
    pub fn is_grabbed(&self) -> bool {
        self.state.lock().unwrap().grabbed
    }

    pub fn cursor(&self) -> (f64, f64) {
        let state = self.state.lock().unwrap();
        (state.cursor_x, state.cursor_y)
    }

    /// Reposition the simulated cursor (e.g. after the controller warped
    /// the real one).
    pub fn set_cursor(&self, x: f64, y: f64) {
        let mut state = self.state.lock().unwrap();
        state.cursor_x = x;
        state.cursor_y = y;
        state.detector.reset();
    }
}

#[async_trait]
impl EventTap for MockTap {
    async fn start(&mut self, tx: mpsc::Sender<CaptureEvent>) -> Result<(), InputError> {
        let mut feed_rx = self.feed_rx.take().ok_or(InputError::AlreadyStarted)?;
        let state = Arc::clone(&self.state);

        tokio::spawn(async move {
            while let Some(timed) = feed_rx.recv().await {
                let outgoing = {
                    let mut state = state.lock().unwrap();
                    if state.shutdown {
                        break;
                    }
                    if state.grabbed {
                        match &timed.event {
                            InputEvent::KeyDown { code, .. } if *code == ESCAPE_KEYCODE => {
                                Some(CaptureEvent::Escape)
                            }
                            _ => Some(CaptureEvent::Input(timed)),
                        }
                    } else {
                        match &timed.event {
                            InputEvent::MouseMove { dx, dy, .. }
                            | InputEvent::MouseDrag { dx, dy, .. } => {
                                let (x, y) = state.bounds.clamp_point(
                                    state.cursor_x + f64::from(*dx),
                                    state.cursor_y + f64::from(*dy),
                                );
                                state.cursor_x = x;
                                state.cursor_y = y;
                                state
                                    .detector
                                    .observe(x, y, std::time::Instant::now())
                                    .map(|edge| CaptureEvent::EdgeReached { edge, x, y })
                            }
                            // Non-mouse events pass through to the OS.
                            _ => None,
                        }
                    }
                };
                if let Some(event) = outgoing {
                    if tx.send(event).await.is_err() {
                        break;
                    }
                }
            }
        });
        Ok(())
    }

    async fn grab(&mut self) -> Result<(), InputError> {
        let mut state = self.state.lock().unwrap();
        state.grabbed = true;
        state.detector.reset();
        Ok(())
    }

    async fn release(&mut self) -> Result<(), InputError> {
        let mut state = self.state.lock().unwrap();
        state.grabbed = false;
        state.detector.reset();
        Ok(())
    }

    async fn update_edge_rules(&mut self, rules: EdgeRules) -> Result<(), InputError> {
        let mut state = self.state.lock().unwrap();
        state.bounds = rules.bounds;
        state.detector.set_rules(rules);
        Ok(())
    }

    async fn shutdown(&mut self) -> Result<(), InputError> {
        self.state.lock().unwrap().shutdown = true;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MockInjector
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct InjectorState {
    cursor_x: f64,
    cursor_y: f64,
    visible: bool,
    associated: bool,
    injected: Vec<InputEvent>,
    warps: Vec<(Edge, f64)>,
    shutdown: bool,
}

/// Mock injector for testing. Maintains a simulated cursor within the main
/// display bounds and records everything injected.
pub struct MockInjector {
    bounds: Rect,
    state: Arc<Mutex<InjectorState>>,
}

impl MockInjector {
    #[must_use]
    pub fn new(bounds: Rect) -> Self {
        let (cx, cy) = bounds.center();
        Self {
            bounds,
            state: Arc::new(Mutex::new(InjectorState {
                cursor_x: cx,
                cursor_y: cy,
                visible: true,
                associated: true,
                ..InjectorState::default()
            })),
        }
    }

    pub fn handle(&self) -> MockInjectorHandle {
        MockInjectorHandle {
            state: Arc::clone(&self.state),
        }
    }
}

/// Clonable observer handle for [`MockInjector`].
#[derive(Clone)]
pub struct MockInjectorHandle {
    state: Arc<Mutex<InjectorState>>,
}

impl MockInjectorHandle {
    pub fn cursor(&self) -> (f64, f64) {
        let state = self.state.lock().unwrap();
        (state.cursor_x, state.cursor_y)
    }

    pub fn is_visible(&self) -> bool {
        self.state.lock().unwrap().visible
    }

    pub fn is_associated(&self) -> bool {
        self.state.lock().unwrap().associated
    }

    pub fn injected_events(&self) -> Vec<InputEvent> {
        self.state.lock().unwrap().injected.clone()
    }

    pub fn edge_warps(&self) -> Vec<(Edge, f64)> {
        self.state.lock().unwrap().warps.clone()
    }
}

#[async_trait]
impl Injector for MockInjector {
    async fn inject(&mut self, event: InputEvent) -> Result<(), InputError> {
        let mut state = self.state.lock().unwrap();
        if let InputEvent::MouseMove { dx, dy, .. } | InputEvent::MouseDrag { dx, dy, .. } = &event
        {
            let (x, y) = self.bounds.clamp_point(
                state.cursor_x + f64::from(*dx),
                state.cursor_y + f64::from(*dy),
            );
            state.cursor_x = x;
            state.cursor_y = y;
        }
        state.injected.push(event);
        Ok(())
    }

    async fn move_to(&mut self, x: f64, y: f64) -> Result<(), InputError> {
        let mut state = self.state.lock().unwrap();
        let (x, y) = self.bounds.clamp_point(x, y);
        state.cursor_x = x;
        state.cursor_y = y;
        Ok(())
    }

    async fn park_cursor(&mut self) -> Result<(), InputError> {
        let mut state = self.state.lock().unwrap();
        let (cx, cy) = self.bounds.center();
        state.cursor_x = cx;
        state.cursor_y = cy;
        state.associated = false;
        Ok(())
    }

    async fn warp_to_edge(&mut self, edge: Edge, relative: f64) -> Result<(), InputError> {
        let mut state = self.state.lock().unwrap();
        let (x, y) = crate::edge_warp_point(&self.bounds, edge, relative);
        state.cursor_x = x;
        state.cursor_y = y;
        state.warps.push((edge, relative.clamp(0.0, 1.0)));
        Ok(())
    }

    async fn set_cursor_visible(&mut self, visible: bool) -> Result<(), InputError> {
        self.state.lock().unwrap().visible = visible;
        Ok(())
    }

    async fn set_mouse_association(&mut self, associated: bool) -> Result<(), InputError> {
        self.state.lock().unwrap().associated = associated;
        Ok(())
    }

    async fn shutdown(&mut self) -> Result<(), InputError> {
        self.state.lock().unwrap().shutdown = true;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MockDisplays
// ---------------------------------------------------------------------------

/// Fixed display list for tests.
pub struct MockDisplays {
    displays: Vec<mouseshare_types::DisplayBounds>,
}

impl MockDisplays {
    #[must_use]
    pub fn single(width: f64, height: f64) -> Self {
        Self {
            displays: vec![mouseshare_types::DisplayBounds {
                display_id: 1,
                name: "mock-display".to_string(),
                bounds: Rect::new(0.0, 0.0, width, height),
                is_primary: true,
            }],
        }
    }
}

impl crate::DisplayProvider for MockDisplays {
    fn displays(&self) -> Vec<mouseshare_types::DisplayBounds> {
        self.displays.clone()
    }
}
