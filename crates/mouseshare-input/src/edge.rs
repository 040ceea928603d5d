//! Edge-arrival detection.
//!
//! Works on the combined local display bounds. A point is "at edge E" when
//! its distance from E is within the configured threshold; points inside a
//! corner dead zone never trigger; with a transition delay configured, the
//! cursor must dwell at the same edge for that long first.

use std::time::{Duration, Instant};

use mouseshare_types::{Edge, Rect};

/// Detection parameters, derived from user settings and the display list.
#[derive(Debug, Clone, PartialEq)]
pub struct EdgeRules {
    /// Combined bounds of all local displays.
    pub bounds: Rect,
    /// Distance from an edge (pixels) that counts as arrival. 1–10.
    pub threshold: f64,
    /// Half-width of the corner exclusion zone (pixels). 0–50.
    pub corner_dead_zone: f64,
    /// How long the cursor must dwell at an edge before it triggers.
    pub transition_delay: Duration,
}

impl EdgeRules {
    #[must_use]
    pub fn new(bounds: Rect) -> Self {
        Self {
            bounds,
            threshold: 1.0,
            corner_dead_zone: 10.0,
            transition_delay: Duration::ZERO,
        }
    }
}

/// Stateful edge detector fed with cursor positions.
#[derive(Debug)]
pub struct EdgeDetector {
    rules: EdgeRules,
    /// Edge the cursor currently dwells at, and since when.
    pending: Option<(Edge, Instant)>,
}

impl EdgeDetector {
    #[must_use]
    pub fn new(rules: EdgeRules) -> Self {
        Self {
            rules,
            pending: None,
        }
    }

    pub fn set_rules(&mut self, rules: EdgeRules) {
        self.rules = rules;
        self.pending = None;
    }

    pub fn reset(&mut self) {
        self.pending = None;
    }

    /// Feed the current cursor position. Returns the edge once arrival is
    /// confirmed (immediately with no transition delay, otherwise after the
    /// cursor has stayed at that edge for the configured duration).
    pub fn observe(&mut self, x: f64, y: f64, now: Instant) -> Option<Edge> {
        let Some(edge) = self.edge_at(x, y) else {
            self.pending = None;
            return None;
        };

        if self.in_corner_dead_zone(x, y) {
            self.pending = None;
            return None;
        }

        match self.pending {
            Some((pending_edge, since)) if pending_edge == edge => {
                if now.duration_since(since) >= self.rules.transition_delay {
                    Some(edge)
                } else {
                    None
                }
            }
            _ => {
                self.pending = Some((edge, now));
                if self.rules.transition_delay.is_zero() {
                    Some(edge)
                } else {
                    None
                }
            }
        }
    }

    fn edge_at(&self, x: f64, y: f64) -> Option<Edge> {
        let bounds = &self.rules.bounds;
        let distances = [
            (Edge::Left, x - bounds.x),
            (Edge::Right, bounds.right() - 1.0 - x),
            (Edge::Top, y - bounds.y),
            (Edge::Bottom, bounds.bottom() - 1.0 - y),
        ];
        distances
            .into_iter()
            .filter(|(_, d)| *d <= self.rules.threshold)
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(edge, _)| edge)
    }

    fn in_corner_dead_zone(&self, x: f64, y: f64) -> bool {
        let bounds = &self.rules.bounds;
        let zone = self.rules.corner_dead_zone;
        let near_vertical =
            (x - bounds.x) <= zone || (bounds.right() - 1.0 - x) <= zone;
        let near_horizontal =
            (y - bounds.y) <= zone || (bounds.bottom() - 1.0 - y) <= zone;
        near_vertical && near_horizontal
    }
}
