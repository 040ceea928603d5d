//! Daemon settings, persisted as JSON.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use mouseshare_arrangement::ScreenArrangement;
use mouseshare_input::EdgeRules;
use mouseshare_types::Rect;

/// The transition delays selectable in the settings UI, in milliseconds.
pub const TRANSITION_DELAY_STEPS_MS: [u64; 4] = [0, 100, 250, 500];

/// User-facing settings. Out-of-range persisted values are clamped on load.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub encryption_enabled: bool,
    #[serde(default)]
    pub password: String,
    #[serde(default = "default_true")]
    pub clipboard_sync_enabled: bool,
    #[serde(default = "default_true")]
    pub auto_connect: bool,
    /// Distance from an edge (pixels) that counts as arrival. 1–10.
    #[serde(default = "default_edge_threshold")]
    pub edge_threshold: f64,
    /// Half-width of the corner exclusion zone (pixels). 0–50.
    #[serde(default = "default_corner_dead_zone")]
    pub corner_dead_zone: f64,
    /// Dwell time required at an edge before a transition starts.
    #[serde(default)]
    pub transition_delay_ms: u64,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub arrangement: ScreenArrangement,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            encryption_enabled: false,
            password: String::new(),
            clipboard_sync_enabled: true,
            auto_connect: true,
            edge_threshold: default_edge_threshold(),
            corner_dead_zone: default_corner_dead_zone(),
            transition_delay_ms: 0,
            port: default_port(),
            arrangement: ScreenArrangement::default(),
        }
    }
}

impl Settings {
    /// Clamp every tunable into its valid range. Transition delay snaps
    /// down to the nearest selectable step.
    pub fn sanitize(&mut self) {
        self.edge_threshold = self.edge_threshold.clamp(1.0, 10.0);
        self.corner_dead_zone = self.corner_dead_zone.clamp(0.0, 50.0);
        self.transition_delay_ms = TRANSITION_DELAY_STEPS_MS
            .iter()
            .rev()
            .copied()
            .find(|step| *step <= self.transition_delay_ms)
            .unwrap_or(0);
    }

    /// Edge-detection rules for the given combined display bounds.
    #[must_use]
    pub fn edge_rules(&self, bounds: Rect) -> EdgeRules {
        EdgeRules {
            bounds,
            threshold: self.edge_threshold,
            corner_dead_zone: self.corner_dead_zone,
            transition_delay: Duration::from_millis(self.transition_delay_ms),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_edge_threshold() -> f64 {
    1.0
}

fn default_corner_dead_zone() -> f64 {
    10.0
}

fn default_port() -> u16 {
    mouseshare_protocol::DEFAULT_PORT
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let settings = Settings::default();
        assert_eq!(settings.port, 24801);
        assert_eq!(settings.edge_threshold, 1.0);
        assert_eq!(settings.corner_dead_zone, 10.0);
        assert_eq!(settings.transition_delay_ms, 0);
        assert!(settings.clipboard_sync_enabled);
        assert!(settings.auto_connect);
        assert!(!settings.encryption_enabled);
    }

    #[test]
    fn sanitize_clamps_ranges() {
        let mut settings = Settings {
            edge_threshold: 25.0,
            corner_dead_zone: -3.0,
            transition_delay_ms: 180,
            ..Settings::default()
        };
        settings.sanitize();
        assert_eq!(settings.edge_threshold, 10.0);
        assert_eq!(settings.corner_dead_zone, 0.0);
        // 180 snaps down to the 100 ms step.
        assert_eq!(settings.transition_delay_ms, 100);
    }

    #[test]
    fn settings_json_roundtrip() {
        let settings = Settings {
            encryption_enabled: true,
            password: "swordfish".to_string(),
            ..Settings::default()
        };
        let json = serde_json::to_string_pretty(&settings).unwrap();
        let restored: Settings = serde_json::from_str(&json).unwrap();
        assert!(restored.encryption_enabled);
        assert_eq!(restored.password, "swordfish");
    }

    #[test]
    fn missing_fields_take_defaults() {
        let restored: Settings = serde_json::from_str("{}").unwrap();
        assert_eq!(restored.port, 24801);
        assert!(restored.auto_connect);
    }
}
