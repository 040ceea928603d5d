//! Settings persistence and local peer identity.

use std::path::{Path, PathBuf};

use tracing::info;
use uuid::Uuid;

use mouseshare_types::PeerId;

use crate::config::Settings;
use crate::error::DaemonError;

/// Load settings from the given path, or the default location. Missing file
/// means defaults; out-of-range values are clamped.
pub fn load_settings(path: Option<&Path>) -> Result<Settings, DaemonError> {
    let settings_path = match path {
        Some(p) => p.to_path_buf(),
        None => default_settings_path(),
    };

    let mut settings = if settings_path.exists() {
        let content = std::fs::read_to_string(&settings_path)
            .map_err(|e| DaemonError::Config(format!("failed to read settings: {e}")))?;
        let settings: Settings = serde_json::from_str(&content)
            .map_err(|e| DaemonError::Config(format!("failed to parse settings: {e}")))?;
        info!(path = %settings_path.display(), "loaded settings");
        settings
    } else {
        info!("no settings file found, using defaults");
        Settings::default()
    };

    settings.sanitize();
    Ok(settings)
}

/// Persist settings as pretty JSON.
pub fn save_settings(settings: &Settings, path: Option<&Path>) -> Result<(), DaemonError> {
    let settings_path = match path {
        Some(p) => p.to_path_buf(),
        None => default_settings_path(),
    };
    if let Some(parent) = settings_path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| DaemonError::Config(format!("failed to create config dir: {e}")))?;
    }
    let json = serde_json::to_string_pretty(settings)
        .map_err(|e| DaemonError::Config(format!("failed to encode settings: {e}")))?;
    std::fs::write(&settings_path, json)
        .map_err(|e| DaemonError::Config(format!("failed to write settings: {e}")))?;
    Ok(())
}

/// Load or create the persistent local peer ID.
pub fn load_or_create_peer_id(config_dir: &Path) -> Result<PeerId, DaemonError> {
    let id_path = config_dir.join("peer-id");

    if id_path.exists() {
        let content = std::fs::read_to_string(&id_path)
            .map_err(|e| DaemonError::Config(format!("failed to read peer-id: {e}")))?;
        let uuid: Uuid = content
            .trim()
            .parse()
            .map_err(|e| DaemonError::Config(format!("invalid peer-id: {e}")))?;
        info!(id = %uuid, "loaded peer ID");
        Ok(PeerId::from_uuid(uuid))
    } else {
        std::fs::create_dir_all(config_dir)
            .map_err(|e| DaemonError::Config(format!("failed to create config dir: {e}")))?;

        let id = PeerId::new();
        std::fs::write(&id_path, id.as_uuid().to_string())
            .map_err(|e| DaemonError::Config(format!("failed to write peer-id: {e}")))?;

        info!(id = %id, "created new peer ID");
        Ok(id)
    }
}

/// Default host name, used as the peer name.
#[must_use]
pub fn local_host_name() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "mouseshare".to_string())
}

/// Per-user config directory.
#[must_use]
pub fn config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("~/.config"))
        .join("mouseshare")
}

fn default_settings_path() -> PathBuf {
    config_dir().join("settings.json")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_survive_save_and_load() {
        let dir = std::env::temp_dir().join(format!("mouseshare-test-{}", Uuid::new_v4()));
        let path = dir.join("settings.json");

        let settings = Settings {
            encryption_enabled: true,
            password: "pw".to_string(),
            edge_threshold: 4.0,
            ..Settings::default()
        };
        save_settings(&settings, Some(&path)).unwrap();
        let loaded = load_settings(Some(&path)).unwrap();

        assert!(loaded.encryption_enabled);
        assert_eq!(loaded.edge_threshold, 4.0);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn peer_id_is_stable_across_loads() {
        let dir = std::env::temp_dir().join(format!("mouseshare-test-{}", Uuid::new_v4()));

        let first = load_or_create_peer_id(&dir).unwrap();
        let second = load_or_create_peer_id(&dir).unwrap();
        assert_eq!(first, second);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn out_of_range_settings_are_clamped_on_load() {
        let dir = std::env::temp_dir().join(format!("mouseshare-test-{}", Uuid::new_v4()));
        let path = dir.join("settings.json");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            &path,
            r#"{"edge_threshold": 99.0, "corner_dead_zone": 200.0, "transition_delay_ms": 400}"#,
        )
        .unwrap();

        let loaded = load_settings(Some(&path)).unwrap();
        assert_eq!(loaded.edge_threshold, 10.0);
        assert_eq!(loaded.corner_dead_zone, 50.0);
        assert_eq!(loaded.transition_delay_ms, 250);
        std::fs::remove_dir_all(&dir).ok();
    }
}
