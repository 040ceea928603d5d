//! Peer identity types.

use bincode::{Decode, Encode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a peer in the mouseshare network.
///
/// Wraps a UUID v4 but serialises as raw bytes for bincode efficiency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Encode, Decode)]
pub struct PeerId(#[bincode(with_serde)] Uuid);

impl PeerId {
    /// Generate a new random peer ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a peer ID from an existing UUID.
    #[must_use]
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID.
    #[must_use]
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for PeerId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for PeerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for PeerId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peer_id_unique() {
        let a = PeerId::new();
        let b = PeerId::new();
        assert_ne!(a, b);
    }

    #[test]
    fn peer_id_display_parses_back() {
        let id = PeerId::new();
        let s = id.to_string();
        assert_eq!(s.len(), 36);
        let parsed: PeerId = s.parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn peer_id_bincode_roundtrip() {
        let id = PeerId::new();
        let config = bincode::config::standard();
        let bytes = bincode::encode_to_vec(id, config).unwrap();
        let (decoded, _): (PeerId, _) = bincode::decode_from_slice(&bytes, config).unwrap();
        assert_eq!(id, decoded);
    }

    #[test]
    fn peer_id_serde_roundtrip() {
        let id = PeerId::new();
        let json = serde_json::to_string(&id).unwrap();
        let decoded: PeerId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, decoded);
    }
}
