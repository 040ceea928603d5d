//! Controller-owned peer records.
//!
//! The registry is the single authoritative view of every known peer.
//! Discovery, transport, and the controller all feed it through the
//! daemon's event loop; reads outside the loop are served by copies.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Instant;

use tracing::debug;

use mouseshare_discovery::DiscoveredPeer;
use mouseshare_types::PeerId;

/// Observable lifecycle state of a peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerState {
    Discovered,
    Connecting,
    Connected,
    Controlling,
    Controlled,
    Disconnected,
    Error(String),
}

/// Link-quality counters, updated by the receive pipeline and heartbeats.
#[derive(Debug, Clone, Copy, Default)]
pub struct LinkQuality {
    pub packets_sent: u64,
    pub packets_received: u64,
    pub sequence_gaps: u64,
}

/// Everything known about one peer.
#[derive(Debug, Clone)]
pub struct Peer {
    pub id: PeerId,
    pub name: String,
    pub endpoint: Option<SocketAddr>,
    pub screen_width: u32,
    pub screen_height: u32,
    pub state: PeerState,
    pub last_seen: Instant,
    pub link: LinkQuality,
}

/// PeerId-addressed peer records.
#[derive(Debug, Default)]
pub struct PeerRegistry {
    peers: HashMap<PeerId, Peer>,
}

impl PeerRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a discovered peer. Records with the same name but a changed
    /// id (restart churn, or the same host seen on another interface)
    /// collapse into one entry; the latest endpoint wins.
    pub fn upsert_discovered(&mut self, discovered: &DiscoveredPeer) -> &mut Peer {
        let stale_id = self
            .peers
            .iter()
            .find(|(id, p)| p.name == discovered.name && **id != discovered.peer_id)
            .map(|(id, _)| *id);
        if let Some(stale_id) = stale_id {
            // Do not replace an entry that still has a live session.
            let replaceable = self.peers.get(&stale_id).is_some_and(|p| {
                matches!(
                    p.state,
                    PeerState::Discovered | PeerState::Disconnected | PeerState::Error(_)
                )
            });
            if replaceable {
                debug!(name = %discovered.name, old = %stale_id, new = %discovered.peer_id,
                    "peer id churned, replacing record");
                self.peers.remove(&stale_id);
            }
        }

        let entry = self
            .peers
            .entry(discovered.peer_id)
            .or_insert_with(|| Peer {
                id: discovered.peer_id,
                name: discovered.name.clone(),
                endpoint: None,
                screen_width: discovered.screen_width,
                screen_height: discovered.screen_height,
                state: PeerState::Discovered,
                last_seen: Instant::now(),
                link: LinkQuality::default(),
            });
        entry.name.clone_from(&discovered.name);
        entry.endpoint = Some(discovered.endpoint);
        entry.screen_width = discovered.screen_width;
        entry.screen_height = discovered.screen_height;
        entry
    }

    /// Record a peer learned from an inbound handshake.
    pub fn upsert_connected(
        &mut self,
        id: PeerId,
        name: &str,
        endpoint: SocketAddr,
        screen_width: u32,
        screen_height: u32,
    ) -> &mut Peer {
        let entry = self.peers.entry(id).or_insert_with(|| Peer {
            id,
            name: name.to_string(),
            endpoint: Some(endpoint),
            screen_width,
            screen_height,
            state: PeerState::Connected,
            last_seen: Instant::now(),
            link: LinkQuality::default(),
        });
        entry.name = name.to_string();
        entry.endpoint = Some(endpoint);
        entry.screen_width = screen_width;
        entry.screen_height = screen_height;
        entry.state = PeerState::Connected;
        entry.last_seen = Instant::now();
        entry
    }

    pub fn get(&self, id: PeerId) -> Option<&Peer> {
        self.peers.get(&id)
    }

    pub fn get_mut(&mut self, id: PeerId) -> Option<&mut Peer> {
        self.peers.get_mut(&id)
    }

    pub fn remove(&mut self, id: PeerId) -> Option<Peer> {
        self.peers.remove(&id)
    }

    pub fn find_by_name(&self, name: &str) -> Option<&Peer> {
        self.peers.values().find(|p| p.name == name)
    }

    pub fn set_state(&mut self, id: PeerId, state: PeerState) {
        if let Some(peer) = self.peers.get_mut(&id) {
            peer.state = state;
        }
    }

    /// Refresh `last_seen` and bump the receive counters.
    pub fn touch(&mut self, id: PeerId, sequence_gap: u64) {
        if let Some(peer) = self.peers.get_mut(&id) {
            peer.last_seen = Instant::now();
            peer.link.packets_received += 1;
            peer.link.sequence_gaps += sequence_gap;
        }
    }

    pub fn is_connected(&self, id: PeerId) -> bool {
        self.peers.get(&id).is_some_and(|p| {
            matches!(
                p.state,
                PeerState::Connected | PeerState::Controlling | PeerState::Controlled
            )
        })
    }

    pub fn connected_ids(&self) -> Vec<PeerId> {
        self.peers
            .iter()
            .filter(|(_, p)| {
                matches!(
                    p.state,
                    PeerState::Connected | PeerState::Controlling | PeerState::Controlled
                )
            })
            .map(|(id, _)| *id)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    fn discovered(id: PeerId, name: &str, port: u16) -> DiscoveredPeer {
        DiscoveredPeer {
            peer_id: id,
            name: name.to_string(),
            version: "1.0".to_string(),
            screen_width: 1920,
            screen_height: 1080,
            endpoint: SocketAddr::new(IpAddr::V4(Ipv4Addr::new(192, 168, 1, 10)), port),
        }
    }

    #[test]
    fn discovery_creates_record() {
        let mut registry = PeerRegistry::new();
        let id = PeerId::new();
        registry.upsert_discovered(&discovered(id, "laptop", 24801));

        let peer = registry.get(id).unwrap();
        assert_eq!(peer.state, PeerState::Discovered);
        assert_eq!(peer.screen_width, 1920);
    }

    #[test]
    fn latest_endpoint_wins_for_same_name() {
        let mut registry = PeerRegistry::new();
        let old_id = PeerId::new();
        let new_id = PeerId::new();
        registry.upsert_discovered(&discovered(old_id, "laptop", 24801));
        registry.upsert_discovered(&discovered(new_id, "laptop", 24999));

        assert_eq!(registry.len(), 1);
        let peer = registry.find_by_name("laptop").unwrap();
        assert_eq!(peer.id, new_id);
        assert_eq!(peer.endpoint.unwrap().port(), 24999);
    }

    #[test]
    fn live_session_is_not_replaced_by_churned_record() {
        let mut registry = PeerRegistry::new();
        let live_id = PeerId::new();
        registry.upsert_discovered(&discovered(live_id, "laptop", 24801));
        registry.set_state(live_id, PeerState::Connected);

        let churned = PeerId::new();
        registry.upsert_discovered(&discovered(churned, "laptop", 24801));
        assert!(registry.is_connected(live_id));
        assert!(registry.get(live_id).is_some());
    }

    #[test]
    fn touch_updates_link_counters() {
        let mut registry = PeerRegistry::new();
        let id = PeerId::new();
        registry.upsert_discovered(&discovered(id, "laptop", 24801));
        registry.touch(id, 2);
        registry.touch(id, 0);

        let peer = registry.get(id).unwrap();
        assert_eq!(peer.link.packets_received, 2);
        assert_eq!(peer.link.sequence_gaps, 2);
    }

    #[test]
    fn connected_ids_excludes_discovered() {
        let mut registry = PeerRegistry::new();
        let a = PeerId::new();
        let b = PeerId::new();
        registry.upsert_discovered(&discovered(a, "a", 1));
        registry.upsert_discovered(&discovered(b, "b", 2));
        registry.set_state(b, PeerState::Connected);

        assert_eq!(registry.connected_ids(), vec![b]);
    }
}
