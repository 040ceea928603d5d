//! mDNS/DNS-SD zero-config discovery for mouseshare.
//!
//! Publishes a `_mouseshare._tcp` record in `local.` carrying the peer id,
//! name, protocol version, and screen dimensions as TXT keys, and observes
//! the same service type. Records advertised by this host are filtered out
//! by id and by name; duplicate records from multiple interfaces are left
//! to the daemon's registry to collapse (latest endpoint wins).

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use mdns_sd::{ServiceDaemon, ServiceEvent, ServiceInfo};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use mouseshare_types::PeerId;

pub mod error;

pub use error::DiscoveryError;

/// Service type browsed and advertised.
pub const SERVICE_TYPE: &str = "_mouseshare._tcp.local.";

/// Protocol version advertised in the TXT record.
pub const ADVERTISED_VERSION: &str = "1.0";

/// Fixed delay before recreating a failed daemon or browser.
pub const RETRY_BACKOFF: Duration = Duration::from_secs(2);

/// A peer observed on the network.
#[derive(Debug, Clone, PartialEq)]
pub struct DiscoveredPeer {
    pub peer_id: PeerId,
    pub name: String,
    pub version: String,
    pub screen_width: u32,
    pub screen_height: u32,
    pub endpoint: SocketAddr,
}

/// Events from the discovery subsystem.
#[derive(Debug, Clone)]
pub enum DiscoveryEvent {
    /// A new peer record was resolved.
    PeerFound(DiscoveredPeer),
    /// A known record was re-resolved (address or TXT change).
    PeerUpdated(DiscoveredPeer),
    /// A record was withdrawn. Only the instance name is known.
    PeerLost { name: String },
}

/// mDNS advertisement and browsing.
pub struct Discovery {
    daemon: ServiceDaemon,
    local_id: PeerId,
    local_name: String,
    registered: Option<String>,
}

impl Discovery {
    /// Create the mDNS daemon.
    pub fn new(local_id: PeerId, local_name: &str) -> Result<Self, DiscoveryError> {
        let daemon = ServiceDaemon::new().map_err(|e| DiscoveryError::Daemon(e.to_string()))?;
        Ok(Self {
            daemon,
            local_id,
            local_name: local_name.to_string(),
            registered: None,
        })
    }

    /// Publish this host's record on the given listener port.
    pub fn advertise(
        &mut self,
        port: u16,
        screen_width: u32,
        screen_height: u32,
    ) -> Result<(), DiscoveryError> {
        let host = format!("{}.local.", self.local_name.replace(' ', "-"));
        let properties: HashMap<String, String> = [
            ("id".to_string(), self.local_id.to_string()),
            ("name".to_string(), self.local_name.clone()),
            ("version".to_string(), ADVERTISED_VERSION.to_string()),
            ("width".to_string(), screen_width.to_string()),
            ("height".to_string(), screen_height.to_string()),
        ]
        .into_iter()
        .collect();
        let info = ServiceInfo::new(
            SERVICE_TYPE,
            &self.local_name,
            &host,
            "",
            port,
            properties,
        )
        .map_err(|e| DiscoveryError::Register(e.to_string()))?
        .enable_addr_auto();

        let fullname = info.get_fullname().to_string();
        self.daemon
            .register(info)
            .map_err(|e| DiscoveryError::Register(e.to_string()))?;
        info!(name = %self.local_name, port, "advertising service");
        self.registered = Some(fullname);
        Ok(())
    }

    /// Withdraw this host's record.
    pub fn stop_advertising(&mut self) {
        if let Some(fullname) = self.registered.take() {
            let _ = self.daemon.unregister(&fullname);
        }
    }

    /// Start browsing for peers, forwarding events to the returned receiver.
    pub fn browse(&self) -> Result<mpsc::Receiver<DiscoveryEvent>, DiscoveryError> {
        let browser = self
            .daemon
            .browse(SERVICE_TYPE)
            .map_err(|e| DiscoveryError::Browse(e.to_string()))?;

        let (tx, rx) = mpsc::channel(64);
        let local_id = self.local_id;
        let local_name = self.local_name.clone();

        tokio::spawn(async move {
            while let Ok(event) = browser.recv_async().await {
                match event {
                    ServiceEvent::ServiceResolved(info) => {
                        let Some(peer) = resolve_peer(&info) else {
                            debug!(fullname = %info.get_fullname(), "ignoring unresolvable record");
                            continue;
                        };
                        // Never surface our own record.
                        if peer.peer_id == local_id || peer.name == local_name {
                            continue;
                        }
                        debug!(peer = %peer.name, endpoint = %peer.endpoint, "peer resolved");
                        if tx.send(DiscoveryEvent::PeerFound(peer)).await.is_err() {
                            break;
                        }
                    }
                    ServiceEvent::ServiceRemoved(_, fullname) => {
                        let name = instance_name(&fullname);
                        if name == local_name {
                            continue;
                        }
                        debug!(peer = %name, "peer record withdrawn");
                        if tx
                            .send(DiscoveryEvent::PeerLost { name })
                            .await
                            .is_err()
                        {
                            break;
                        }
                    }
                    _ => {}
                }
            }
            warn!("mDNS browser channel closed");
        });

        Ok(rx)
    }

    /// Shut the daemon down.
    pub fn shutdown(mut self) {
        self.stop_advertising();
        let _ = self.daemon.shutdown();
    }
}

fn resolve_peer(info: &ServiceInfo) -> Option<DiscoveredPeer> {
    let peer_id: PeerId = info.get_property_val_str("id")?.parse().ok()?;
    let name = info
        .get_property_val_str("name")
        .map(str::to_string)
        .unwrap_or_else(|| instance_name(info.get_fullname()));
    let version = info
        .get_property_val_str("version")
        .unwrap_or("1.0")
        .to_string();
    let screen_width = info.get_property_val_str("width")?.parse().ok()?;
    let screen_height = info.get_property_val_str("height")?.parse().ok()?;

    // Prefer IPv4 when a record resolves on both families.
    let addresses = info.get_addresses();
    let ip = addresses
        .iter()
        .find(|a| matches!(a, IpAddr::V4(_)))
        .or_else(|| addresses.iter().next())
        .copied()?;

    Some(DiscoveredPeer {
        peer_id,
        name,
        version,
        screen_width,
        screen_height,
        endpoint: SocketAddr::new(ip, info.get_port()),
    })
}

/// Instance name portion of a service fullname
/// (`name._mouseshare._tcp.local.` → `name`).
fn instance_name(fullname: &str) -> String {
    fullname
        .split_once("._")
        .map_or(fullname, |(instance, _)| instance)
        .to_string()
}
