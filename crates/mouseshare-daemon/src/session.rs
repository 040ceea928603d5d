//! Per-peer session: framed sender plus the spawned receive pipeline.

use tokio::sync::mpsc;
use tracing::{debug, warn};

use mouseshare_protocol::{
    MessageReceiver, MessageSender, ProtocolError, SequenceCounter, SequenceTracker,
};
use mouseshare_types::{InputEvent, InputPacket, Message, PeerId, TimedEvent};

use crate::daemon::DaemonEvent;

/// An established session with one remote peer.
///
/// The controller enqueues sends here; the paired receive half runs as a
/// spawned task feeding the controller inbox.
pub struct PeerSession {
    pub peer_id: PeerId,
    pub name: String,
    sender: MessageSender,
    sequence: SequenceCounter,
}

impl PeerSession {
    #[must_use]
    pub fn new(peer_id: PeerId, name: String, sender: MessageSender) -> Self {
        Self {
            peer_id,
            name,
            sender,
            sequence: SequenceCounter::new(),
        }
    }

    /// Send a batch of events as one sequenced packet.
    pub async fn send_events(&mut self, events: Vec<TimedEvent>) -> Result<(), ProtocolError> {
        let packet = InputPacket::new(self.sequence.next(), events);
        self.sender.send(&Message::Packet(packet)).await
    }

    /// Send a single event immediately.
    pub async fn send_event(&mut self, event: InputEvent) -> Result<(), ProtocolError> {
        self.send_events(vec![TimedEvent::now(event)]).await
    }
}

/// Drive the receive pipeline for one connection.
///
/// Frames are decoded in order; sequence gaps are logged but the packet is
/// still delivered, and a frame that fails to parse or authenticate is
/// dropped without advancing the sequence expectation. Anything else ends
/// the session.
pub fn spawn_reader(
    peer_id: PeerId,
    mut receiver: MessageReceiver,
    events: mpsc::Sender<DaemonEvent>,
) {
    tokio::spawn(async move {
        let mut tracker = SequenceTracker::new();
        loop {
            match receiver.recv().await {
                Ok(Some(Message::Packet(packet))) => {
                    let gap = tracker.observe(packet.sequence);
                    if gap > 0 {
                        warn!(peer = %peer_id, sequence = packet.sequence, gap,
                            "sequence gap, delivering anyway");
                    }
                    let event = DaemonEvent::PeerPacket {
                        peer_id,
                        packet,
                        sequence_gap: u64::from(gap),
                    };
                    if events.send(event).await.is_err() {
                        break;
                    }
                }
                Ok(Some(other)) => {
                    debug!(peer = %peer_id, msg = ?other, "unexpected post-handshake message");
                }
                Ok(None) => {
                    debug!(peer = %peer_id, "peer closed the stream");
                    let _ = events.send(DaemonEvent::PeerDisconnected(peer_id)).await;
                    break;
                }
                Err(e) if e.is_frame_local() => {
                    warn!(peer = %peer_id, error = %e, "dropping bad frame");
                }
                Err(e) => {
                    debug!(peer = %peer_id, error = %e, "receive pipeline error");
                    let _ = events.send(DaemonEvent::PeerDisconnected(peer_id)).await;
                    break;
                }
            }
        }
    });
}
