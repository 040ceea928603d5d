//! Wire message types.
//!
//! Everything that crosses the TCP link between peers is a [`Message`]:
//! either one of the two handshake messages, or an [`InputPacket`] once the
//! handshake has completed.

use bincode::{Decode, Encode};
use serde::{Deserialize, Serialize};

use crate::event::TimedEvent;
use crate::peer::PeerId;

/// Handshake protocol version. Mismatches are rejected.
pub const PROTOCOL_VERSION: u32 = 1;

/// Version carried in every [`InputPacket`].
pub const PACKET_VERSION: u32 = 1;

/// First message on a new connection, sent by the initiator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Encode, Decode)]
pub struct HandshakeRequest {
    pub version: u32,
    pub peer_id: PeerId,
    pub peer_name: String,
    pub screen_width: u32,
    pub screen_height: u32,
    pub encryption_enabled: bool,
    pub timestamp_us: u64,
}

/// Reply to a [`HandshakeRequest`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Encode, Decode)]
pub struct HandshakeResponse {
    pub accepted: bool,
    pub peer_id: PeerId,
    pub peer_name: String,
    pub screen_width: u32,
    pub screen_height: u32,
    pub error_message: Option<String>,
}

/// A sequenced batch of input events.
///
/// Sequence numbers start at 1 for the first packet a sender emits within a
/// session and never decrease. Receivers log gaps but still deliver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Encode, Decode)]
pub struct InputPacket {
    pub version: u32,
    pub sequence: u32,
    pub events: Vec<TimedEvent>,
}

impl InputPacket {
    #[must_use]
    pub fn new(sequence: u32, events: Vec<TimedEvent>) -> Self {
        Self {
            version: PACKET_VERSION,
            sequence,
            events,
        }
    }
}

/// Top-level wire envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Encode, Decode)]
pub enum Message {
    HandshakeRequest(HandshakeRequest),
    HandshakeResponse(HandshakeResponse),
    Packet(InputPacket),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{timestamp_us, InputEvent, Modifiers};
    use crate::screen::Edge;

    fn roundtrip(msg: &Message) -> Message {
        let config = bincode::config::standard();
        let bytes = bincode::encode_to_vec(msg, config).unwrap();
        let (decoded, _): (Message, _) = bincode::decode_from_slice(&bytes, config).unwrap();
        decoded
    }

    #[test]
    fn handshake_request_roundtrip() {
        let msg = Message::HandshakeRequest(HandshakeRequest {
            version: PROTOCOL_VERSION,
            peer_id: PeerId::new(),
            peer_name: "workstation-left".to_string(),
            screen_width: 1920,
            screen_height: 1080,
            encryption_enabled: true,
            timestamp_us: timestamp_us(),
        });
        assert_eq!(roundtrip(&msg), msg);
    }

    #[test]
    fn handshake_rejection_carries_message() {
        let msg = Message::HandshakeResponse(HandshakeResponse {
            accepted: false,
            peer_id: PeerId::new(),
            peer_name: "laptop".to_string(),
            screen_width: 2560,
            screen_height: 1440,
            error_message: Some("encryption-mismatch".to_string()),
        });
        match roundtrip(&msg) {
            Message::HandshakeResponse(resp) => {
                assert!(!resp.accepted);
                assert_eq!(resp.error_message.as_deref(), Some("encryption-mismatch"));
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn packet_roundtrip_preserves_event_order() {
        let events = vec![
            TimedEvent::now(InputEvent::MouseMove {
                dx: 3,
                dy: -1,
                modifiers: Modifiers::default(),
            }),
            TimedEvent::now(InputEvent::Scroll { dx: 0.0, dy: 8.5 }),
            TimedEvent::now(InputEvent::ScreenLeave { edge: Edge::Right }),
        ];
        let msg = Message::Packet(InputPacket::new(7, events.clone()));
        match roundtrip(&msg) {
            Message::Packet(packet) => {
                assert_eq!(packet.version, PACKET_VERSION);
                assert_eq!(packet.sequence, 7);
                assert_eq!(packet.events, events);
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }
}
