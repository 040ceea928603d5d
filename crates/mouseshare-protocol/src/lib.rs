//! Framed, sequenced, optionally-encrypted transport between mouseshare
//! peers.
//!
//! Wire format: big-endian u32 length, then a bincode v2 [`Message`] body,
//! AEAD-sealed (AES-256-GCM) when the session has a password. One TCP
//! listener accepts inbound connections; one outbound connection is opened
//! per peer on demand.
//!
//! [`Message`]: mouseshare_types::Message

pub mod crypto;
pub mod error;
pub mod framed;
pub mod handshake;
pub mod sequence;
pub mod transport;
pub mod wire;

pub use crypto::{derive_session_key, SessionCipher};
pub use error::ProtocolError;
pub use framed::{split, MessageReceiver, MessageSender};
pub use handshake::{LocalIdentity, HANDSHAKE_TIMEOUT};
pub use sequence::{SequenceCounter, SequenceTracker};
pub use transport::{TcpTransport, DEFAULT_PORT};
pub use wire::MAX_FRAME_SIZE;
