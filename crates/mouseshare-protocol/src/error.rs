//! Protocol and transport errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("failed to bind listener: {0}")]
    Bind(String),

    #[error("connection failed: {0}")]
    Connection(String),

    #[error("handshake rejected: {0}")]
    HandshakeRejected(String),

    #[error("handshake timed out")]
    HandshakeTimeout,

    #[error("incompatible protocol version: remote {remote}, local {local}")]
    VersionMismatch { remote: u32, local: u32 },

    #[error("malformed frame: {0}")]
    FrameMalformed(String),

    #[error("frame failed authentication")]
    DecryptFailed,

    #[error("frame of {len} bytes exceeds maximum {max}")]
    FrameTooLarge { len: u32, max: u32 },

    #[error("key derivation failed")]
    KeyDerivation,

    #[error("send failed: {0}")]
    SendFailed(String),

    #[error("receive stream closed")]
    ReceiveClosed,

    #[error("serialisation error: {0}")]
    Serialization(String),
}

impl ProtocolError {
    /// Whether the error poisons only the current frame.
    ///
    /// A malformed or unauthenticated frame is dropped and the connection
    /// survives; every other error tears the connection down.
    #[must_use]
    pub fn is_frame_local(&self) -> bool {
        matches!(self, Self::FrameMalformed(_) | Self::DecryptFailed)
    }
}
