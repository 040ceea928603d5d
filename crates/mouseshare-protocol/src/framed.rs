//! Framed message streams over TCP.

use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tracing::trace;

use mouseshare_types::Message;

use crate::crypto::SessionCipher;
use crate::error::ProtocolError;
use crate::wire::{decode_body, encode_frame, MAX_FRAME_SIZE};

/// Split a connected stream into framed sender and receiver halves sharing
/// one optional session cipher.
pub fn split(
    stream: TcpStream,
    cipher: Option<Arc<SessionCipher>>,
) -> (MessageSender, MessageReceiver) {
    let (read, write) = stream.into_split();
    (
        MessageSender {
            stream: write,
            cipher: cipher.clone(),
        },
        MessageReceiver {
            stream: read,
            cipher,
            body: Vec::new(),
        },
    )
}

/// Sends length-prefixed frames over a TCP write half.
#[derive(Debug)]
pub struct MessageSender {
    stream: OwnedWriteHalf,
    cipher: Option<Arc<SessionCipher>>,
}

impl MessageSender {
    /// Encode, seal, and write one message.
    pub async fn send(&mut self, msg: &Message) -> Result<(), ProtocolError> {
        let frame = encode_frame(msg, self.cipher.as_deref())?;
        self.stream
            .write_all(&frame)
            .await
            .map_err(|e| ProtocolError::SendFailed(e.to_string()))?;
        trace!(len = frame.len(), "sent frame");
        Ok(())
    }

    /// Write a pre-encoded frame, bypassing the session cipher.
    pub(crate) async fn send_raw(&mut self, frame: &[u8]) -> Result<(), ProtocolError> {
        self.stream
            .write_all(frame)
            .await
            .map_err(|e| ProtocolError::SendFailed(e.to_string()))
    }
}

/// Receives length-prefixed frames from a TCP read half.
///
/// The body buffer is reused across frames.
#[derive(Debug)]
pub struct MessageReceiver {
    stream: OwnedReadHalf,
    cipher: Option<Arc<SessionCipher>>,
    body: Vec<u8>,
}

impl MessageReceiver {
    /// Receive and decode one message.
    ///
    /// Returns `None` when the peer has cleanly closed the stream. A
    /// [frame-local](ProtocolError::is_frame_local) error leaves the stream
    /// positioned at the next frame; the caller may keep receiving.
    pub async fn recv(&mut self) -> Result<Option<Message>, ProtocolError> {
        let mut len_buf = [0u8; 4];
        match self.stream.read_exact(&mut len_buf).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(ProtocolError::Connection(e.to_string())),
        }

        let len = u32::from_be_bytes(len_buf);
        if len > MAX_FRAME_SIZE {
            return Err(ProtocolError::FrameTooLarge {
                len,
                max: MAX_FRAME_SIZE,
            });
        }

        self.body.resize(len as usize, 0);
        match self.stream.read_exact(&mut self.body).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                return Err(ProtocolError::ReceiveClosed);
            }
            Err(e) => return Err(ProtocolError::Connection(e.to_string())),
        }

        trace!(len, "received frame");
        decode_body(&self.body, self.cipher.as_deref()).map(Some)
    }

    /// Retry decoding the last received body without the session cipher.
    ///
    /// Used by the handshake initiator: a peer that cannot open our sealed
    /// request answers with a plaintext rejection.
    pub(crate) fn decode_last_plaintext(&self) -> Result<Message, ProtocolError> {
        decode_body(&self.body, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mouseshare_types::{InputEvent, InputPacket, TimedEvent};
    use tokio::net::TcpListener;

    async fn pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr);
        let server = listener.accept();
        let (client, server) = tokio::join!(client, server);
        (client.unwrap(), server.unwrap().0)
    }

    #[tokio::test]
    async fn send_recv_roundtrip() {
        let (a, b) = pair().await;
        let (mut tx, _) = split(a, None);
        let (_, mut rx) = split(b, None);

        let msg = Message::Packet(InputPacket::new(
            1,
            vec![TimedEvent::now(InputEvent::Heartbeat)],
        ));
        tx.send(&msg).await.unwrap();
        let received = rx.recv().await.unwrap().unwrap();
        assert_eq!(received, msg);
    }

    #[tokio::test]
    async fn clean_close_returns_none() {
        let (a, b) = pair().await;
        let (tx, _) = split(a, None);
        let (_, mut rx) = split(b, None);

        drop(tx);
        assert!(rx.recv().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn oversize_length_drops_connection() {
        let (mut a, b) = pair().await;
        let (_, mut rx) = split(b, None);

        let len = MAX_FRAME_SIZE + 1;
        a.write_all(&len.to_be_bytes()).await.unwrap();
        assert!(matches!(
            rx.recv().await,
            Err(ProtocolError::FrameTooLarge { .. })
        ));
    }

    #[tokio::test]
    async fn malformed_frame_keeps_stream_alive() {
        let (mut a, b) = pair().await;
        let (_, mut rx) = split(b, None);

        // One garbage frame, then a valid one.
        a.write_all(&3u32.to_be_bytes()).await.unwrap();
        a.write_all(&[0xFF, 0xFE, 0xFD]).await.unwrap();
        let msg = Message::Packet(InputPacket::new(1, vec![]));
        let frame = encode_frame(&msg, None).unwrap();
        a.write_all(&frame).await.unwrap();

        let err = rx.recv().await.unwrap_err();
        assert!(err.is_frame_local());
        let received = rx.recv().await.unwrap().unwrap();
        assert_eq!(received, msg);
    }

    #[tokio::test]
    async fn sealed_streams_agree() {
        let (a, b) = pair().await;
        let cipher = Arc::new(SessionCipher::from_password("pw").unwrap());
        let (mut tx, _) = split(a, Some(cipher.clone()));
        let (_, mut rx) = split(b, Some(cipher));

        let msg = Message::Packet(InputPacket::new(2, vec![]));
        tx.send(&msg).await.unwrap();
        assert_eq!(rx.recv().await.unwrap().unwrap(), msg);
    }
}
