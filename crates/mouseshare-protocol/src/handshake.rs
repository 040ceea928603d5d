//! Connection handshake.
//!
//! The initiator sends a [`HandshakeRequest`]; the acceptor answers with a
//! [`HandshakeResponse`]. A mismatched encryption flag is rejected with
//! `"encryption-mismatch"`. Rejections are always sent in plaintext so the
//! other side can read them regardless of its key material.

use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{info, warn};

use mouseshare_types::{
    timestamp_us, HandshakeRequest, HandshakeResponse, Message, PeerId, PROTOCOL_VERSION,
};

use crate::crypto::SessionCipher;
use crate::error::ProtocolError;
use crate::framed::{split, MessageReceiver, MessageSender};

/// How long either side waits for the other's handshake message.
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// This host's identity as presented during the handshake.
#[derive(Debug, Clone)]
pub struct LocalIdentity {
    pub peer_id: PeerId,
    pub peer_name: String,
    pub screen_width: u32,
    pub screen_height: u32,
    pub encryption_enabled: bool,
}

impl LocalIdentity {
    fn request(&self) -> HandshakeRequest {
        HandshakeRequest {
            version: PROTOCOL_VERSION,
            peer_id: self.peer_id,
            peer_name: self.peer_name.clone(),
            screen_width: self.screen_width,
            screen_height: self.screen_height,
            encryption_enabled: self.encryption_enabled,
            timestamp_us: timestamp_us(),
        }
    }

    fn acceptance(&self) -> HandshakeResponse {
        HandshakeResponse {
            accepted: true,
            peer_id: self.peer_id,
            peer_name: self.peer_name.clone(),
            screen_width: self.screen_width,
            screen_height: self.screen_height,
            error_message: None,
        }
    }

    fn rejection(&self, message: &str) -> HandshakeResponse {
        HandshakeResponse {
            accepted: false,
            peer_id: self.peer_id,
            peer_name: self.peer_name.clone(),
            screen_width: self.screen_width,
            screen_height: self.screen_height,
            error_message: Some(message.to_string()),
        }
    }
}

/// Initiator side: send the request, await an accepting response.
///
/// On success returns the framed stream halves and the peer's response.
pub async fn initiate(
    stream: TcpStream,
    local: &LocalIdentity,
    cipher: Option<Arc<SessionCipher>>,
) -> Result<(MessageSender, MessageReceiver, HandshakeResponse), ProtocolError> {
    let (mut sender, mut receiver) = split(stream, cipher);

    sender
        .send(&Message::HandshakeRequest(local.request()))
        .await?;

    let reply = timeout(HANDSHAKE_TIMEOUT, receiver.recv())
        .await
        .map_err(|_| ProtocolError::HandshakeTimeout)?;

    let msg = match reply {
        Ok(Some(msg)) => msg,
        Ok(None) => return Err(ProtocolError::ReceiveClosed),
        // A peer without our key answers rejections in plaintext.
        Err(ProtocolError::DecryptFailed) => receiver.decode_last_plaintext()?,
        Err(e) => return Err(e),
    };

    match msg {
        Message::HandshakeResponse(resp) if resp.accepted => {
            info!(peer = %resp.peer_name, id = %resp.peer_id, "handshake complete (initiator)");
            Ok((sender, receiver, resp))
        }
        Message::HandshakeResponse(resp) => Err(ProtocolError::HandshakeRejected(
            resp.error_message
                .unwrap_or_else(|| "no reason given".to_string()),
        )),
        other => Err(ProtocolError::FrameMalformed(format!(
            "expected HandshakeResponse, got {other:?}"
        ))),
    }
}

/// Acceptor side: read the request, validate, answer.
///
/// On success returns the framed stream halves and the peer's request.
pub async fn accept(
    stream: TcpStream,
    local: &LocalIdentity,
    cipher: Option<Arc<SessionCipher>>,
) -> Result<(MessageSender, MessageReceiver, HandshakeRequest), ProtocolError> {
    let (mut sender, mut receiver) = split(stream, cipher);

    let request = timeout(HANDSHAKE_TIMEOUT, receiver.recv())
        .await
        .map_err(|_| ProtocolError::HandshakeTimeout)?;

    let request = match request {
        Ok(Some(Message::HandshakeRequest(req))) => req,
        Ok(Some(other)) => {
            return Err(ProtocolError::FrameMalformed(format!(
                "expected HandshakeRequest, got {other:?}"
            )));
        }
        Ok(None) => return Err(ProtocolError::ReceiveClosed),
        Err(e) if e.is_frame_local() => {
            // Most likely the peer sealed (or didn't seal) its request while
            // we expect the opposite. Tell it so in plaintext and close.
            reject_plaintext(&mut sender, local, "encryption-mismatch").await;
            return Err(ProtocolError::HandshakeRejected(
                "encryption-mismatch".to_string(),
            ));
        }
        Err(e) => return Err(e),
    };

    if request.version != PROTOCOL_VERSION {
        reject_plaintext(&mut sender, local, "version-mismatch").await;
        return Err(ProtocolError::VersionMismatch {
            remote: request.version,
            local: PROTOCOL_VERSION,
        });
    }

    if request.encryption_enabled != local.encryption_enabled {
        reject_plaintext(&mut sender, local, "encryption-mismatch").await;
        return Err(ProtocolError::HandshakeRejected(
            "encryption-mismatch".to_string(),
        ));
    }

    sender
        .send(&Message::HandshakeResponse(local.acceptance()))
        .await?;

    info!(peer = %request.peer_name, id = %request.peer_id, "handshake complete (acceptor)");
    Ok((sender, receiver, request))
}

async fn reject_plaintext(sender: &mut MessageSender, local: &LocalIdentity, reason: &str) {
    warn!(reason, "rejecting handshake");
    let reply = Message::HandshakeResponse(local.rejection(reason));
    if let Ok(frame) = crate::wire::encode_frame(&reply, None) {
        let _ = sender.send_raw(&frame).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    fn identity(name: &str, encryption: bool) -> LocalIdentity {
        LocalIdentity {
            peer_id: PeerId::new(),
            peer_name: name.to_string(),
            screen_width: 1920,
            screen_height: 1080,
            encryption_enabled: encryption,
        }
    }

    async fn pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (client, server) = tokio::join!(TcpStream::connect(addr), listener.accept());
        (client.unwrap(), server.unwrap().0)
    }

    #[tokio::test]
    async fn plaintext_handshake_completes() {
        let (a, b) = pair().await;
        let alice = identity("alice", false);
        let bob = identity("bob", false);

        let (initiated, accepted) =
            tokio::join!(initiate(a, &alice, None), accept(b, &bob, None));

        let (_, _, resp) = initiated.unwrap();
        let (_, _, req) = accepted.unwrap();
        assert_eq!(resp.peer_name, "bob");
        assert_eq!(req.peer_name, "alice");
        assert_eq!(req.screen_width, 1920);
    }

    #[tokio::test]
    async fn sealed_handshake_completes() {
        let (a, b) = pair().await;
        let alice = identity("alice", true);
        let bob = identity("bob", true);
        let key_a = Some(Arc::new(SessionCipher::from_password("pw").unwrap()));
        let key_b = Some(Arc::new(SessionCipher::from_password("pw").unwrap()));

        let (initiated, accepted) =
            tokio::join!(initiate(a, &alice, key_a), accept(b, &bob, key_b));

        assert!(initiated.is_ok());
        assert!(accepted.is_ok());
    }

    #[tokio::test]
    async fn encryption_mismatch_is_rejected() {
        let (a, b) = pair().await;
        let alice = identity("alice", true);
        let bob = identity("bob", false);
        let key_a = Some(Arc::new(SessionCipher::from_password("x").unwrap()));

        let (initiated, accepted) = tokio::join!(initiate(a, &alice, key_a), accept(b, &bob, None));

        match initiated {
            Err(ProtocolError::HandshakeRejected(reason)) => {
                assert_eq!(reason, "encryption-mismatch");
            }
            other => panic!("expected rejection, got {other:?}"),
        }
        assert!(matches!(
            accepted,
            Err(ProtocolError::HandshakeRejected(_))
        ));
    }

    #[tokio::test]
    async fn flag_mismatch_without_cipher_is_rejected() {
        // Peer claims encryption in the flag but neither side seals; the
        // acceptor still refuses on the flag comparison.
        let (a, b) = pair().await;
        let alice = identity("alice", true);
        let bob = identity("bob", false);

        let (initiated, accepted) = tokio::join!(initiate(a, &alice, None), accept(b, &bob, None));
        assert!(matches!(
            initiated,
            Err(ProtocolError::HandshakeRejected(_))
        ));
        assert!(matches!(
            accepted,
            Err(ProtocolError::HandshakeRejected(_))
        ));
    }
}
