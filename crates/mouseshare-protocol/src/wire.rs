//! Wire format: length-prefixed bincode v2 frames, optionally sealed.
//!
//! Each message on the wire is:
//!   [4 bytes big-endian length][body]
//! where the body is a bincode v2 [`Message`], or its AEAD-sealed form when
//! encryption is enabled.

use bincode::config::Configuration;
use mouseshare_types::Message;

use crate::crypto::SessionCipher;
use crate::error::ProtocolError;

/// Maximum frame body size (10 MiB). A larger declared length drops the
/// connection, not just the frame.
pub const MAX_FRAME_SIZE: u32 = 10 * 1024 * 1024;

fn config() -> Configuration {
    bincode::config::standard()
}

/// Encode a message to a length-prefixed frame, sealing when a cipher is
/// present.
pub fn encode_frame(
    msg: &Message,
    cipher: Option<&SessionCipher>,
) -> Result<Vec<u8>, ProtocolError> {
    let plaintext = bincode::encode_to_vec(msg, config())
        .map_err(|e| ProtocolError::Serialization(e.to_string()))?;

    let body = match cipher {
        Some(cipher) => cipher.seal(&plaintext)?,
        None => plaintext,
    };

    let len = u32::try_from(body.len())
        .map_err(|_| ProtocolError::Serialization("message too large".to_string()))?;
    if len > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge {
            len,
            max: MAX_FRAME_SIZE,
        });
    }

    let mut frame = Vec::with_capacity(4 + body.len());
    frame.extend_from_slice(&len.to_be_bytes());
    frame.extend_from_slice(&body);
    Ok(frame)
}

/// Decode a frame body (without the length prefix), opening it first when a
/// cipher is present.
pub fn decode_body(body: &[u8], cipher: Option<&SessionCipher>) -> Result<Message, ProtocolError> {
    let plaintext;
    let bytes = match cipher {
        Some(cipher) => {
            plaintext = cipher.open(body)?;
            plaintext.as_slice()
        }
        None => body,
    };

    let (msg, consumed) = bincode::decode_from_slice::<Message, _>(bytes, config())
        .map_err(|e| ProtocolError::FrameMalformed(e.to_string()))?;
    if consumed != bytes.len() {
        return Err(ProtocolError::FrameMalformed(format!(
            "{} trailing bytes after message",
            bytes.len() - consumed
        )));
    }
    Ok(msg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mouseshare_types::{InputEvent, InputPacket, Modifiers, TimedEvent};

    fn packet() -> Message {
        Message::Packet(InputPacket::new(
            1,
            vec![TimedEvent::now(InputEvent::MouseMove {
                dx: 5,
                dy: -2,
                modifiers: Modifiers::default(),
            })],
        ))
    }

    #[test]
    fn plaintext_frame_roundtrip() {
        let msg = packet();
        let frame = encode_frame(&msg, None).unwrap();
        let len = u32::from_be_bytes(frame[..4].try_into().unwrap());
        assert_eq!(len as usize, frame.len() - 4);

        let decoded = decode_body(&frame[4..], None).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn sealed_frame_roundtrip() {
        let cipher = SessionCipher::from_password("x").unwrap();
        let msg = packet();
        let frame = encode_frame(&msg, Some(&cipher)).unwrap();
        let decoded = decode_body(&frame[4..], Some(&cipher)).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn mismatched_keys_fail_decrypt() {
        let sealer = SessionCipher::from_password("x").unwrap();
        let opener = SessionCipher::from_password("y").unwrap();
        let frame = encode_frame(&packet(), Some(&sealer)).unwrap();
        assert!(matches!(
            decode_body(&frame[4..], Some(&opener)),
            Err(ProtocolError::DecryptFailed)
        ));
    }

    #[test]
    fn garbage_body_is_malformed() {
        let err = decode_body(&[0xFF, 0xFE, 0xFD], None).unwrap_err();
        assert!(matches!(err, ProtocolError::FrameMalformed(_)));
        assert!(err.is_frame_local());
    }

    #[test]
    fn trailing_bytes_are_malformed() {
        let mut frame = encode_frame(&packet(), None).unwrap();
        frame.push(0);
        let len = frame.len() - 4;
        frame[..4].copy_from_slice(&u32::try_from(len).unwrap().to_be_bytes());
        assert!(matches!(
            decode_body(&frame[4..], None),
            Err(ProtocolError::FrameMalformed(_))
        ));
    }
}
