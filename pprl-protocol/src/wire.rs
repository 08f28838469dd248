//! Bit-exact wire framing and message encode/decode for the two-party
//! protocol: a 4-byte big-endian length prefix around a 1-byte tag plus
//! tag-specific body.

use pprl_types::wire::{AbortReason, MessageTag, Role};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::ProtocolError;

/// One decoded protocol message.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// `0x01 HANDSHAKE`.
    Handshake {
        /// The sender's protocol version.
        version: u8,
        /// The sender's declared role.
        role: Role,
        /// A random 32-byte session id.
        session_id: [u8; 32],
    },
    /// `0x02 PARAM_FINGERPRINT`.
    ParamFingerprint([u8; 32]),
    /// `0x03 SKETCH`.
    Sketch {
        /// The record's opaque id.
        id: String,
        /// Bloom filter length in bits (`m`).
        bloom_bits: u32,
        /// Packed Bloom filter bytes, little-endian bit order per byte.
        bloom_bytes: Vec<u8>,
        /// MinHash signature entries.
        signature: Vec<u32>,
    },
    /// `0x04 SKETCH_END`.
    SketchEnd,
    /// `0x05 MATCH_DIGEST`.
    MatchDigest([u8; 32]),
    /// `0x06 MATCH_DIFF`.
    MatchDiff(String),
    /// `0x07 ABORT`.
    Abort {
        /// The abort reason code.
        reason: AbortReason,
        /// A human-readable reason string.
        message: String,
    },
}

impl Message {
    /// Encodes this message's wire payload: tag byte followed by body.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        match self {
            Message::Handshake { version, role, session_id } => {
                out.push(MessageTag::Handshake as u8);
                out.push(*version);
                out.push(*role as u8);
                out.extend_from_slice(session_id);
            }
            Message::ParamFingerprint(digest) => {
                out.push(MessageTag::ParamFingerprint as u8);
                out.extend_from_slice(digest);
            }
            Message::Sketch { id, bloom_bits, bloom_bytes, signature } => {
                out.push(MessageTag::Sketch as u8);
                let id_bytes = id.as_bytes();
                out.extend_from_slice(&(id_bytes.len() as u16).to_be_bytes());
                out.extend_from_slice(id_bytes);
                out.extend_from_slice(&bloom_bits.to_be_bytes());
                out.extend_from_slice(bloom_bytes);
                out.extend_from_slice(&(signature.len() as u16).to_be_bytes());
                for entry in signature {
                    out.extend_from_slice(&entry.to_le_bytes());
                }
            }
            Message::SketchEnd => {
                out.push(MessageTag::SketchEnd as u8);
            }
            Message::MatchDigest(digest) => {
                out.push(MessageTag::MatchDigest as u8);
                out.extend_from_slice(digest);
            }
            Message::MatchDiff(text) => {
                out.push(MessageTag::MatchDiff as u8);
                out.extend_from_slice(text.as_bytes());
            }
            Message::Abort { reason, message } => {
                out.push(MessageTag::Abort as u8);
                out.extend_from_slice(&(*reason as u16).to_be_bytes());
                out.extend_from_slice(message.as_bytes());
            }
        }
        out
    }

    /// Decodes a payload (tag byte plus body) into a [`Message`].
    ///
    /// # Errors
    /// Returns [`ProtocolError::UnknownTag`] for an unrecognized tag, or
    /// [`ProtocolError::MalformedBody`] when a recognized tag's body does
    /// not match its fixed shape.
    pub fn decode(payload: &[u8]) -> Result<Self, ProtocolError> {
        let (&tag_byte, body) = payload.split_first().ok_or(ProtocolError::MalformedBody {
            what: "empty payload",
        })?;
        let tag = MessageTag::from_byte(tag_byte).ok_or(ProtocolError::UnknownTag(tag_byte))?;
        match tag {
            MessageTag::Handshake => {
                if body.len() != 34 {
                    return Err(ProtocolError::MalformedBody { what: "HANDSHAKE" });
                }
                let version = body[0];
                let role = Role::from_byte(body[1])
                    .ok_or(ProtocolError::MalformedBody { what: "HANDSHAKE role" })?;
                let mut session_id = [0u8; 32];
                session_id.copy_from_slice(&body[2..34]);
                Ok(Message::Handshake { version, role, session_id })
            }
            MessageTag::ParamFingerprint => {
                if body.len() != 32 {
                    return Err(ProtocolError::MalformedBody { what: "PARAM_FINGERPRINT" });
                }
                let mut digest = [0u8; 32];
                digest.copy_from_slice(body);
                Ok(Message::ParamFingerprint(digest))
            }
            MessageTag::Sketch => decode_sketch(body),
            MessageTag::SketchEnd => {
                if !body.is_empty() {
                    return Err(ProtocolError::MalformedBody { what: "SKETCH_END" });
                }
                Ok(Message::SketchEnd)
            }
            MessageTag::MatchDigest => {
                if body.len() != 32 {
                    return Err(ProtocolError::MalformedBody { what: "MATCH_DIGEST" });
                }
                let mut digest = [0u8; 32];
                digest.copy_from_slice(body);
                Ok(Message::MatchDigest(digest))
            }
            MessageTag::MatchDiff => {
                let text = String::from_utf8(body.to_vec())
                    .map_err(|_| ProtocolError::MalformedBody { what: "MATCH_DIFF" })?;
                Ok(Message::MatchDiff(text))
            }
            MessageTag::Abort => {
                if body.len() < 2 {
                    return Err(ProtocolError::MalformedBody { what: "ABORT" });
                }
                let reason = AbortReason::from_u16(u16::from_be_bytes([body[0], body[1]]));
                let message = String::from_utf8(body[2..].to_vec())
                    .map_err(|_| ProtocolError::MalformedBody { what: "ABORT" })?;
                Ok(Message::Abort { reason, message })
            }
        }
    }
}

fn decode_sketch(body: &[u8]) -> Result<Message, ProtocolError> {
    let err = || ProtocolError::MalformedBody { what: "SKETCH" };
    if body.len() < 2 {
        return Err(err());
    }
    let id_len = u16::from_be_bytes([body[0], body[1]]) as usize;
    let mut offset = 2;
    if body.len() < offset + id_len {
        return Err(err());
    }
    let id = String::from_utf8(body[offset..offset + id_len].to_vec()).map_err(|_| err())?;
    offset += id_len;

    if body.len() < offset + 4 {
        return Err(err());
    }
    let bloom_bits = u32::from_be_bytes(body[offset..offset + 4].try_into().map_err(|_| err())?);
    offset += 4;

    let bloom_byte_len = (bloom_bits as usize).div_ceil(8);
    if body.len() < offset + bloom_byte_len {
        return Err(err());
    }
    let bloom_bytes = body[offset..offset + bloom_byte_len].to_vec();
    offset += bloom_byte_len;

    if body.len() < offset + 2 {
        return Err(err());
    }
    let sig_len = u16::from_be_bytes([body[offset], body[offset + 1]]) as usize;
    offset += 2;

    if body.len() != offset + sig_len * 4 {
        return Err(err());
    }
    let mut signature = Vec::with_capacity(sig_len);
    for chunk in body[offset..].chunks_exact(4) {
        signature.push(u32::from_le_bytes(chunk.try_into().map_err(|_| err())?));
    }

    Ok(Message::Sketch { id, bloom_bits, bloom_bytes, signature })
}

/// Writes one length-prefixed frame.
pub async fn write_frame<W: AsyncWrite + Unpin>(writer: &mut W, payload: &[u8]) -> Result<(), ProtocolError> {
    writer.write_u32(payload.len() as u32).await?;
    writer.write_all(payload).await?;
    writer.flush().await?;
    Ok(())
}

/// Reads one length-prefixed frame, rejecting any whose declared length
/// exceeds `max_frame_bytes`.
///
/// # Errors
/// Returns [`ProtocolError::FrameTooLarge`] on an oversized declared
/// length, or [`ProtocolError::Io`] on a socket failure (including EOF).
pub async fn read_frame<R: AsyncRead + Unpin>(
    reader: &mut R,
    max_frame_bytes: u32,
) -> Result<Vec<u8>, ProtocolError> {
    let len = reader.read_u32().await?;
    if len > max_frame_bytes {
        return Err(ProtocolError::FrameTooLarge { len, max: max_frame_bytes });
    }
    let mut payload = vec![0u8; len as usize];
    reader.read_exact(&mut payload).await?;
    Ok(payload)
}

/// Writes one message as a single length-prefixed frame.
pub async fn write_message<W: AsyncWrite + Unpin>(writer: &mut W, message: &Message) -> Result<(), ProtocolError> {
    write_frame(writer, &message.encode()).await
}

/// Reads one length-prefixed frame and decodes it into a [`Message`].
pub async fn read_message<R: AsyncRead + Unpin>(
    reader: &mut R,
    max_frame_bytes: u32,
) -> Result<Message, ProtocolError> {
    let payload = read_frame(reader, max_frame_bytes).await?;
    Message::decode(&payload)
}
