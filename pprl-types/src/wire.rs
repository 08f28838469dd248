//! Wire-level constants shared between the two-party protocol and whatever
//! crate needs to recognize a message tag without pulling in the transport
//! itself.
//!
//! The full framing (4-byte big-endian length prefix) and per-message body
//! encode/decode live in `pprl-protocol`, which is the only crate that
//! touches sockets; this module holds just the tag values and the protocol
//! version constant so both sides of a connection agree on them without
//! duplicating magic numbers.

/// Current wire protocol version.
pub const PROTOCOL_VERSION: u8 = 0x01;

/// Maximum frame payload size accepted by default (spec default: 64 MiB).
pub const DEFAULT_MAX_FRAME_BYTES: u32 = 64 * 1024 * 1024;

/// One-byte message tags, exactly as enumerated in the wire format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageTag {
    /// `0x01 HANDSHAKE`
    Handshake = 0x01,
    /// `0x02 PARAM_FINGERPRINT`
    ParamFingerprint = 0x02,
    /// `0x03 SKETCH`
    Sketch = 0x03,
    /// `0x04 SKETCH_END`
    SketchEnd = 0x04,
    /// `0x05 MATCH_DIGEST`
    MatchDigest = 0x05,
    /// `0x06 MATCH_DIFF`
    MatchDiff = 0x06,
    /// `0x07 ABORT`
    Abort = 0x07,
}

impl MessageTag {
    /// Decodes a tag byte.
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x01 => Some(Self::Handshake),
            0x02 => Some(Self::ParamFingerprint),
            0x03 => Some(Self::Sketch),
            0x04 => Some(Self::SketchEnd),
            0x05 => Some(Self::MatchDigest),
            0x06 => Some(Self::MatchDiff),
            0x07 => Some(Self::Abort),
            _ => None,
        }
    }
}

/// The role a party plays in the two-party protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Role {
    /// Binds a port and accepts one connection.
    Listener = 0x00,
    /// Connects to the listener.
    Dialer = 0x01,
}

impl Role {
    /// Decodes a role byte.
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x00 => Some(Self::Listener),
            0x01 => Some(Self::Dialer),
            _ => None,
        }
    }
}

/// A 2-byte `ABORT` reason code, enumerated exhaustively so both parties
/// agree on the wire representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum AbortReason {
    /// Protocol version did not match during HANDSHAKE.
    VersionMismatch = 1,
    /// Parameter fingerprints disagreed during PARAM_AGREE.
    ParameterMismatch = 2,
    /// A frame was malformed, oversized, or carried an unknown tag.
    ProtocolError = 3,
    /// A deadline expired.
    Timeout = 4,
    /// A second connection attempt was rejected by the listener.
    SecondaryConnectionRejected = 5,
    /// Unspecified/other.
    Other = 0,
}

impl AbortReason {
    /// Decodes a reason code.
    pub fn from_u16(code: u16) -> Self {
        match code {
            1 => Self::VersionMismatch,
            2 => Self::ParameterMismatch,
            3 => Self::ProtocolError,
            4 => Self::Timeout,
            5 => Self::SecondaryConnectionRejected,
            _ => Self::Other,
        }
    }
}
