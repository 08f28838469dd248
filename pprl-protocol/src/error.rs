//! Error kinds owned by the two-party transport: malformed frames, deadline
//! expiry, and cross-party parameter disagreement. Configuration and data
//! errors live in `pprl-types`; similarity/shape errors live in
//! `pprl-core::error`.

use std::io;

/// Errors that tear down a connection.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// The peer's parameter fingerprint did not match ours.
    #[error("parameter fingerprints disagree")]
    ParameterMismatch,
    /// A frame carried an unrecognized message tag.
    #[error("unknown message tag {0:#04x}")]
    UnknownTag(u8),
    /// A frame's declared length exceeded the configured maximum.
    #[error("frame of {len} bytes exceeds configured maximum {max}")]
    FrameTooLarge {
        /// The declared frame length.
        len: u32,
        /// The configured maximum.
        max: u32,
    },
    /// A frame's body did not match its tag's expected shape.
    #[error("malformed {what} body")]
    MalformedBody {
        /// Which message's body failed to parse.
        what: &'static str,
    },
    /// The peer declared an incompatible protocol version.
    #[error("protocol version mismatch: ours {ours:#04x}, theirs {theirs:#04x}")]
    VersionMismatch {
        /// Our protocol version.
        ours: u8,
        /// The peer's declared protocol version.
        theirs: u8,
    },
    /// A deadline configured in `TimeoutsConfig` expired.
    #[error("deadline expired during {phase}")]
    Timeout {
        /// Which protocol phase the deadline belonged to.
        phase: &'static str,
    },
    /// The peer closed the connection before the handshake completed, or a
    /// secondary connection attempt was rejected.
    #[error("connection closed: {0}")]
    ConnectionClosed(&'static str),
    /// Underlying socket I/O failure.
    #[error(transparent)]
    Io(#[from] io::Error),
    /// The peer sent an explicit `ABORT`.
    #[error("peer aborted: {0}")]
    PeerAbort(String),
}

/// Errors local to the PSI sub-protocol (C10).
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    /// A received point or scalar did not deserialize to a valid group
    /// element.
    #[error("invalid curve point or scalar encoding")]
    InvalidEncoding,
    /// AES-GCM decryption failed (wrong key or tampered ciphertext).
    #[error("AES-GCM tag verification failed")]
    DecryptionFailed,
    /// The underlying transport failed while running PSI.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}
