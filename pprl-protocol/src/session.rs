//! The two-party protocol's state machine (C9):
//! `INIT → HANDSHAKE → PARAM_AGREE → SKETCH_EXCHANGE → MATCH → VERIFY → DONE`,
//! with a shared `ABORT` exit from any state.
//!
//! `MATCH` itself is entirely local (C7/C8 over the exchanged sketches) and
//! has no wire representation; this module covers every state that touches
//! the network.

use std::collections::BTreeSet;
use std::time::Duration;

use pprl_core::BloomFilter;
use pprl_core::tokenizer::Sketch;
use pprl_types::config::TimeoutsConfig;
use pprl_types::wire::{AbortReason, Role, DEFAULT_MAX_FRAME_BYTES, PROTOCOL_VERSION};
use rand::RngCore;
use sha2::{Digest, Sha256};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

use crate::error::ProtocolError;
use crate::wire::{read_message, write_message, Message};

/// Bounded channel capacity for the sketch-exchange sender/receiver tasks.
const SKETCH_CHANNEL_CAPACITY: usize = 64;

/// The outcome of the `VERIFY` state: either both parties' sorted match
/// sets agree, or they don't and the peer's set is attached for diffing.
#[derive(Debug, Clone, PartialEq)]
pub enum VerifyOutcome {
    /// Both sides' match-set digests were byte-equal.
    Agreed,
    /// Digests disagreed; carries the peer's sorted `(id_a, id_b)` pairs so
    /// the caller can emit a diff against its own set.
    Disagreed {
        /// The peer's match set, as reported over `MATCH_DIFF`.
        peer_pairs: Vec<(String, String)>,
    },
}

/// A single two-party connection, past the TCP handshake but with the
/// protocol state machine not yet advanced.
pub struct Session {
    stream: TcpStream,
    role: Role,
    max_frame_bytes: u32,
    timeouts: TimeoutsConfig,
    /// Background task rejecting secondary connections on the listener this
    /// session accepted from. `None` for a `Dialer` session, which owns no
    /// listener.
    reject_secondary: Option<tokio::task::JoinHandle<()>>,
}

impl Session {
    /// Dials a listening peer. Plays the `Dialer` role.
    ///
    /// # Errors
    /// Returns [`ProtocolError::Io`] on connection failure, or
    /// [`ProtocolError::Timeout`] if the connection deadline expires.
    pub async fn connect(
        addr: impl tokio::net::ToSocketAddrs,
        max_frame_bytes: u32,
        timeouts: TimeoutsConfig,
    ) -> Result<Self, ProtocolError> {
        let stream = deadline(timeouts.connection, "connect", TcpStream::connect(addr)).await??;
        Ok(Self { stream, role: Role::Dialer, max_frame_bytes, timeouts, reject_secondary: None })
    }

    /// Binds `addr`, accepts exactly one connection, and rejects any
    /// further connection attempt on the same listener with `ABORT`.
    ///
    /// The listener stays open for the lifetime of the returned `Session`:
    /// a background task keeps accepting on it and writes
    /// `AbortReason::SecondaryConnectionRejected` to every further
    /// connection before dropping it. The task is stopped when the
    /// `Session` is dropped.
    ///
    /// # Errors
    /// Returns [`ProtocolError::Io`] on bind/accept failure, or
    /// [`ProtocolError::Timeout`] if the connection deadline expires before
    /// a peer connects.
    pub async fn listen(
        addr: impl tokio::net::ToSocketAddrs,
        max_frame_bytes: u32,
        timeouts: TimeoutsConfig,
    ) -> Result<Self, ProtocolError> {
        let listener = TcpListener::bind(addr).await?;
        let (stream, _) = deadline(timeouts.connection, "accept", listener.accept()).await??;
        let reject_secondary = tokio::spawn(reject_secondary_connections(listener));
        Ok(Self { stream, role: Role::Listener, max_frame_bytes, timeouts, reject_secondary: Some(reject_secondary) })
    }

    /// Runs `HANDSHAKE`: exchanges protocol version, role, and a random
    /// session id, concurrently to avoid a write/write deadlock.
    ///
    /// # Errors
    /// Returns [`ProtocolError::VersionMismatch`] if the peer's declared
    /// version differs from ours, [`ProtocolError::ConnectionClosed`] if
    /// both sides declare the same role, or [`ProtocolError::Timeout`] on
    /// deadline expiry.
    pub async fn handshake(&mut self) -> Result<[u8; 32], ProtocolError> {
        let mut session_id = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut session_id);
        let ours = Message::Handshake { version: PROTOCOL_VERSION, role: self.role, session_id };

        let max_frame_bytes = self.max_frame_bytes;
        let (mut read_half, mut write_half) = self.stream.split();
        let peer = deadline(
            self.timeouts.handshake,
            "handshake",
            send_and_receive(&mut read_half, &mut write_half, &ours, max_frame_bytes),
        )
        .await??;

        let Message::Handshake { version, role, session_id: peer_session_id } = peer else {
            return Err(ProtocolError::ConnectionClosed("expected HANDSHAKE"));
        };
        if version != PROTOCOL_VERSION {
            return Err(ProtocolError::VersionMismatch { ours: PROTOCOL_VERSION, theirs: version });
        }
        if role == self.role {
            return Err(ProtocolError::ConnectionClosed("both peers declared the same role"));
        }

        let mut combined = session_id.to_vec();
        combined.extend_from_slice(&peer_session_id);
        Ok(Sha256::digest(&combined).into())
    }

    /// Runs `PARAM_AGREE`: exchanges the canonical parameter fingerprint.
    ///
    /// # Errors
    /// Returns [`ProtocolError::ParameterMismatch`] if the fingerprints
    /// disagree, or [`ProtocolError::Timeout`] on deadline expiry.
    pub async fn agree_params(&mut self, fingerprint: [u8; 32]) -> Result<(), ProtocolError> {
        let ours = Message::ParamFingerprint(fingerprint);
        let max_frame_bytes = self.max_frame_bytes;
        let (mut read_half, mut write_half) = self.stream.split();
        let peer = deadline(
            self.timeouts.read,
            "param_agree",
            send_and_receive(&mut read_half, &mut write_half, &ours, max_frame_bytes),
        )
        .await??;

        let Message::ParamFingerprint(peer_fingerprint) = peer else {
            return Err(ProtocolError::ConnectionClosed("expected PARAM_FINGERPRINT"));
        };
        if peer_fingerprint != fingerprint {
            return Err(ProtocolError::ParameterMismatch);
        }
        Ok(())
    }

    /// Runs `SKETCH_EXCHANGE`: streams `own` as framed `SKETCH` messages
    /// terminated by `SKETCH_END`, while concurrently receiving the peer's
    /// stream on a separate task, so neither side can deadlock against a
    /// full socket buffer on the other.
    ///
    /// `bloom_k` is the agreed Bloom hash-probe count (`k`): the wire
    /// format carries only the Bloom bit length, since `k` is already
    /// covered by the parameter fingerprint both sides verified.
    ///
    /// # Errors
    /// Propagates the first I/O, framing, or timeout error from either
    /// direction.
    pub async fn exchange_sketches(&mut self, own: Vec<Sketch>, bloom_k: u32) -> Result<Vec<Sketch>, ProtocolError> {
        let max_frame_bytes = self.max_frame_bytes;
        let read_deadline = self.timeouts.read;
        let write_deadline = self.timeouts.write;
        let (mut read_half, mut write_half) = self.stream.split();

        let (result_tx, mut result_rx) = mpsc::channel(SKETCH_CHANNEL_CAPACITY);

        let sender = async {
            for sketch in &own {
                let message = sketch_to_message(sketch);
                deadline(write_deadline, "sketch_exchange_write", write_message(&mut write_half, &message)).await??;
            }
            deadline(write_deadline, "sketch_exchange_write", write_message(&mut write_half, &Message::SketchEnd)).await??;
            Ok::<(), ProtocolError>(())
        };

        let receiver = async {
            loop {
                let message = deadline(
                    read_deadline,
                    "sketch_exchange_read",
                    read_message(&mut read_half, max_frame_bytes),
                )
                .await??;
                match message {
                    Message::SketchEnd => break,
                    Message::Sketch { .. } => {
                        let sketch = message_to_sketch(message, bloom_k)?;
                        if result_tx.send(sketch).await.is_err() {
                            break;
                        }
                    }
                    _ => return Err(ProtocolError::ConnectionClosed("expected SKETCH or SKETCH_END")),
                }
            }
            drop(result_tx);
            Ok::<(), ProtocolError>(())
        };

        let collector = async {
            let mut peer = Vec::new();
            while let Some(sketch) = result_rx.recv().await {
                peer.push(sketch);
            }
            peer
        };

        let (send_result, recv_result, peer) = tokio::join!(sender, receiver, collector);
        send_result?;
        recv_result?;
        Ok(peer)
    }

    /// Runs `VERIFY`: exchanges a SHA-256 digest of the sorted match set
    /// (serialized as `id_a\tid_b\n` lines); on disagreement, additionally
    /// exchanges the full sorted set for diffing.
    ///
    /// # Errors
    /// Returns a [`ProtocolError`] on I/O, framing, or timeout failure. A
    /// digest disagreement is *not* an error — see [`VerifyOutcome`].
    pub async fn verify(&mut self, matches: &[(String, String)]) -> Result<VerifyOutcome, ProtocolError> {
        let sorted = sorted_pairs(matches);
        let serialized = serialize_pairs(&sorted);
        let digest: [u8; 32] = Sha256::digest(serialized.as_bytes()).into();

        let max_frame_bytes = self.max_frame_bytes;
        let (mut read_half, mut write_half) = self.stream.split();
        let ours = Message::MatchDigest(digest);
        let peer = deadline(
            self.timeouts.read,
            "verify",
            send_and_receive(&mut read_half, &mut write_half, &ours, max_frame_bytes),
        )
        .await??;

        let Message::MatchDigest(peer_digest) = peer else {
            return Err(ProtocolError::ConnectionClosed("expected MATCH_DIGEST"));
        };

        if peer_digest == digest {
            return Ok(VerifyOutcome::Agreed);
        }

        let ours = Message::MatchDiff(serialized);
        let peer_diff = deadline(
            self.timeouts.read,
            "verify_diff",
            send_and_receive(&mut read_half, &mut write_half, &ours, max_frame_bytes),
        )
        .await??;

        let Message::MatchDiff(text) = peer_diff else {
            return Err(ProtocolError::ConnectionClosed("expected MATCH_DIFF"));
        };
        Ok(VerifyOutcome::Disagreed { peer_pairs: parse_pairs(&text) })
    }

    /// Sends an `ABORT` and lets the caller drop the connection.
    ///
    /// # Errors
    /// Returns [`ProtocolError::Io`] if the abort itself cannot be sent;
    /// the caller should treat that the same as a silent disconnect.
    pub async fn abort(&mut self, reason: AbortReason, message: impl Into<String>) -> Result<(), ProtocolError> {
        let abort = Message::Abort { reason, message: message.into() };
        write_message(&mut self.stream, &abort).await
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Some(handle) = self.reject_secondary.take() {
            handle.abort();
        }
    }
}

/// Keeps accepting connections on a listener whose first connection has
/// already been claimed by the session's primary `Session`, writing
/// `ABORT` to every one of them before dropping it.
async fn reject_secondary_connections(listener: TcpListener) {
    loop {
        let Ok((mut stream, _)) = listener.accept().await else {
            return;
        };
        let abort = Message::Abort {
            reason: AbortReason::SecondaryConnectionRejected,
            message: "a peer connection is already established on this listener".to_string(),
        };
        let _ = write_message(&mut stream, &abort).await;
    }
}

async fn send_and_receive<R, W>(
    read_half: &mut R,
    write_half: &mut W,
    ours: &Message,
    max_frame_bytes: u32,
) -> Result<Message, ProtocolError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let (write_result, read_result) =
        tokio::join!(write_message(write_half, ours), read_message(read_half, max_frame_bytes));
    write_result?;
    read_result
}

async fn deadline<F, T>(duration: Duration, phase: &'static str, fut: F) -> Result<T, ProtocolError>
where
    F: std::future::Future<Output = T>,
{
    tokio::time::timeout(duration, fut).await.map_err(|_| ProtocolError::Timeout { phase })
}

fn sketch_to_message(sketch: &Sketch) -> Message {
    Message::Sketch {
        id: sketch.id.clone(),
        bloom_bits: sketch.bloom.size() as u32,
        bloom_bytes: sketch.bloom.to_bytes(),
        signature: sketch.minhash.clone(),
    }
}

fn message_to_sketch(message: Message, bloom_k: u32) -> Result<Sketch, ProtocolError> {
    let Message::Sketch { id, bloom_bits, bloom_bytes, signature } = message else {
        return Err(ProtocolError::ConnectionClosed("expected SKETCH"));
    };
    let bloom = BloomFilter::from_bytes(bloom_bits as usize, bloom_k, &bloom_bytes)
        .map_err(|_| ProtocolError::MalformedBody { what: "SKETCH bloom" })?;
    Ok(Sketch { id, bloom, minhash: signature })
}

/// Canonicalizes each pair to `id_A < id_B` before sorting, so both parties'
/// digests agree regardless of which side called a given id "own" first.
fn sorted_pairs(matches: &[(String, String)]) -> Vec<(String, String)> {
    let set: BTreeSet<(String, String)> = matches
        .iter()
        .map(|(a, b)| if a <= b { (a.clone(), b.clone()) } else { (b.clone(), a.clone()) })
        .collect();
    set.into_iter().collect()
}

fn serialize_pairs(pairs: &[(String, String)]) -> String {
    let mut out = String::new();
    for (a, b) in pairs {
        out.push_str(a);
        out.push('\t');
        out.push_str(b);
        out.push('\n');
    }
    out
}

fn parse_pairs(text: &str) -> Vec<(String, String)> {
    text.lines()
        .filter_map(|line| line.split_once('\t'))
        .map(|(a, b)| (a.to_string(), b.to_string()))
        .collect()
}

/// The default maximum frame size, re-exported for callers that want the
/// spec's documented default without constructing a full `RunConfig`.
pub const fn default_max_frame_bytes() -> u32 {
    DEFAULT_MAX_FRAME_BYTES
}
