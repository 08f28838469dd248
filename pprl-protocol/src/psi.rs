//! The PSI sub-protocol (C10): exact-intersection matching over Curve25519,
//! used instead of the fuzzy Bloom/MinHash exchange when a deployment
//! chooses exact-join mode (e.g. matching on a hashed SSN).
//!
//! Party R (the receiver) learns which of its tokens are in party S's set,
//! plus whatever payload S attached to each matched token. S learns nothing
//! about R's tokens beyond their count.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use curve25519_dalek::constants::RISTRETTO_BASEPOINT_POINT;
use curve25519_dalek::ristretto::{CompressedRistretto, RistrettoPoint};
use curve25519_dalek::scalar::Scalar;
use rand::{CryptoRng, Rng};
use sha2::{Digest, Sha256, Sha512};

use crate::error::CryptoError;

/// Hashes an arbitrary token to a point on the Ristretto group via a
/// uniform 64-byte expansion (SHA-512) fed to
/// [`RistrettoPoint::from_uniform_bytes`].
pub fn hash_to_curve(token: &[u8]) -> RistrettoPoint {
    let digest: [u8; 64] = Sha512::digest(token).into();
    RistrettoPoint::from_uniform_bytes(&digest)
}

fn point_key(point: &RistrettoPoint) -> [u8; 32] {
    Sha256::digest(point.compress().as_bytes()).into()
}

/// One of R's blinded queries: `Q_i = r_i · HashToCurve(t_i)`, with the
/// blinding scalar `r_i` kept private to unblind S's response.
pub struct BlindedQuery {
    /// The index of the source token this query corresponds to.
    pub token_index: usize,
    /// The private blinding scalar `r_i`. Never sent to S.
    scalar: Scalar,
    /// The point sent to S: `Q_i = r_i · P_i`.
    pub point: CompressedRistretto,
}

/// R's first message: blinds every token with an independent random
/// scalar. The returned queries' `point` fields are sent to S in order;
/// the `scalar` fields stay with R.
pub fn receiver_blind<R: Rng + CryptoRng>(tokens: &[impl AsRef<[u8]>], rng: &mut R) -> Vec<BlindedQuery> {
    tokens
        .iter()
        .enumerate()
        .map(|(token_index, token)| {
            let scalar = Scalar::random(rng);
            let point = (scalar * hash_to_curve(token.as_ref())).compress();
            BlindedQuery { token_index, scalar, point }
        })
        .collect()
}

/// One entry of S's response lookup table: an AES-GCM ciphertext keyed by
/// `H(s · U_j)` for one of S's own tokens.
#[derive(Debug)]
pub struct SealedEntry {
    /// AES-GCM nonce used for this entry, fresh per ciphertext.
    pub nonce: [u8; 12],
    /// The sealed payload.
    pub ciphertext: Vec<u8>,
}

/// S's response to a batch of blinded queries: the doubly-blinded points
/// (one per query, same order) and a lookup table over S's own token set.
#[derive(Debug)]
pub struct SenderResponse {
    /// `Q'_i = s · Q_i`, in the same order as the queries S received.
    pub doubly_blinded: Vec<CompressedRistretto>,
    /// `(H(s · U_j), sealed payload)` for every one of S's tokens.
    pub entries: Vec<([u8; 32], SealedEntry)>,
}

/// S's side: picks a single secret scalar `s` for this run, re-blinds every
/// received query, and seals a payload for each of its own tokens under a
/// key derived from that token's blinded form.
///
/// # Errors
/// Returns [`CryptoError::InvalidEncoding`] if a received query point does
/// not decompress to a valid Ristretto element.
pub fn sender_respond<R: Rng + CryptoRng>(
    queries: &[CompressedRistretto],
    own_tokens: &[(impl AsRef<[u8]>, Vec<u8>)],
    rng: &mut R,
) -> Result<SenderResponse, CryptoError> {
    let secret = Scalar::random(rng);

    let mut doubly_blinded = Vec::with_capacity(queries.len());
    for query in queries {
        let point = query.decompress().ok_or(CryptoError::InvalidEncoding)?;
        doubly_blinded.push((secret * point).compress());
    }

    let mut entries = Vec::with_capacity(own_tokens.len());
    for (token, payload) in own_tokens {
        let blinded = secret * hash_to_curve(token.as_ref());
        let key_bytes = point_key(&blinded);
        let entry = seal(&key_bytes, payload, rng);
        entries.push((key_bytes, entry));
    }

    Ok(SenderResponse { doubly_blinded, entries })
}

fn seal<R: Rng + CryptoRng>(key_bytes: &[u8; 32], payload: &[u8], rng: &mut R) -> SealedEntry {
    let key = Key::<Aes256Gcm>::from_slice(key_bytes);
    let cipher = Aes256Gcm::new(key);
    let mut nonce_bytes = [0u8; 12];
    rng.fill(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);
    let ciphertext = cipher.encrypt(nonce, payload).expect("AES-GCM encryption of a bounded payload cannot fail");
    SealedEntry { nonce: nonce_bytes, ciphertext }
}

/// R's final step: unblinds each doubly-blinded point with its own `r_i`,
/// looks the resulting key up in S's entry table, and decrypts any match.
///
/// Returns `(token_index, decrypted payload)` for every query that matched
/// one of S's tokens. A single token whose point fails to decompress or
/// whose matched entry fails AES-GCM verification is logged and skipped,
/// mirroring the `DataError` skip-and-continue policy used for record
/// ingestion; only when the fraction of tokens skipped this way exceeds
/// `max_failure_rate` does this return `Err`, signalling PSI should abort.
///
/// # Errors
/// Returns [`CryptoError::InvalidEncoding`] if `queries` and
/// `response.doubly_blinded` disagree in length (a malformed response, not
/// a per-token failure), or whichever per-token [`CryptoError`] variant was
/// most recently skipped once `max_failure_rate` is exceeded.
pub fn receiver_finish(
    queries: &[BlindedQuery],
    response: &SenderResponse,
    max_failure_rate: f64,
) -> Result<Vec<(usize, Vec<u8>)>, CryptoError> {
    if queries.len() != response.doubly_blinded.len() {
        return Err(CryptoError::InvalidEncoding);
    }
    let mut matches = Vec::new();
    let mut failures = 0usize;
    let mut last_failure = None;
    for (query, doubly_blinded) in queries.iter().zip(&response.doubly_blinded) {
        match recover_one(query, doubly_blinded, response) {
            Ok(Some(payload)) => matches.push((query.token_index, payload)),
            Ok(None) => {}
            Err(err) => {
                tracing::warn!(
                    category = "CryptoError",
                    token_index = query.token_index,
                    error = %err,
                    "skipping PSI token"
                );
                failures += 1;
                last_failure = Some(err);
            }
        }
    }

    let failure_rate = failures as f64 / queries.len().max(1) as f64;
    if failure_rate > max_failure_rate {
        let err = last_failure.expect("failure_rate > 0 implies at least one failure was recorded");
        tracing::error!(category = "CryptoError", failures, failure_rate, "PSI failure rate exceeded cap, aborting");
        return Err(err);
    }
    Ok(matches)
}

fn recover_one(
    query: &BlindedQuery,
    doubly_blinded: &CompressedRistretto,
    response: &SenderResponse,
) -> Result<Option<Vec<u8>>, CryptoError> {
    let point = doubly_blinded.decompress().ok_or(CryptoError::InvalidEncoding)?;
    let unblinded = query.scalar.invert() * point;
    let key_bytes = point_key(&unblinded);
    match response.entries.iter().find(|(key, _)| *key == key_bytes) {
        Some((_, entry)) => open(&key_bytes, entry).map(Some),
        None => Ok(None),
    }
}

fn open(key_bytes: &[u8; 32], entry: &SealedEntry) -> Result<Vec<u8>, CryptoError> {
    let key = Key::<Aes256Gcm>::from_slice(key_bytes);
    let cipher = Aes256Gcm::new(key);
    let nonce = Nonce::from_slice(&entry.nonce);
    cipher
        .decrypt(nonce, entry.ciphertext.as_ref())
        .map_err(|_| CryptoError::DecryptionFailed)
}

/// Sanity check that the Ristretto basepoint used by this module is the
/// standard one (guards against an accidental custom-curve mixup).
pub fn basepoint() -> RistrettoPoint {
    RISTRETTO_BASEPOINT_POINT
}
