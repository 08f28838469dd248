//! Tokenized sketch files: a sequence of `SKETCH` wire records followed by
//! `SKETCH_END`, read and written directly against plain files.
//!
//! An encrypting wrapper (AES-GCM sealing of the artifact at rest) is named
//! in the external interfaces but out of scope here; it would sit between
//! [`write_sketch_file`]/[`read_sketch_file`] and the filesystem, wrapping
//! the same byte stream these functions already produce.

use pprl_core::BloomFilter;
use pprl_core::tokenizer::Sketch;
use pprl_protocol::ProtocolError;
use pprl_protocol::wire::Message;
use pprl_types::wire::DEFAULT_MAX_FRAME_BYTES;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufReader, BufWriter};

/// Writes `sketches` to `path` as a sequence of framed `SKETCH` records
/// terminated by `SKETCH_END`.
///
/// # Errors
/// Returns [`ProtocolError::Io`] if the file cannot be created or written.
pub async fn write_sketch_file(path: impl AsRef<std::path::Path>, sketches: &[Sketch]) -> Result<(), ProtocolError> {
    let mut writer = BufWriter::new(File::create(path).await?);
    for sketch in sketches {
        let message = Message::Sketch {
            id: sketch.id.clone(),
            bloom_bits: sketch.bloom.size() as u32,
            bloom_bytes: sketch.bloom.to_bytes(),
            signature: sketch.minhash.clone(),
        };
        pprl_protocol::wire::write_frame(&mut writer, &message.encode()).await?;
    }
    pprl_protocol::wire::write_frame(&mut writer, &Message::SketchEnd.encode()).await?;
    writer.flush().await?;
    Ok(())
}

/// Reads a sketch file written by [`write_sketch_file`] back into memory.
///
/// `bloom_k` is the agreed Bloom hash-probe count, since the wire format
/// does not carry it (see `pprl_protocol::session::exchange_sketches`).
///
/// # Errors
/// Returns [`ProtocolError`] on I/O failure, an oversized frame, or a
/// frame that is neither `SKETCH` nor the terminating `SKETCH_END`.
pub async fn read_sketch_file(
    path: impl AsRef<std::path::Path>,
    bloom_k: u32,
) -> Result<Vec<Sketch>, ProtocolError> {
    let mut reader = BufReader::new(File::open(path).await?);
    let mut sketches = Vec::new();
    loop {
        let payload = match pprl_protocol::wire::read_frame(&mut reader, DEFAULT_MAX_FRAME_BYTES).await {
            Ok(payload) => payload,
            Err(ProtocolError::Io(err)) if err.kind() == std::io::ErrorKind::UnexpectedEof => break,
            Err(err) => return Err(err),
        };
        match Message::decode(&payload)? {
            Message::SketchEnd => break,
            Message::Sketch { id, bloom_bits, bloom_bytes, signature } => {
                let bloom = BloomFilter::from_bytes(bloom_bits as usize, bloom_k, &bloom_bytes)
                    .map_err(|_| ProtocolError::MalformedBody { what: "SKETCH bloom" })?;
                sketches.push(Sketch { id, bloom, minhash: signature });
            }
            _ => return Err(ProtocolError::MalformedBody { what: "sketch file" }),
        }
    }
    Ok(sketches)
}
