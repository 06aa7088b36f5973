//! Chunked authenticated encryption.
//!
//! Chunk `i` is sealed with XChaCha20-Poly1305 under the nonce
//! `nonce_prefix || u32_be(i) || last_flag` and the raw header as associated
//! data. Every chunk except the last carries exactly `chunk_size` plaintext
//! bytes; the last carries fewer, possibly none. A reader therefore knows a
//! chunk is final from its length alone, and the flag in the nonce makes
//! truncation at a chunk boundary fail authentication.

use std::io::{ErrorKind, Read, Write};

use chacha20poly1305::aead::{Aead, KeyInit, Payload};
use chacha20poly1305::{Key, XChaCha20Poly1305, XNonce};
use rand::RngCore;
use tracing::{debug, info};
use zeroize::Zeroizing;

use crate::cancel::CancellationToken;
use crate::error::EnvelopeError;
use crate::header::{ContainerHeader, FORMAT_VERSION, HEADER_SIZE, NONCE_PREFIX_LEN};
use crate::kdf::{derive_key, generate_salt, ContainerKey};
use crate::settings::{check_chunk_size, OpenLimits, SealSettings, MAX_CHUNK_SIZE};

pub const TAG_LEN: usize = 16;

// ── Sealing ─────────────────────────────────────────────────────────────────

/// Encrypt everything `reader` yields into a new container written to
/// `writer`. Salt and nonce prefix are fresh for every call.
pub fn seal<R: Read, W: Write>(
    mut reader: R,
    mut writer: W,
    passphrase: &[u8],
    settings: &SealSettings,
) -> Result<ContainerHeader, EnvelopeError> {
    check_chunk_size(settings.chunk_size, MAX_CHUNK_SIZE)?;
    let header = ContainerHeader {
        format_version: FORMAT_VERSION,
        kdf: settings.kdf,
        chunk_size: settings.chunk_size,
        salt: generate_salt(),
        nonce_prefix: generate_nonce_prefix(),
    };
    let header_bytes = header.to_bytes();
    let key = derive_key(passphrase, &header.salt, &header.kdf)?;
    let cipher = cipher_for(&key);

    writer.write_all(&header_bytes)?;

    let mut buf = Zeroizing::new(vec![0u8; header.chunk_size as usize]);
    let mut index: u32 = 0;
    loop {
        let filled = read_full(&mut reader, &mut buf)?;
        let last = filled < buf.len();
        let nonce = chunk_nonce(&header.nonce_prefix, index, last);
        let sealed = cipher
            .encrypt(
                &nonce,
                Payload {
                    msg: &buf[..filled],
                    aad: &header_bytes,
                },
            )
            .map_err(|_| EnvelopeError::Encrypt("aead rejected chunk"))?;
        writer.write_all(&sealed)?;
        if last {
            break;
        }
        index = index
            .checked_add(1)
            .ok_or(EnvelopeError::Encrypt("chunk counter overflow"))?;
    }
    writer.flush()?;
    debug!(chunks = u64::from(index) + 1, "container sealed");
    Ok(header)
}

// ── Opening ─────────────────────────────────────────────────────────────────

/// Parse the header, check it against `limits`, derive the key and return a
/// stream of plaintext chunks.
///
/// Chunks are released one at a time as they authenticate. A consumer that
/// must not act on partial plaintext keeps its output provisional until the
/// stream has ended without error (see [`ChunkStream::copy_to`]).
pub fn open<R: Read>(
    mut reader: R,
    passphrase: &[u8],
    limits: &OpenLimits,
) -> Result<ChunkStream<R>, EnvelopeError> {
    let (header, header_bytes) = ContainerHeader::read_from(&mut reader)?;
    limits.check(&header)?;
    info!(
        format_version = header.format_version,
        chunk_size = header.chunk_size,
        kdf_time_cost = header.kdf.time_cost,
        kdf_memory_cost_kib = header.kdf.memory_cost_kib,
        "container header accepted"
    );
    let key = derive_key(passphrase, &header.salt, &header.kdf)?;
    let buf = vec![0u8; header.chunk_size as usize + TAG_LEN];
    Ok(ChunkStream {
        reader,
        header,
        header_bytes,
        key: Some(key),
        buf,
        index: 0,
        state: StreamState::Open,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StreamState {
    Open,
    Finished,
    Failed,
}

/// Iterator over authenticated plaintext chunks.
///
/// The derived key is dropped (and zeroized) as soon as the final chunk is
/// read, the first error is returned, or the stream itself is dropped. After
/// an error the iterator is fused.
pub struct ChunkStream<R> {
    reader: R,
    header: ContainerHeader,
    header_bytes: [u8; HEADER_SIZE],
    key: Option<ContainerKey>,
    buf: Vec<u8>,
    index: u32,
    state: StreamState,
}

impl<R: Read> ChunkStream<R> {
    pub fn header(&self) -> &ContainerHeader {
        &self.header
    }

    /// Number of chunks authenticated so far.
    pub fn chunks_read(&self) -> u32 {
        self.index
    }

    pub fn is_finished(&self) -> bool {
        self.state == StreamState::Finished
    }

    /// Drain the stream into `writer`, checking `cancel` before every chunk.
    /// Returns the number of plaintext bytes written.
    pub fn copy_to<W: Write>(
        mut self,
        mut writer: W,
        cancel: &CancellationToken,
    ) -> Result<u64, EnvelopeError> {
        let mut written = 0u64;
        loop {
            cancel.check()?;
            match self.next() {
                Some(chunk) => {
                    let chunk = chunk?;
                    writer.write_all(&chunk)?;
                    written += chunk.len() as u64;
                }
                None => break,
            }
        }
        writer.flush()?;
        debug!(bytes = written, chunks = self.index, "container decrypted");
        Ok(written)
    }

    fn next_chunk(&mut self) -> Result<Zeroizing<Vec<u8>>, EnvelopeError> {
        let chunk = self.index;
        let filled = read_full(&mut self.reader, &mut self.buf)?;
        if filled < TAG_LEN {
            // Covers EOF right after a full-size chunk: the final chunk is gone.
            return Err(EnvelopeError::Authentication {
                chunk,
                reason: "truncated",
            });
        }
        let last = filled < self.buf.len();
        let key = self.key.as_ref().ok_or(EnvelopeError::Authentication {
            chunk,
            reason: "key released",
        })?;
        let nonce = chunk_nonce(&self.header.nonce_prefix, chunk, last);
        let plaintext = cipher_for(key)
            .decrypt(
                &nonce,
                Payload {
                    msg: &self.buf[..filled],
                    aad: &self.header_bytes,
                },
            )
            .map_err(|_| EnvelopeError::Authentication {
                chunk,
                reason: "tag mismatch",
            })?;
        let plaintext = Zeroizing::new(plaintext);

        if last {
            let mut extra = [0u8; 1];
            if read_full(&mut self.reader, &mut extra)? != 0 {
                return Err(EnvelopeError::Authentication {
                    chunk,
                    reason: "trailing data after final chunk",
                });
            }
            self.index = chunk.saturating_add(1);
            self.key = None;
            self.state = StreamState::Finished;
        } else {
            self.index = chunk.checked_add(1).ok_or(EnvelopeError::Authentication {
                chunk,
                reason: "chunk counter overflow",
            })?;
        }
        Ok(plaintext)
    }
}

impl<R: Read> Iterator for ChunkStream<R> {
    type Item = Result<Zeroizing<Vec<u8>>, EnvelopeError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.state != StreamState::Open {
            return None;
        }
        match self.next_chunk() {
            Ok(chunk) => Some(Ok(chunk)),
            Err(e) => {
                self.key = None;
                self.state = StreamState::Failed;
                Some(Err(e))
            }
        }
    }
}

// ── Helpers ─────────────────────────────────────────────────────────────────

fn cipher_for(key: &ContainerKey) -> XChaCha20Poly1305 {
    XChaCha20Poly1305::new(Key::from_slice(key.as_bytes()))
}

fn chunk_nonce(prefix: &[u8; NONCE_PREFIX_LEN], index: u32, last: bool) -> XNonce {
    let mut nonce = [0u8; 24];
    nonce[..NONCE_PREFIX_LEN].copy_from_slice(prefix);
    nonce[NONCE_PREFIX_LEN..NONCE_PREFIX_LEN + 4].copy_from_slice(&index.to_be_bytes());
    nonce[23] = u8::from(last);
    *XNonce::from_slice(&nonce)
}

fn generate_nonce_prefix() -> [u8; NONCE_PREFIX_LEN] {
    let mut prefix = [0u8; NONCE_PREFIX_LEN];
    rand::rngs::OsRng.fill_bytes(&mut prefix);
    prefix
}

/// Fill `buf` as far as the reader allows. Short only at end of input.
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
