//! Fixed-size container header.
//!
//! Layout (little-endian integers, unused bytes zero):
//!
//! ```text
//!   0..8    magic "BKUPENC\0"
//!   8..12   format version
//!  12..16   Argon2id time cost
//!  16..20   Argon2id memory cost (KiB)
//!  20..24   Argon2id parallelism
//!  24..28   plaintext chunk size
//!  28..60   KDF salt
//!  60..79   nonce prefix
//! ```
//!
//! The whole 128-byte header is bound as associated data of every chunk, so
//! editing any header byte breaks authentication of the first chunk.

use std::io::{ErrorKind, Read};

use crate::error::EnvelopeError;
use crate::kdf::KdfParams;

pub const CONTAINER_MAGIC: &[u8; 8] = b"BKUPENC\0";
pub const FORMAT_VERSION: u32 = 1;
pub const HEADER_SIZE: usize = 128;
pub const SALT_LEN: usize = 32;
pub const NONCE_PREFIX_LEN: usize = 19;

const SALT_AT: usize = 28;
const NONCE_PREFIX_AT: usize = SALT_AT + SALT_LEN;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerHeader {
    pub format_version: u32,
    pub kdf: KdfParams,
    pub chunk_size: u32,
    pub salt: [u8; SALT_LEN],
    pub nonce_prefix: [u8; NONCE_PREFIX_LEN],
}

impl ContainerHeader {
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[..8].copy_from_slice(CONTAINER_MAGIC);
        buf[8..12].copy_from_slice(&self.format_version.to_le_bytes());
        buf[12..16].copy_from_slice(&self.kdf.time_cost.to_le_bytes());
        buf[16..20].copy_from_slice(&self.kdf.memory_cost_kib.to_le_bytes());
        buf[20..24].copy_from_slice(&self.kdf.parallelism.to_le_bytes());
        buf[24..28].copy_from_slice(&self.chunk_size.to_le_bytes());
        buf[SALT_AT..NONCE_PREFIX_AT].copy_from_slice(&self.salt);
        buf[NONCE_PREFIX_AT..NONCE_PREFIX_AT + NONCE_PREFIX_LEN].copy_from_slice(&self.nonce_prefix);
        buf
    }

    pub fn from_bytes(buf: &[u8; HEADER_SIZE]) -> Result<Self, EnvelopeError> {
        if &buf[..8] != CONTAINER_MAGIC {
            return Err(EnvelopeError::InvalidHeader("bad magic"));
        }
        let format_version = read_u32(buf, 8);
        if format_version != FORMAT_VERSION {
            return Err(EnvelopeError::UnsupportedFormat(format_version));
        }
        let mut salt = [0u8; SALT_LEN];
        salt.copy_from_slice(&buf[SALT_AT..NONCE_PREFIX_AT]);
        let mut nonce_prefix = [0u8; NONCE_PREFIX_LEN];
        nonce_prefix.copy_from_slice(&buf[NONCE_PREFIX_AT..NONCE_PREFIX_AT + NONCE_PREFIX_LEN]);
        Ok(Self {
            format_version,
            kdf: KdfParams {
                time_cost: read_u32(buf, 12),
                memory_cost_kib: read_u32(buf, 16),
                parallelism: read_u32(buf, 20),
            },
            chunk_size: read_u32(buf, 24),
            salt,
            nonce_prefix,
        })
    }

    /// Read and parse the header from the start of a container. Returns the raw
    /// bytes as well; they are the associated data of every chunk.
    pub fn read_from<R: Read>(reader: &mut R) -> Result<(Self, [u8; HEADER_SIZE]), EnvelopeError> {
        let mut raw = [0u8; HEADER_SIZE];
        reader.read_exact(&mut raw).map_err(|e| match e.kind() {
            ErrorKind::UnexpectedEof => EnvelopeError::InvalidHeader("container shorter than header"),
            _ => EnvelopeError::Io(e),
        })?;
        let header = Self::from_bytes(&raw)?;
        Ok((header, raw))
    }
}

fn read_u32(buf: &[u8], at: usize) -> u32 {
    let mut bytes = [0u8; 4];
    bytes.copy_from_slice(&buf[at..at + 4]);
    u32::from_le_bytes(bytes)
}
