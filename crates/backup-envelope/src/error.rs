use thiserror::Error;

use crate::cancel::Cancelled;

#[derive(Debug, Error)]
pub enum EnvelopeError {
    #[error("Invalid container header: {0}")]
    InvalidHeader(&'static str),

    #[error("Unsupported container format version {0}")]
    UnsupportedFormat(u32),

    #[error("Key derivation failed: {0}")]
    KeyDerivation(String),

    #[error("Chunk {chunk} failed authentication ({reason})")]
    Authentication { chunk: u32, reason: &'static str },

    #[error("Encryption failed: {0}")]
    Encrypt(&'static str),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<Cancelled> for EnvelopeError {
    fn from(_: Cancelled) -> Self {
        EnvelopeError::Cancelled
    }
}
