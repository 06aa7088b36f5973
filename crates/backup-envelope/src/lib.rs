//! backup-envelope: password-sealed container for messaging backups
//!
//! A container is a fixed 128-byte header followed by a sequence of
//! independently authenticated XChaCha20-Poly1305 chunks. The key comes from
//! the passphrase through Argon2id with the salt and costs stored in the
//! header, so containers sealed with older parameters stay readable.
//!
//! # Module layout
//! - `header`:   header codec (magic, format version, KDF costs, chunk size)
//! - `kdf`:      Argon2id key derivation, key zeroized on drop
//! - `settings`: sealing parameters and the ceilings accepted when opening
//! - `stream`:   chunked seal / open, chunk counter and final flag in the nonce
//! - `cancel`:   cooperative cancellation checked at chunk boundaries
//! - `error`:    unified error type

pub mod cancel;
pub mod error;
pub mod header;
pub mod kdf;
pub mod settings;
pub mod stream;

pub use cancel::{Cancelled, CancellationToken};
pub use error::EnvelopeError;
pub use header::ContainerHeader;
pub use kdf::KdfParams;
pub use settings::{OpenLimits, SealSettings, MAX_CHUNK_SIZE};
pub use stream::{open, seal, ChunkStream};
