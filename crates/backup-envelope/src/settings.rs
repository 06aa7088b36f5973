use serde::{Deserialize, Serialize};

use crate::error::EnvelopeError;
use crate::header::ContainerHeader;
use crate::kdf::KdfParams;

pub const DEFAULT_CHUNK_SIZE: u32 = 64 * 1024;

/// Largest chunk any container may use, sealed or opened.
pub const MAX_CHUNK_SIZE: u32 = 16 * 1024 * 1024;

/// Parameters used when sealing a new container.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SealSettings {
    pub chunk_size: u32,
    pub kdf: KdfParams,
}

impl Default for SealSettings {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            kdf: KdfParams::INTERACTIVE,
        }
    }
}

/// Ceilings applied to header parameters before any key derivation runs, so a
/// hostile header cannot make us allocate gigabytes or spin for minutes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct OpenLimits {
    pub max_time_cost: u32,
    pub max_memory_cost_kib: u32,
    pub max_parallelism: u32,
    pub max_chunk_size: u32,
}

impl Default for OpenLimits {
    fn default() -> Self {
        Self {
            max_time_cost: 64,
            max_memory_cost_kib: 1024 * 1024, // 1 GiB
            max_parallelism: 16,
            max_chunk_size: MAX_CHUNK_SIZE,
        }
    }
}

impl OpenLimits {
    pub fn check(&self, header: &ContainerHeader) -> Result<(), EnvelopeError> {
        self.check_kdf(&header.kdf)?;
        check_chunk_size(header.chunk_size, self.max_chunk_size)
    }

    /// Whether a container sealed with `settings` would pass [`check`](Self::check).
    pub fn admits(&self, settings: &SealSettings) -> Result<(), EnvelopeError> {
        self.check_kdf(&settings.kdf)?;
        check_chunk_size(settings.chunk_size, self.max_chunk_size)
    }

    fn check_kdf(&self, kdf: &KdfParams) -> Result<(), EnvelopeError> {
        if kdf.time_cost > self.max_time_cost {
            return Err(EnvelopeError::KeyDerivation(format!(
                "time cost {} exceeds limit {}",
                kdf.time_cost, self.max_time_cost
            )));
        }
        if kdf.memory_cost_kib > self.max_memory_cost_kib {
            return Err(EnvelopeError::KeyDerivation(format!(
                "memory cost {} KiB exceeds limit {} KiB",
                kdf.memory_cost_kib, self.max_memory_cost_kib
            )));
        }
        if kdf.parallelism > self.max_parallelism {
            return Err(EnvelopeError::KeyDerivation(format!(
                "parallelism {} exceeds limit {}",
                kdf.parallelism, self.max_parallelism
            )));
        }
        Ok(())
    }
}

pub(crate) fn check_chunk_size(chunk_size: u32, max: u32) -> Result<(), EnvelopeError> {
    if chunk_size == 0 || chunk_size > max {
        return Err(EnvelopeError::KeyDerivation(format!(
            "chunk size {chunk_size} outside 1..={max}"
        )));
    }
    Ok(())
}
