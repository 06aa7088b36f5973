//! Passphrase key derivation (Argon2id).
//!
//! Costs are always taken from the container header. `KdfParams::INTERACTIVE`
//! is only the default used when sealing new containers.

use argon2::{Algorithm, Argon2, Params, Version};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::EnvelopeError;
use crate::header::SALT_LEN;

pub const KEY_LEN: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfParams {
    pub time_cost: u32,
    pub memory_cost_kib: u32,
    pub parallelism: u32,
}

impl KdfParams {
    pub const INTERACTIVE: KdfParams = KdfParams {
        time_cost: 3,
        memory_cost_kib: 64 * 1024,
        parallelism: 4,
    };

    fn to_argon2(self) -> Result<Params, EnvelopeError> {
        Params::new(
            self.memory_cost_kib,
            self.time_cost,
            self.parallelism,
            Some(KEY_LEN),
        )
        .map_err(|e| EnvelopeError::KeyDerivation(format!("argon2 params: {e}")))
    }
}

impl Default for KdfParams {
    fn default() -> Self {
        Self::INTERACTIVE
    }
}

/// 32-byte container key. Zeroized on drop.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct ContainerKey([u8; KEY_LEN]);

impl ContainerKey {
    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

impl std::fmt::Debug for ContainerKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ContainerKey(..)")
    }
}

pub fn derive_key(
    passphrase: &[u8],
    salt: &[u8],
    params: &KdfParams,
) -> Result<ContainerKey, EnvelopeError> {
    let argon = Argon2::new(Algorithm::Argon2id, Version::V0x13, params.to_argon2()?);
    let mut key = ContainerKey([0u8; KEY_LEN]);
    argon
        .hash_password_into(passphrase, salt, &mut key.0)
        .map_err(|e| EnvelopeError::KeyDerivation(format!("argon2 derive: {e}")))?;
    Ok(key)
}

pub fn generate_salt() -> [u8; SALT_LEN] {
    let mut salt = [0u8; SALT_LEN];
    rand::rngs::OsRng.fill_bytes(&mut salt);
    salt
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHEAP: KdfParams = KdfParams {
        time_cost: 1,
        memory_cost_kib: 64,
        parallelism: 1,
    };

    #[test]
    fn same_inputs_same_key() {
        let salt = [3u8; SALT_LEN];
        let a = derive_key(b"passphrase", &salt, &CHEAP).unwrap();
        let b = derive_key(b"passphrase", &salt, &CHEAP).unwrap();
        assert_eq!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn salt_changes_key() {
        let a = derive_key(b"passphrase", &[1u8; SALT_LEN], &CHEAP).unwrap();
        let b = derive_key(b"passphrase", &[2u8; SALT_LEN], &CHEAP).unwrap();
        assert_ne!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn zero_cost_is_a_derivation_error() {
        let params = KdfParams {
            time_cost: 0,
            ..CHEAP
        };
        let err = derive_key(b"pw", &[0u8; SALT_LEN], &params).unwrap_err();
        assert!(matches!(err, EnvelopeError::KeyDerivation(_)));
    }
}
