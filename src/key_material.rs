//! RSA key pair generation.
//!
//! Keys come from OpenSSL's RNG, which is seeded from the operating system's
//! CSPRNG. Only RSA is produced; the signature algorithm used by the
//! certificate builder is fixed to SHA-256 with RSA.

use std::fmt;

use log::debug;
use openssl::pkey::{PKey, Private};
use openssl::rsa::Rsa;

use crate::error::{CaError, Result};

pub const RSA_KEY_SIZE_DEFAULT: u32 = 4096;
const RSA_KEY_SIZE_MIN: u32 = 2048;

/// An RSA private key together with its public half.
pub struct KeyPair {
    private_key: PKey<Private>,
}

impl KeyPair {
    /// Generate a fresh RSA key pair of `bits` length.
    pub fn generate(bits: u32) -> Result<Self> {
        if bits < RSA_KEY_SIZE_MIN {
            return Err(CaError::KeyGeneration(format!(
                "RSA key size {} is below the minimum of {} bits",
                bits, RSA_KEY_SIZE_MIN
            )));
        }
        let rsa = Rsa::generate(bits)
            .map_err(|e| CaError::KeyGeneration(format!("Failed to generate RSA keypair: {}", e)))?;
        let private_key = PKey::from_rsa(rsa)
            .map_err(|e| CaError::KeyGeneration(format!("Failed to create private key: {}", e)))?;
        debug!("Generated {}-bit RSA key pair", bits);
        Ok(Self { private_key })
    }

    /// Wrap a key loaded from disk.
    pub fn from_private_key(private_key: PKey<Private>) -> Self {
        Self { private_key }
    }

    pub fn private_key(&self) -> &PKey<Private> {
        &self.private_key
    }

    pub fn bits(&self) -> u32 {
        self.private_key.bits()
    }

    /// DER-encoded SubjectPublicKeyInfo.
    pub fn public_key_der(&self) -> Result<Vec<u8>> {
        self.private_key
            .public_key_to_der()
            .map_err(|e| CaError::signing("Failed to encode public key", e))
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("algorithm", &"RSA")
            .field("bits", &self.bits())
            .field("private_key", &"<redacted>")
            .finish()
    }
}
