//! Error types for the CA bootstrap.
//!
//! Every variant is fatal: bootstrap never retries and never falls back to a
//! different code path once one of these has been raised.

use std::path::PathBuf;

use openssl::error::ErrorStack;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, CaError>;

#[derive(Debug, Error)]
pub enum CaError {
    /// The RSA key pair could not be produced.
    #[error("key generation failed: {0}")]
    KeyGeneration(String),

    /// Certificate construction or signing failed.
    #[error("certificate signing failed: {0}")]
    Signing(String),

    /// An artifact already on disk does not parse as PEM/X.509 or PKCS#8.
    #[error("corrupt certificate state in {path}: {reason}")]
    CorruptState { path: PathBuf, reason: String },

    /// A freshly built chain does not satisfy the trust-chain invariants.
    #[error("trust chain check failed: {0}")]
    InvalidChain(String),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid CA configuration: {0}")]
    InvalidConfig(String),
}

impl CaError {
    pub(crate) fn signing(context: &str, e: ErrorStack) -> Self {
        CaError::Signing(format!("{}: {}", context, e))
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CaError::Io {
            path: path.into(),
            source,
        }
    }
}
