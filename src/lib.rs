//! Chat CA - two-level certificate authority bootstrap
//!
//! Produces and persists the trust chain used for the chat backend's TLS
//! material, and publishes the public certificates:
//!
//! ```text
//! Root CA (self-signed, CA=true)
//!   └── Intermediate CA (signed by Root, CA=true, pathlen=0)
//! ```
//!
//! # Startup flow
//!
//! ```text
//! ChainState::bootstrap
//!   └── Storage::load_or_generate
//!         ├── all four files present → parse → Loaded
//!         └── any file missing       → build_chain → persist → Generated
//! ```
//!
//! The resulting [`trust_chain::TrustChain`] is immutable and shared through an
//! `Arc`.
//!
//! # Files
//!
//! | File | Contents |
//! |---|---|
//! | `{dir}/ca.crt` | root certificate, PEM |
//! | `{dir}/ca.key` | root private key, PKCS#8 PEM |
//! | `{dir}/intermediate.crt` | intermediate certificate, PEM |
//! | `{dir}/intermediate.key` | intermediate private key, PKCS#8 PEM |
//!
//! `{dir}` defaults to `./certs`; each path can be overridden individually.
//!
//! # Example
//!
//! ```no_run
//! use chat_ca::chain_state::ChainState;
//! use chat_ca::configs::CertificateConfig;
//!
//! let state = ChainState::bootstrap(&CertificateConfig::with_directory("./certs"))?;
//! println!("{}", state.chain().root_certificate_pem());
//! # Ok::<(), chat_ca::error::CaError>(())
//! ```
//!
//! # Error Handling
//!
//! Library functions return [`error::Result`]. Every [`error::CaError`] raised
//! during bootstrap is fatal; the binary exits without serving.

pub mod chain_state;
pub mod configs;
pub mod error;
pub mod key_material;
pub mod pem;
pub mod pki_generator;
pub mod storage;
pub mod trust_chain;
pub mod webserver;
