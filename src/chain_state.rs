//! Startup bootstrap of the CA chain.
//!
//! [`ChainState::bootstrap`] runs once, synchronously, before anything is
//! served. Its result is shared read-only through an `Arc`; there is no way to
//! mutate or replace the chain afterwards.

use std::sync::Arc;

use log::info;

use crate::configs::CertificateConfig;
use crate::error::Result;
use crate::storage::Storage;
use crate::trust_chain::TrustChain;

#[derive(Debug, Clone)]
pub struct ChainState {
    chain: Arc<TrustChain>,
    generated: bool,
}

impl ChainState {
    /// Load or generate the chain described by `config`.
    ///
    /// Any error here must abort startup.
    pub fn bootstrap(config: &CertificateConfig) -> Result<Self> {
        let storage = Storage::from_config(config);
        let source = storage.load_or_generate()?;
        let generated = source.is_generated();
        let chain = source.into_chain();

        info!("CA certificate subject      : {}", chain.root_subject());
        info!("Intermediate cert subject   : {}", chain.intermediate_subject());

        Ok(Self {
            chain: Arc::new(chain),
            generated,
        })
    }

    pub fn chain(&self) -> Arc<TrustChain> {
        Arc::clone(&self.chain)
    }

    /// Whether this bootstrap created the chain rather than loading it.
    pub fn was_generated(&self) -> bool {
        self.generated
    }
}
