//! Chat CA - certificate authority bootstrap for the chat backend
//!
//! On start the process loads the root and intermediate CA from the configured
//! directory, or generates and stores a fresh pair when any of the four files
//! is missing. Once the chain is in memory the public certificates are served
//! over HTTP:
//!
//! - `GET /api/certificates/ca`
//! - `GET /api/certificates/intermediate`
//!
//! Configuration is read from `config.toml` (or `$CHAT_CA_CONFIG`); every
//! setting has a default. Log verbosity follows `RUST_LOG`.

use anyhow::{Context, Result};
use chat_ca::chain_state::ChainState;
use chat_ca::configs::AppConfig;
use chat_ca::webserver::start_webserver;
use log::info;

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = AppConfig::load().context("Failed to load configuration")?;

    // Nothing is served unless the chain is in place.
    let state = ChainState::bootstrap(&config.certificates)
        .context("Certificate bootstrap failed")?;
    if state.was_generated() {
        info!("✓ New CA chain generated");
    } else {
        info!("✓ Existing CA chain loaded");
    }

    start_webserver(&config.server, state.chain())
}
