//! On-disk persistence of the trust chain.
//!
//! The four artifacts are treated as one unit:
//!
//! - all four files present: each is parsed and the chain is returned as
//!   [`ChainSource::Loaded`]. A file that fails to parse is fatal; nothing
//!   is repaired or regenerated.
//! - any file missing: whatever is there is discarded, a new chain is
//!   generated and all four files are written ([`ChainSource::Generated`]).
//!
//! Running against a complete directory is therefore a no-op, and the four
//! files on disk always belong to the same chain.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use tempfile::NamedTempFile;

use crate::configs::CertificateConfig;
use crate::error::{CaError, Result};
use crate::key_material::KeyPair;
use crate::pem::{certificate_from_pem, private_key_from_pem, private_key_to_pem};
use crate::pki_generator::SubjectIdentity;
use crate::trust_chain::{build_chain, ChainValidity, TrustChain};

pub const CA_CERT_FILE: &str = "ca.crt";
pub const CA_KEY_FILE: &str = "ca.key";
pub const INTERMEDIATE_CERT_FILE: &str = "intermediate.crt";
pub const INTERMEDIATE_KEY_FILE: &str = "intermediate.key";

#[cfg(unix)]
const PRIVATE_KEY_MODE: u32 = 0o600;
#[cfg(unix)]
const CERTIFICATE_MODE: u32 = 0o644;

/// Resolved locations of the four chain artifacts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainPaths {
    pub directory: PathBuf,
    pub ca_cert: PathBuf,
    pub ca_key: PathBuf,
    pub intermediate_cert: PathBuf,
    pub intermediate_key: PathBuf,
}

impl ChainPaths {
    /// Explicit paths win; blank or unset ones fall back to
    /// `{directory}/{ca,intermediate}.{crt,key}`.
    pub fn resolve(config: &CertificateConfig) -> Self {
        let dir = &config.directory;
        let pick = |configured: &Option<PathBuf>, file_name: &str| match configured {
            Some(path) if !path.as_os_str().to_string_lossy().trim().is_empty() => path.clone(),
            _ => dir.join(file_name),
        };
        Self {
            directory: dir.clone(),
            ca_cert: pick(&config.ca_cert_path, CA_CERT_FILE),
            ca_key: pick(&config.ca_key_path, CA_KEY_FILE),
            intermediate_cert: pick(&config.intermediate_cert_path, INTERMEDIATE_CERT_FILE),
            intermediate_key: pick(&config.intermediate_key_path, INTERMEDIATE_KEY_FILE),
        }
    }

    pub fn all(&self) -> [&Path; 4] {
        [
            &self.ca_cert,
            &self.ca_key,
            &self.intermediate_cert,
            &self.intermediate_key,
        ]
    }
}

/// How the chain returned by [`Storage::load_or_generate`] came to be.
#[derive(Debug)]
pub enum ChainSource {
    Loaded(TrustChain),
    Generated(TrustChain),
}

impl ChainSource {
    pub fn chain(&self) -> &TrustChain {
        match self {
            ChainSource::Loaded(chain) | ChainSource::Generated(chain) => chain,
        }
    }

    pub fn into_chain(self) -> TrustChain {
        match self {
            ChainSource::Loaded(chain) | ChainSource::Generated(chain) => chain,
        }
    }

    pub fn is_generated(&self) -> bool {
        matches!(self, ChainSource::Generated(_))
    }
}

/// What a freshly generated chain should look like.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainSettings {
    pub root_subject: SubjectIdentity,
    pub intermediate_subject: SubjectIdentity,
    pub validity: ChainValidity,
    pub key_bits: u32,
}

impl ChainSettings {
    pub fn from_config(config: &CertificateConfig) -> Self {
        Self {
            root_subject: config.ca.identity(),
            intermediate_subject: config.intermediate.identity(),
            validity: config.validity(),
            key_bits: config.key_bits,
        }
    }
}

/// Access to the chain files. Holds their paths and the parameters used when
/// the set has to be regenerated; never the chain itself.
#[derive(Debug, Clone)]
pub struct Storage {
    paths: ChainPaths,
    settings: ChainSettings,
}

impl Storage {
    pub fn new(paths: ChainPaths, settings: ChainSettings) -> Self {
        Storage { paths, settings }
    }

    pub fn from_config(config: &CertificateConfig) -> Self {
        Self::new(ChainPaths::resolve(config), ChainSettings::from_config(config))
    }

    pub fn paths(&self) -> &ChainPaths {
        &self.paths
    }

    pub fn settings(&self) -> &ChainSettings {
        &self.settings
    }

    /// Paths of the artifacts that do not exist yet.
    pub fn missing(&self) -> Result<Vec<&Path>> {
        let mut missing = Vec::new();
        for path in self.paths.all() {
            if !path.try_exists().map_err(|e| CaError::io(path, e))? {
                missing.push(path);
            }
        }
        Ok(missing)
    }

    pub fn is_complete(&self) -> Result<bool> {
        Ok(self.missing()?.is_empty())
    }

    /// Load the existing chain, or generate and persist a new one.
    pub fn load_or_generate(&self) -> Result<ChainSource> {
        let missing = self.missing()?;
        if missing.is_empty() {
            info!("Certificate files found, loading from disk");
            return Ok(ChainSource::Loaded(self.load()?));
        }

        let present = self.paths.all().len() - missing.len();
        if present > 0 {
            warn!(
                "Incomplete certificate set ({} of 4 files present, missing: {}); regenerating the whole chain",
                present,
                missing
                    .iter()
                    .map(|p| p.display().to_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            );
        } else {
            info!("Certificate files not found, generating new CA and intermediate certificates");
        }

        let settings = &self.settings;
        let chain = build_chain(
            &settings.root_subject,
            &settings.intermediate_subject,
            settings.validity,
            settings.key_bits,
        )?;
        self.persist(&chain)?;
        info!(
            "Generated and saved certificates to directory: {}",
            self.paths.directory.display()
        );
        Ok(ChainSource::Generated(chain))
    }

    /// Parse all four artifacts. No consistency checks beyond parsing.
    pub fn load(&self) -> Result<TrustChain> {
        let root_certificate =
            certificate_from_pem(&read(&self.paths.ca_cert)?, &self.paths.ca_cert)?;
        let root_key = private_key_from_pem(&read(&self.paths.ca_key)?, &self.paths.ca_key)?;
        let intermediate_certificate = certificate_from_pem(
            &read(&self.paths.intermediate_cert)?,
            &self.paths.intermediate_cert,
        )?;
        let intermediate_key = private_key_from_pem(
            &read(&self.paths.intermediate_key)?,
            &self.paths.intermediate_key,
        )?;
        TrustChain::new(
            root_certificate,
            KeyPair::from_private_key(root_key),
            intermediate_certificate,
            KeyPair::from_private_key(intermediate_key),
        )
    }

    /// Replace all four artifacts with `chain`.
    ///
    /// Existing files are removed first so that an interrupted write leaves
    /// an incomplete set, which the next start regenerates.
    pub fn persist(&self, chain: &TrustChain) -> Result<()> {
        fs::create_dir_all(&self.paths.directory)
            .map_err(|e| CaError::io(&self.paths.directory, e))?;
        for path in self.paths.all() {
            remove_if_exists(path)?;
        }

        write_artifact(
            &self.paths.ca_key,
            &private_key_to_pem(chain.root_key().private_key())?,
            ArtifactKind::PrivateKey,
        )?;
        write_artifact(
            &self.paths.intermediate_key,
            &private_key_to_pem(chain.intermediate_key().private_key())?,
            ArtifactKind::PrivateKey,
        )?;
        write_artifact(
            &self.paths.intermediate_cert,
            chain.intermediate_certificate_pem(),
            ArtifactKind::Certificate,
        )?;
        write_artifact(
            &self.paths.ca_cert,
            chain.root_certificate_pem(),
            ArtifactKind::Certificate,
        )?;
        Ok(())
    }
}

#[derive(Clone, Copy)]
enum ArtifactKind {
    Certificate,
    PrivateKey,
}

fn read(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).map_err(|e| CaError::io(path, e))
}

fn remove_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => {
            debug!("Discarded {}", path.display());
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(CaError::io(path, e)),
    }
}

/// Write through a temp file in the target directory, then rename into place.
fn write_artifact(path: &Path, contents: &str, kind: ArtifactKind) -> Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&parent).map_err(|e| CaError::io(&parent, e))?;

    let mut file = NamedTempFile::new_in(&parent).map_err(|e| CaError::io(&parent, e))?;
    file.write_all(contents.as_bytes())
        .and_then(|_| file.as_file().sync_all())
        .map_err(|e| CaError::io(path, e))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = match kind {
            ArtifactKind::Certificate => CERTIFICATE_MODE,
            ArtifactKind::PrivateKey => PRIVATE_KEY_MODE,
        };
        fs::set_permissions(file.path(), fs::Permissions::from_mode(mode))
            .map_err(|e| CaError::io(path, e))?;
    }
    #[cfg(not(unix))]
    let _ = kind;

    file.persist(path).map_err(|e| CaError::io(path, e.error))?;
    debug!("Wrote {}", path.display());
    Ok(())
}
