use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::key_material::RSA_KEY_SIZE_DEFAULT;
use crate::pki_generator::SubjectIdentity;
use crate::trust_chain::{
    ChainValidity, INTERMEDIATE_CA_VALIDITY_DAYS_DEFAULT, ROOT_CA_VALIDITY_DAYS_DEFAULT,
};

pub const CONFIG_PATH_DEFAULT: &str = "config.toml";
pub const CONFIG_PATH_ENV: &str = "CHAT_CA_CONFIG";

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub certificates: CertificateConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

/// Where the chain lives on disk and what it should look like when generated.
#[derive(Debug, Deserialize, Clone)]
pub struct CertificateConfig {
    #[serde(default = "default_cert_dir")]
    pub directory: PathBuf,
    #[serde(default)]
    pub ca_cert_path: Option<PathBuf>,
    #[serde(default)]
    pub ca_key_path: Option<PathBuf>,
    #[serde(default)]
    pub intermediate_cert_path: Option<PathBuf>,
    #[serde(default)]
    pub intermediate_key_path: Option<PathBuf>,
    #[serde(default = "default_key_bits")]
    pub key_bits: u32,
    #[serde(default = "default_ca_validity")]
    pub ca_validity_days: u32,
    #[serde(default = "default_intermediate_validity")]
    pub intermediate_validity_days: u32,
    #[serde(default)]
    pub ca: RootCASubject,
    #[serde(default)]
    pub intermediate: IntermediateCASubject,
}

impl Default for CertificateConfig {
    fn default() -> Self {
        Self {
            directory: default_cert_dir(),
            ca_cert_path: None,
            ca_key_path: None,
            intermediate_cert_path: None,
            intermediate_key_path: None,
            key_bits: default_key_bits(),
            ca_validity_days: default_ca_validity(),
            intermediate_validity_days: default_intermediate_validity(),
            ca: RootCASubject::default(),
            intermediate: IntermediateCASubject::default(),
        }
    }
}

impl CertificateConfig {
    /// Config rooted at `directory` with every other field at its default.
    pub fn with_directory(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            ..Self::default()
        }
    }

    pub fn validity(&self) -> ChainValidity {
        ChainValidity {
            root_days: self.ca_validity_days,
            intermediate_days: self.intermediate_validity_days,
        }
    }
}

fn default_cert_dir() -> PathBuf {
    PathBuf::from("./certs")
}

fn default_key_bits() -> u32 {
    RSA_KEY_SIZE_DEFAULT
}

fn default_ca_validity() -> u32 {
    ROOT_CA_VALIDITY_DAYS_DEFAULT // 10 years
}

fn default_intermediate_validity() -> u32 {
    INTERMEDIATE_CA_VALIDITY_DAYS_DEFAULT // 5 years
}

/// `[certificates.ca]`; each field falls back to its own default.
#[derive(Debug, Deserialize, Clone)]
pub struct RootCASubject {
    #[serde(default = "default_root_ca_cn")]
    pub common_name: String,
    #[serde(default = "default_organization")]
    pub organization: String,
    #[serde(default = "default_country")]
    pub country: String,
}

impl Default for RootCASubject {
    fn default() -> Self {
        Self {
            common_name: default_root_ca_cn(),
            organization: default_organization(),
            country: default_country(),
        }
    }
}

impl RootCASubject {
    pub fn identity(&self) -> SubjectIdentity {
        SubjectIdentity::new(&self.common_name, &self.organization, &self.country)
    }
}

/// `[certificates.intermediate]`; each field falls back to its own default.
#[derive(Debug, Deserialize, Clone)]
pub struct IntermediateCASubject {
    #[serde(default = "default_intermediate_ca_cn")]
    pub common_name: String,
    #[serde(default = "default_organization")]
    pub organization: String,
    #[serde(default = "default_country")]
    pub country: String,
}

impl Default for IntermediateCASubject {
    fn default() -> Self {
        Self {
            common_name: default_intermediate_ca_cn(),
            organization: default_organization(),
            country: default_country(),
        }
    }
}

impl IntermediateCASubject {
    pub fn identity(&self) -> SubjectIdentity {
        SubjectIdentity::new(&self.common_name, &self.organization, &self.country)
    }
}

fn default_root_ca_cn() -> String {
    "Chat Root CA".to_string()
}

fn default_intermediate_ca_cn() -> String {
    "Chat Intermediate CA".to_string()
}

fn default_organization() -> String {
    "Chat Corp".to_string()
}

fn default_country() -> String {
    "US".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_server_host")]
    pub host: String,
    #[serde(default = "default_server_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_server_host(),
            port: default_server_port(),
        }
    }
}

fn default_server_host() -> String {
    "127.0.0.1".to_string()
}

fn default_server_port() -> u16 {
    8080
}

impl AppConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let config_str = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::from_toml(&config_str)
    }

    pub fn from_toml(config_str: &str) -> Result<Self> {
        let config: AppConfig =
            toml::from_str(config_str).context("Failed to parse config file")?;
        Ok(config)
    }

    /// Load `$CHAT_CA_CONFIG` or `config.toml`, falling back to defaults when
    /// the default file is absent. An explicitly named file must exist.
    pub fn load() -> Result<Self> {
        match std::env::var_os(CONFIG_PATH_ENV) {
            Some(path) => Self::from_file(PathBuf::from(path)),
            None if Path::new(CONFIG_PATH_DEFAULT).exists() => Self::from_file(CONFIG_PATH_DEFAULT),
            None => {
                log::info!("No {} found, using built-in defaults", CONFIG_PATH_DEFAULT);
                Ok(Self::default())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = AppConfig::from_toml("").unwrap();
        let certs = &config.certificates;
        assert_eq!(certs.directory, PathBuf::from("./certs"));
        assert!(certs.ca_cert_path.is_none());
        assert!(certs.intermediate_key_path.is_none());
        assert_eq!(certs.key_bits, 4096);
        assert_eq!(certs.validity(), ChainValidity::default());
        assert_eq!(
            certs.ca.identity(),
            SubjectIdentity::new("Chat Root CA", "Chat Corp", "US")
        );
        assert_eq!(
            certs.intermediate.identity(),
            SubjectIdentity::new("Chat Intermediate CA", "Chat Corp", "US")
        );
        assert_eq!(config.server.port, 8080);
    }

    #[test]
    fn test_overrides() {
        let config = AppConfig::from_toml(
            r#"
            [certificates]
            directory = "/var/lib/chat/certs"
            ca_key_path = "/secure/ca.key"
            key_bits = 2048
            intermediate_validity_days = 365

            [certificates.ca]
            common_name = "Acme Root"
            organization = "Acme"
            country = "DE"

            [server]
            port = 9443
            "#,
        )
        .unwrap();
        let certs = &config.certificates;
        assert_eq!(certs.directory, PathBuf::from("/var/lib/chat/certs"));
        assert_eq!(certs.ca_key_path, Some(PathBuf::from("/secure/ca.key")));
        assert_eq!(certs.key_bits, 2048);
        assert_eq!(certs.ca_validity_days, 3650);
        assert_eq!(certs.intermediate_validity_days, 365);
        assert_eq!(certs.ca.identity(), SubjectIdentity::new("Acme Root", "Acme", "DE"));
        assert_eq!(certs.intermediate.common_name, "Chat Intermediate CA");
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 9443);
    }

    #[test]
    fn test_partial_subject_table_keeps_field_defaults() {
        let config = AppConfig::from_toml(
            r#"
            [certificates.ca]
            common_name = "Acme Root"
            "#,
        )
        .unwrap();
        assert_eq!(
            config.certificates.ca.identity(),
            SubjectIdentity::new("Acme Root", "Chat Corp", "US")
        );

        let config = AppConfig::from_toml(
            r#"
            [certificates.ca]
            organization = "Acme"

            [certificates.intermediate]
            country = "DE"
            "#,
        )
        .unwrap();
        assert_eq!(
            config.certificates.ca.identity(),
            SubjectIdentity::new("Chat Root CA", "Acme", "US")
        );
        assert_eq!(
            config.certificates.intermediate.identity(),
            SubjectIdentity::new("Chat Intermediate CA", "Chat Corp", "DE")
        );
    }

    #[test]
    fn test_malformed_config_is_error() {
        assert!(AppConfig::from_toml("[certificates]\nkey_bits = \"big\"").is_err());
    }
}
