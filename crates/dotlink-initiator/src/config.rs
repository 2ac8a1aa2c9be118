//! Deployment configuration for dotlink-initiator
//!
//! One TOML file describes the serial port, the enrollment server the robots
//! trust, the handshake tuning and the robot identities to run. Key and
//! credential files are raw bytes; relative paths are resolved against the
//! directory holding the config file.
//!
//! # Example TOML
//!
//! ```toml
//! responder_credentials = ["gateway-cred-rpk.bin"]
//!
//! [port]
//! path = "/dev/pts/75"
//!
//! [peer]
//! enrollment_key = "ffa4f102134029b3b156890b88c9d9619501196574174dcb68a07db0588e4d41"
//! location = "http://localhost:18000"
//!
//! [handshake]
//! settle_delay_ms = 1000
//! receive_deadline_ms = 30000
//! foreign_frames = "discard"  # "discard" | "fail"
//!
//! [[identities]]
//! id = "a1044101"
//! private_key_file = "dotbot1-priv-bytes"
//! credential_file = "dotbot1-cred-rpk.bin"
//!
//! [logging]
//! level = "info"
//! ```

use std::path::{Path, PathBuf};

use dotlink_core::soft::{RpkCredential, StaticResolver};
use dotlink_core::{
    Credential, DeviceId, HandshakeConfig, Identity, IdentityError, PeerReference, PrivateKey,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read a config, key or credential file
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse config file
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// Invalid configuration value
    #[error("invalid configuration: {0}")]
    Validation(String),

    #[error("invalid handshake settings: {0}")]
    Handshake(#[from] dotlink_core::ConfigError),

    #[error("invalid identity: {0}")]
    Identity(#[from] IdentityError),
}

/// Whole deployment file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentConfig {
    /// Raw responder credentials the resolver knows up front
    #[serde(default)]
    pub responder_credentials: Vec<PathBuf>,

    pub port: PortConfig,

    pub peer: PeerConfig,

    #[serde(default)]
    pub handshake: HandshakeConfig,

    #[serde(default)]
    pub identities: Vec<IdentityConfig>,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Serial port configuration
///
/// Line settings (baud rate, raw mode) are left to the OS, e.g. `stty`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortConfig {
    pub path: PathBuf,
}

/// Enrollment server the robots trust.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerConfig {
    /// Hex encoded X25519 public key (G_W)
    pub enrollment_key: String,

    /// Enrollment server location (LOC_W)
    #[serde(default = "default_location")]
    pub location: String,
}

fn default_location() -> String {
    "http://localhost:18000".to_string()
}

/// One robot identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityConfig {
    /// Hex device id, also the robot's wire address
    pub id: String,
    pub private_key_file: PathBuf,
    pub credential_file: PathBuf,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Filter directive used when neither --verbose nor --debug is given
    #[serde(default = "default_level")]
    pub level: String,
}

fn default_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
        }
    }
}

impl DeploymentConfig {
    /// Read, parse and validate `path`.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_toml_str(&content)?;
        if let Some(base) = path.parent() {
            config.resolve_paths(base);
        }
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: DeploymentConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.handshake.validate()?;
        self.peer_reference()?;

        if self.identities.is_empty() {
            return Err(ConfigError::Validation("no identities configured".to_string()));
        }
        for identity in &self.identities {
            DeviceId::from_hex(&identity.id)?;
        }
        Ok(())
    }

    /// Make relative key and credential paths relative to `base`.
    pub fn resolve_paths(&mut self, base: &Path) {
        let rebase = |path: &mut PathBuf| {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        };
        for path in &mut self.responder_credentials {
            rebase(path);
        }
        for identity in &mut self.identities {
            rebase(&mut identity.private_key_file);
            rebase(&mut identity.credential_file);
        }
    }

    pub fn peer_reference(&self) -> Result<PeerReference, ConfigError> {
        let key = hex::decode(&self.peer.enrollment_key)
            .map_err(|e| ConfigError::Validation(format!("peer.enrollment_key: {e}")))?;
        let gateway_public_key: [u8; 32] = key.as_slice().try_into().map_err(|_| {
            ConfigError::Validation(format!(
                "peer.enrollment_key must be 32 bytes, got {}",
                key.len()
            ))
        })?;
        Ok(PeerReference {
            gateway_public_key,
            location: self.peer.location.clone(),
        })
    }

    /// Read every identity's key and credential from disk.
    pub fn load_identities(&self) -> Result<Vec<Identity>, ConfigError> {
        self.identities
            .iter()
            .map(|entry| {
                Ok(Identity::new(
                    DeviceId::from_hex(&entry.id)?,
                    PrivateKey::new(read_file(&entry.private_key_file)?),
                    Credential::new(read_file(&entry.credential_file)?),
                ))
            })
            .collect()
    }

    /// Resolver preloaded with the configured responder credentials.
    pub fn load_resolver(&self) -> Result<StaticResolver, ConfigError> {
        let mut resolver = StaticResolver::new();
        for path in &self.responder_credentials {
            let credential = Credential::new(read_file(path)?);
            let rpk = RpkCredential::parse(&credential).map_err(|e| {
                ConfigError::Validation(format!("{}: {e}", path.display()))
            })?;
            resolver.insert(rpk.reference(), credential);
        }
        Ok(resolver)
    }
}

fn read_file(path: &Path) -> Result<Vec<u8>, ConfigError> {
    std::fs::read(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use dotlink_core::harness::demo_identity;
    use dotlink_core::ForeignFramePolicy;
    use std::time::Duration;

    const MINIMAL: &str = r#"
[port]
path = "/dev/pts/75"

[peer]
enrollment_key = "ffa4f102134029b3b156890b88c9d9619501196574174dcb68a07db0588e4d41"

[[identities]]
id = "a1044101"
private_key_file = "dotbot1-priv-bytes"
credential_file = "dotbot1-cred-rpk.bin"
"#;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = DeploymentConfig::from_toml_str(MINIMAL).unwrap();

        assert_eq!(config.peer.location, "http://localhost:18000");
        assert_eq!(config.handshake, HandshakeConfig::default());
        assert_eq!(config.logging.level, "info");
        assert!(config.responder_credentials.is_empty());

        let peer = config.peer_reference().unwrap();
        assert_eq!(peer.gateway_public_key[0], 0xff);
        assert_eq!(peer.gateway_public_key[31], 0x41);
    }

    #[test]
    fn test_handshake_table_overrides() {
        let content = format!(
            "{MINIMAL}\n[handshake]\nsettle_delay_ms = 250\n\
             foreign_frames = \"fail\"\nmax_read_attempts = 5\n"
        );
        let config = DeploymentConfig::from_toml_str(&content).unwrap();

        assert_eq!(config.handshake.settle_delay.as_duration(), Duration::from_millis(250));
        assert_eq!(config.handshake.foreign_frames, ForeignFramePolicy::Fail);
        assert_eq!(config.handshake.max_read_attempts, Some(5));
        assert_eq!(config.handshake.read_chunk_len, 256);
    }

    #[test]
    fn test_validation_errors() {
        let short_key = MINIMAL.replace("4d41\"", "\"");
        assert!(matches!(
            DeploymentConfig::from_toml_str(&short_key),
            Err(ConfigError::Validation(_))
        ));

        let bad_id = MINIMAL.replace("a1044101", "a1044101a1044101ff");
        assert!(matches!(
            DeploymentConfig::from_toml_str(&bad_id),
            Err(ConfigError::Identity(IdentityError::IdTooLong(9)))
        ));

        let bad_handshake = format!("{MINIMAL}\n[handshake]\nread_timeout_ms = 0\n");
        assert!(matches!(
            DeploymentConfig::from_toml_str(&bad_handshake),
            Err(ConfigError::Handshake(_))
        ));

        let no_port = MINIMAL.replace("[port]\npath = \"/dev/pts/75\"\n", "");
        assert!(matches!(
            DeploymentConfig::from_toml_str(&no_port),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_load_resolves_files_next_to_config() {
        let dir = tempfile::tempdir().unwrap();
        let identity = demo_identity(1).unwrap();
        let key_path = dir.path().join("dotbot1-priv-bytes");
        std::fs::write(key_path, identity.private_key().as_bytes()).unwrap();
        let cred_path = dir.path().join("dotbot1-cred-rpk.bin");
        std::fs::write(cred_path, identity.credential().as_bytes()).unwrap();
        let config_path = dir.path().join("deployment.toml");
        std::fs::write(&config_path, MINIMAL).unwrap();

        let config = DeploymentConfig::load(&config_path).unwrap();
        let identities = config.load_identities().unwrap();

        assert_eq!(identities.len(), 1);
        assert_eq!(identities[0].id(), identity.id());
        assert_eq!(identities[0].credential(), identity.credential());
        assert_eq!(identities[0].address(), 0xa104_4101);
    }

    #[test]
    fn test_missing_key_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = DeploymentConfig::from_toml_str(MINIMAL).unwrap();
        config.resolve_paths(dir.path());

        let err = config.load_identities().unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
        assert!(err.to_string().contains("dotbot1-priv-bytes"));
    }

    #[test]
    fn test_resolver_loads_responder_credentials() {
        let dir = tempfile::tempdir().unwrap();
        let rpk = RpkCredential::new(vec![0x32], [0x07; 32]).unwrap();
        std::fs::write(dir.path().join("gateway.bin"), rpk.to_credential().as_bytes()).unwrap();

        let content = format!("responder_credentials = [\"gateway.bin\"]\n{MINIMAL}");
        let mut config = DeploymentConfig::from_toml_str(&content).unwrap();
        config.resolve_paths(dir.path());

        let resolver = config.load_resolver().unwrap();
        assert_eq!(resolver.len(), 1);
    }
}
