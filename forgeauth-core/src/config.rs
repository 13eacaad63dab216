//! # Configuration Management
//!
//! Directory discovery and the read-only `auth.toml` settings consumed by the
//! credential manager.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::model::{AuthMethod, Platform, RemoteTarget};
use crate::secret::Secret;
use crate::store::MAX_KDF_ROUNDS;

/// Represents the configuration directories for forgeauth
#[derive(Debug, Clone)]
pub struct ConfigDirs {
  pub config_dir: PathBuf,
  pub data_dir: PathBuf,
}

impl ConfigDirs {
  pub fn new() -> Result<Self> {
    let proj_dirs =
      ProjectDirs::from("dev", "forgeauth", "forgeauth").context("Failed to determine project directories")?;

    Ok(Self {
      config_dir: proj_dirs.config_dir().to_path_buf(),
      data_dir: proj_dirs.data_dir().to_path_buf(),
    })
  }

  pub fn config_dir(&self) -> &PathBuf {
    &self.config_dir
  }

  pub fn data_dir(&self) -> &PathBuf {
    &self.data_dir
  }

  /// Path to `auth.toml`
  pub fn config_path(&self) -> PathBuf {
    self.config_dir.join("auth.toml")
  }

  /// Default location of the encrypted credential file
  pub fn credential_file(&self) -> PathBuf {
    self.data_dir.join("credentials.enc")
  }
}

/// Get the configuration directories
pub fn get_config_dirs() -> Result<ConfigDirs> {
  ConfigDirs::new()
}

/// OAuth client registration for a platform
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuthSettings {
  pub client_id: String,
  /// Name of the environment variable holding the client secret, if the
  /// platform requires one
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub client_secret_env: Option<String>,
}

/// Per-platform endpoint settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlatformSettings {
  /// REST API root. `None` uses the public default; an empty string disables
  /// online verification.
  pub api_url: Option<String>,
  /// Web root used for OAuth endpoints
  pub web_url: Option<String>,
  pub oauth: Option<OAuthSettings>,
}

/// Settings loaded from `auth.toml`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
  /// Encrypted credential file; defaults to the data directory
  pub credential_file: Option<PathBuf>,
  pub kdf_rounds: u32,
  pub interactive_timeout_secs: u64,
  pub external_timeout_secs: u64,
  pub network_retries: u32,
  pub retry_backoff_ms: u64,
  pub default_repository: Option<String>,
  pub preferred_method: Option<AuthMethod>,
  /// Host to platform overrides for self-hosted instances
  pub hosts: BTreeMap<String, Platform>,
  /// SSH agent socket; defaults to `SSH_AUTH_SOCK`
  pub ssh_auth_sock: Option<PathBuf>,
  /// Program used by the git credential helper bridge
  pub git_program: Option<String>,
  pub github: PlatformSettings,
  pub gitlab: PlatformSettings,
  pub bitbucket: PlatformSettings,
}

impl Default for AuthConfig {
  fn default() -> Self {
    Self {
      credential_file: None,
      kdf_rounds: 100_000,
      interactive_timeout_secs: 120,
      external_timeout_secs: 3,
      network_retries: 3,
      retry_backoff_ms: 250,
      default_repository: None,
      preferred_method: None,
      hosts: BTreeMap::new(),
      ssh_auth_sock: None,
      git_program: None,
      github: PlatformSettings::default(),
      gitlab: PlatformSettings::default(),
      bitbucket: PlatformSettings::default(),
    }
  }
}

impl AuthConfig {
  /// Load settings from `path`, or return the defaults when it does not exist
  pub fn load(path: &Path) -> Result<Self> {
    if !path.exists() {
      return Ok(Self::default());
    }

    let content =
      fs::read_to_string(path).with_context(|| format!("Failed to read auth config from {}", path.display()))?;
    let config: AuthConfig =
      toml::from_str(&content).with_context(|| format!("Failed to parse auth config from {}", path.display()))?;

    if config.kdf_rounds == 0 || config.kdf_rounds > MAX_KDF_ROUNDS {
      anyhow::bail!(
        "kdf_rounds in {} must be between 1 and {MAX_KDF_ROUNDS}",
        path.display()
      );
    }

    Ok(config)
  }

  /// Load from the default location
  pub fn load_default() -> Result<Self> {
    let dirs = get_config_dirs()?;
    Self::load(&dirs.config_path())
  }

  pub fn interactive_timeout(&self) -> Duration {
    Duration::from_secs(self.interactive_timeout_secs)
  }

  pub fn external_timeout(&self) -> Duration {
    Duration::from_secs(self.external_timeout_secs)
  }

  pub fn retry_backoff(&self) -> Duration {
    Duration::from_millis(self.retry_backoff_ms)
  }

  pub fn platform_settings(&self, platform: Platform) -> Option<&PlatformSettings> {
    match platform {
      Platform::GitHub => Some(&self.github),
      Platform::GitLab => Some(&self.gitlab),
      Platform::Bitbucket => Some(&self.bitbucket),
      Platform::Generic => None,
    }
  }

  /// Resolve the platform for a repository key, honoring the host map
  pub fn platform_for(&self, repository: &str) -> Platform {
    if let Ok(target) = RemoteTarget::parse(repository) {
      let bare_host = target.host.split(':').next().unwrap_or(&target.host);
      if let Some(platform) = self.hosts.get(&target.host).or_else(|| self.hosts.get(bare_host)) {
        return *platform;
      }
    }
    Platform::detect(repository)
  }
}

/// Everything the credential manager needs at construction time
#[derive(Debug, Clone)]
pub struct ManagerConfig {
  pub settings: AuthConfig,
  pub credential_file: PathBuf,
  /// Passphrase for the encrypted file store. Without one the file store is
  /// unavailable.
  pub passphrase: Option<Secret>,
}

impl ManagerConfig {
  pub fn new(settings: AuthConfig, dirs: &ConfigDirs) -> Self {
    let credential_file = settings
      .credential_file
      .clone()
      .unwrap_or_else(|| dirs.credential_file());
    Self {
      settings,
      credential_file,
      passphrase: None,
    }
  }

  pub fn with_passphrase(mut self, passphrase: Option<Secret>) -> Self {
    self.passphrase = passphrase.filter(|p| !p.is_empty());
    self
  }
}
