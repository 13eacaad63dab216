//! # CLI Session
//!
//! Loads `auth.toml`, obtains the store passphrase, and builds the credential
//! manager used by every command.

use std::io::IsTerminal;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use dialoguer::Password;
use forgeauth_core::config::{AuthConfig, ManagerConfig, get_config_dirs};
use forgeauth_core::git;
use forgeauth_core::manager::CredentialManager;
use forgeauth_core::model::{Platform, RemoteTarget};
use forgeauth_core::prompt::{NonInteractivePrompter, Prompter};
use forgeauth_core::secret::Secret;
use forgeauth_forges::Bootstrap;
use tracing::debug;

use crate::prompt::{ConsolePrompter, forgeauth_theme};

/// Environment variable holding the passphrase for the encrypted store
pub const PASSPHRASE_ENV: &str = "FORGEAUTH_PASSPHRASE";

/// How the command may interact with the user
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interaction {
  /// Prompts are allowed when stdin is a terminal
  Terminal,
  /// Never prompt; stdin belongs to another protocol
  Never,
}

/// Loaded configuration plus the passphrase for this invocation
pub struct Session {
  config: ManagerConfig,
  interaction: Interaction,
}

impl Session {
  pub fn load(config_path: Option<&Path>, interaction: Interaction) -> Result<Self> {
    let dirs = get_config_dirs()?;
    let path = config_path.map(Path::to_path_buf).unwrap_or_else(|| dirs.config_path());
    let settings = AuthConfig::load(&path)?;
    debug!(path = %path.display(), "Loaded auth settings");

    let config = ManagerConfig::new(settings, &dirs);
    let passphrase = read_passphrase(interaction)?;
    Ok(Self {
      config: config.with_passphrase(passphrase),
      interaction,
    })
  }

  pub fn settings(&self) -> &AuthConfig {
    &self.config.settings
  }

  pub fn credential_file(&self) -> &Path {
    &self.config.credential_file
  }

  pub fn has_passphrase(&self) -> bool {
    self.config.passphrase.is_some()
  }

  fn prompter(&self) -> Arc<dyn Prompter> {
    match self.interaction {
      Interaction::Terminal if std::io::stdin().is_terminal() => Arc::new(ConsolePrompter),
      _ => Arc::new(NonInteractivePrompter),
    }
  }

  /// Build a manager with every store, helper, and authenticator
  pub fn manager(&self) -> Result<CredentialManager> {
    Bootstrap::new(&self.config, self.prompter())
      .build()
      .context("Failed to set up the credential manager")
  }

  /// Build a manager that does not consult external credential helpers.
  /// Used when forgeauth itself is the helper git is calling.
  pub fn manager_without_helpers(&self) -> Result<CredentialManager> {
    Bootstrap::new(&self.config, self.prompter())
      .without_helpers()
      .build()
      .context("Failed to set up the credential manager")
  }

  /// The repository to act on: the argument, the configured default, or the
  /// `origin` remote of the current git repository
  pub fn repository(&self, explicit: Option<&str>) -> Result<String> {
    if let Some(repo) = explicit.filter(|r| !r.trim().is_empty()) {
      return Ok(repo.trim().to_string());
    }
    if let Some(repo) = self.settings().default_repository.clone() {
      debug!("Using default repository from settings");
      return Ok(repo);
    }
    if let Some(repo) = git::current_origin_url() {
      debug!("Using origin remote of the current repository");
      return Ok(repo);
    }
    anyhow::bail!("No repository given, no default_repository configured, and no origin remote found")
  }

  /// Platform and credential key for a repository string
  pub fn target(&self, repository: &str) -> Result<(Platform, String)> {
    let key = credential_key(repository)?;
    Ok((self.settings().platform_for(repository), key))
  }
}

/// Credentials are keyed by host so one login serves every repository on it
pub fn credential_key(repository: &str) -> Result<String> {
  let target =
    RemoteTarget::parse(repository).with_context(|| format!("'{repository}' is not a repository URL or host"))?;
  Ok(target.host)
}

fn read_passphrase(interaction: Interaction) -> Result<Option<Secret>> {
  if let Ok(value) = std::env::var(PASSPHRASE_ENV) {
    return Ok(Some(Secret::from(value)));
  }
  if interaction == Interaction::Never || !std::io::stdin().is_terminal() {
    debug!("No passphrase available; the encrypted file store is disabled");
    return Ok(None);
  }

  let value = Password::with_theme(&forgeauth_theme())
    .with_prompt("Passphrase for the forgeauth credential file")
    .allow_empty_password(true)
    .interact()
    .context("Failed to read passphrase")?;
  Ok(Some(Secret::from(value)))
}
