//! # Default Manager
//!
//! Assembles a [`CredentialManager`] from configuration: the encrypted file
//! store first, then the keychain placeholder, then git's credential helpers
//! and the `gh` CLI, then one authenticator per platform family.

use std::sync::Arc;

use forgeauth_core::config::ManagerConfig;
use forgeauth_core::error::AuthError;
use forgeauth_core::helper::{GhCliHelper, GitCredentialHelper};
use forgeauth_core::manager::CredentialManager;
use forgeauth_core::prompt::Prompter;
use forgeauth_core::retry::RetryPolicy;
use forgeauth_core::ssh_agent::{SshAgent, SshAgentClient};
use forgeauth_core::store::{EncryptedFileStore, KeychainStore};
use tracing::debug;

use crate::bitbucket::BitbucketAuthenticator;
use crate::generic::GenericAuthenticator;
use crate::github::GitHubAuthenticator;
use crate::gitlab::GitLabAuthenticator;

const DEFAULT_GIT_PROGRAM: &str = "git";

/// Builder for the default manager
pub struct Bootstrap<'a> {
  config: &'a ManagerConfig,
  prompter: Arc<dyn Prompter>,
  agent: Option<Arc<dyn SshAgent>>,
  helpers: bool,
}

impl<'a> Bootstrap<'a> {
  pub fn new(config: &'a ManagerConfig, prompter: Arc<dyn Prompter>) -> Self {
    Self {
      config,
      prompter,
      agent: None,
      helpers: true,
    }
  }

  /// Skip git credential helpers and the `gh` CLI. Required when forgeauth
  /// itself is running as git's credential helper.
  pub fn without_helpers(mut self) -> Self {
    self.helpers = false;
    self
  }

  pub fn with_agent(mut self, agent: Arc<dyn SshAgent>) -> Self {
    self.agent = Some(agent);
    self
  }

  pub fn build(self) -> Result<CredentialManager, AuthError> {
    let settings = &self.config.settings;
    let timeout = settings.external_timeout();
    let retry = RetryPolicy::new(settings.network_retries, settings.retry_backoff());
    let agent = self
      .agent
      .unwrap_or_else(|| Arc::new(SshAgentClient::new(settings.ssh_auth_sock.clone(), timeout)));

    let mut manager = CredentialManager::new(settings);
    manager
      .register_store(Arc::new(EncryptedFileStore::new(
        &self.config.credential_file,
        self.config.passphrase.clone(),
        settings.kdf_rounds,
      )))
      .register_store(Arc::new(KeychainStore::new()));

    if self.helpers {
      let git = settings.git_program.as_deref().unwrap_or(DEFAULT_GIT_PROGRAM);
      manager
        .register_credential_helper(Arc::new(GitCredentialHelper::new(git, timeout)))
        .register_credential_helper(Arc::new(GhCliHelper::new(timeout)));
    }

    manager
      .register_authenticator(Arc::new(
        GitHubAuthenticator::new(&settings.github, Arc::clone(&self.prompter), Arc::clone(&agent))?
          .with_retry_policy(retry),
      ))
      .register_authenticator(Arc::new(
        GitLabAuthenticator::new(&settings.gitlab, Arc::clone(&self.prompter), Arc::clone(&agent))?
          .with_retry_policy(retry),
      ))
      .register_authenticator(Arc::new(
        BitbucketAuthenticator::new(&settings.bitbucket, Arc::clone(&self.prompter), Arc::clone(&agent))?
          .with_retry_policy(retry),
      ))
      .register_authenticator(Arc::new(GenericAuthenticator::new(self.prompter, agent)));

    debug!(manager = ?manager, "Assembled credential manager");
    Ok(manager)
  }
}

/// The manager the CLI uses: every store, helper, and authenticator
pub fn default_manager(config: &ManagerConfig, prompter: Arc<dyn Prompter>) -> Result<CredentialManager, AuthError> {
  Bootstrap::new(config, prompter).build()
}
