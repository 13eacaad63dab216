//! SSH logins shared by every platform. The agent's first identity backs the
//! credential; only its public fingerprint is recorded.

use forgeauth_core::error::{AuthError, CredentialError};
use forgeauth_core::model::{AuthMethod, AuthRequest, AuthResult, Credential, Platform, meta};
use forgeauth_core::ssh_agent::SshAgent;
use tracing::debug;

/// Metadata key for the algorithm of the agent key
pub const SSH_KEY_TYPE: &str = "ssh_key_type";

pub fn login(platform: Platform, agent: &dyn SshAgent, request: &AuthRequest) -> Result<AuthResult, CredentialError> {
  if !agent.is_available() {
    return Err(AuthError::agent_unavailable("no agent is listening on the configured socket").into());
  }

  let keys = agent.list_keys()?;
  let Some(key) = keys.first() else {
    return Ok(AuthResult::failure(
      AuthMethod::Ssh,
      "The SSH agent holds no keys; add one with `ssh-add`",
    ));
  };
  debug!(count = keys.len(), fingerprint = %key.fingerprint, "Using first agent identity");

  let credential = Credential::new(platform, request.key.clone(), AuthMethod::Ssh, key.fingerprint.as_str())
    .with_metadata(meta::SSH_FINGERPRINT, key.fingerprint.clone())
    .with_metadata(SSH_KEY_TYPE, key.key_type.clone());
  Ok(AuthResult::success(
    credential,
    format!("Using SSH key {} ({})", key.fingerprint, key.comment),
  ))
}
