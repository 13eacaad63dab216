//! # Error Taxonomy
//!
//! Typed errors shared by every credential source. `AuthError` describes why
//! a source could not produce a credential, `ValidationError` describes
//! malformed caller input. Neither type ever carries secret bytes: messages
//! are built from platform names, repository keys, store names, and static
//! text only.

use std::fmt;

use thiserror::Error;

use crate::model::Platform;

/// Kinds of authentication failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthErrorKind {
  /// No credential exists in the consulted source
  NotFound,
  /// A credential exists but is stale, or cannot be refreshed
  ExpiredToken,
  /// Stored data failed authentication or could not be parsed
  StorageCorrupted,
  /// No usable or writable store is registered
  StorageUnavailable,
  /// An external credential helper is missing, hung, or failed
  HelperUnavailable,
  /// The SSH agent could not be reached
  AgentUnavailable,
  /// A platform API could not be reached
  NetworkError,
  /// The platform rejected the supplied secret
  InvalidCredentials,
  /// The platform asked for a second factor
  TwoFactorRequired,
  /// The second factor was rejected or could not be collected
  TwoFactorFailed,
  /// An interactive flow was abandoned or timed out
  Canceled,
  /// The authenticator does not support the requested method or platform
  Unsupported,
}

impl AuthErrorKind {
  pub const fn as_str(&self) -> &'static str {
    match self {
      Self::NotFound => "not_found",
      Self::ExpiredToken => "expired_token",
      Self::StorageCorrupted => "storage_corrupted",
      Self::StorageUnavailable => "storage_unavailable",
      Self::HelperUnavailable => "helper_unavailable",
      Self::AgentUnavailable => "agent_unavailable",
      Self::NetworkError => "network_error",
      Self::InvalidCredentials => "invalid_credentials",
      Self::TwoFactorRequired => "two_factor_required",
      Self::TwoFactorFailed => "two_factor_failed",
      Self::Canceled => "canceled",
      Self::Unsupported => "unsupported",
    }
  }
}

impl fmt::Display for AuthErrorKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// An authentication failure with a machine-readable code and a remediation
/// hint for humans
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct AuthError {
  pub kind: AuthErrorKind,
  pub message: String,
  pub code: String,
  pub hint: Option<String>,
}

impl AuthError {
  pub fn new(kind: AuthErrorKind, code: impl Into<String>, message: impl Into<String>) -> Self {
    Self {
      kind,
      message: message.into(),
      code: code.into(),
      hint: None,
    }
  }

  /// Attach a remediation hint
  pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
    self.hint = Some(hint.into());
    self
  }

  pub fn is(&self, kind: AuthErrorKind) -> bool {
    self.kind == kind
  }

  pub fn not_found(platform: Platform, key: &str) -> Self {
    Self::new(
      AuthErrorKind::NotFound,
      "AUTH_CREDENTIALS_NOT_FOUND",
      format!("No credential found for {platform}/{key}"),
    )
    .with_hint(format!(
      "Run `forgeauth auth login {key}` or store a token with `forgeauth auth token {key} <TOKEN>`"
    ))
  }

  pub fn expired(platform: Platform, key: &str) -> Self {
    Self::new(
      AuthErrorKind::ExpiredToken,
      "AUTH_CREDENTIALS_EXPIRED",
      format!("Stored credential for {platform}/{key} has expired"),
    )
    .with_hint(format!("Run `forgeauth auth login {key}` to obtain a fresh credential"))
  }

  pub fn refresh_unsupported(platform: Platform) -> Self {
    Self::new(
      AuthErrorKind::ExpiredToken,
      "AUTH_REFRESH_UNSUPPORTED",
      format!("{platform} credentials of this kind cannot be refreshed"),
    )
    .with_hint("Generate a new token and store it again")
  }

  pub fn storage_corrupted(store: &str, detail: impl fmt::Display) -> Self {
    Self::new(
      AuthErrorKind::StorageCorrupted,
      "AUTH_STORAGE_CORRUPTED",
      format!("Credential store '{store}' could not be read: {detail}"),
    )
    .with_hint("Check the passphrase; if the file is damaged, remove it and log in again")
  }

  pub fn storage_unavailable(detail: impl Into<String>) -> Self {
    Self::new(AuthErrorKind::StorageUnavailable, "AUTH_NO_STORAGE", detail)
      .with_hint("Set FORGEAUTH_PASSPHRASE to enable the encrypted credential file")
  }

  pub fn helper_unavailable(helper: &str, detail: impl fmt::Display) -> Self {
    Self::new(
      AuthErrorKind::HelperUnavailable,
      "AUTH_HELPER_UNAVAILABLE",
      format!("Credential helper '{helper}' is unavailable: {detail}"),
    )
    .with_hint(format!("Check that '{helper}' is installed and configured"))
  }

  pub fn agent_unavailable(detail: impl fmt::Display) -> Self {
    Self::new(
      AuthErrorKind::AgentUnavailable,
      "AUTH_SSH_AGENT_UNAVAILABLE",
      format!("SSH agent is unavailable: {detail}"),
    )
    .with_hint("Start an agent with `eval $(ssh-agent)` and add a key with `ssh-add`")
  }

  pub fn network(detail: impl fmt::Display) -> Self {
    Self::new(AuthErrorKind::NetworkError, "AUTH_NETWORK_ERROR", format!("Network error: {detail}"))
      .with_hint("Check your network connection and the platform API URL")
  }

  pub fn invalid_credentials(platform: Platform, detail: impl fmt::Display) -> Self {
    Self::new(
      AuthErrorKind::InvalidCredentials,
      "AUTH_INVALID_CREDENTIALS",
      format!("{platform} rejected the credential: {detail}"),
    )
    .with_hint("Generate a new token or check the username")
  }

  pub fn two_factor_required(platform: Platform) -> Self {
    Self::new(
      AuthErrorKind::TwoFactorRequired,
      "AUTH_2FA_REQUIRED",
      format!("{platform} requires a second authentication factor"),
    )
    .with_hint("Run the login interactively or use a personal access token")
  }

  pub fn two_factor_failed(platform: Platform, detail: impl fmt::Display) -> Self {
    Self::new(
      AuthErrorKind::TwoFactorFailed,
      "AUTH_2FA_FAILED",
      format!("{platform} two-factor verification failed: {detail}"),
    )
    .with_hint("Retry with a fresh one-time code")
  }

  pub fn canceled(detail: impl Into<String>) -> Self {
    Self::new(AuthErrorKind::Canceled, "AUTH_CANCELED", detail).with_hint("Run the login again when ready")
  }

  pub fn unsupported(detail: impl Into<String>) -> Self {
    Self::new(AuthErrorKind::Unsupported, "AUTH_UNSUPPORTED", detail)
      .with_hint("Choose a different authentication method for this platform")
  }
}

/// Malformed caller input
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid {field}: {message}")]
pub struct ValidationError {
  pub field: String,
  pub message: String,
  pub code: String,
}

impl ValidationError {
  pub fn new(field: impl Into<String>, code: impl Into<String>, message: impl Into<String>) -> Self {
    Self {
      field: field.into(),
      message: message.into(),
      code: code.into(),
    }
  }
}

/// Any failure surfaced by the credential subsystem
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CredentialError {
  #[error(transparent)]
  Auth(#[from] AuthError),
  #[error(transparent)]
  Validation(#[from] ValidationError),
}

impl CredentialError {
  /// The authentication failure kind, or `None` for validation errors
  pub fn kind(&self) -> Option<AuthErrorKind> {
    match self {
      Self::Auth(err) => Some(err.kind),
      Self::Validation(_) => None,
    }
  }

  pub fn is(&self, kind: AuthErrorKind) -> bool {
    self.kind() == Some(kind)
  }

  pub fn code(&self) -> &str {
    match self {
      Self::Auth(err) => &err.code,
      Self::Validation(err) => &err.code,
    }
  }

  /// A remediation hint suitable for showing to a user
  pub fn hint(&self) -> String {
    match self {
      Self::Auth(err) => err
        .hint
        .clone()
        .unwrap_or_else(|| "Re-run with -vv for more detail".to_string()),
      Self::Validation(err) => format!("Check the value supplied for '{}'", err.field),
    }
  }
}

pub type Result<T, E = CredentialError> = std::result::Result<T, E>;
