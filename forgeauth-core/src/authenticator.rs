//! # Platform Authenticators
//!
//! Each platform family provides an [`Authenticator`] that knows how to log
//! in, check a token, and rotate credentials. Implementations live in the
//! `forgeauth-forges` crate; shared offline checks live here.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::{AuthError, CredentialError, ValidationError};
use crate::model::{AuthMethod, AuthRequest, AuthResult, Credential, Platform, TwoFactorChallenge, TwoFactorResponse};

/// Minimum length of any token accepted by the offline format check
pub const MIN_TOKEN_LEN: usize = 8;

static SCOPE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
  Regex::new(r"^[A-Za-z][A-Za-z0-9_\-]*(?::[A-Za-z0-9_\-]+)*$").expect("Failed to compile scope regex")
});

pub trait Authenticator: Send + Sync {
  fn platform(&self) -> Platform;

  fn supported_methods(&self) -> Vec<AuthMethod>;

  /// Run a login flow for the request
  fn authenticate(&self, request: &AuthRequest) -> Result<AuthResult, CredentialError>;

  /// Check a token's format and, when scopes are required, its grants
  fn validate_token(&self, token: &str, required_scopes: &[String]) -> Result<(), CredentialError>;

  fn supports_refresh(&self) -> bool {
    false
  }

  /// Produce a replacement for a stale credential
  fn refresh_token(&self, credential: &Credential) -> Result<Credential, AuthError> {
    let _ = credential;
    Err(AuthError::refresh_unsupported(self.platform()))
  }

  /// Answer a second-factor challenge raised during `authenticate`
  fn handle_two_factor(&self, challenge: &TwoFactorChallenge) -> Result<TwoFactorResponse, AuthError>;
}

/// Offline checks shared by every platform: non-empty, long enough, and no
/// whitespace
pub fn check_token_shape(token: &str) -> Result<(), ValidationError> {
  if token.is_empty() {
    return Err(ValidationError::new("token", "TOKEN_EMPTY", "token must not be empty"));
  }
  if token.chars().any(char::is_whitespace) {
    return Err(ValidationError::new(
      "token",
      "TOKEN_WHITESPACE",
      "token must not contain whitespace",
    ));
  }
  if token.len() < MIN_TOKEN_LEN {
    return Err(ValidationError::new(
      "token",
      "TOKEN_TOO_SHORT",
      format!("token must be at least {MIN_TOKEN_LEN} characters"),
    ));
  }
  Ok(())
}

/// Validate the syntax of requested scope strings such as `repo`,
/// `read:org`, or `read_api`
pub fn check_scopes(scopes: &[String]) -> Result<(), ValidationError> {
  for scope in scopes {
    if !SCOPE_PATTERN.is_match(scope) {
      return Err(ValidationError::new(
        "scopes",
        "SCOPE_INVALID",
        format!("'{scope}' is not a valid scope name"),
      ));
    }
  }
  Ok(())
}

/// Scopes from `required` that `granted` does not cover
pub fn missing_scopes(required: &[String], granted: &[String]) -> Vec<String> {
  required
    .iter()
    .filter(|scope| !granted.iter().any(|g| g == *scope))
    .cloned()
    .collect()
}
