//! An authenticator that counts calls and returns a fixed outcome

use std::sync::atomic::{AtomicUsize, Ordering};

use forgeauth_core::authenticator::{Authenticator, check_token_shape};
use forgeauth_core::error::{AuthError, AuthErrorKind, CredentialError};
use forgeauth_core::model::{
  AuthMethod, AuthRequest, AuthResult, Credential, Platform, TwoFactorChallenge, TwoFactorResponse,
};

pub struct CountingAuthenticator {
  platform: Platform,
  secret: String,
  failure: Option<AuthErrorKind>,
  refresh_secret: Option<String>,
  calls: AtomicUsize,
  refreshes: AtomicUsize,
}

impl CountingAuthenticator {
  /// Succeeds with a token credential carrying `secret`
  pub fn succeeding(platform: Platform, secret: &str) -> Self {
    Self {
      platform,
      secret: secret.to_string(),
      failure: None,
      refresh_secret: None,
      calls: AtomicUsize::new(0),
      refreshes: AtomicUsize::new(0),
    }
  }

  /// Always fails with an error of `kind`
  pub fn failing(platform: Platform, kind: AuthErrorKind) -> Self {
    Self {
      failure: Some(kind),
      ..Self::succeeding(platform, "")
    }
  }

  /// Also support refresh, replacing stale credentials with `secret`
  pub fn with_refresh(mut self, secret: &str) -> Self {
    self.refresh_secret = Some(secret.to_string());
    self
  }

  pub fn calls(&self) -> usize {
    self.calls.load(Ordering::SeqCst)
  }

  pub fn refreshes(&self) -> usize {
    self.refreshes.load(Ordering::SeqCst)
  }
}

impl Authenticator for CountingAuthenticator {
  fn platform(&self) -> Platform {
    self.platform
  }

  fn supported_methods(&self) -> Vec<AuthMethod> {
    vec![AuthMethod::Token]
  }

  fn authenticate(&self, request: &AuthRequest) -> Result<AuthResult, CredentialError> {
    self.calls.fetch_add(1, Ordering::SeqCst);
    if let Some(kind) = self.failure {
      return Err(AuthError::new(kind, "TEST_FAILURE", "scripted failure").into());
    }
    let credential = Credential::new(self.platform, request.key.clone(), AuthMethod::Token, self.secret.as_str());
    Ok(AuthResult::success(credential, "authenticated"))
  }

  fn validate_token(&self, token: &str, _required_scopes: &[String]) -> Result<(), CredentialError> {
    Ok(check_token_shape(token)?)
  }

  fn supports_refresh(&self) -> bool {
    self.refresh_secret.is_some()
  }

  fn refresh_token(&self, credential: &Credential) -> Result<Credential, AuthError> {
    self.refreshes.fetch_add(1, Ordering::SeqCst);
    match &self.refresh_secret {
      Some(secret) => Ok(Credential::new(
        credential.platform,
        credential.key.clone(),
        credential.method,
        secret.as_str(),
      )),
      None => Err(AuthError::refresh_unsupported(self.platform)),
    }
  }

  fn handle_two_factor(&self, _challenge: &TwoFactorChallenge) -> Result<TwoFactorResponse, AuthError> {
    Err(AuthError::two_factor_failed(self.platform, "not supported by the test authenticator"))
  }
}
