//! Authenticator for self-hosted or unknown git servers. It makes no network
//! calls: tokens and passwords are checked offline and stored as given.

use std::sync::Arc;

use forgeauth_core::authenticator::{Authenticator, check_scopes, check_token_shape};
use forgeauth_core::error::{AuthError, CredentialError, ValidationError};
use forgeauth_core::model::{
  AuthMethod, AuthRequest, AuthResult, Credential, Platform, TwoFactorChallenge, TwoFactorResponse,
};
use forgeauth_core::prompt::Prompter;
use forgeauth_core::ssh_agent::SshAgent;

use crate::ssh;

pub struct GenericAuthenticator {
  prompter: Arc<dyn Prompter>,
  agent: Arc<dyn SshAgent>,
}

impl GenericAuthenticator {
  pub fn new(prompter: Arc<dyn Prompter>, agent: Arc<dyn SshAgent>) -> Self {
    Self { prompter, agent }
  }

  fn login_with_token(&self, request: &AuthRequest) -> Result<AuthResult, CredentialError> {
    let token = self.prompter.secret(&format!("Access token for {}", request.key))?;
    let text = token
      .expose_str()
      .map(str::trim)
      .ok_or_else(|| ValidationError::new("token", "TOKEN_NOT_UTF8", "token is not valid UTF-8"))?;
    self.validate_token(text, &request.scopes)?;

    let mut credential = Credential::new(Platform::Generic, request.key.clone(), AuthMethod::Token, text);
    if !request.scopes.is_empty() {
      credential = credential.with_scopes(&request.scopes);
    }
    Ok(AuthResult::success(credential, "Stored access token"))
  }

  fn login_with_password(&self, request: &AuthRequest) -> Result<AuthResult, CredentialError> {
    let username = self.prompter.text(&format!("Username for {}", request.key))?;
    let password = self.prompter.secret(&format!("Password for {username}"))?;
    if password.is_empty() {
      return Err(ValidationError::new("password", "SECRET_EMPTY", "password must not be empty").into());
    }
    let credential =
      Credential::new(Platform::Generic, request.key.clone(), AuthMethod::Basic, password).with_username(username);
    Ok(AuthResult::success(credential, "Stored username and password"))
  }
}

impl Authenticator for GenericAuthenticator {
  fn platform(&self) -> Platform {
    Platform::Generic
  }

  fn supported_methods(&self) -> Vec<AuthMethod> {
    vec![AuthMethod::Token, AuthMethod::Basic, AuthMethod::Ssh]
  }

  fn authenticate(&self, request: &AuthRequest) -> Result<AuthResult, CredentialError> {
    match request.method.unwrap_or(AuthMethod::Token) {
      AuthMethod::Token => self.login_with_token(request),
      AuthMethod::Basic => self.login_with_password(request),
      AuthMethod::Ssh => ssh::login(Platform::Generic, self.agent.as_ref(), request),
      AuthMethod::OAuth => Err(AuthError::unsupported("OAuth is not available for generic git servers").into()),
    }
  }

  fn validate_token(&self, token: &str, required_scopes: &[String]) -> Result<(), CredentialError> {
    check_token_shape(token)?;
    check_scopes(required_scopes)?;
    Ok(())
  }

  fn handle_two_factor(&self, _challenge: &TwoFactorChallenge) -> Result<TwoFactorResponse, AuthError> {
    Err(AuthError::unsupported("Generic git servers do not issue second-factor challenges"))
  }
}
