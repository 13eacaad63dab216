//! # Bitbucket Authenticator
//!
//! Bitbucket Cloud logins use a username with an app password over HTTP
//! Basic auth. OAuth consumers have no device flow, so OAuth credentials are
//! only refreshed here, authenticating the consumer with its key and secret.

use std::sync::Arc;

use forgeauth_core::authenticator::{Authenticator, check_scopes, check_token_shape, missing_scopes};
use forgeauth_core::config::PlatformSettings;
use forgeauth_core::error::{AuthError, AuthErrorKind, CredentialError, ValidationError};
use forgeauth_core::model::{
  AuthMethod, AuthRequest, AuthResult, Credential, Platform, TwoFactorChallenge, TwoFactorResponse, meta,
};
use forgeauth_core::prompt::Prompter;
use forgeauth_core::retry::RetryPolicy;
use forgeauth_core::ssh_agent::SshAgent;
use reqwest::StatusCode;
use reqwest::blocking::{RequestBuilder, Response};
use serde::Deserialize;
use tracing::{debug, instrument};

use crate::client::{ApiClient, api_client, check_status, parse_json, split_scopes, web_url};
use crate::consts::{BITBUCKET_API_URL, BITBUCKET_WEB_URL};
use crate::oauth::{OAuthClient, OAuthEndpoints};
use crate::ssh;

const SCOPES_HEADER: &str = "X-OAuth-Scopes";

const ENDPOINTS: OAuthEndpoints = OAuthEndpoints {
  device_code: None,
  token: "site/oauth2/access_token",
  basic_client_auth: true,
};

#[derive(Debug, Clone, Deserialize)]
pub struct BitbucketUser {
  pub username: String,
  /// `{...}`-wrapped account UUID
  pub uuid: String,
}

pub struct BitbucketAuthenticator {
  api: Option<ApiClient>,
  oauth: Option<OAuthClient>,
  prompter: Arc<dyn Prompter>,
  agent: Arc<dyn SshAgent>,
}

impl BitbucketAuthenticator {
  pub fn new(
    settings: &PlatformSettings,
    prompter: Arc<dyn Prompter>,
    agent: Arc<dyn SshAgent>,
  ) -> Result<Self, AuthError> {
    let oauth = settings
      .oauth
      .as_ref()
      .map(|oauth| OAuthClient::new(Platform::Bitbucket, web_url(settings, BITBUCKET_WEB_URL), oauth, ENDPOINTS))
      .transpose()?;
    Ok(Self {
      api: api_client(settings, BITBUCKET_API_URL)?,
      oauth,
      prompter,
      agent,
    })
  }

  /// Retry policy for this platform's API and OAuth requests
  pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
    self.api = self.api.map(|api| api.with_retry(retry));
    self.oauth = self.oauth.map(|oauth| oauth.with_retry(retry));
    self
  }

  /// `GET /user`, checking `X-OAuth-Scopes` against `required_scopes`
  fn fetch_user(
    &self,
    api: &ApiClient,
    request: RequestBuilder,
    required_scopes: &[String],
  ) -> Result<(BitbucketUser, Vec<String>), CredentialError> {
    let response = api.send(request)?;
    if response.status() == StatusCode::UNAUTHORIZED {
      return Err(
        AuthError::new(
          AuthErrorKind::InvalidCredentials,
          "BITBUCKET_INVALID_CREDENTIALS",
          "Bitbucket rejected the username or app password",
        )
        .with_hint("Create an app password under Personal settings > App passwords")
        .into(),
      );
    }
    let response = check_status(Platform::Bitbucket, response)?;
    let granted = granted_scopes(&response);
    let missing = missing_scopes(required_scopes, &granted);
    if !required_scopes.is_empty() && !granted.is_empty() && !missing.is_empty() {
      return Err(
        AuthError::new(
          AuthErrorKind::InvalidCredentials,
          "BITBUCKET_INSUFFICIENT_SCOPE",
          format!("Credential missing required permissions: {}", missing.join(", ")),
        )
        .with_hint("Create an app password with the required permissions")
        .into(),
      );
    }
    let user: BitbucketUser = parse_json(Platform::Bitbucket, response)?;
    Ok((user, granted))
  }

  fn login_with_app_password(&self, request: &AuthRequest) -> Result<AuthResult, CredentialError> {
    check_scopes(&request.scopes)?;
    let username = self.prompter.text("Bitbucket username")?;
    let password = self.prompter.secret(&format!("Bitbucket app password for {username}"))?;
    let password_text = password
      .expose_str()
      .ok_or_else(|| ValidationError::new("password", "PASSWORD_NOT_UTF8", "password is not valid UTF-8"))?;
    check_token_shape(password_text)?;

    let mut credential = Credential::new(Platform::Bitbucket, request.key.clone(), AuthMethod::Basic, password.clone())
      .with_username(username.clone());

    if let Some(api) = &self.api {
      let call = api.get("user").basic_auth(&username, Some(password_text));
      let (user, granted) = self.fetch_user(api, call, &request.scopes)?;
      credential = credential.with_metadata(meta::USER_ID, user.uuid);
      if !granted.is_empty() {
        credential = credential.with_scopes(&granted);
      }
    } else {
      debug!("Bitbucket API disabled, storing app password unverified");
    }
    Ok(AuthResult::success(credential, format!("Logged in to Bitbucket as {username}")))
  }
}

impl Authenticator for BitbucketAuthenticator {
  fn platform(&self) -> Platform {
    Platform::Bitbucket
  }

  fn supported_methods(&self) -> Vec<AuthMethod> {
    vec![AuthMethod::Basic, AuthMethod::Ssh]
  }

  #[instrument(skip_all, fields(key = %request.key, method = ?request.method))]
  fn authenticate(&self, request: &AuthRequest) -> Result<AuthResult, CredentialError> {
    match request.method.unwrap_or(AuthMethod::Basic) {
      AuthMethod::Basic => self.login_with_app_password(request),
      AuthMethod::Ssh => ssh::login(Platform::Bitbucket, self.agent.as_ref(), request),
      AuthMethod::Token | AuthMethod::OAuth => Err(
        AuthError::unsupported(
          "Bitbucket logins use an app password; store an access token with `forgeauth auth token` instead",
        )
        .into(),
      ),
    }
  }

  /// Access tokens and OAuth tokens are sent as bearer tokens
  fn validate_token(&self, token: &str, required_scopes: &[String]) -> Result<(), CredentialError> {
    check_token_shape(token)?;
    check_scopes(required_scopes)?;
    match &self.api {
      Some(api) => self
        .fetch_user(api, api.get("user").bearer_auth(token), required_scopes)
        .map(|_| ()),
      None => Ok(()),
    }
  }

  fn supports_refresh(&self) -> bool {
    self.oauth.is_some()
  }

  fn refresh_token(&self, credential: &Credential) -> Result<Credential, AuthError> {
    let (Some(oauth), Some(refresh)) = (&self.oauth, &credential.refresh_token) else {
      return Err(AuthError::refresh_unsupported(Platform::Bitbucket));
    };
    let mut fresh = oauth.refresh(refresh)?.into_credential(credential.platform, &credential.key);
    if let Some(username) = &credential.username {
      fresh = fresh.with_username(username.clone());
    }
    Ok(fresh)
  }

  fn handle_two_factor(&self, _challenge: &TwoFactorChallenge) -> Result<TwoFactorResponse, AuthError> {
    // App passwords bypass two-step verification
    Err(AuthError::two_factor_required(Platform::Bitbucket))
  }
}

fn granted_scopes(response: &Response) -> Vec<String> {
  response
    .headers()
    .get(SCOPES_HEADER)
    .and_then(|value| value.to_str().ok())
    .map(split_scopes)
    .unwrap_or_default()
}
