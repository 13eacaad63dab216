//! # GitLab Authenticator
//!
//! Personal, project, and group access tokens are verified through
//! `GET /personal_access_tokens/self` with the `PRIVATE-TOKEN` header, which
//! reports the token's scopes and whether it is still active. OAuth tokens
//! come from the device flow and are rotated with the refresh grant.

use std::sync::{Arc, LazyLock};

use chrono::NaiveDate;
use forgeauth_core::authenticator::{Authenticator, check_scopes, check_token_shape, missing_scopes};
use forgeauth_core::config::PlatformSettings;
use forgeauth_core::error::{AuthError, AuthErrorKind, CredentialError, ValidationError};
use forgeauth_core::model::{
  AuthMethod, AuthRequest, AuthResult, Credential, Platform, TwoFactorChallenge, TwoFactorResponse, meta,
};
use forgeauth_core::prompt::Prompter;
use forgeauth_core::retry::RetryPolicy;
use forgeauth_core::ssh_agent::SshAgent;
use regex::Regex;
use reqwest::StatusCode;
use reqwest::blocking::RequestBuilder;
use serde::Deserialize;
use tracing::{debug, instrument};

use crate::client::{ApiClient, api_client, check_status, parse_json, web_url};
use crate::consts::{GITLAB_API_URL, GITLAB_WEB_URL};
use crate::oauth::{OAuthClient, OAuthEndpoints};
use crate::ssh;

const ENDPOINTS: OAuthEndpoints = OAuthEndpoints {
  device_code: Some("oauth/authorize_device"),
  token: "oauth/token",
  basic_client_auth: false,
};

/// Prefixed access tokens: personal, OAuth application secret, deploy,
/// pipeline trigger, and feed tokens
static PREFIXED_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
  Regex::new(r"^(glpat|gloas|gldt|glptt|glft)-[A-Za-z0-9_\-]{20,}$").expect("Failed to compile GitLab token regex")
});

/// OAuth access tokens are 64 hex characters
static OAUTH_TOKEN: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r"^[0-9a-f]{64}$").expect("Failed to compile GitLab OAuth token regex"));

#[derive(Debug, Clone, Deserialize)]
struct TokenSelf {
  #[serde(default)]
  scopes: Vec<String>,
  #[serde(default = "default_active")]
  active: bool,
  #[serde(default)]
  revoked: bool,
  /// `YYYY-MM-DD`
  expires_at: Option<String>,
}

fn default_active() -> bool {
  true
}

#[derive(Debug, Clone, Deserialize)]
pub struct GitLabUser {
  pub username: String,
  pub id: u64,
}

pub struct GitLabAuthenticator {
  api: Option<ApiClient>,
  oauth: Option<OAuthClient>,
  prompter: Arc<dyn Prompter>,
  agent: Arc<dyn SshAgent>,
}

impl GitLabAuthenticator {
  pub fn new(
    settings: &PlatformSettings,
    prompter: Arc<dyn Prompter>,
    agent: Arc<dyn SshAgent>,
  ) -> Result<Self, AuthError> {
    let oauth = settings
      .oauth
      .as_ref()
      .map(|oauth| OAuthClient::new(Platform::GitLab, web_url(settings, GITLAB_WEB_URL), oauth, ENDPOINTS))
      .transpose()?;
    Ok(Self {
      api: api_client(settings, GITLAB_API_URL)?,
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

  pub fn check_format(token: &str) -> Result<(), ValidationError> {
    check_token_shape(token)?;
    if PREFIXED_TOKEN.is_match(token) || OAUTH_TOKEN.is_match(token) {
      Ok(())
    } else {
      Err(ValidationError::new(
        "token",
        "GITLAB_INVALID_TOKEN_FORMAT",
        "not a recognized GitLab token format",
      ))
    }
  }

  fn authorize(request: RequestBuilder, token: &str) -> RequestBuilder {
    if PREFIXED_TOKEN.is_match(token) {
      request.header("PRIVATE-TOKEN", token)
    } else {
      request.bearer_auth(token)
    }
  }

  /// Verify a token online. Returns the account and, for access tokens, the
  /// granted scopes and expiry.
  #[instrument(skip_all, level = "debug")]
  fn verify(&self, token: &str, required_scopes: &[String]) -> Result<Option<Verified>, CredentialError> {
    Self::check_format(token)?;
    check_scopes(required_scopes)?;

    let Some(api) = &self.api else {
      debug!("GitLab API disabled, skipping online verification");
      return Ok(None);
    };

    let mut scopes = None;
    let mut expires_at = None;
    if PREFIXED_TOKEN.is_match(token) {
      let response = api.send(Self::authorize(api.get("personal_access_tokens/self"), token))?;
      if response.status() == StatusCode::UNAUTHORIZED {
        return Err(invalid_token().into());
      }
      let details: TokenSelf = parse_json(Platform::GitLab, check_status(Platform::GitLab, response)?)?;
      if details.revoked || !details.active {
        return Err(
          AuthError::new(
            AuthErrorKind::InvalidCredentials,
            "GITLAB_TOKEN_REVOKED",
            "GitLab token is revoked or inactive",
          )
          .with_hint("Create a new access token in GitLab under Preferences > Access Tokens")
          .into(),
        );
      }
      let missing = missing_scopes(required_scopes, &details.scopes);
      if !missing.is_empty() {
        return Err(
          AuthError::new(
            AuthErrorKind::InvalidCredentials,
            "GITLAB_INSUFFICIENT_SCOPE",
            format!("Token missing required scopes: {}", missing.join(", ")),
          )
          .with_hint("Create a token that includes the required scopes")
          .into(),
        );
      }
      scopes = Some(details.scopes);
      expires_at = details.expires_at;
    }

    let response = api.send(Self::authorize(api.get("user"), token))?;
    if response.status() == StatusCode::UNAUTHORIZED {
      return Err(invalid_token().into());
    }
    let user: GitLabUser = parse_json(Platform::GitLab, check_status(Platform::GitLab, response)?)?;
    Ok(Some(Verified {
      user,
      scopes,
      expires_at,
    }))
  }

  fn login_with_token(&self, request: &AuthRequest) -> Result<AuthResult, CredentialError> {
    let token = self.prompter.secret(&format!("GitLab access token for {}", request.key))?;
    let text = token
      .expose_str()
      .map(str::trim)
      .ok_or_else(|| ValidationError::new("token", "TOKEN_NOT_UTF8", "token is not valid UTF-8"))?;
    let verified = self.verify(text, &request.scopes)?;

    let mut credential = Credential::new(Platform::GitLab, request.key.clone(), AuthMethod::Token, text);
    if let Some(verified) = verified {
      credential = verified.apply(credential);
    }
    Ok(AuthResult::success(credential, "Authenticated with a GitLab token"))
  }

  fn login_with_device_flow(&self, request: &AuthRequest) -> Result<AuthResult, CredentialError> {
    let oauth = self.oauth.as_ref().ok_or_else(|| {
      AuthError::unsupported("GitLab OAuth login needs `gitlab.oauth.client_id` in auth.toml")
    })?;
    let grant = oauth.run_device_flow(&request.scopes, self.prompter.as_ref())?;
    let mut credential = grant.into_credential(Platform::GitLab, &request.key);

    if let Some(api) = &self.api
      && let Some(token) = credential.secret.expose_str()
    {
      match api
        .send(api.get("user").bearer_auth(token))
        .and_then(|r| check_status(Platform::GitLab, r))
        .and_then(|r| parse_json::<GitLabUser>(Platform::GitLab, r))
      {
        Ok(user) => {
          credential = credential
            .with_username(user.username)
            .with_metadata(meta::USER_ID, user.id.to_string());
        }
        Err(err) => debug!(code = %err.code, "Could not look up the authorized GitLab account"),
      }
    }
    Ok(AuthResult::success(credential, "Authorized forgeauth on GitLab"))
  }
}

struct Verified {
  user: GitLabUser,
  scopes: Option<Vec<String>>,
  expires_at: Option<String>,
}

impl Verified {
  fn apply(self, credential: Credential) -> Credential {
    let mut credential = credential
      .with_username(self.user.username)
      .with_metadata(meta::USER_ID, self.user.id.to_string());
    if let Some(scopes) = self.scopes {
      credential = credential.with_scopes(&scopes);
    }
    // Access tokens expire at the start of the given day
    if let Some(date) = self.expires_at.and_then(|d| NaiveDate::parse_from_str(&d, "%Y-%m-%d").ok())
      && let Some(midnight) = date.and_hms_opt(0, 0, 0)
    {
      credential = credential.with_expiry(midnight.and_utc());
    }
    credential
  }
}

fn invalid_token() -> AuthError {
  AuthError::new(
    AuthErrorKind::InvalidCredentials,
    "GITLAB_INVALID_TOKEN",
    "GitLab token is invalid or expired",
  )
  .with_hint("Create a new access token in GitLab under Preferences > Access Tokens")
}

impl Authenticator for GitLabAuthenticator {
  fn platform(&self) -> Platform {
    Platform::GitLab
  }

  fn supported_methods(&self) -> Vec<AuthMethod> {
    let mut methods = vec![AuthMethod::Token];
    if self.oauth.is_some() {
      methods.push(AuthMethod::OAuth);
    }
    methods.push(AuthMethod::Ssh);
    methods
  }

  #[instrument(skip_all, fields(key = %request.key, method = ?request.method))]
  fn authenticate(&self, request: &AuthRequest) -> Result<AuthResult, CredentialError> {
    match request.method.unwrap_or(AuthMethod::Token) {
      AuthMethod::Token => self.login_with_token(request),
      AuthMethod::OAuth => self.login_with_device_flow(request),
      AuthMethod::Ssh => ssh::login(Platform::GitLab, self.agent.as_ref(), request),
      AuthMethod::Basic => Err(
        AuthError::unsupported("GitLab does not accept passwords for API access; use an access token").into(),
      ),
    }
  }

  fn validate_token(&self, token: &str, required_scopes: &[String]) -> Result<(), CredentialError> {
    self.verify(token, required_scopes).map(|_| ())
  }

  fn supports_refresh(&self) -> bool {
    self.oauth.is_some()
  }

  fn refresh_token(&self, credential: &Credential) -> Result<Credential, AuthError> {
    let (Some(oauth), Some(refresh)) = (&self.oauth, &credential.refresh_token) else {
      return Err(AuthError::refresh_unsupported(Platform::GitLab));
    };
    let mut fresh = oauth.refresh(refresh)?.into_credential(credential.platform, &credential.key);
    if let Some(username) = &credential.username {
      fresh = fresh.with_username(username.clone());
    }
    Ok(fresh)
  }

  fn handle_two_factor(&self, _challenge: &TwoFactorChallenge) -> Result<TwoFactorResponse, AuthError> {
    // Token and OAuth logins never raise a second-factor challenge
    Err(AuthError::two_factor_required(Platform::GitLab))
  }
}
