//! # OAuth Flows
//!
//! RFC 8628 device authorization grant for terminal logins, and the
//! `refresh_token` grant for rotating stale OAuth credentials. Each platform
//! supplies its endpoint paths; client secrets are read from the environment
//! variable named in the settings and never stored.

use std::env;
use std::thread;
use std::time::{Duration, Instant};

use chrono::{Duration as ChronoDuration, Utc};
use forgeauth_core::config::OAuthSettings;
use forgeauth_core::error::{AuthError, AuthErrorKind};
use forgeauth_core::model::{AuthMethod, Credential, Platform};
use forgeauth_core::prompt::Prompter;
use forgeauth_core::retry::RetryPolicy;
use forgeauth_core::secret::Secret;
use serde::Deserialize;
use tracing::{debug, info, instrument};
use zeroize::Zeroizing;

use crate::client::{ApiClient, check_status, parse_json, split_scopes};

const DEVICE_CODE_GRANT: &str = "urn:ietf:params:oauth:grant-type:device_code";
const DEFAULT_POLL_INTERVAL: u64 = 5;
const SLOW_DOWN_STEP: u64 = 5;

/// Endpoint paths relative to the platform's web root
#[derive(Debug, Clone, Copy)]
pub struct OAuthEndpoints {
  /// Device authorization endpoint; `None` when the platform has no device
  /// flow
  pub device_code: Option<&'static str>,
  pub token: &'static str,
  /// Send the client id and secret as HTTP Basic credentials instead of form
  /// fields
  pub basic_client_auth: bool,
}

/// Answer to a device authorization request
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceAuthorization {
  pub device_code: String,
  pub user_code: String,
  #[serde(alias = "verification_url")]
  pub verification_uri: String,
  #[serde(default)]
  pub verification_uri_complete: Option<String>,
  pub expires_in: u64,
  #[serde(default)]
  pub interval: Option<u64>,
}

#[derive(Deserialize)]
struct TokenResponse {
  access_token: Option<String>,
  refresh_token: Option<String>,
  expires_in: Option<i64>,
  #[serde(alias = "scopes")]
  scope: Option<String>,
  error: Option<String>,
  error_description: Option<String>,
}

/// Tokens issued by a successful grant
#[derive(Debug)]
pub struct TokenGrant {
  pub access_token: Secret,
  pub refresh_token: Option<Secret>,
  pub expires_in: Option<i64>,
  pub scopes: Vec<String>,
}

impl TokenGrant {
  /// Build an OAuth credential for `key`
  pub fn into_credential(self, platform: Platform, key: &str) -> Credential {
    let mut credential = Credential::new(platform, key, AuthMethod::OAuth, self.access_token);
    if let Some(refresh) = self.refresh_token {
      credential = credential.with_refresh_token(refresh);
    }
    if !self.scopes.is_empty() {
      credential = credential.with_scopes(&self.scopes);
    }
    if let Some(seconds) = self.expires_in.filter(|s| *s > 0) {
      credential = credential.with_expiry(Utc::now() + ChronoDuration::seconds(seconds));
    }
    credential
  }
}

/// Token endpoint form fields. Values can hold the client secret or a
/// refresh token, so each one is wiped when the form is dropped.
#[derive(Default)]
struct TokenForm(Vec<(&'static str, Zeroizing<String>)>);

impl TokenForm {
  fn push(&mut self, name: &'static str, value: &str) {
    self.0.push((name, Zeroizing::new(value.to_string())));
  }

  /// Borrowed pairs for `RequestBuilder::form`
  fn pairs(&self) -> Vec<(&'static str, &str)> {
    self.0.iter().map(|(name, value)| (*name, value.as_str())).collect()
  }
}

/// OAuth client registration bound to a platform's endpoints
pub struct OAuthClient {
  platform: Platform,
  web: ApiClient,
  client_id: String,
  client_secret: Option<Secret>,
  endpoints: OAuthEndpoints,
}

impl std::fmt::Debug for OAuthClient {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("OAuthClient")
      .field("platform", &self.platform)
      .field("web", &self.web.base_url())
      .field("client_id", &self.client_id)
      .field("client_secret", &self.client_secret.as_ref().map(|_| "[REDACTED]"))
      .finish()
  }
}

impl OAuthClient {
  pub fn new(
    platform: Platform,
    web_url: &str,
    settings: &OAuthSettings,
    endpoints: OAuthEndpoints,
  ) -> Result<Self, AuthError> {
    let client_secret = settings
      .client_secret_env
      .as_deref()
      .and_then(|name| env::var(name).ok())
      .filter(|value| !value.is_empty())
      .map(Secret::from);
    Ok(Self {
      platform,
      web: ApiClient::new(web_url)?,
      client_id: settings.client_id.clone(),
      client_secret,
      endpoints,
    })
  }

  pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
    self.web = self.web.with_retry(retry);
    self
  }

  pub fn supports_device_flow(&self) -> bool {
    self.endpoints.device_code.is_some()
  }

  fn token_request(&self) -> reqwest::blocking::RequestBuilder {
    let request = self
      .web
      .post(self.endpoints.token)
      .header("Accept", "application/json");
    if self.endpoints.basic_client_auth {
      let secret = self.client_secret.as_ref().and_then(Secret::expose_str);
      request.basic_auth(&self.client_id, secret)
    } else {
      request
    }
  }

  /// Form fields identifying the client, unless they travel as Basic auth
  fn client_fields(&self) -> TokenForm {
    let mut form = TokenForm::default();
    if self.endpoints.basic_client_auth {
      return form;
    }
    form.push("client_id", &self.client_id);
    if let Some(secret) = self.client_secret.as_ref().and_then(Secret::expose_str) {
      form.push("client_secret", secret);
    }
    form
  }

  /// Request a device and user code pair
  #[instrument(skip(self), level = "debug")]
  pub fn start_device_flow(&self, scopes: &[String]) -> Result<DeviceAuthorization, AuthError> {
    let path = self.endpoints.device_code.ok_or_else(|| {
      AuthError::unsupported(format!("{} does not offer a device authorization flow", self.platform))
    })?;

    let mut form = vec![("client_id", self.client_id.clone())];
    if !scopes.is_empty() {
      form.push(("scope", scopes.join(" ")));
    }
    let request = self.web.post(path).header("Accept", "application/json").form(&form);
    let response = check_status(self.platform, self.web.send(request)?)?;
    parse_json(self.platform, response)
  }

  /// Show the verification code and poll until the user approves, denies, or
  /// the code expires
  pub fn run_device_flow(&self, scopes: &[String], prompter: &dyn Prompter) -> Result<TokenGrant, AuthError> {
    let authorization = self.start_device_flow(scopes)?;
    let target = authorization
      .verification_uri_complete
      .as_deref()
      .unwrap_or(&authorization.verification_uri);
    prompter.notify(&format!(
      "Open {target} and enter the code {} to authorize forgeauth",
      authorization.user_code
    ));
    self.poll_device_flow(&authorization)
  }

  #[instrument(skip_all, level = "debug")]
  pub fn poll_device_flow(&self, authorization: &DeviceAuthorization) -> Result<TokenGrant, AuthError> {
    let deadline = Instant::now() + Duration::from_secs(authorization.expires_in);
    let mut interval = authorization.interval.unwrap_or(DEFAULT_POLL_INTERVAL);

    loop {
      let mut form = self.client_fields();
      form.push("device_code", &authorization.device_code);
      form.push("grant_type", DEVICE_CODE_GRANT);

      let response = self.web.send(self.token_request().form(&form.pairs()))?;
      let body = self.read_token_response(response)?;

      match body.error.as_deref() {
        None => return self.grant_from(body),
        Some("authorization_pending") => debug!("Device authorization pending"),
        Some("slow_down") => {
          interval += SLOW_DOWN_STEP;
          debug!(interval, "Device flow asked to slow down");
        }
        Some("expired_token") => {
          return Err(AuthError::canceled("The device code expired before it was authorized"));
        }
        Some("access_denied") => {
          return Err(AuthError::canceled("Authorization was denied in the browser"));
        }
        Some(other) => return Err(self.grant_error(other, body.error_description.as_deref())),
      }

      let wait = Duration::from_secs(interval);
      if Instant::now() + wait > deadline {
        return Err(AuthError::canceled("The device code expired before it was authorized"));
      }
      thread::sleep(wait);
    }
  }

  /// Exchange a refresh token for a new access token
  #[instrument(skip_all, level = "debug")]
  pub fn refresh(&self, refresh_token: &Secret) -> Result<TokenGrant, AuthError> {
    let token = refresh_token.expose_str().ok_or_else(|| {
      AuthError::new(
        AuthErrorKind::InvalidCredentials,
        "AUTH_REFRESH_TOKEN_INVALID",
        "Stored refresh token is not valid UTF-8",
      )
    })?;

    let mut form = self.client_fields();
    form.push("grant_type", "refresh_token");
    form.push("refresh_token", token);

    let response = self.web.send(self.token_request().form(&form.pairs()))?;
    let body = self.read_token_response(response)?;
    match body.error.as_deref() {
      None => {
        info!(platform = %self.platform, "Refreshed OAuth token");
        self.grant_from(body)
      }
      Some(error) => Err(self.grant_error(error, body.error_description.as_deref())),
    }
  }

  /// Token endpoints report grant errors as JSON with either 200 or 400
  fn read_token_response(&self, response: reqwest::blocking::Response) -> Result<TokenResponse, AuthError> {
    if response.status().is_success() || response.status() == reqwest::StatusCode::BAD_REQUEST {
      parse_json(self.platform, response)
    } else {
      Err(check_status(self.platform, response).err().unwrap_or_else(|| {
        AuthError::network(format!("{} token endpoint returned an unexpected status", self.platform))
      }))
    }
  }

  fn grant_from(&self, body: TokenResponse) -> Result<TokenGrant, AuthError> {
    let access_token = body.access_token.filter(|t| !t.is_empty()).ok_or_else(|| {
      AuthError::new(
        AuthErrorKind::InvalidCredentials,
        "AUTH_OAUTH_NO_TOKEN",
        format!("{} did not issue an access token", self.platform),
      )
    })?;
    Ok(TokenGrant {
      access_token: Secret::from(access_token),
      refresh_token: body.refresh_token.filter(|t| !t.is_empty()).map(Secret::from),
      expires_in: body.expires_in,
      scopes: body.scope.as_deref().map(split_scopes).unwrap_or_default(),
    })
  }

  fn grant_error(&self, error: &str, description: Option<&str>) -> AuthError {
    let detail = description.unwrap_or(error);
    match error {
      "invalid_grant" => AuthError::new(
        AuthErrorKind::ExpiredToken,
        "AUTH_OAUTH_INVALID_GRANT",
        format!("{} rejected the grant: {detail}", self.platform),
      )
      .with_hint("Log in again to obtain a new token"),
      _ => AuthError::new(
        AuthErrorKind::InvalidCredentials,
        "AUTH_OAUTH_ERROR",
        format!("{} OAuth error: {detail}", self.platform),
      )
      .with_hint("Check the OAuth client id configured for this platform"),
    }
  }
}
