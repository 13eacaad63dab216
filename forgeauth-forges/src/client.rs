//! # Platform HTTP Client
//!
//! Thin wrapper over a blocking `reqwest` client that maps transport and
//! status failures onto [`AuthError`] kinds the credential manager
//! understands. Request URLs never carry secrets, but transport errors are
//! still stripped of their URL before being reported.
//!
//! Network retries live here rather than around a whole login, so a dropped
//! connection repeats one request and never a prompt or a one-time code.

use forgeauth_core::config::PlatformSettings;
use forgeauth_core::error::{AuthError, AuthErrorKind, CredentialError};
use forgeauth_core::model::Platform;
use forgeauth_core::retry::RetryPolicy;
use reqwest::StatusCode;
use reqwest::blocking::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::consts::{HTTP_TIMEOUT, USER_AGENT};

/// Represents a platform API client rooted at `base_url`
#[derive(Debug, Clone)]
pub struct ApiClient {
  pub(crate) http: Client,
  pub(crate) base_url: String,
  pub(crate) retry: RetryPolicy,
}

impl ApiClient {
  pub fn new(base_url: &str) -> Result<Self, AuthError> {
    let http = Client::builder()
      .user_agent(USER_AGENT)
      .timeout(HTTP_TIMEOUT)
      .build()
      .map_err(|e| AuthError::network(format!("could not build HTTP client: {e}")))?;
    Ok(Self {
      http,
      base_url: base_url.trim_end_matches('/').to_string(),
      retry: RetryPolicy::default(),
    })
  }

  pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
    self.retry = retry;
    self
  }

  pub fn base_url(&self) -> &str {
    &self.base_url
  }

  pub fn url(&self, path: &str) -> String {
    format!("{}/{}", self.base_url, path.trim_start_matches('/'))
  }

  pub fn get(&self, path: &str) -> RequestBuilder {
    self.http.get(self.url(path))
  }

  pub fn post(&self, path: &str) -> RequestBuilder {
    self.http.post(self.url(path))
  }

  /// Send a request, retrying transport failures and 429 or 5xx responses
  /// under the client's policy. A transport failure that outlasts the policy
  /// becomes `NetworkError`; a status that does is returned for
  /// [`check_status`] to map.
  pub fn send(&self, request: RequestBuilder) -> Result<Response, AuthError> {
    let mut retryable = None;
    let outcome = self.retry.run(None, |attempt| {
      retryable = None;
      // Streaming bodies cannot be replayed, so they get a single attempt
      let Some(current) = request.try_clone() else {
        return Ok(None);
      };
      let response = send_once(current)?;
      let status = response.status();
      debug!(attempt, %status, "Platform API responded");
      if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        retryable = Some(response);
        return Err(AuthError::network(format!("HTTP {}", status.as_u16())).into());
      }
      Ok(Some(response))
    });

    match outcome {
      Ok(Some(response)) => Ok(response),
      Ok(None) => send_once(request),
      Err(err) => match retryable {
        Some(response) => Ok(response),
        None => Err(match err {
          CredentialError::Auth(err) => err,
          CredentialError::Validation(err) => AuthError::network(err.to_string()),
        }),
      },
    }
  }
}

fn send_once(request: RequestBuilder) -> Result<Response, AuthError> {
  request.send().map_err(|e| AuthError::network(e.without_url()))
}

/// Build the API client for `settings`, or `None` when online verification
/// is disabled with an empty `api_url`
pub fn api_client(settings: &PlatformSettings, default_url: &str) -> Result<Option<ApiClient>, AuthError> {
  match settings.api_url.as_deref() {
    Some(url) if url.trim().is_empty() => Ok(None),
    Some(url) => ApiClient::new(url).map(Some),
    None => ApiClient::new(default_url).map(Some),
  }
}

/// Web root for OAuth endpoints
pub fn web_url<'a>(settings: &'a PlatformSettings, default_url: &'a str) -> &'a str {
  settings
    .web_url
    .as_deref()
    .filter(|url| !url.trim().is_empty())
    .unwrap_or(default_url)
}

/// Map a non-success status to an error. Rate limits and server errors are
/// reported as `NetworkError`, which [`ApiClient::send`] has already retried.
pub fn check_status(platform: Platform, response: Response) -> Result<Response, AuthError> {
  let status = response.status();
  if status.is_success() {
    return Ok(response);
  }

  Err(match status {
    StatusCode::UNAUTHORIZED => AuthError::invalid_credentials(platform, "authentication failed (HTTP 401)"),
    StatusCode::FORBIDDEN => AuthError::new(
      AuthErrorKind::InvalidCredentials,
      "AUTH_FORBIDDEN",
      format!("{platform} refused access (HTTP 403)"),
    )
    .with_hint("Check that the token has not been revoked and grants the required scopes"),
    StatusCode::TOO_MANY_REQUESTS => AuthError::network(format!("{platform} rate limit exceeded (HTTP 429)")),
    s if s.is_server_error() => AuthError::network(format!("{platform} API error (HTTP {})", s.as_u16())),
    s => AuthError::new(
      AuthErrorKind::InvalidCredentials,
      "AUTH_API_ERROR",
      format!("{platform} API returned HTTP {}", s.as_u16()),
    )
    .with_hint("Check the configured API URL for this platform"),
  })
}

/// Decode a JSON body
pub fn parse_json<T: DeserializeOwned>(platform: Platform, response: Response) -> Result<T, AuthError> {
  response.json::<T>().map_err(|e| {
    AuthError::new(
      AuthErrorKind::NetworkError,
      "AUTH_API_RESPONSE_INVALID",
      format!("Failed to parse {platform} API response: {}", e.without_url()),
    )
    .with_hint("Check the configured API URL for this platform")
  })
}

/// Split a scope list as platforms report it, comma or space separated
pub fn split_scopes(value: &str) -> Vec<String> {
  value
    .split([',', ' '])
    .map(str::trim)
    .filter(|s| !s.is_empty())
    .map(str::to_string)
    .collect()
}

#[cfg(test)]
mod tests {
  use std::time::Duration;

  use forgeauth_test_utils::MockApi;
  use wiremock::matchers::{header, method, path};
  use wiremock::{Mock, ResponseTemplate};

  use super::*;

  #[test]
  fn test_client_trims_base_url() {
    let client = ApiClient::new("https://api.example.com/").unwrap();
    assert_eq!(client.base_url(), "https://api.example.com");
    assert_eq!(client.url("/user"), "https://api.example.com/user");
    assert_eq!(client.url("user"), "https://api.example.com/user");
  }

  #[test]
  fn test_api_client_disabled_by_empty_url() {
    let settings = PlatformSettings {
      api_url: Some(String::new()),
      ..Default::default()
    };
    assert!(api_client(&settings, "https://api.github.com").unwrap().is_none());

    let client = api_client(&PlatformSettings::default(), "https://api.github.com")
      .unwrap()
      .unwrap();
    assert_eq!(client.base_url(), "https://api.github.com");
  }

  #[test]
  fn test_status_mapping() {
    let api = MockApi::start();
    for (status, route) in [(401, "/unauthorized"), (403, "/forbidden"), (429, "/limited"), (502, "/bad-gateway")] {
      api.mount(
        Mock::given(method("GET"))
          .and(path(route))
          .respond_with(ResponseTemplate::new(status)),
      );
    }
    let client = ApiClient::new(&api.uri()).unwrap().with_retry(fast_retry());

    let status_of = |route: &str| {
      let response = client.send(client.get(route)).unwrap();
      check_status(Platform::GitHub, response).unwrap_err()
    };

    assert!(status_of("/unauthorized").is(AuthErrorKind::InvalidCredentials));
    assert_eq!(status_of("/forbidden").code, "AUTH_FORBIDDEN");
    assert!(status_of("/limited").is(AuthErrorKind::NetworkError));
    assert!(status_of("/bad-gateway").is(AuthErrorKind::NetworkError));
  }

  #[test]
  fn test_user_agent_is_sent() {
    let api = MockApi::start();
    api.mount(
      Mock::given(method("GET"))
        .and(path("/ping"))
        .and(header("User-Agent", USER_AGENT))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true}))),
    );
    let client = ApiClient::new(&api.uri()).unwrap();

    let response = check_status(Platform::Generic, client.send(client.get("ping")).unwrap()).unwrap();
    let body: serde_json::Value = parse_json(Platform::Generic, response).unwrap();
    assert_eq!(body["ok"], true);
  }

  #[test]
  fn test_unreachable_host_is_network_error() {
    let client = ApiClient::new("http://127.0.0.1:9").unwrap().with_retry(fast_retry());
    let err = client.send(client.get("user")).unwrap_err();
    assert!(err.is(AuthErrorKind::NetworkError));
  }

  fn fast_retry() -> RetryPolicy {
    RetryPolicy::new(3, Duration::from_millis(1))
  }

  #[test]
  fn test_server_errors_are_retried_per_request() {
    let api = MockApi::start();
    api.mount(
      Mock::given(method("GET"))
        .and(path("/user"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2),
    );
    api.mount(
      Mock::given(method("GET"))
        .and(path("/user"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"login": "octocat"}))),
    );
    let client = ApiClient::new(&api.uri()).unwrap().with_retry(fast_retry());

    let response = check_status(Platform::GitHub, client.send(client.get("user")).unwrap()).unwrap();
    let body: serde_json::Value = parse_json(Platform::GitHub, response).unwrap();
    assert_eq!(body["login"], "octocat");
  }

  #[test]
  fn test_retries_exhausted_return_last_status() {
    let api = MockApi::start();
    api.mount(
      Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(502)),
    );
    let client = ApiClient::new(&api.uri())
      .unwrap()
      .with_retry(RetryPolicy::new(2, Duration::from_millis(1)));

    let response = client.send(client.post("token").form(&[("grant_type", "refresh_token")])).unwrap();
    assert_eq!(response.status().as_u16(), 502);
    assert!(check_status(Platform::GitHub, response).unwrap_err().is(AuthErrorKind::NetworkError));
  }

  #[test]
  fn test_client_errors_are_not_retried() {
    let api = MockApi::start();
    api.mount(
      Mock::given(method("GET"))
        .and(path("/user"))
        .respond_with(ResponseTemplate::new(401))
        .up_to_n_times(1),
    );
    api.mount(
      Mock::given(method("GET"))
        .and(path("/user"))
        .respond_with(ResponseTemplate::new(200)),
    );
    let client = ApiClient::new(&api.uri()).unwrap().with_retry(fast_retry());

    let response = client.send(client.get("user")).unwrap();
    assert_eq!(response.status().as_u16(), 401);
  }

  #[test]
  fn test_split_scopes() {
    assert_eq!(split_scopes("repo, read:org"), vec!["repo", "read:org"]);
    assert_eq!(split_scopes("api read_user"), vec!["api", "read_user"]);
    assert!(split_scopes("").is_empty());
  }
}
