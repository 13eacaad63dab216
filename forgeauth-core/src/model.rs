//! # Credential Model
//!
//! Value types shared by stores, helpers, authenticators, and the manager.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::ValidationError;
use crate::secret::Secret;

/// Secrets shorter than this are not searched for in usernames and metadata
const MIN_LEAK_CHECK_LEN: usize = 8;

/// Well-known metadata keys
pub mod meta {
  /// Comma-separated list of granted scopes
  pub const SCOPES: &str = "scopes";
  /// RFC 3339 expiry timestamp
  pub const EXPIRES_AT: &str = "expires_at";
  /// Set to `true` when a source knows the credential is stale
  pub const EXPIRED: &str = "expired";
  /// Second-factor method used during login (`totp`, `sms`, `app`)
  pub const TWO_FACTOR: &str = "two_factor";
  /// Permission level reported by the platform
  pub const PERMISSION: &str = "permission";
  /// Platform user id
  pub const USER_ID: &str = "user_id";
  /// SSH key fingerprint backing an SSH credential
  pub const SSH_FINGERPRINT: &str = "ssh_fingerprint";
  /// Name of the helper a credential was resolved from
  pub const SOURCE: &str = "source";
}

/// Git hosting platform families
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
  GitHub,
  GitLab,
  Bitbucket,
  Generic,
}

impl Platform {
  pub const ALL: [Platform; 4] = [Platform::GitHub, Platform::GitLab, Platform::Bitbucket, Platform::Generic];

  pub const fn as_str(&self) -> &'static str {
    match self {
      Self::GitHub => "github",
      Self::GitLab => "gitlab",
      Self::Bitbucket => "bitbucket",
      Self::Generic => "generic",
    }
  }

  /// The public SaaS host for this platform
  pub const fn default_host(&self) -> Option<&'static str> {
    match self {
      Self::GitHub => Some("github.com"),
      Self::GitLab => Some("gitlab.com"),
      Self::Bitbucket => Some("bitbucket.org"),
      Self::Generic => None,
    }
  }

  /// Detect the platform from a repository URL, scp-style remote, or host
  pub fn detect(repository: &str) -> Self {
    let host = RemoteTarget::parse(repository)
      .map(|target| target.host)
      .unwrap_or_else(|_| repository.to_ascii_lowercase());

    let matches = |domain: &str| host == domain || host.ends_with(&format!(".{domain}"));
    if matches("github.com") {
      Self::GitHub
    } else if matches("gitlab.com") {
      Self::GitLab
    } else if matches("bitbucket.org") {
      Self::Bitbucket
    } else {
      Self::Generic
    }
  }
}

impl fmt::Display for Platform {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for Platform {
  type Err = ValidationError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_ascii_lowercase().as_str() {
      "github" | "gh" => Ok(Self::GitHub),
      "gitlab" | "gl" => Ok(Self::GitLab),
      "bitbucket" | "bb" => Ok(Self::Bitbucket),
      "generic" | "git" => Ok(Self::Generic),
      other => Err(ValidationError::new(
        "platform",
        "PLATFORM_UNKNOWN",
        format!("unknown platform '{other}'"),
      )),
    }
  }
}

/// Authentication methods
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthMethod {
  Token,
  Ssh,
  OAuth,
  Basic,
}

impl AuthMethod {
  pub const fn as_str(&self) -> &'static str {
    match self {
      Self::Token => "token",
      Self::Ssh => "ssh",
      Self::OAuth => "oauth",
      Self::Basic => "basic",
    }
  }
}

impl fmt::Display for AuthMethod {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for AuthMethod {
  type Err = ValidationError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_ascii_lowercase().as_str() {
      "token" | "pat" => Ok(Self::Token),
      "ssh" => Ok(Self::Ssh),
      "oauth" => Ok(Self::OAuth),
      "basic" | "https" | "password" => Ok(Self::Basic),
      other => Err(ValidationError::new(
        "method",
        "METHOD_UNKNOWN",
        format!("unknown authentication method '{other}'"),
      )),
    }
  }
}

/// Identity of a credential within a store
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CredentialId {
  pub platform: Platform,
  pub key: String,
}

impl CredentialId {
  pub fn new(platform: Platform, key: impl Into<String>) -> Self {
    Self {
      platform,
      key: key.into(),
    }
  }
}

impl fmt::Display for CredentialId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}/{}", self.platform, self.key)
  }
}

/// Secret material plus the metadata describing how to use it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
  pub platform: Platform,
  pub key: String,
  pub method: AuthMethod,
  pub secret: Secret,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub username: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub refresh_token: Option<Secret>,
  #[serde(default)]
  pub metadata: BTreeMap<String, String>,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

impl Credential {
  pub fn new(platform: Platform, key: impl Into<String>, method: AuthMethod, secret: impl Into<Secret>) -> Self {
    let now = Utc::now();
    Self {
      platform,
      key: key.into(),
      method,
      secret: secret.into(),
      username: None,
      refresh_token: None,
      metadata: BTreeMap::new(),
      created_at: now,
      updated_at: now,
    }
  }

  pub fn with_username(mut self, username: impl Into<String>) -> Self {
    self.username = Some(username.into());
    self
  }

  pub fn with_refresh_token(mut self, token: impl Into<Secret>) -> Self {
    self.refresh_token = Some(token.into());
    self
  }

  pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
    self.metadata.insert(key.into(), value.into());
    self
  }

  pub fn with_scopes<S: AsRef<str>>(self, scopes: &[S]) -> Self {
    let joined = scopes.iter().map(AsRef::as_ref).collect::<Vec<_>>().join(",");
    self.with_metadata(meta::SCOPES, joined)
  }

  pub fn with_expiry(self, expires_at: DateTime<Utc>) -> Self {
    self.with_metadata(meta::EXPIRES_AT, expires_at.to_rfc3339())
  }

  pub fn id(&self) -> CredentialId {
    CredentialId::new(self.platform, self.key.clone())
  }

  /// Granted scopes recorded in metadata
  pub fn scopes(&self) -> Vec<String> {
    self
      .metadata
      .get(meta::SCOPES)
      .map(|raw| {
        raw
          .split(',')
          .map(str::trim)
          .filter(|s| !s.is_empty())
          .map(str::to_string)
          .collect()
      })
      .unwrap_or_default()
  }

  /// Expiry timestamp recorded in metadata. Unparseable values count as
  /// already expired.
  pub fn expires_at(&self) -> Option<DateTime<Utc>> {
    self.metadata.get(meta::EXPIRES_AT).map(|raw| {
      DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
    })
  }

  pub fn is_stale_at(&self, now: DateTime<Utc>) -> bool {
    if self.metadata.get(meta::EXPIRED).is_some_and(|v| v == "true") {
      return true;
    }
    self.expires_at().is_some_and(|expiry| expiry <= now)
  }

  pub fn is_stale(&self) -> bool {
    self.is_stale_at(Utc::now())
  }

  /// Reject credentials that could leak their secret or cannot be stored
  pub fn validate(&self) -> Result<(), ValidationError> {
    if self.key.trim().is_empty() {
      return Err(ValidationError::new(
        "repository",
        "REPOSITORY_EMPTY",
        "repository key must not be empty",
      ));
    }
    if self.secret.is_empty() {
      return Err(ValidationError::new("secret", "SECRET_EMPTY", "secret must not be empty"));
    }
    // SSH credentials hold the public key fingerprint, which is also recorded
    // in metadata
    if self.method == AuthMethod::Ssh {
      return Ok(());
    }
    // Short secrets match ordinary text by chance, so only secrets long
    // enough to be distinctive are searched for
    let leaks_into = |secret: &Secret, text: &str| secret.len() >= MIN_LEAK_CHECK_LEN && secret.is_contained_in(text);
    let leaks = |text: &str| {
      leaks_into(&self.secret, text) || self.refresh_token.as_ref().is_some_and(|r| leaks_into(r, text))
    };
    for (name, value) in &self.metadata {
      if leaks(name) {
        return Err(ValidationError::new(
          "metadata",
          "METADATA_CONTAINS_SECRET",
          "metadata keys must not contain secret material",
        ));
      }
      if leaks(value) {
        return Err(ValidationError::new(
          "metadata",
          "METADATA_CONTAINS_SECRET",
          format!("metadata entry '{name}' must not contain secret material"),
        ));
      }
    }
    if self.username.as_deref().is_some_and(leaks) {
      return Err(ValidationError::new(
        "username",
        "USERNAME_CONTAINS_SECRET",
        "username must not contain secret material",
      ));
    }
    Ok(())
  }

  /// A view of this credential without any secret bytes
  pub fn summary(&self, source: &str) -> CredentialSummary {
    CredentialSummary {
      platform: self.platform,
      key: self.key.clone(),
      method: self.method,
      username: self.username.clone(),
      metadata: self.metadata.clone(),
      created_at: self.created_at,
      updated_at: self.updated_at,
      source: source.to_string(),
      stale: self.is_stale(),
    }
  }
}

/// Credential listing entry; carries no secret bytes
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CredentialSummary {
  pub platform: Platform,
  pub key: String,
  pub method: AuthMethod,
  pub username: Option<String>,
  pub metadata: BTreeMap<String, String>,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
  /// Name of the store holding this entry
  pub source: String,
  pub stale: bool,
}

/// A request to obtain a credential
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthRequest {
  pub platform: Platform,
  pub key: String,
  pub method: Option<AuthMethod>,
  pub scopes: Vec<String>,
  pub interactive: bool,
}

impl AuthRequest {
  pub fn new(platform: Platform, key: impl Into<String>) -> Self {
    Self {
      platform,
      key: key.into(),
      method: None,
      scopes: Vec::new(),
      interactive: false,
    }
  }

  pub fn interactive(mut self, interactive: bool) -> Self {
    self.interactive = interactive;
    self
  }

  pub fn with_method(mut self, method: AuthMethod) -> Self {
    self.method = Some(method);
    self
  }

  pub fn with_scopes(mut self, scopes: Vec<String>) -> Self {
    self.scopes = scopes;
    self
  }
}

/// Outcome of an authenticator run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthResult {
  pub success: bool,
  pub method: AuthMethod,
  pub credential: Option<Credential>,
  pub message: String,
}

impl AuthResult {
  pub fn success(credential: Credential, message: impl Into<String>) -> Self {
    Self {
      success: true,
      method: credential.method,
      credential: Some(credential),
      message: message.into(),
    }
  }

  pub fn failure(method: AuthMethod, message: impl Into<String>) -> Self {
    Self {
      success: false,
      method,
      credential: None,
      message: message.into(),
    }
  }
}

/// Second-factor delivery methods
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TwoFactorMethod {
  Totp,
  Sms,
  App,
}

impl TwoFactorMethod {
  pub const fn as_str(&self) -> &'static str {
    match self {
      Self::Totp => "totp",
      Self::Sms => "sms",
      Self::App => "app",
    }
  }
}

impl fmt::Display for TwoFactorMethod {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for TwoFactorMethod {
  type Err = ValidationError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_ascii_lowercase().as_str() {
      "totp" => Ok(Self::Totp),
      "sms" => Ok(Self::Sms),
      "app" => Ok(Self::App),
      other => Err(ValidationError::new(
        "two_factor_method",
        "TWO_FACTOR_METHOD_UNKNOWN",
        format!("unknown second-factor method '{other}'"),
      )),
    }
  }
}

/// A second-factor challenge issued by a platform
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TwoFactorChallenge {
  /// Opaque platform token identifying the pending login
  pub token: String,
  pub method: TwoFactorMethod,
  pub message: String,
}

/// The user's answer to a [`TwoFactorChallenge`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TwoFactorResponse {
  pub code: Secret,
  pub method: TwoFactorMethod,
}

/// Protocol, host, and path of a repository key, as used by the git
/// credential-helper protocol
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteTarget {
  pub protocol: String,
  pub host: String,
  pub path: Option<String>,
}

impl RemoteTarget {
  /// Parse `https://host/path`, `git@host:path`, or a bare `host[/path]`
  pub fn parse(key: &str) -> Result<Self, ValidationError> {
    let key = key.trim();
    if key.is_empty() {
      return Err(ValidationError::new(
        "repository",
        "REPOSITORY_EMPTY",
        "repository key must not be empty",
      ));
    }

    if !key.contains("://") {
      if let Some((user_host, path)) = key.split_once(':') {
        if let Some((_, host)) = user_host.split_once('@') {
          if !user_host.contains('/') && !host.is_empty() {
            return Ok(Self {
              protocol: "ssh".to_string(),
              host: host.to_ascii_lowercase(),
              path: non_empty_path(path),
            });
          }
        }
      }
    }

    let with_scheme = if key.contains("://") {
      key.to_string()
    } else {
      format!("https://{key}")
    };
    let url = Url::parse(&with_scheme).map_err(|e| {
      ValidationError::new(
        "repository",
        "REPOSITORY_INVALID",
        format!("'{key}' is not a valid repository URL or host: {e}"),
      )
    })?;
    let host = url.host_str().filter(|h| !h.is_empty()).ok_or_else(|| {
      ValidationError::new("repository", "REPOSITORY_NO_HOST", format!("'{key}' has no host"))
    })?;
    let host = match url.port() {
      Some(port) => format!("{host}:{port}"),
      None => host.to_string(),
    };

    Ok(Self {
      protocol: url.scheme().to_string(),
      host: host.to_ascii_lowercase(),
      path: non_empty_path(url.path()),
    })
  }
}

fn non_empty_path(path: &str) -> Option<String> {
  let trimmed = path.trim_matches('/');
  if trimmed.is_empty() {
    None
  } else {
    Some(trimmed.to_string())
  }
}

#[cfg(test)]
mod tests {
  use chrono::Duration;

  use super::*;

  #[test]
  fn test_platform_detection() {
    assert_eq!(Platform::detect("github.com"), Platform::GitHub);
    assert_eq!(Platform::detect("https://github.com/org/repo.git"), Platform::GitHub);
    assert_eq!(Platform::detect("git@gitlab.com:group/project.git"), Platform::GitLab);
    assert_eq!(Platform::detect("bitbucket.org/team/repo"), Platform::Bitbucket);
    assert_eq!(Platform::detect("git.example.com/repo"), Platform::Generic);
    assert_eq!(Platform::detect("notgithub.com"), Platform::Generic);
  }

  #[test]
  fn test_platform_and_method_parse() {
    assert_eq!("GitHub".parse::<Platform>().unwrap(), Platform::GitHub);
    assert!("sourceforge".parse::<Platform>().is_err());
    assert_eq!("oauth".parse::<AuthMethod>().unwrap(), AuthMethod::OAuth);
    assert_eq!("https".parse::<AuthMethod>().unwrap(), AuthMethod::Basic);
  }

  #[test]
  fn test_remote_target_forms() {
    let https = RemoteTarget::parse("https://GitHub.com/org/repo.git").unwrap();
    assert_eq!(https.protocol, "https");
    assert_eq!(https.host, "github.com");
    assert_eq!(https.path.as_deref(), Some("org/repo.git"));

    let scp = RemoteTarget::parse("git@gitlab.com:group/project.git").unwrap();
    assert_eq!(scp.protocol, "ssh");
    assert_eq!(scp.host, "gitlab.com");
    assert_eq!(scp.path.as_deref(), Some("group/project.git"));

    let bare = RemoteTarget::parse("git.example.com:8443").unwrap();
    assert_eq!(bare.host, "git.example.com:8443");
    assert_eq!(bare.path, None);

    assert!(RemoteTarget::parse("  ").is_err());
  }

  #[test]
  fn test_staleness() {
    let now = Utc::now();
    let fresh = Credential::new(Platform::GitHub, "github.com", AuthMethod::Token, "t0ken-value")
      .with_expiry(now + Duration::hours(1));
    assert!(!fresh.is_stale_at(now));

    let expired = fresh.clone().with_expiry(now - Duration::seconds(1));
    assert!(expired.is_stale_at(now));

    let flagged = Credential::new(Platform::GitLab, "gitlab.com", AuthMethod::Token, "t0ken-value")
      .with_metadata(meta::EXPIRED, "true");
    assert!(flagged.is_stale_at(now));

    let garbage = Credential::new(Platform::GitLab, "gitlab.com", AuthMethod::Token, "t0ken-value")
      .with_metadata(meta::EXPIRES_AT, "not a date");
    assert!(garbage.is_stale_at(now));
  }

  #[test]
  fn test_scopes_round_trip_through_metadata() {
    let cred =
      Credential::new(Platform::GitHub, "github.com", AuthMethod::Token, "t0ken-value").with_scopes(&["repo", "read:org"]);
    assert_eq!(cred.scopes(), vec!["repo".to_string(), "read:org".to_string()]);
  }

  #[test]
  fn test_validate_rejects_secret_in_metadata() {
    let cred = Credential::new(Platform::GitHub, "github.com", AuthMethod::Token, "ghp_leaky")
      .with_metadata("note", "token is ghp_leaky");
    let err = cred.validate().unwrap_err();
    assert_eq!(err.code, "METADATA_CONTAINS_SECRET");
    assert!(!err.to_string().contains("ghp_leaky"));
  }

  #[test]
  fn test_validate_ignores_short_secret_matches() {
    let cred =
      Credential::new(Platform::Generic, "git.example.com", AuthMethod::Basic, "ali").with_username("alice");
    assert!(cred.validate().is_ok());

    let cred = Credential::new(Platform::Generic, "git.example.com", AuthMethod::Basic, "main")
      .with_username("dev")
      .with_metadata("branch", "main");
    assert!(cred.validate().is_ok());

    let cred = Credential::new(Platform::Generic, "git.example.com", AuthMethod::Basic, "hunter2hunter2")
      .with_username("hunter2hunter2-bot");
    assert_eq!(cred.validate().unwrap_err().code, "USERNAME_CONTAINS_SECRET");
  }

  #[test]
  fn test_validate_allows_ssh_fingerprint_metadata() {
    let cred = Credential::new(Platform::GitLab, "gitlab.com", AuthMethod::Ssh, "SHA256:abc")
      .with_metadata(meta::SSH_FINGERPRINT, "SHA256:abc");
    assert!(cred.validate().is_ok());
  }

  #[test]
  fn test_validate_rejects_empty_secret_and_key() {
    let cred = Credential::new(Platform::GitHub, "github.com", AuthMethod::Token, "");
    assert_eq!(cred.validate().unwrap_err().code, "SECRET_EMPTY");

    let cred = Credential::new(Platform::GitHub, " ", AuthMethod::Token, "abc");
    assert_eq!(cred.validate().unwrap_err().code, "REPOSITORY_EMPTY");
  }

  #[test]
  fn test_summary_has_no_secret() {
    let cred = Credential::new(Platform::GitHub, "github.com", AuthMethod::Token, "ghp_secretvalue")
      .with_username("octocat");
    let summary = cred.summary("memory");
    let json = serde_json::to_string(&summary).unwrap();
    assert!(!json.contains("ghp_secretvalue"));
    assert_eq!(summary.source, "memory");
    assert_eq!(summary.username.as_deref(), Some("octocat"));
  }
}
