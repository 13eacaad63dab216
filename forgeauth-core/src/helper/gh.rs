//! Read-only bridge to the GitHub CLI (`gh auth token`)

use std::time::Duration;

use tracing::instrument;
use zeroize::Zeroizing;

use super::CredentialHelper;
use super::process::{self, Invocation};
use crate::error::AuthError;
use crate::model::{AuthMethod, Credential, Platform, RemoteTarget, meta};
use crate::secret::Secret;

#[derive(Debug, Clone)]
pub struct GhCliHelper {
  program: String,
  timeout: Duration,
}

impl GhCliHelper {
  pub fn new(timeout: Duration) -> Self {
    Self::with_program("gh", timeout)
  }

  pub fn with_program(program: impl Into<String>, timeout: Duration) -> Self {
    Self {
      program: program.into(),
      timeout,
    }
  }
}

impl CredentialHelper for GhCliHelper {
  fn name(&self) -> &str {
    "gh"
  }

  fn is_available(&self) -> bool {
    process::find_program(&self.program).is_some()
  }

  #[instrument(skip(self))]
  fn query(&self, platform: Platform, key: &str) -> Result<Credential, AuthError> {
    if platform != Platform::GitHub {
      return Err(AuthError::not_found(platform, key));
    }
    let host = RemoteTarget::parse(key)
      .map(|t| t.host)
      .map_err(|_| AuthError::not_found(platform, key))?;

    let output = process::run(&Invocation {
      helper: self.name(),
      program: &self.program,
      args: &["auth", "token", "--hostname", &host],
      env: &[("GH_PROMPT_DISABLED", "1")],
      stdin: b"",
      timeout: self.timeout,
    })?;

    let text = Zeroizing::new(String::from_utf8_lossy(&output).trim().to_string());
    if text.is_empty() {
      return Err(AuthError::not_found(platform, key));
    }

    Ok(
      Credential::new(platform, key, AuthMethod::Token, Secret::from(text.as_str()))
        .with_metadata(meta::SOURCE, self.name()),
    )
  }
}

#[cfg(all(test, unix))]
mod tests {
  use std::fs;
  use std::os::unix::fs::PermissionsExt;

  use tempfile::TempDir;

  use super::*;
  use crate::error::AuthErrorKind;

  fn fake_gh(dir: &TempDir, body: &str) -> String {
    let path = dir.path().join("gh");
    fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path.to_string_lossy().into_owned()
  }

  #[test]
  fn test_token_is_trimmed() {
    let dir = TempDir::new().unwrap();
    let helper = GhCliHelper::with_program(fake_gh(&dir, "echo \"  gho_fromgh  \""), Duration::from_secs(5));
    let credential = helper.query(Platform::GitHub, "github.com").unwrap();
    assert_eq!(credential.secret.expose(), b"gho_fromgh");
    assert_eq!(credential.method, AuthMethod::Token);
  }

  #[test]
  fn test_hostname_is_passed() {
    let dir = TempDir::new().unwrap();
    let helper = GhCliHelper::with_program(fake_gh(&dir, "echo \"$4\""), Duration::from_secs(5));
    let credential = helper
      .query(Platform::GitHub, "https://github.example.com/org/repo")
      .unwrap();
    assert_eq!(credential.secret.expose(), b"github.example.com");
  }

  #[test]
  fn test_other_platforms_are_not_found() {
    let dir = TempDir::new().unwrap();
    let helper = GhCliHelper::with_program(fake_gh(&dir, "echo tok"), Duration::from_secs(5));
    assert!(helper.query(Platform::GitLab, "gitlab.com").unwrap_err().is(AuthErrorKind::NotFound));
  }

  #[test]
  fn test_logged_out_gh_is_unavailable() {
    let dir = TempDir::new().unwrap();
    let helper = GhCliHelper::with_program(fake_gh(&dir, "echo 'not logged in' >&2; exit 1"), Duration::from_secs(5));
    assert!(helper.query(Platform::GitHub, "github.com").unwrap_err().is(AuthErrorKind::HelperUnavailable));
  }

  #[test]
  fn test_store_is_unsupported() {
    let helper = GhCliHelper::new(Duration::from_secs(1));
    let credential = Credential::new(Platform::GitHub, "github.com", AuthMethod::Token, "tok");
    assert!(helper.store(&credential).unwrap_err().is(AuthErrorKind::Unsupported));
  }
}
