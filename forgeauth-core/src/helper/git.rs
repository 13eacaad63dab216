//! Bridge to git's credential helpers.
//!
//! By default this runs `git credential fill|approve|reject`, which consults
//! whatever helpers the user configured in git. A raw helper program such as
//! `git-credential-store` can be used instead, in which case the
//! `get|store|erase` verbs are passed directly.

use std::time::Duration;

use tracing::{debug, instrument};

use super::CredentialHelper;
use super::process::{self, Invocation};
use super::protocol::HelperMessage;
use crate::error::{AuthError, AuthErrorKind};
use crate::model::{AuthMethod, Credential, Platform, RemoteTarget, meta};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Verb {
  Get,
  Store,
  Erase,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Style {
  /// `git credential fill|approve|reject`
  GitFrontend,
  /// `<program> get|store|erase`
  RawHelper,
}

#[derive(Debug, Clone)]
pub struct GitCredentialHelper {
  name: String,
  program: String,
  style: Style,
  timeout: Duration,
}

impl GitCredentialHelper {
  /// Use `git credential` with the given program (normally `git`)
  pub fn new(program: impl Into<String>, timeout: Duration) -> Self {
    Self {
      name: "git-credential".to_string(),
      program: program.into(),
      style: Style::GitFrontend,
      timeout,
    }
  }

  /// Talk to a `git-credential-*` helper program directly
  pub fn raw(program: impl Into<String>, timeout: Duration) -> Self {
    let program = program.into();
    Self {
      name: program.rsplit(['/', '\\']).next().unwrap_or(&program).to_string(),
      program,
      style: Style::RawHelper,
      timeout,
    }
  }

  pub fn with_name(mut self, name: impl Into<String>) -> Self {
    self.name = name.into();
    self
  }

  fn args(&self, verb: Verb) -> Vec<&'static str> {
    match (self.style, verb) {
      (Style::GitFrontend, Verb::Get) => vec!["credential", "fill"],
      (Style::GitFrontend, Verb::Store) => vec!["credential", "approve"],
      (Style::GitFrontend, Verb::Erase) => vec!["credential", "reject"],
      (Style::RawHelper, Verb::Get) => vec!["get"],
      (Style::RawHelper, Verb::Store) => vec!["store"],
      (Style::RawHelper, Verb::Erase) => vec!["erase"],
    }
  }

  fn exchange(&self, verb: Verb, message: &HelperMessage) -> Result<HelperMessage, AuthError> {
    let input = message.encode().map_err(|e| AuthError::helper_unavailable(&self.name, e))?;
    let args = self.args(verb);
    let output = process::run(&Invocation {
      helper: &self.name,
      program: &self.program,
      args: &args,
      env: &[("GIT_TERMINAL_PROMPT", "0"), ("GCM_INTERACTIVE", "never")],
      stdin: input.as_bytes(),
      timeout: self.timeout,
    })?;

    let text = std::str::from_utf8(&output)
      .map_err(|_| AuthError::helper_unavailable(&self.name, "returned non UTF-8 output"))?;
    HelperMessage::parse(text).map_err(|e| AuthError::helper_unavailable(&self.name, e))
  }

  fn target(key: &str) -> Result<RemoteTarget, AuthError> {
    RemoteTarget::parse(key).map_err(|e| {
      AuthError::new(
        AuthErrorKind::NotFound,
        "AUTH_HELPER_BAD_KEY",
        format!("Repository key cannot be used with a credential helper: {e}"),
      )
    })
  }
}

impl CredentialHelper for GitCredentialHelper {
  fn name(&self) -> &str {
    &self.name
  }

  fn is_available(&self) -> bool {
    process::find_program(&self.program).is_some()
  }

  #[instrument(skip(self), fields(helper = %self.name))]
  fn query(&self, platform: Platform, key: &str) -> Result<Credential, AuthError> {
    let target = Self::target(key)?;
    let response = self.exchange(Verb::Get, &HelperMessage::for_target(&target))?;

    let Some(password) = response.password.filter(|p| !p.is_empty()) else {
      debug!("Helper returned no password");
      return Err(AuthError::not_found(platform, key));
    };

    let mut credential = Credential::new(platform, key, AuthMethod::Token, password)
      .with_metadata(meta::SOURCE, self.name.clone());
    if let Some(username) = response.username.filter(|u| !u.is_empty()) {
      credential = credential.with_username(username);
    }
    Ok(credential)
  }

  #[instrument(skip_all, fields(helper = %self.name, key = %credential.key))]
  fn store(&self, credential: &Credential) -> Result<(), AuthError> {
    let target = Self::target(&credential.key)?;
    let message = HelperMessage::for_target(&target)
      .with_username(credential.username.clone())
      .with_password(credential.secret.clone());
    self.exchange(Verb::Store, &message).map(|_| ())
  }

  #[instrument(skip(self), fields(helper = %self.name))]
  fn erase(&self, _platform: Platform, key: &str) -> Result<(), AuthError> {
    let target = Self::target(key)?;
    self.exchange(Verb::Erase, &HelperMessage::for_target(&target)).map(|_| ())
  }
}

#[cfg(all(test, unix))]
mod tests {
  use std::fs;
  use std::os::unix::fs::PermissionsExt;

  use tempfile::TempDir;

  use super::*;

  fn script(dir: &TempDir, body: &str) -> String {
    let path = dir.path().join("git-credential-fake");
    fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path.to_string_lossy().into_owned()
  }

  #[test]
  fn test_query_parses_helper_output() {
    let dir = TempDir::new().unwrap();
    let program = script(
      &dir,
      "cat > /dev/null; printf 'protocol=https\\nhost=github.com\\nusername=octocat\\npassword=ghp_fromhelper\\n'",
    );
    let helper = GitCredentialHelper::raw(program, Duration::from_secs(5));
    assert_eq!(helper.name(), "git-credential-fake");
    assert!(helper.is_available());

    let credential = helper.query(Platform::GitHub, "github.com").unwrap();
    assert_eq!(credential.secret.expose(), b"ghp_fromhelper");
    assert_eq!(credential.username.as_deref(), Some("octocat"));
    assert_eq!(credential.metadata.get(meta::SOURCE).map(String::as_str), Some("git-credential-fake"));
  }

  #[test]
  fn test_query_receives_request_on_stdin() {
    let dir = TempDir::new().unwrap();
    let captured = dir.path().join("stdin.txt");
    let program = script(
      &dir,
      &format!("cat > '{}'; echo \"$1\" >> '{}'; echo password=x", captured.display(), captured.display()),
    );
    GitCredentialHelper::raw(program, Duration::from_secs(5))
      .query(Platform::GitLab, "https://gitlab.com/group/project.git")
      .unwrap();

    let seen = fs::read_to_string(captured).unwrap();
    assert_eq!(seen, "protocol=https\nhost=gitlab.com\npath=group/project.git\n\nget\n");
  }

  #[test]
  fn test_empty_response_is_not_found() {
    let dir = TempDir::new().unwrap();
    let program = script(&dir, "cat > /dev/null");
    let err = GitCredentialHelper::raw(program, Duration::from_secs(5))
      .query(Platform::GitHub, "github.com")
      .unwrap_err();
    assert!(err.is(AuthErrorKind::NotFound));
  }

  #[test]
  fn test_failing_helper_is_unavailable() {
    let dir = TempDir::new().unwrap();
    let program = script(&dir, "exit 1");
    let err = GitCredentialHelper::raw(program, Duration::from_secs(5))
      .query(Platform::GitHub, "github.com")
      .unwrap_err();
    assert!(err.is(AuthErrorKind::HelperUnavailable));
  }

  #[test]
  fn test_store_and_erase_send_verbs() {
    let dir = TempDir::new().unwrap();
    let log = dir.path().join("log.txt");
    let program = script(&dir, &format!("echo \"$1\" >> '{}'; cat > /dev/null", log.display()));
    let helper = GitCredentialHelper::raw(program, Duration::from_secs(5));

    let credential = Credential::new(Platform::GitHub, "github.com", AuthMethod::Token, "tok");
    helper.store(&credential).unwrap();
    helper.erase(Platform::GitHub, "github.com").unwrap();
    assert_eq!(fs::read_to_string(log).unwrap(), "store\nerase\n");
  }

  #[test]
  fn test_missing_program_is_not_available() {
    let helper = GitCredentialHelper::new("/nonexistent/git", Duration::from_secs(1));
    assert!(!helper.is_available());
  }
}
