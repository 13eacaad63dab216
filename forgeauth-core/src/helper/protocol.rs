//! The git credential-helper line protocol.
//!
//! A message is a sequence of `key=value` lines terminated by a blank line or
//! end of input. Unknown keys are ignored. Values may not contain a newline
//! or NUL byte.

use std::fmt::Write as _;

use zeroize::Zeroizing;

use crate::error::ValidationError;
use crate::model::RemoteTarget;
use crate::secret::Secret;

/// Fields exchanged with a credential helper
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HelperMessage {
  pub protocol: Option<String>,
  pub host: Option<String>,
  pub path: Option<String>,
  pub username: Option<String>,
  pub password: Option<Secret>,
}

impl HelperMessage {
  /// Request for the credential of a repository key
  pub fn for_target(target: &RemoteTarget) -> Self {
    Self {
      // Helpers key HTTPS and SSH remotes the same way
      protocol: Some(if target.protocol == "http" { "http" } else { "https" }.to_string()),
      host: Some(target.host.clone()),
      path: target.path.clone(),
      ..Self::default()
    }
  }

  pub fn with_username(mut self, username: Option<String>) -> Self {
    self.username = username;
    self
  }

  pub fn with_password(mut self, password: Secret) -> Self {
    self.password = Some(password);
    self
  }

  /// Render the message, including the terminating blank line
  pub fn encode(&self) -> Result<Zeroizing<String>, ValidationError> {
    let mut out = Zeroizing::new(String::new());
    let plain = [
      ("protocol", self.protocol.as_deref()),
      ("host", self.host.as_deref()),
      ("path", self.path.as_deref()),
      ("username", self.username.as_deref()),
    ];
    for (key, value) in plain {
      if let Some(value) = value {
        check_value(key, value.as_bytes())?;
        let _ = writeln!(out, "{key}={value}");
      }
    }
    if let Some(password) = &self.password {
      check_value("password", password.expose())?;
      let text = password.expose_str().ok_or_else(|| {
        ValidationError::new("password", "HELPER_VALUE_NOT_UTF8", "password must be valid UTF-8")
      })?;
      out.push_str("password=");
      out.push_str(text);
      out.push('\n');
    }
    out.push('\n');
    Ok(out)
  }

  /// Parse a message up to the first blank line
  pub fn parse(input: &str) -> Result<Self, ValidationError> {
    let mut message = Self::default();
    for line in input.lines() {
      if line.is_empty() {
        break;
      }
      let Some((key, value)) = line.split_once('=') else {
        return Err(ValidationError::new(
          "helper_input",
          "HELPER_LINE_MALFORMED",
          "expected a key=value line",
        ));
      };
      check_value(key, value.as_bytes())?;
      match key {
        "protocol" => message.protocol = Some(value.to_string()),
        "host" => message.host = Some(value.to_string()),
        "path" => message.path = Some(value.to_string()),
        "username" => message.username = Some(value.to_string()),
        "password" => message.password = Some(Secret::from(value)),
        "url" => {
          let target = RemoteTarget::parse(value)?;
          message.protocol = Some(target.protocol);
          message.host = Some(target.host);
          message.path = target.path;
        }
        _ => {}
      }
    }
    Ok(message)
  }

  /// Repository key for this message: `host` or `host/path`
  pub fn repository_key(&self) -> Option<String> {
    let host = self.host.as_deref().filter(|h| !h.is_empty())?;
    Some(match self.path.as_deref().filter(|p| !p.is_empty()) {
      Some(path) => format!("{host}/{path}"),
      None => host.to_string(),
    })
  }
}

fn check_value(key: &str, value: &[u8]) -> Result<(), ValidationError> {
  if value.iter().any(|b| *b == b'\n' || *b == b'\0') {
    return Err(ValidationError::new(
      key,
      "HELPER_VALUE_INVALID",
      "value must not contain a newline or NUL byte",
    ));
  }
  Ok(())
}
