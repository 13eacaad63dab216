//! # SSH Agent Client
//!
//! Enumerates the identities held by a running SSH agent. Only public key
//! blobs and comments are read; private key material never leaves the agent.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD_NO_PAD;
use sha2::{Digest, Sha256};
use tracing::{debug, instrument};

use crate::error::AuthError;

const SSH_AGENT_FAILURE: u8 = 5;
const SSH_AGENTC_REQUEST_IDENTITIES: u8 = 11;
const SSH_AGENT_IDENTITIES_ANSWER: u8 = 12;
const MAX_RESPONSE_LEN: usize = 256 * 1024;

/// A public identity held by the agent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshKey {
  /// `SHA256:<base64>` fingerprint of the public key blob
  pub fingerprint: String,
  pub comment: String,
  /// Algorithm name, e.g. `ssh-ed25519`
  pub key_type: String,
}

pub trait SshAgent: Send + Sync {
  fn is_available(&self) -> bool;

  /// Identities currently loaded in the agent; empty when there are none
  fn list_keys(&self) -> Result<Vec<SshKey>, AuthError>;
}

/// Agent client speaking the ssh-agent protocol over a Unix socket
#[derive(Debug, Clone)]
pub struct SshAgentClient {
  socket: Option<PathBuf>,
  timeout: Duration,
}

impl SshAgentClient {
  /// Use `SSH_AUTH_SOCK` unless `socket` is given
  pub fn new(socket: Option<PathBuf>, timeout: Duration) -> Self {
    Self { socket, timeout }
  }

  fn socket_path(&self) -> Option<PathBuf> {
    self
      .socket
      .clone()
      .or_else(|| env::var_os("SSH_AUTH_SOCK").map(PathBuf::from))
      .filter(|p| !p.as_os_str().is_empty())
  }

  #[cfg(unix)]
  fn request_identities(&self) -> Result<Vec<u8>, AuthError> {
    use std::io::{Read, Write};
    use std::os::unix::net::UnixStream;

    let path = self
      .socket_path()
      .ok_or_else(|| AuthError::agent_unavailable("SSH_AUTH_SOCK is not set"))?;
    let mut stream = UnixStream::connect(&path).map_err(AuthError::agent_unavailable)?;
    let timeout = Some(self.timeout.max(Duration::from_millis(1)));
    stream
      .set_read_timeout(timeout)
      .and_then(|()| stream.set_write_timeout(timeout))
      .map_err(AuthError::agent_unavailable)?;

    stream
      .write_all(&[0, 0, 0, 1, SSH_AGENTC_REQUEST_IDENTITIES])
      .map_err(AuthError::agent_unavailable)?;

    let mut len = [0u8; 4];
    stream.read_exact(&mut len).map_err(AuthError::agent_unavailable)?;
    let len = u32::from_be_bytes(len) as usize;
    if len == 0 || len > MAX_RESPONSE_LEN {
      return Err(AuthError::agent_unavailable(format!("invalid response length {len}")));
    }
    let mut body = vec![0u8; len];
    stream.read_exact(&mut body).map_err(AuthError::agent_unavailable)?;
    Ok(body)
  }

  #[cfg(not(unix))]
  fn request_identities(&self) -> Result<Vec<u8>, AuthError> {
    Err(AuthError::agent_unavailable("agent sockets are only supported on Unix"))
  }
}

impl SshAgent for SshAgentClient {
  fn is_available(&self) -> bool {
    #[cfg(unix)]
    {
      self
        .socket_path()
        .is_some_and(|path| std::os::unix::net::UnixStream::connect(path).is_ok())
    }
    #[cfg(not(unix))]
    {
      false
    }
  }

  #[instrument(skip(self))]
  fn list_keys(&self) -> Result<Vec<SshKey>, AuthError> {
    let body = self.request_identities()?;
    let keys = parse_identities_answer(&body)?;
    debug!(count = keys.len(), "Listed agent identities");
    Ok(keys)
  }
}

/// Cursor over SSH wire-format data
struct Reader<'a> {
  data: &'a [u8],
}

impl<'a> Reader<'a> {
  fn u8(&mut self) -> Option<u8> {
    let (first, rest) = self.data.split_first()?;
    self.data = rest;
    Some(*first)
  }

  fn u32(&mut self) -> Option<u32> {
    if self.data.len() < 4 {
      return None;
    }
    let (head, rest) = self.data.split_at(4);
    self.data = rest;
    Some(u32::from_be_bytes([head[0], head[1], head[2], head[3]]))
  }

  fn string(&mut self) -> Option<&'a [u8]> {
    let len = self.u32()? as usize;
    if self.data.len() < len {
      return None;
    }
    let (value, rest) = self.data.split_at(len);
    self.data = rest;
    Some(value)
  }
}

fn malformed(what: &str) -> AuthError {
  AuthError::agent_unavailable(format!("malformed agent response ({what})"))
}

/// Parse the body of an `SSH_AGENT_IDENTITIES_ANSWER` message
pub fn parse_identities_answer(body: &[u8]) -> Result<Vec<SshKey>, AuthError> {
  let mut reader = Reader { data: body };
  match reader.u8() {
    Some(SSH_AGENT_IDENTITIES_ANSWER) => {}
    Some(SSH_AGENT_FAILURE) => return Err(AuthError::agent_unavailable("agent refused the request")),
    Some(other) => return Err(malformed(&format!("unexpected message type {other}"))),
    None => return Err(malformed("empty")),
  }

  let count = reader.u32().ok_or_else(|| malformed("missing key count"))?;
  let mut keys = Vec::with_capacity(count.min(64) as usize);
  for _ in 0..count {
    let blob = reader.string().ok_or_else(|| malformed("truncated key blob"))?;
    let comment = reader.string().ok_or_else(|| malformed("truncated comment"))?;
    let key_type = Reader { data: blob }
      .string()
      .map(|t| String::from_utf8_lossy(t).into_owned())
      .unwrap_or_else(|| "unknown".to_string());

    keys.push(SshKey {
      fingerprint: fingerprint(blob),
      comment: String::from_utf8_lossy(comment).into_owned(),
      key_type,
    });
  }
  Ok(keys)
}

/// OpenSSH-style SHA256 fingerprint of a public key blob
pub fn fingerprint(blob: &[u8]) -> String {
  format!("SHA256:{}", STANDARD_NO_PAD.encode(Sha256::digest(blob)))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::error::AuthErrorKind;

  fn ssh_string(out: &mut Vec<u8>, value: &[u8]) {
    out.extend_from_slice(&(value.len() as u32).to_be_bytes());
    out.extend_from_slice(value);
  }

  fn answer(keys: &[(&str, &[u8], &str)]) -> Vec<u8> {
    let mut body = vec![SSH_AGENT_IDENTITIES_ANSWER];
    body.extend_from_slice(&(keys.len() as u32).to_be_bytes());
    for (key_type, material, comment) in keys {
      let mut blob = Vec::new();
      ssh_string(&mut blob, key_type.as_bytes());
      ssh_string(&mut blob, material);
      ssh_string(&mut body, &blob);
      ssh_string(&mut body, comment.as_bytes());
    }
    body
  }

  #[test]
  fn test_parse_identities() {
    let body = answer(&[("ssh-ed25519", &[7u8; 32], "me@laptop"), ("ssh-rsa", &[1u8; 64], "")]);
    let keys = parse_identities_answer(&body).unwrap();
    assert_eq!(keys.len(), 2);
    assert_eq!(keys[0].key_type, "ssh-ed25519");
    assert_eq!(keys[0].comment, "me@laptop");
    assert!(keys[0].fingerprint.starts_with("SHA256:"));
    assert!(!keys[0].fingerprint.ends_with('='));
    assert_ne!(keys[0].fingerprint, keys[1].fingerprint);
  }

  #[test]
  fn test_parse_empty_agent() {
    assert!(parse_identities_answer(&answer(&[])).unwrap().is_empty());
  }

  #[test]
  fn test_parse_failure_and_truncation() {
    assert!(parse_identities_answer(&[SSH_AGENT_FAILURE]).unwrap_err().is(AuthErrorKind::AgentUnavailable));

    let mut body = answer(&[("ssh-ed25519", &[7u8; 32], "me")]);
    body.truncate(body.len() - 3);
    assert!(parse_identities_answer(&body).unwrap_err().message.contains("malformed"));
  }

  #[test]
  fn test_fingerprint_format() {
    // SHA256 of the empty input
    assert_eq!(fingerprint(b""), "SHA256:47DEQpj8HBSa+/TImW+5JCeuQeRkm5NMpJWZG3hSuFU");
  }

  #[test]
  fn test_unset_socket_is_unavailable() {
    let client = SshAgentClient::new(Some(PathBuf::from("/nonexistent/agent.sock")), Duration::from_millis(100));
    assert!(!client.is_available());
    assert!(client.list_keys().unwrap_err().is(AuthErrorKind::AgentUnavailable));
  }
}
