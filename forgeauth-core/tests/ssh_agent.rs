#![cfg(unix)]

use std::time::Duration;

use forgeauth_core::ssh_agent::{SshAgent, SshAgentClient, fingerprint};
use forgeauth_test_utils::{FakeIdentity, FakeSshAgent};

fn client_for(agent: &FakeSshAgent) -> SshAgentClient {
  SshAgentClient::new(Some(agent.socket_path().to_path_buf()), Duration::from_secs(2))
}

#[test]
fn test_lists_identities_from_running_agent() {
  let work = FakeIdentity::ed25519("work@laptop");
  let personal = FakeIdentity::ed25519("me@home");
  let agent = FakeSshAgent::start(vec![work.clone(), personal.clone()]);
  let client = client_for(&agent);

  let keys = client.list_keys().unwrap();
  assert_eq!(keys.len(), 2);
  assert_eq!(keys[0].comment, "work@laptop");
  assert_eq!(keys[0].key_type, "ssh-ed25519");
  assert_eq!(keys[0].fingerprint, fingerprint(&work.blob()));
  assert_eq!(keys[1].fingerprint, fingerprint(&personal.blob()));
  assert!(keys[0].fingerprint.starts_with("SHA256:"));
}

#[test]
fn test_empty_agent_returns_no_keys() {
  let agent = FakeSshAgent::start(Vec::new());
  let keys = client_for(&agent).list_keys().unwrap();
  assert!(keys.is_empty());
}

#[test]
fn test_agent_reported_available() {
  let agent = FakeSshAgent::start(vec![FakeIdentity::ed25519("ci")]);
  assert!(client_for(&agent).is_available());
}

#[test]
fn test_missing_socket_is_unavailable() {
  let client = SshAgentClient::new(Some("/nonexistent/agent.sock".into()), Duration::from_millis(200));
  assert!(!client.is_available());
  let err = client.list_keys().unwrap_err();
  assert_eq!(err.kind, forgeauth_core::AuthErrorKind::AgentUnavailable);
}
