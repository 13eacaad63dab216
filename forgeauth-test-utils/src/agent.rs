//! A fake SSH agent that answers identity requests on a Unix socket

#![cfg(unix)]

use std::io::{Read, Write};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread::{self, JoinHandle};

use tempfile::TempDir;

const REQUEST_IDENTITIES: u8 = 11;
const IDENTITIES_ANSWER: u8 = 12;
const FAILURE: u8 = 5;

/// Public identity served by the fake agent
#[derive(Debug, Clone)]
pub struct FakeIdentity {
  pub key_type: String,
  pub material: Vec<u8>,
  pub comment: String,
}

impl FakeIdentity {
  pub fn ed25519(comment: &str) -> Self {
    Self {
      key_type: "ssh-ed25519".to_string(),
      material: comment.bytes().cycle().take(32).collect(),
      comment: comment.to_string(),
    }
  }

  /// Wire-format public key blob
  pub fn blob(&self) -> Vec<u8> {
    let mut blob = Vec::new();
    put_string(&mut blob, self.key_type.as_bytes());
    put_string(&mut blob, &self.material);
    blob
  }
}

fn put_string(out: &mut Vec<u8>, value: &[u8]) {
  out.extend_from_slice(&(value.len() as u32).to_be_bytes());
  out.extend_from_slice(value);
}

pub struct FakeSshAgent {
  _dir: TempDir,
  socket: PathBuf,
  stop: Arc<AtomicBool>,
  requests: Arc<AtomicUsize>,
  handle: Option<JoinHandle<()>>,
}

impl FakeSshAgent {
  /// Start an agent holding `identities`
  pub fn start(identities: Vec<FakeIdentity>) -> Self {
    let dir = TempDir::new().expect("Failed to create temporary directory");
    let socket = dir.path().join("agent.sock");
    let listener = UnixListener::bind(&socket).expect("Failed to bind fake agent socket");

    let stop = Arc::new(AtomicBool::new(false));
    let requests = Arc::new(AtomicUsize::new(0));
    let thread_stop = Arc::clone(&stop);
    let thread_requests = Arc::clone(&requests);

    let handle = thread::spawn(move || {
      for stream in listener.incoming() {
        if thread_stop.load(Ordering::SeqCst) {
          break;
        }
        if let Ok(stream) = stream {
          if serve(stream, &identities) {
            thread_requests.fetch_add(1, Ordering::SeqCst);
          }
        }
      }
    });

    Self {
      _dir: dir,
      socket,
      stop,
      requests,
      handle: Some(handle),
    }
  }

  pub fn socket_path(&self) -> &Path {
    &self.socket
  }

  /// Number of identity requests answered
  pub fn requests(&self) -> usize {
    self.requests.load(Ordering::SeqCst)
  }
}

impl Drop for FakeSshAgent {
  fn drop(&mut self) {
    self.stop.store(true, Ordering::SeqCst);
    // Wake the accept loop so it can observe the stop flag
    let _ = UnixStream::connect(&self.socket);
    if let Some(handle) = self.handle.take() {
      let _ = handle.join();
    }
  }
}

/// Answer one request; returns whether it was an identity request
fn serve(mut stream: UnixStream, identities: &[FakeIdentity]) -> bool {
  let mut len = [0u8; 4];
  if stream.read_exact(&mut len).is_err() {
    return false;
  }
  let mut body = vec![0u8; u32::from_be_bytes(len) as usize];
  if stream.read_exact(&mut body).is_err() {
    return false;
  }

  let mut reply = Vec::new();
  let is_identity_request = body.first() == Some(&REQUEST_IDENTITIES);
  if is_identity_request {
    reply.push(IDENTITIES_ANSWER);
    reply.extend_from_slice(&(identities.len() as u32).to_be_bytes());
    for identity in identities {
      put_string(&mut reply, &identity.blob());
      put_string(&mut reply, identity.comment.as_bytes());
    }
  } else {
    reply.push(FAILURE);
  }

  let mut framed = (reply.len() as u32).to_be_bytes().to_vec();
  framed.extend_from_slice(&reply);
  let _ = stream.write_all(&framed);
  is_identity_request
}
