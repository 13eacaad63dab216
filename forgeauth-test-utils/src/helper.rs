//! Fake credential helper programs
//!
//! Each fake is a small shell script in its own temporary directory. Every
//! invocation appends its arguments to a log so tests can assert how often
//! and with which verb the helper ran.

#![cfg(unix)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;

use tempfile::TempDir;

pub struct FakeHelperScript {
  dir: TempDir,
  program: PathBuf,
  log: PathBuf,
}

impl FakeHelperScript {
  /// A helper that prints `output` (helper-protocol lines) and exits 0
  pub fn responding(output: &str) -> Self {
    let escaped = output.replace('\'', "'\\''");
    Self::with_body(&format!("cat > /dev/null\nprintf '%s' '{escaped}'"))
  }

  /// A helper that exits with `code` without printing anything
  pub fn failing(code: i32) -> Self {
    Self::with_body(&format!("exit {code}"))
  }

  /// A helper that sleeps far longer than any test timeout
  pub fn hanging() -> Self {
    Self::with_body("sleep 30")
  }

  /// A helper running an arbitrary shell body
  pub fn with_body(body: &str) -> Self {
    let dir = TempDir::new().expect("Failed to create temporary directory");
    let program = dir.path().join("git-credential-fake");
    let log = dir.path().join("invocations.log");

    let script = format!("#!/bin/sh\necho \"$*\" >> '{}'\n{body}\n", log.display());
    fs::write(&program, script).expect("Failed to write fake helper");
    fs::set_permissions(&program, fs::Permissions::from_mode(0o755)).expect("Failed to mark fake helper executable");

    Self { dir, program, log }
  }

  /// Path to pass as the helper program
  pub fn program(&self) -> String {
    self.program.to_string_lossy().into_owned()
  }

  /// Arguments of every invocation so far, one entry per call
  pub fn invocations(&self) -> Vec<String> {
    fs::read_to_string(&self.log)
      .map(|content| content.lines().map(str::to_string).collect())
      .unwrap_or_default()
  }

  pub fn dir(&self) -> &std::path::Path {
    self.dir.path()
  }
}
