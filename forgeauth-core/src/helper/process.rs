//! Bounded execution of external helper programs

use std::env;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;
use zeroize::Zeroizing;

use crate::error::AuthError;

/// Invocation of an external program
pub(crate) struct Invocation<'a> {
  /// Helper name used in errors
  pub helper: &'a str,
  pub program: &'a str,
  pub args: &'a [&'a str],
  pub env: &'a [(&'a str, &'a str)],
  pub stdin: &'a [u8],
  pub timeout: Duration,
}

/// Run a program to completion within its timeout and return its stdout.
///
/// A missing program, a non-zero exit, or a timeout all map to
/// `HelperUnavailable`. The child is killed when the timeout elapses.
pub(crate) fn run(invocation: &Invocation<'_>) -> Result<Zeroizing<Vec<u8>>, AuthError> {
  let helper = invocation.helper;
  let runtime = tokio::runtime::Builder::new_current_thread()
    .enable_all()
    .build()
    .map_err(|e| AuthError::helper_unavailable(helper, format!("failed to create runtime: {e}")))?;

  let outcome = runtime.block_on(async {
    let mut command = Command::new(invocation.program);
    command
      .args(invocation.args)
      .stdin(Stdio::piped())
      .stdout(Stdio::piped())
      .stderr(Stdio::piped())
      .kill_on_drop(true);
    for (key, value) in invocation.env {
      command.env(key, value);
    }

    let mut child = command.spawn()?;
    let stdin = child.stdin.take();
    let exchange = async move {
      if let Some(mut pipe) = stdin {
        match pipe.write_all(invocation.stdin).await {
          Err(e) if e.kind() != io::ErrorKind::BrokenPipe => return Err(e),
          _ => {}
        }
        drop(pipe);
      }
      child.wait_with_output().await
    };
    Ok::<_, io::Error>(tokio::time::timeout(invocation.timeout, exchange).await)
  });

  match outcome {
    Err(e) if e.kind() == io::ErrorKind::NotFound => {
      Err(AuthError::helper_unavailable(helper, format!("'{}' is not installed", invocation.program)))
    }
    Err(e) => Err(AuthError::helper_unavailable(helper, e)),
    Ok(Err(_elapsed)) => Err(AuthError::helper_unavailable(
      helper,
      format!("timed out after {}ms", invocation.timeout.as_millis()),
    )),
    Ok(Ok(Err(e))) => Err(AuthError::helper_unavailable(helper, e)),
    Ok(Ok(Ok(output))) => {
      let stdout = Zeroizing::new(output.stdout);
      if output.status.success() {
        Ok(stdout)
      } else {
        // stderr may echo user input, so only its size is recorded
        debug!(helper, status = %output.status, stderr_bytes = output.stderr.len(), "Helper exited unsuccessfully");
        Err(AuthError::helper_unavailable(helper, format!("exited with {}", output.status)))
      }
    }
  }
}

/// Locate `program` on `PATH`, or check it directly when it is a path
pub(crate) fn find_program(program: &str) -> Option<PathBuf> {
  let candidate = Path::new(program);
  if candidate.components().count() > 1 {
    return candidate.is_file().then(|| candidate.to_path_buf());
  }

  let path_var = env::var_os("PATH")?;
  env::split_paths(&path_var).find_map(|dir| {
    let full = dir.join(program);
    if full.is_file() {
      return Some(full);
    }
    if cfg!(windows) {
      let exe = dir.join(format!("{program}.exe"));
      if exe.is_file() {
        return Some(exe);
      }
    }
    None
  })
}
