//! # Git Utilities
//!
//! Repository discovery and remote inspection used to pick a default
//! repository key when the caller does not name one.

use std::env;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use git2::Repository;

/// Detect if the current directory or any parent directory is a Git repository
pub fn detect_repository() -> Option<PathBuf> {
  let current_dir = env::current_dir().ok()?;
  detect_repository_from_path(&current_dir)
}

/// Detect if the given path or any parent directory is a Git repository
pub fn detect_repository_from_path<P: AsRef<Path>>(path: P) -> Option<PathBuf> {
  match Repository::discover(path.as_ref()) {
    Ok(repo) => repo.workdir().map(|workdir| workdir.to_path_buf()),
    Err(_) => None,
  }
}

/// URL of a named remote in the repository containing `path`
pub fn remote_url<P: AsRef<Path>>(path: P, remote: &str) -> Result<Option<String>> {
  let repo = Repository::discover(path.as_ref()).context("Failed to open Git repository")?;
  match repo.find_remote(remote) {
    Ok(found) => Ok(found.url().map(str::to_string)),
    Err(e) if e.code() == git2::ErrorCode::NotFound => Ok(None),
    Err(e) => Err(e).with_context(|| format!("Failed to read remote '{remote}'")),
  }
}

/// The `origin` URL of the repository containing the current directory
pub fn current_origin_url() -> Option<String> {
  let repo_path = detect_repository()?;
  remote_url(repo_path, "origin").ok().flatten()
}
