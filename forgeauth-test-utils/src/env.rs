//! Environment variable management for testing
//!
//! Guards that point XDG directories and HOME at a per-test temporary
//! directory, and restore every variable they touched on drop.

use std::env;
use std::ffi::OsString;
use std::path::PathBuf;

use tempfile::TempDir;

/// Overrides one environment variable for the guard's lifetime
pub struct VarGuard {
  name: String,
  original: Option<OsString>,
}

impl VarGuard {
  /// Set `name` to `value`
  pub fn set(name: &str, value: impl Into<OsString>) -> Self {
    let original = env::var_os(name);
    unsafe {
      env::set_var(name, value.into());
    }
    Self {
      name: name.to_string(),
      original,
    }
  }

  /// Remove `name` from the environment
  pub fn unset(name: &str) -> Self {
    let original = env::var_os(name);
    unsafe {
      env::remove_var(name);
    }
    Self {
      name: name.to_string(),
      original,
    }
  }
}

impl Drop for VarGuard {
  fn drop(&mut self) {
    match &self.original {
      Some(val) => unsafe {
        env::set_var(&self.name, val);
      },
      None => unsafe {
        env::remove_var(&self.name);
      },
    }
  }
}

/// A test environment that overrides XDG directories and HOME to use a
/// per-test temporary directory, and hides the caller's SSH agent and
/// passphrase
pub struct EnvTestGuard {
  /// The temporary directory backing every overridden location
  pub temp_dir: TempDir,
  vars: Vec<VarGuard>,
}

impl Default for EnvTestGuard {
  fn default() -> Self {
    Self::new()
  }
}

impl EnvTestGuard {
  pub const XDG_CONFIG_HOME: &'static str = "XDG_CONFIG_HOME";
  pub const XDG_DATA_HOME: &'static str = "XDG_DATA_HOME";
  pub const XDG_CACHE_HOME: &'static str = "XDG_CACHE_HOME";

  pub fn new() -> Self {
    let temp_dir = TempDir::new().expect("Failed to create temporary directory");
    let temp_path = temp_dir.path().to_path_buf();

    for sub in ["config", "data", "cache", "home"] {
      std::fs::create_dir_all(temp_path.join(sub)).expect("Failed to create test directory");
    }

    let vars = vec![
      VarGuard::set(Self::XDG_CONFIG_HOME, temp_path.join("config")),
      VarGuard::set(Self::XDG_DATA_HOME, temp_path.join("data")),
      VarGuard::set(Self::XDG_CACHE_HOME, temp_path.join("cache")),
      VarGuard::set("HOME", temp_path.join("home")),
      VarGuard::unset("SSH_AUTH_SOCK"),
      VarGuard::unset("FORGEAUTH_PASSPHRASE"),
    ];

    Self { temp_dir, vars }
  }

  pub fn config_dir(&self) -> PathBuf {
    self.temp_dir.path().join("config")
  }

  pub fn data_dir(&self) -> PathBuf {
    self.temp_dir.path().join("data")
  }

  pub fn home_dir(&self) -> PathBuf {
    self.temp_dir.path().join("home")
  }
}
