//! Owner-only permissions for credential files and their directories

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

/// Platform-specific file permission operations
pub trait FilePermissions {
  /// Restrict a credential file to its owner
  fn set_secure_permissions(path: &Path) -> Result<()>;

  /// Restrict a directory holding credential files to its owner
  fn set_secure_dir_permissions(path: &Path) -> Result<()>;

  /// Check whether a file is only accessible by its owner
  fn has_secure_permissions(path: &Path) -> Result<bool>;
}

#[cfg(unix)]
pub struct UnixFilePermissions;

#[cfg(unix)]
impl FilePermissions for UnixFilePermissions {
  fn set_secure_permissions(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let mut perms = fs::metadata(path).context("Failed to get file metadata")?.permissions();
    perms.set_mode(0o600);
    fs::set_permissions(path, perms).context("Failed to set secure permissions")
  }

  fn set_secure_dir_permissions(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let mut perms = fs::metadata(path)
      .context("Failed to get directory metadata")?
      .permissions();
    perms.set_mode(0o700);
    fs::set_permissions(path, perms).context("Failed to set secure directory permissions")
  }

  fn has_secure_permissions(path: &Path) -> Result<bool> {
    use std::os::unix::fs::PermissionsExt;

    let mode = fs::metadata(path).context("Failed to get file metadata")?.permissions().mode();
    Ok(mode & 0o077 == 0)
  }
}

#[cfg(not(unix))]
pub struct OtherFilePermissions;

#[cfg(not(unix))]
impl FilePermissions for OtherFilePermissions {
  fn set_secure_permissions(_path: &Path) -> Result<()> {
    // Relies on the per-user profile ACLs
    Ok(())
  }

  fn set_secure_dir_permissions(_path: &Path) -> Result<()> {
    Ok(())
  }

  fn has_secure_permissions(path: &Path) -> Result<bool> {
    Ok(path.exists())
  }
}

#[cfg(unix)]
pub type PlatformFilePermissions = UnixFilePermissions;
#[cfg(not(unix))]
pub type PlatformFilePermissions = OtherFilePermissions;
