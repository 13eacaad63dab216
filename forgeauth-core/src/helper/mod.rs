//! # Credential Helper Bridge
//!
//! Wraps external programs that already know the user's credentials (git's
//! configured credential helpers, platform CLIs) behind one read-mostly
//! interface. Every call is bounded by the external-process timeout.

pub mod gh;
pub mod git;
pub(crate) mod process;
pub mod protocol;

pub use gh::GhCliHelper;
pub use git::GitCredentialHelper;
pub use protocol::HelperMessage;

use crate::error::AuthError;
use crate::model::{Credential, Platform};

pub trait CredentialHelper: Send + Sync {
  fn name(&self) -> &str;

  /// Whether the helper program can be found
  fn is_available(&self) -> bool;

  /// Ask the helper for a credential
  fn query(&self, platform: Platform, key: &str) -> Result<Credential, AuthError>;

  /// Hand a credential to the helper for its own storage
  fn store(&self, credential: &Credential) -> Result<(), AuthError> {
    let _ = credential;
    Err(AuthError::unsupported(format!("Credential helper '{}' is read-only", self.name())))
  }

  /// Ask the helper to forget a credential
  fn erase(&self, platform: Platform, key: &str) -> Result<(), AuthError> {
    let _ = (platform, key);
    Err(AuthError::unsupported(format!("Credential helper '{}' is read-only", self.name())))
  }
}
