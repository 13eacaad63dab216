//! OS keychain placeholder.
//!
//! Registered so that configurations naming it keep working, but it never
//! reports itself available and the manager treats it as empty.

use super::CredentialStore;
use crate::error::AuthError;
use crate::model::{Credential, Platform};

#[derive(Debug, Clone, Default)]
pub struct KeychainStore;

impl KeychainStore {
  pub fn new() -> Self {
    Self
  }

  fn unavailable() -> AuthError {
    AuthError::storage_unavailable("The OS keychain backend is not supported on this build")
  }
}

impl CredentialStore for KeychainStore {
  fn name(&self) -> &str {
    "keychain"
  }

  fn is_available(&self) -> bool {
    false
  }

  fn get(&self, _platform: Platform, _key: &str) -> Result<Credential, AuthError> {
    Err(Self::unavailable())
  }

  fn set(&self, _credential: &Credential) -> Result<(), AuthError> {
    Err(Self::unavailable())
  }

  fn delete(&self, _platform: Platform, _key: &str) -> Result<bool, AuthError> {
    Err(Self::unavailable())
  }

  fn list(&self) -> Result<Vec<Credential>, AuthError> {
    Err(Self::unavailable())
  }

  fn clear(&self) -> Result<(), AuthError> {
    Err(Self::unavailable())
  }
}
