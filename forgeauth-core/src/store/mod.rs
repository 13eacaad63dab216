//! # Credential Stores
//!
//! Persistent and in-memory backends for credentials. Every store keeps at
//! most one entry per `(platform, key)`; different stores may hold
//! independent copies.

mod crypto;
pub mod file;
pub mod keychain;
pub mod memory;
pub mod permissions;

pub use crypto::MAX_KDF_ROUNDS;
pub use file::EncryptedFileStore;
pub use keychain::KeychainStore;
pub use memory::MemoryStore;

use crate::error::AuthError;
use crate::model::{Credential, Platform};

/// A backend that can hold credentials
pub trait CredentialStore: Send + Sync {
  /// Short unique name used in logs, listings, and `store_credential` targets
  fn name(&self) -> &str;

  /// Whether the backend can currently be used at all
  fn is_available(&self) -> bool;

  /// Whether `set` is expected to succeed
  fn is_writable(&self) -> bool {
    self.is_available()
  }

  /// Fetch a credential. Missing entries are `NotFound`.
  fn get(&self, platform: Platform, key: &str) -> Result<Credential, AuthError>;

  /// Insert or replace the entry for the credential's `(platform, key)`
  fn set(&self, credential: &Credential) -> Result<(), AuthError>;

  /// Remove an entry, returning whether one existed
  fn delete(&self, platform: Platform, key: &str) -> Result<bool, AuthError>;

  /// Snapshot of every entry
  fn list(&self) -> Result<Vec<Credential>, AuthError>;

  /// Remove every entry
  fn clear(&self) -> Result<(), AuthError>;
}
