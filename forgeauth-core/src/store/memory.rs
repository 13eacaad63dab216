//! Process-local credential store

use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};

use super::CredentialStore;
use crate::error::AuthError;
use crate::model::{Credential, CredentialId, Platform};

/// Credentials held in memory for the lifetime of the process
#[derive(Debug)]
pub struct MemoryStore {
  name: String,
  entries: RwLock<BTreeMap<CredentialId, Credential>>,
}

impl Default for MemoryStore {
  fn default() -> Self {
    Self::new()
  }
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::named("memory")
  }

  pub fn named(name: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      entries: RwLock::new(BTreeMap::new()),
    }
  }

  pub fn len(&self) -> usize {
    self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}

impl CredentialStore for MemoryStore {
  fn name(&self) -> &str {
    &self.name
  }

  fn is_available(&self) -> bool {
    true
  }

  fn get(&self, platform: Platform, key: &str) -> Result<Credential, AuthError> {
    let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
    entries
      .get(&CredentialId::new(platform, key))
      .cloned()
      .ok_or_else(|| AuthError::not_found(platform, key))
  }

  fn set(&self, credential: &Credential) -> Result<(), AuthError> {
    let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
    entries.insert(credential.id(), credential.clone());
    Ok(())
  }

  fn delete(&self, platform: Platform, key: &str) -> Result<bool, AuthError> {
    let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
    Ok(entries.remove(&CredentialId::new(platform, key)).is_some())
  }

  fn list(&self) -> Result<Vec<Credential>, AuthError> {
    let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
    Ok(entries.values().cloned().collect())
  }

  fn clear(&self) -> Result<(), AuthError> {
    self.entries.write().unwrap_or_else(PoisonError::into_inner).clear();
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use std::sync::Arc;
  use std::thread;

  use super::*;
  use crate::error::AuthErrorKind;
  use crate::model::AuthMethod;

  fn token(platform: Platform, key: &str, secret: &str) -> Credential {
    Credential::new(platform, key, AuthMethod::Token, secret)
  }

  #[test]
  fn test_round_trip_and_replace() {
    let store = MemoryStore::new();
    store.set(&token(Platform::GitHub, "github.com", "first")).unwrap();
    store.set(&token(Platform::GitHub, "github.com", "second")).unwrap();

    let fetched = store.get(Platform::GitHub, "github.com").unwrap();
    assert_eq!(fetched.secret.expose(), b"second");
    assert_eq!(store.len(), 1);
  }

  #[test]
  fn test_missing_is_not_found() {
    let store = MemoryStore::new();
    let err = store.get(Platform::GitLab, "gitlab.com").unwrap_err();
    assert!(err.is(AuthErrorKind::NotFound));
  }

  #[test]
  fn test_same_key_different_platform_are_distinct() {
    let store = MemoryStore::new();
    store.set(&token(Platform::GitHub, "example.com", "a")).unwrap();
    store.set(&token(Platform::Generic, "example.com", "b")).unwrap();
    assert_eq!(store.list().unwrap().len(), 2);
  }

  #[test]
  fn test_delete_and_clear() {
    let store = MemoryStore::new();
    store.set(&token(Platform::GitHub, "github.com", "a")).unwrap();
    store.set(&token(Platform::GitLab, "gitlab.com", "b")).unwrap();

    assert!(store.delete(Platform::GitHub, "github.com").unwrap());
    assert!(!store.delete(Platform::GitHub, "github.com").unwrap());
    store.clear().unwrap();
    assert!(store.is_empty());
  }

  #[test]
  fn test_concurrent_writers() {
    let store = Arc::new(MemoryStore::new());
    let handles: Vec<_> = (0..16)
      .map(|i| {
        let store = Arc::clone(&store);
        thread::spawn(move || store.set(&token(Platform::Generic, &format!("host{i}"), "s")).unwrap())
      })
      .collect();
    for handle in handles {
      handle.join().unwrap();
    }
    assert_eq!(store.len(), 16);
  }
}
