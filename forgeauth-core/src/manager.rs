//! # Credential Manager
//!
//! The single entry point for callers. Resolution walks registered stores,
//! then credential helpers, then (for interactive requests) the platform's
//! authenticators, in registration order. Per-source failures are absorbed
//! and only the terminal outcome is returned.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info, instrument, warn};

use crate::authenticator::{Authenticator, check_scopes, check_token_shape};
use crate::config::AuthConfig;
use crate::error::{AuthError, AuthErrorKind, CredentialError, Result, ValidationError};
use crate::helper::CredentialHelper;
use crate::model::{AuthMethod, AuthRequest, Credential, CredentialId, CredentialSummary, Platform};
use crate::store::CredentialStore;

pub struct CredentialManager {
  stores: Vec<Arc<dyn CredentialStore>>,
  helpers: Vec<Arc<dyn CredentialHelper>>,
  authenticators: Vec<Arc<dyn Authenticator>>,
  interactive_timeout: Duration,
}

impl Default for CredentialManager {
  fn default() -> Self {
    Self::new(&AuthConfig::default())
  }
}

impl fmt::Debug for CredentialManager {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("CredentialManager")
      .field("stores", &self.stores.iter().map(|s| s.name()).collect::<Vec<_>>())
      .field("helpers", &self.helpers.iter().map(|h| h.name()).collect::<Vec<_>>())
      .field(
        "authenticators",
        &self.authenticators.iter().map(|a| a.platform()).collect::<Vec<_>>(),
      )
      .field("interactive_timeout", &self.interactive_timeout)
      .finish()
  }
}

/// What the store pass found besides a usable credential
#[derive(Default)]
struct StorePass {
  saw_stale: bool,
  corrupted: Vec<(String, AuthError)>,
}

impl CredentialManager {
  pub fn new(settings: &AuthConfig) -> Self {
    Self {
      stores: Vec::new(),
      helpers: Vec::new(),
      authenticators: Vec::new(),
      interactive_timeout: settings.interactive_timeout(),
    }
  }

  pub fn with_interactive_timeout(mut self, timeout: Duration) -> Self {
    self.interactive_timeout = timeout;
    self
  }

  /// Append a store; earlier stores take priority
  pub fn register_store(&mut self, store: Arc<dyn CredentialStore>) -> &mut Self {
    debug!(store = store.name(), "Registered credential store");
    self.stores.push(store);
    self
  }

  pub fn register_authenticator(&mut self, authenticator: Arc<dyn Authenticator>) -> &mut Self {
    debug!(platform = %authenticator.platform(), "Registered authenticator");
    self.authenticators.push(authenticator);
    self
  }

  pub fn register_credential_helper(&mut self, helper: Arc<dyn CredentialHelper>) -> &mut Self {
    debug!(helper = helper.name(), "Registered credential helper");
    self.helpers.push(helper);
    self
  }

  pub fn stores(&self) -> impl Iterator<Item = &Arc<dyn CredentialStore>> {
    self.stores.iter()
  }

  pub fn helpers(&self) -> impl Iterator<Item = &Arc<dyn CredentialHelper>> {
    self.helpers.iter()
  }

  pub fn authenticators_for(&self, platform: Platform) -> impl Iterator<Item = &Arc<dyn Authenticator>> {
    self.authenticators.iter().filter(move |a| a.platform() == platform)
  }

  /// Resolve a credential for `request`
  #[instrument(skip(self, request), fields(platform = %request.platform, key = %request.key, interactive = request.interactive))]
  pub fn get_credential(&self, request: &AuthRequest) -> Result<Credential> {
    validate_key(&request.key)?;
    check_scopes(&request.scopes)?;

    let mut pass = StorePass::default();
    let outcome = self.resolve(request, &mut pass);

    for (store, err) in &pass.corrupted {
      warn!(store = %store, code = %err.code, "Skipped unreadable credential store: {err}");
    }
    outcome
  }

  fn resolve(&self, request: &AuthRequest, pass: &mut StorePass) -> Result<Credential> {
    if let Some(credential) = self.resolve_from_stores(request, pass) {
      return Ok(credential);
    }

    if let Some(credential) = self.resolve_from_helpers(request) {
      return Ok(credential);
    }

    if request.interactive {
      return self.resolve_interactively(request);
    }

    if pass.saw_stale {
      Err(AuthError::expired(request.platform, &request.key).into())
    } else {
      Err(AuthError::not_found(request.platform, &request.key).into())
    }
  }

  fn resolve_from_stores(&self, request: &AuthRequest, pass: &mut StorePass) -> Option<Credential> {
    for store in &self.stores {
      if !store.is_available() {
        debug!(store = store.name(), "Store unavailable, skipping");
        continue;
      }

      match store.get(request.platform, &request.key) {
        Ok(credential) if !credential.is_stale() => {
          debug!(store = store.name(), "Resolved credential from store");
          return Some(credential);
        }
        Ok(stale) => {
          pass.saw_stale = true;
          match self.refresh_in_store(store.as_ref(), &stale) {
            Ok(fresh) => return Some(fresh),
            Err(err) => debug!(store = store.name(), code = %err.code, "Stale credential could not be refreshed"),
          }
        }
        Err(err) if err.is(AuthErrorKind::NotFound) => {}
        Err(err) if err.is(AuthErrorKind::StorageCorrupted) => {
          pass.corrupted.push((store.name().to_string(), err));
        }
        Err(err) => debug!(store = store.name(), code = %err.code, "Store lookup failed: {err}"),
      }
    }
    None
  }

  fn resolve_from_helpers(&self, request: &AuthRequest) -> Option<Credential> {
    for helper in &self.helpers {
      if !helper.is_available() {
        debug!(helper = helper.name(), "Credential helper unavailable, skipping");
        continue;
      }

      match helper.query(request.platform, &request.key) {
        Ok(credential) => {
          debug!(helper = helper.name(), "Resolved credential from helper");
          return Some(credential);
        }
        Err(err) => debug!(helper = helper.name(), code = %err.code, "Credential helper did not resolve"),
      }
    }
    None
  }

  fn resolve_interactively(&self, request: &AuthRequest) -> Result<Credential> {
    let deadline = Instant::now() + self.interactive_timeout;
    let mut last_error: Option<CredentialError> = None;
    let mut rejected_method = None;

    for authenticator in self.authenticators_for(request.platform) {
      if let Some(method) = request.method
        && !authenticator.supported_methods().contains(&method)
      {
        rejected_method = Some(method);
        continue;
      }

      match self.run_authenticator(authenticator, request, deadline) {
        Ok(mut credential) => {
          if credential.platform != request.platform || credential.key != request.key {
            debug!(returned = %credential.id(), "Authenticator returned a different key; storing under the requested one");
            credential.platform = request.platform;
            credential.key = request.key.clone();
          }
          credential.validate()?;
          self.persist_new(&credential);
          info!(platform = %credential.platform, method = %credential.method, "Authenticated");
          return Ok(credential);
        }
        // Another authenticator for the same platform may support the method
        Err(err) if err.is(AuthErrorKind::Unsupported) => last_error = Some(err),
        Err(err) => return Err(err),
      }
    }

    if let Some(err) = last_error {
      return Err(err);
    }
    if let Some(method) = rejected_method {
      return Err(AuthError::unsupported(format!("{method} login is not supported for {}", request.platform)).into());
    }
    Err(
      AuthError::not_found(request.platform, &request.key)
        .with_hint(format!(
          "No authenticator is registered for {}; store a token with `forgeauth auth token {} <TOKEN>`",
          request.platform, request.key
        ))
        .into(),
    )
  }

  /// Run one authenticator on a worker thread so a stalled flow cannot
  /// outlive the interactive deadline. A late result is discarded.
  fn run_authenticator(
    &self,
    authenticator: &Arc<dyn Authenticator>,
    request: &AuthRequest,
    deadline: Instant,
  ) -> Result<Credential> {
    let remaining = deadline.saturating_duration_since(Instant::now());
    if remaining.is_zero() {
      return Err(AuthError::canceled("Interactive login timed out").into());
    }

    let (tx, rx) = mpsc::channel();
    let worker = Arc::clone(authenticator);
    let worker_request = request.clone();
    thread::Builder::new()
      .name("forgeauth-login".to_string())
      .spawn(move || {
        // Network retries happen per request inside the authenticator, so a
        // failed attempt never prompts twice
        let result = worker.authenticate(&worker_request);
        // The receiver is gone once the deadline passed
        let _ = tx.send(result);
      })
      .map_err(|e| AuthError::canceled(format!("Could not start the login flow: {e}")))?;

    let result = match rx.recv_timeout(remaining) {
      Ok(result) => result?,
      Err(RecvTimeoutError::Timeout) => {
        return Err(
          AuthError::canceled(format!(
            "Interactive login did not finish within {}s",
            self.interactive_timeout.as_secs()
          ))
          .into(),
        );
      }
      Err(RecvTimeoutError::Disconnected) => {
        return Err(AuthError::canceled("The login flow stopped unexpectedly").into());
      }
    };

    match result.credential {
      Some(credential) if result.success => Ok(credential),
      _ => Err(
        AuthError::new(
          AuthErrorKind::InvalidCredentials,
          "AUTH_LOGIN_FAILED",
          format!("Login to {} failed: {}", request.platform, result.message),
        )
        .with_hint(format!("Run `forgeauth auth login {}` again", request.key))
        .into(),
      ),
    }
  }

  /// Save into the first writable store, logging rather than failing when
  /// none accepts it
  fn persist_new(&self, credential: &Credential) {
    for store in self.stores.iter().filter(|s| s.is_available() && s.is_writable()) {
      match store.set(credential) {
        Ok(()) => {
          debug!(store = store.name(), "Persisted credential");
          return;
        }
        Err(err) => warn!(store = store.name(), code = %err.code, "Failed to persist credential: {err}"),
      }
    }
    warn!(id = %credential.id(), "No writable credential store; the credential was not saved");
  }

  /// Refresh `stale` with the first capable authenticator and write the
  /// result back to `store`
  fn refresh_in_store(&self, store: &dyn CredentialStore, stale: &Credential) -> Result<Credential, AuthError> {
    let mut last_error = AuthError::refresh_unsupported(stale.platform);
    for authenticator in self.authenticators_for(stale.platform).filter(|a| a.supports_refresh()) {
      match authenticator.refresh_token(stale) {
        Ok(mut fresh) => {
          fresh.platform = stale.platform;
          fresh.key = stale.key.clone();
          if let Err(err) = fresh.validate() {
            warn!(code = %err.code, "Refreshed credential rejected: {err}");
            continue;
          }
          if let Err(err) = store.set(&fresh) {
            warn!(store = store.name(), code = %err.code, "Failed to persist refreshed credential: {err}");
          }
          info!(store = store.name(), platform = %fresh.platform, "Refreshed stale credential");
          return Ok(fresh);
        }
        Err(err) => {
          debug!(code = %err.code, "Refresh failed");
          last_error = err;
        }
      }
    }
    Err(last_error)
  }

  /// Save a credential into `target_store`, or the first writable available
  /// store. Returns the name of the store used.
  #[instrument(skip_all, fields(platform = %credential.platform, key = %credential.key))]
  pub fn store_credential(&self, credential: &Credential, target_store: Option<&str>) -> Result<String> {
    credential.validate()?;

    let store = match target_store {
      Some(name) => {
        let store = self.stores.iter().find(|s| s.name() == name).ok_or_else(|| {
          ValidationError::new("store", "STORE_UNKNOWN", format!("no credential store named '{name}'"))
        })?;
        if !store.is_available() || !store.is_writable() {
          return Err(AuthError::storage_unavailable(format!("Credential store '{name}' is not writable")).into());
        }
        store
      }
      None => self
        .stores
        .iter()
        .find(|s| s.is_available() && s.is_writable())
        .ok_or_else(|| AuthError::storage_unavailable("No writable credential store is available"))?,
    };

    store.set(credential)?;
    info!(store = store.name(), "Stored credential");
    Ok(store.name().to_string())
  }

  /// Remove a credential from every store, returning how many held it
  #[instrument(skip(self))]
  pub fn delete_credential(&self, platform: Platform, key: &str) -> Result<usize> {
    validate_key(key)?;

    let mut removed = 0;
    for store in self.stores.iter().filter(|s| s.is_available()) {
      match store.delete(platform, key) {
        Ok(true) => {
          debug!(store = store.name(), "Deleted credential");
          removed += 1;
        }
        Ok(false) => {}
        Err(err) => warn!(store = store.name(), code = %err.code, "Failed to delete credential: {err}"),
      }
    }
    Ok(removed)
  }

  /// Snapshot of every stored credential without secret bytes. When several
  /// stores hold the same entry the most recently updated copy is listed,
  /// with ties going to the higher-priority store.
  pub fn list_credentials(&self) -> Result<Vec<CredentialSummary>> {
    let mut newest: BTreeMap<CredentialId, CredentialSummary> = BTreeMap::new();

    for store in self.stores.iter().filter(|s| s.is_available()) {
      match store.list() {
        Ok(credentials) => {
          for credential in credentials {
            let id = CredentialId::new(credential.platform, credential.key.clone());
            match newest.get(&id) {
              Some(kept) if kept.updated_at >= credential.updated_at => {}
              _ => {
                newest.insert(id, credential.summary(store.name()));
              }
            }
          }
        }
        Err(err) => warn!(store = store.name(), code = %err.code, "Failed to list credentials: {err}"),
      }
    }

    let mut summaries: Vec<_> = newest.into_values().collect();
    summaries.sort_by(|a, b| (a.platform, &a.key).cmp(&(b.platform, &b.key)));
    Ok(summaries)
  }

  /// Rotate a stored credential even if it has not expired yet
  #[instrument(skip(self))]
  pub fn refresh_credential(&self, platform: Platform, key: &str) -> Result<Credential> {
    validate_key(key)?;

    for store in self.stores.iter().filter(|s| s.is_available()) {
      match store.get(platform, key) {
        Ok(current) => return Ok(self.refresh_in_store(store.as_ref(), &current)?),
        Err(err) if err.is(AuthErrorKind::NotFound) => {}
        Err(err) => debug!(store = store.name(), code = %err.code, "Store lookup failed: {err}"),
      }
    }
    Err(AuthError::not_found(platform, key).into())
  }

  /// Check that a stored credential is current and, for tokens, that the
  /// platform still accepts it with the required scopes
  #[instrument(skip(self, required_scopes))]
  pub fn validate_credential(&self, platform: Platform, key: &str, required_scopes: &[String]) -> Result<Credential> {
    check_scopes(required_scopes)?;
    let credential = self.get_credential(&AuthRequest::new(platform, key))?;

    if matches!(credential.method, AuthMethod::Token | AuthMethod::OAuth) {
      let token = credential.secret.expose_str().ok_or_else(|| {
        ValidationError::new("token", "TOKEN_NOT_UTF8", "stored token is not valid UTF-8")
      })?;
      match self.authenticators_for(platform).next() {
        Some(authenticator) => authenticator.validate_token(token, required_scopes)?,
        None => check_token_shape(token)?,
      }
    }
    Ok(credential)
  }
}

fn validate_key(key: &str) -> Result<(), ValidationError> {
  if key.trim().is_empty() {
    return Err(ValidationError::new(
      "repository",
      "REPOSITORY_EMPTY",
      "repository key must not be empty",
    ));
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use std::sync::Mutex;
  use std::sync::atomic::{AtomicUsize, Ordering};

  use chrono::{Duration as ChronoDuration, Utc};

  use super::*;
  use crate::model::{AuthResult, TwoFactorChallenge, TwoFactorResponse};
  use crate::store::{KeychainStore, MemoryStore};

  /// Authenticator that replays a fixed sequence of outcomes
  struct Scripted {
    platform: Platform,
    outcomes: Mutex<Vec<Result<AuthResult, CredentialError>>>,
    calls: AtomicUsize,
    delay: Duration,
    refreshes: bool,
  }

  impl Scripted {
    fn new(platform: Platform, outcomes: Vec<Result<AuthResult, CredentialError>>) -> Self {
      Self {
        platform,
        outcomes: Mutex::new(outcomes),
        calls: AtomicUsize::new(0),
        delay: Duration::ZERO,
        refreshes: false,
      }
    }
  }

  impl Authenticator for Scripted {
    fn platform(&self) -> Platform {
      self.platform
    }

    fn supported_methods(&self) -> Vec<AuthMethod> {
      vec![AuthMethod::Token]
    }

    fn authenticate(&self, _request: &AuthRequest) -> Result<AuthResult, CredentialError> {
      self.calls.fetch_add(1, Ordering::SeqCst);
      thread::sleep(self.delay);
      let mut outcomes = self.outcomes.lock().unwrap();
      if outcomes.is_empty() {
        return Err(AuthError::canceled("script exhausted").into());
      }
      outcomes.remove(0)
    }

    fn validate_token(&self, token: &str, _required_scopes: &[String]) -> Result<(), CredentialError> {
      Ok(check_token_shape(token)?)
    }

    fn supports_refresh(&self) -> bool {
      self.refreshes
    }

    fn refresh_token(&self, credential: &Credential) -> Result<Credential, AuthError> {
      if !self.refreshes {
        return Err(AuthError::refresh_unsupported(self.platform));
      }
      Ok(
        Credential::new(credential.platform, credential.key.clone(), credential.method, "refreshed-token")
          .with_expiry(Utc::now() + ChronoDuration::hours(1)),
      )
    }

    fn handle_two_factor(&self, _challenge: &TwoFactorChallenge) -> Result<TwoFactorResponse, AuthError> {
      Err(AuthError::two_factor_failed(self.platform, "not scripted"))
    }
  }

  fn token(key: &str, secret: &str) -> Credential {
    Credential::new(Platform::GitHub, key, AuthMethod::Token, secret)
  }

  fn login_ok(secret: &str) -> Result<AuthResult, CredentialError> {
    Ok(AuthResult::success(token("github.com", secret), "ok"))
  }

  fn fast_manager() -> CredentialManager {
    CredentialManager::default()
  }

  #[test]
  fn test_empty_key_is_validation_error() {
    let manager = fast_manager();
    let err = manager.get_credential(&AuthRequest::new(Platform::GitHub, "  ")).unwrap_err();
    assert!(matches!(err, CredentialError::Validation(_)));
  }

  #[test]
  fn test_bad_scope_is_validation_error() {
    let manager = fast_manager();
    let request = AuthRequest::new(Platform::GitHub, "github.com").with_scopes(vec!["not a scope".into()]);
    assert!(matches!(manager.get_credential(&request), Err(CredentialError::Validation(_))));
  }

  #[test]
  fn test_store_priority() {
    let first = Arc::new(MemoryStore::named("first"));
    let second = Arc::new(MemoryStore::named("second"));
    first.set(&token("github.com", "from-first")).unwrap();
    second.set(&token("github.com", "from-second")).unwrap();

    let mut manager = fast_manager();
    manager.register_store(second.clone()).register_store(first.clone());
    let credential = manager.get_credential(&AuthRequest::new(Platform::GitHub, "github.com")).unwrap();
    assert_eq!(credential.secret.expose(), b"from-second");
  }

  #[test]
  fn test_unavailable_store_is_skipped() {
    let memory = Arc::new(MemoryStore::new());
    memory.set(&token("github.com", "tok")).unwrap();

    let mut manager = fast_manager();
    manager.register_store(Arc::new(KeychainStore::new())).register_store(memory);
    assert!(manager.get_credential(&AuthRequest::new(Platform::GitHub, "github.com")).is_ok());
  }

  #[test]
  fn test_exhaustion_is_not_found() {
    let mut manager = fast_manager();
    manager.register_store(Arc::new(MemoryStore::new()));
    let err = manager.get_credential(&AuthRequest::new(Platform::GitHub, "github.com")).unwrap_err();
    assert!(err.is(AuthErrorKind::NotFound));
    assert!(err.hint().contains("forgeauth auth login"));
  }

  #[test]
  fn test_stale_without_refresh_is_expired() {
    let memory = Arc::new(MemoryStore::new());
    memory
      .set(&token("github.com", "old").with_expiry(Utc::now() - ChronoDuration::minutes(5)))
      .unwrap();

    let mut manager = fast_manager();
    manager
      .register_store(memory)
      .register_authenticator(Arc::new(Scripted::new(Platform::GitHub, vec![])));
    let err = manager.get_credential(&AuthRequest::new(Platform::GitHub, "github.com")).unwrap_err();
    assert!(err.is(AuthErrorKind::ExpiredToken));
  }

  #[test]
  fn test_stale_credential_is_refreshed_in_place() {
    let memory = Arc::new(MemoryStore::new());
    memory
      .set(&token("github.com", "old").with_expiry(Utc::now() - ChronoDuration::minutes(5)))
      .unwrap();
    let mut refresher = Scripted::new(Platform::GitHub, vec![]);
    refresher.refreshes = true;

    let mut manager = fast_manager();
    manager.register_store(memory.clone()).register_authenticator(Arc::new(refresher));
    let credential = manager.get_credential(&AuthRequest::new(Platform::GitHub, "github.com")).unwrap();
    assert_eq!(credential.secret.expose(), b"refreshed-token");
    assert_eq!(
      memory.get(Platform::GitHub, "github.com").unwrap().secret.expose(),
      b"refreshed-token"
    );
  }

  #[test]
  fn test_interactive_login_is_persisted() {
    let memory = Arc::new(MemoryStore::new());
    let authenticator = Arc::new(Scripted::new(Platform::GitHub, vec![login_ok("ghp_interactive")]));

    let mut manager = fast_manager();
    manager.register_store(memory.clone()).register_authenticator(authenticator.clone());
    let request = AuthRequest::new(Platform::GitHub, "github.com").interactive(true);

    assert_eq!(manager.get_credential(&request).unwrap().secret.expose(), b"ghp_interactive");
    assert_eq!(manager.get_credential(&request).unwrap().secret.expose(), b"ghp_interactive");
    assert_eq!(authenticator.calls.load(Ordering::SeqCst), 1);
    assert_eq!(memory.len(), 1);
  }

  #[test]
  fn test_network_error_does_not_rerun_login() {
    let authenticator = Arc::new(Scripted::new(
      Platform::GitHub,
      vec![Err(AuthError::network("refused").into()), login_ok("ghp_second_prompt")],
    ));
    let memory = Arc::new(MemoryStore::new());
    let mut manager = fast_manager();
    manager.register_store(memory.clone()).register_authenticator(authenticator.clone());

    let request = AuthRequest::new(Platform::GitHub, "github.com").interactive(true);
    assert!(manager.get_credential(&request).unwrap_err().is(AuthErrorKind::NetworkError));
    assert_eq!(authenticator.calls.load(Ordering::SeqCst), 1);
    assert!(memory.is_empty());
  }

  #[test]
  fn test_interactive_timeout_cancels_without_persisting() {
    let memory = Arc::new(MemoryStore::new());
    let mut slow = Scripted::new(Platform::GitHub, vec![login_ok("late")]);
    slow.delay = Duration::from_millis(500);

    let mut manager = fast_manager().with_interactive_timeout(Duration::from_millis(50));
    manager.register_store(memory.clone()).register_authenticator(Arc::new(slow));

    let request = AuthRequest::new(Platform::GitHub, "github.com").interactive(true);
    assert!(manager.get_credential(&request).unwrap_err().is(AuthErrorKind::Canceled));
    thread::sleep(Duration::from_millis(700));
    assert!(memory.is_empty());
  }

  #[test]
  fn test_failed_login_returns_typed_error() {
    let authenticator = Scripted::new(
      Platform::GitHub,
      vec![Err(AuthError::two_factor_failed(Platform::GitHub, "bad code").into())],
    );
    let mut manager = fast_manager();
    manager.register_authenticator(Arc::new(authenticator));
    let request = AuthRequest::new(Platform::GitHub, "github.com").interactive(true);
    assert!(manager.get_credential(&request).unwrap_err().is(AuthErrorKind::TwoFactorFailed));
  }

  #[test]
  fn test_unsupported_method_is_named() {
    let authenticator = Arc::new(Scripted::new(Platform::GitHub, vec![login_ok("ghp_unused")]));
    let mut manager = fast_manager();
    manager
      .register_store(Arc::new(MemoryStore::new()))
      .register_authenticator(authenticator.clone());

    let request = AuthRequest::new(Platform::GitHub, "github.com")
      .with_method(AuthMethod::OAuth)
      .interactive(true);
    let err = manager.get_credential(&request).unwrap_err();
    assert!(err.is(AuthErrorKind::Unsupported));
    assert!(err.to_string().contains("oauth"));
    assert_eq!(authenticator.calls.load(Ordering::SeqCst), 0);
  }

  #[test]
  fn test_store_credential_targets() {
    let first = Arc::new(MemoryStore::named("first"));
    let second = Arc::new(MemoryStore::named("second"));
    let mut manager = fast_manager();
    manager
      .register_store(Arc::new(KeychainStore::new()))
      .register_store(first.clone())
      .register_store(second.clone());

    assert_eq!(manager.store_credential(&token("github.com", "a"), None).unwrap(), "first");
    assert_eq!(manager.store_credential(&token("github.com", "b"), Some("second")).unwrap(), "second");
    assert!(matches!(
      manager.store_credential(&token("github.com", "c"), Some("missing")),
      Err(CredentialError::Validation(_))
    ));
    assert!(
      manager
        .store_credential(&token("github.com", "d"), Some("keychain"))
        .unwrap_err()
        .is(AuthErrorKind::StorageUnavailable)
    );
  }

  #[test]
  fn test_store_without_writable_store_fails() {
    let mut manager = fast_manager();
    manager.register_store(Arc::new(KeychainStore::new()));
    let err = manager.store_credential(&token("github.com", "a"), None).unwrap_err();
    assert!(err.is(AuthErrorKind::StorageUnavailable));
  }

  #[test]
  fn test_delete_and_list_across_stores() {
    let first = Arc::new(MemoryStore::named("first"));
    let second = Arc::new(MemoryStore::named("second"));
    first.set(&token("github.com", "a")).unwrap();
    second.set(&token("github.com", "b")).unwrap();
    second
      .set(&Credential::new(Platform::GitLab, "gitlab.com", AuthMethod::Token, "c"))
      .unwrap();

    let mut manager = fast_manager();
    manager.register_store(first.clone()).register_store(second.clone());

    let listed = manager.list_credentials().unwrap();
    assert_eq!(listed.len(), 2);
    assert_eq!(listed[0].platform, Platform::GitHub);
    assert_eq!(listed[1].platform, Platform::GitLab);

    assert_eq!(manager.delete_credential(Platform::GitHub, "github.com").unwrap(), 2);
    assert!(
      manager
        .get_credential(&AuthRequest::new(Platform::GitHub, "github.com"))
        .unwrap_err()
        .is(AuthErrorKind::NotFound)
    );
  }

  #[test]
  fn test_list_keeps_most_recently_updated_duplicate() {
    let first = Arc::new(MemoryStore::named("first"));
    let second = Arc::new(MemoryStore::named("second"));
    let mut older = token("github.com", "old").with_username("before");
    older.updated_at = Utc::now() - ChronoDuration::days(2);
    first.set(&older).unwrap();
    second.set(&token("github.com", "new").with_username("after")).unwrap();

    let mut manager = fast_manager();
    manager.register_store(first).register_store(second);

    let listed = manager.list_credentials().unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].source, "second");
    assert_eq!(listed[0].username.as_deref(), Some("after"));
  }

  #[test]
  fn test_list_tie_goes_to_priority_store() {
    let first = Arc::new(MemoryStore::named("first"));
    let second = Arc::new(MemoryStore::named("second"));
    let credential = token("github.com", "same");
    first.set(&credential).unwrap();
    second.set(&credential).unwrap();

    let mut manager = fast_manager();
    manager.register_store(first).register_store(second);
    assert_eq!(manager.list_credentials().unwrap()[0].source, "first");
  }

  #[test]
  fn test_refresh_credential_unsupported() {
    let memory = Arc::new(MemoryStore::new());
    memory.set(&token("github.com", "tok")).unwrap();
    let mut manager = fast_manager();
    manager.register_store(memory);
    let err = manager.refresh_credential(Platform::GitHub, "github.com").unwrap_err();
    assert_eq!(err.code(), "AUTH_REFRESH_UNSUPPORTED");
  }

  #[test]
  fn test_validate_credential_checks_shape() {
    let memory = Arc::new(MemoryStore::new());
    memory.set(&token("github.com", "short")).unwrap();
    let mut manager = fast_manager();
    manager.register_store(memory);
    let err = manager.validate_credential(Platform::GitHub, "github.com", &[]).unwrap_err();
    assert_eq!(err.code(), "TOKEN_TOO_SHORT");
  }

  #[test]
  fn test_manager_is_send_and_sync() {
    fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<CredentialManager>();
  }
}
