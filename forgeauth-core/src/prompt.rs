//! # Interactive Prompts
//!
//! Authenticators never talk to a terminal directly. They ask a [`Prompter`],
//! which the CLI backs with a console implementation and tests back with a
//! scripted one.

use crate::error::AuthError;
use crate::secret::Secret;

pub trait Prompter: Send + Sync {
  /// Ask for a value that must not be echoed
  fn secret(&self, prompt: &str) -> Result<Secret, AuthError>;

  /// Ask for a plain value
  fn text(&self, prompt: &str) -> Result<String, AuthError>;

  /// Show a message, such as a device-flow verification code
  fn notify(&self, message: &str);
}

/// Prompter for non-interactive contexts; every question is canceled
#[derive(Debug, Clone, Copy, Default)]
pub struct NonInteractivePrompter;

impl Prompter for NonInteractivePrompter {
  fn secret(&self, prompt: &str) -> Result<Secret, AuthError> {
    Err(AuthError::canceled(format!("Cannot ask for '{prompt}' without a terminal")))
  }

  fn text(&self, prompt: &str) -> Result<String, AuthError> {
    Err(AuthError::canceled(format!("Cannot ask for '{prompt}' without a terminal")))
  }

  fn notify(&self, message: &str) {
    tracing::info!("{message}");
  }
}
