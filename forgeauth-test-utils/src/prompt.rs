//! A prompter that replays canned answers

use std::collections::VecDeque;
use std::sync::Mutex;

use forgeauth_core::error::AuthError;
use forgeauth_core::prompt::Prompter;
use forgeauth_core::secret::Secret;

/// Answers prompts from a queue in order; an exhausted queue cancels
#[derive(Default)]
pub struct ScriptedPrompter {
  answers: Mutex<VecDeque<String>>,
  asked: Mutex<Vec<String>>,
  notices: Mutex<Vec<String>>,
}

impl ScriptedPrompter {
  pub fn new<I, S>(answers: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    Self {
      answers: Mutex::new(answers.into_iter().map(Into::into).collect()),
      ..Self::default()
    }
  }

  /// Prompts shown so far, in order
  pub fn asked(&self) -> Vec<String> {
    self.asked.lock().expect("prompt log poisoned").clone()
  }

  /// Messages passed to `notify`
  pub fn notices(&self) -> Vec<String> {
    self.notices.lock().expect("notice log poisoned").clone()
  }

  fn next(&self, prompt: &str) -> Result<String, AuthError> {
    self.asked.lock().expect("prompt log poisoned").push(prompt.to_string());
    self
      .answers
      .lock()
      .expect("answer queue poisoned")
      .pop_front()
      .ok_or_else(|| AuthError::canceled(format!("No scripted answer for '{prompt}'")))
  }
}

impl Prompter for ScriptedPrompter {
  fn secret(&self, prompt: &str) -> Result<Secret, AuthError> {
    self.next(prompt).map(Secret::from)
  }

  fn text(&self, prompt: &str) -> Result<String, AuthError> {
    self.next(prompt)
  }

  fn notify(&self, message: &str) {
    self.notices.lock().expect("notice log poisoned").push(message.to_string());
  }
}
