//! # Console Prompts
//!
//! Terminal-backed [`Prompter`] built on dialoguer, with a theme matching the
//! rest of the CLI output.

use console::Style;
use dialoguer::theme::ColorfulTheme;
use dialoguer::{Input, Password};
use forgeauth_core::error::AuthError;
use forgeauth_core::prompt::Prompter;
use forgeauth_core::secret::Secret;

use crate::output::print_info;

/// Returns the dialoguer theme used for every prompt.
pub fn forgeauth_theme() -> ColorfulTheme {
  ColorfulTheme {
    prompt_style: Style::new().cyan().bold(),
    active_item_prefix: Style::new().green().apply_to("❯ ".to_string()),
    active_item_style: Style::new().green(),
    ..ColorfulTheme::default()
  }
}

/// Prompter that asks on the controlling terminal
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsolePrompter;

fn prompt_failed(prompt: &str, err: dialoguer::Error) -> AuthError {
  AuthError::canceled(format!("Prompt '{prompt}' was not answered: {err}"))
}

impl Prompter for ConsolePrompter {
  fn secret(&self, prompt: &str) -> Result<Secret, AuthError> {
    let value = Password::with_theme(&forgeauth_theme())
      .with_prompt(prompt)
      .interact()
      .map_err(|e| prompt_failed(prompt, e))?;
    Ok(Secret::new(value.into_bytes()))
  }

  fn text(&self, prompt: &str) -> Result<String, AuthError> {
    Input::<String>::with_theme(&forgeauth_theme())
      .with_prompt(prompt)
      .interact_text()
      .map_err(|e| prompt_failed(prompt, e))
  }

  fn notify(&self, message: &str) {
    print_info(message);
  }
}
