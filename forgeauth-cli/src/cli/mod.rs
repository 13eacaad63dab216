//! # Command Line Interface
//!
//! Defines the CLI structure and dispatches to the `auth` and
//! `git-credential` command handlers.

mod auth;
mod git_credential;

use std::path::PathBuf;

use anyhow::Result;
use clap::builder::Styles;
use clap::builder::styling::AnsiColor;
use clap::{ArgAction, Parser, Subcommand};

use crate::output::ColorMode;

/// Top-level CLI command for forgeauth
#[derive(Parser)]
#[command(name = "forgeauth")]
#[command(display_name = "🔑 forgeauth")]
#[command(author = env!("CARGO_PKG_AUTHORS"))]
#[command(about = "Credential management for git hosting platforms")]
#[command(
  long_about = "forgeauth stores credentials for GitHub, GitLab, Bitbucket, and other git servers\n\
        in an encrypted file, logs in through each platform's supported methods, and\n\
        serves stored credentials to git as a credential helper."
)]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(propagate_version = true)]
#[command(subcommand_required(true))]
#[command(disable_help_subcommand = true)]
#[command(max_term_width = 120)]
#[command(styles = Styles::styled()
    .header(AnsiColor::BrightGreen.on_default().bold().underline())
    .usage(AnsiColor::Green.on_default().bold())
    .literal(AnsiColor::BrightGreen.on_default().bold())
    .placeholder(AnsiColor::BrightWhite.on_default().italic())
    .valid(AnsiColor::Green.on_default())
    .invalid(AnsiColor::BrightRed.on_default().bold())
)]
pub struct Cli {
  /// Sets the level of verbosity (can be used multiple times)
  #[arg(
    short = 'v',
    long = "verbose",
    action = ArgAction::Count,
    global = true,
    long_help = "Sets the level of verbosity for tracing and logging output.\n\n\
             -v: Show info level messages\n\
             -vv: Show debug level messages\n\
             -vvv: Show trace level messages"
  )]
  pub verbose: u8,

  /// Controls when colored output is used
  #[arg(
    long,
    value_enum,
    ignore_case = true,
    global = true,
    default_value_t = ColorMode::Auto,
  )]
  pub colors: ColorMode,

  /// Path to auth.toml (defaults to the forgeauth config directory)
  #[arg(long, global = true, value_name = "PATH")]
  pub config: Option<PathBuf>,

  /// Subcommands
  #[command(subcommand)]
  pub command: Commands,
}

/// Subcommands for forgeauth
#[derive(Subcommand)]
pub enum Commands {
  /// Log in, inspect, and remove stored credentials
  #[command(long_about = "Manage credentials for git hosting platforms.\n\n\
            Credentials are keyed by host and kept in an encrypted file whose passphrase\n\
            comes from FORGEAUTH_PASSPHRASE or an interactive prompt.")]
  #[command(arg_required_else_help = true)]
  Auth(auth::AuthArgs),

  /// Act as a git credential helper
  #[command(
    long_about = "Speak git's credential helper protocol on stdin and stdout.\n\n\
            Configure git to use it with:\n\
            git config --global credential.helper '!forgeauth git-credential'\n\n\
            The passphrase must be provided through FORGEAUTH_PASSPHRASE, since stdin\n\
            carries the protocol."
  )]
  GitCredential(git_credential::GitCredentialArgs),
}

pub fn handle_cli(cli: Cli) -> Result<()> {
  cli.colors.apply();

  let config = cli.config.as_deref();
  match cli.command {
    Commands::Auth(auth) => auth::handle_auth_command(auth, config),
    Commands::GitCredential(helper) => git_credential::handle_git_credential_command(helper, config),
  }
}
