//! # Auth Command
//!
//! Derive-based implementation of `forgeauth auth`: logging in, checking
//! status, listing, adding, and removing stored credentials.

use std::io::{self, Read};
use std::path::Path;

use anyhow::Result;
use clap::{Args, Subcommand, ValueEnum};
use forgeauth_core::error::{AuthErrorKind, CredentialError};
use forgeauth_core::model::{AuthMethod, AuthRequest, Credential, CredentialSummary, meta};
use forgeauth_core::secret::Secret;
use zeroize::Zeroizing;

use crate::output::{
  format_command, format_freshness, format_key, format_timestamp, print_error, print_header, print_info, print_success,
  print_warning,
};
use crate::session::{Interaction, PASSPHRASE_ENV, Session};

/// Command for credential management
#[derive(Args)]
pub struct AuthArgs {
  /// The subcommand to execute
  #[command(subcommand)]
  pub subcommand: AuthSubcommands,
}

/// Subcommands for the auth command
#[derive(Subcommand)]
pub enum AuthSubcommands {
  /// Log in to a git hosting platform
  #[command(long_about = "Log in to the platform hosting a repository.\n\n\
            The repository may be a URL, an scp-style remote, or a bare host. Without one,\n\
            the configured default_repository or the current repository's origin remote\n\
            is used. Credentials already stored or available from git and gh are reused.")]
  Login(LoginArgs),

  /// Show stores and check the credential for a repository
  #[command(long_about = "Show the configured credential stores and check the credential for a repository.\n\n\
            Tokens are checked against the platform API when one is configured, including\n\
            any scopes passed with --scopes.")]
  Status(StatusArgs),

  /// List stored credentials without their secrets
  List(ListArgs),

  /// Remove the stored credential for a repository's host
  Logout(LogoutArgs),

  /// Store a token you already have
  #[command(long_about = "Store an existing token or password for a repository's host.\n\n\
            Pass '-' as the token to read it from stdin instead of the command line.")]
  Token(TokenArgs),
}

#[derive(Args)]
pub struct LoginArgs {
  /// Repository URL, remote, or host
  pub repository: Option<String>,

  /// Authentication method (token, basic, oauth, ssh)
  #[arg(long, short = 'm')]
  pub method: Option<AuthMethod>,

  /// Scopes the credential must grant, comma separated
  #[arg(long, short = 's', value_delimiter = ',')]
  pub scopes: Vec<String>,
}

#[derive(Args)]
pub struct StatusArgs {
  /// Repository URL, remote, or host
  pub repository: Option<String>,

  /// Scopes the credential must grant, comma separated
  #[arg(long, short = 's', value_delimiter = ',')]
  pub scopes: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ListFormat {
  Table,
  Json,
}

#[derive(Args)]
pub struct ListArgs {
  /// Output format
  #[arg(long, short = 'f', value_enum, default_value_t = ListFormat::Table)]
  pub format: ListFormat,
}

#[derive(Args)]
pub struct LogoutArgs {
  /// Repository URL, remote, or host
  pub repository: String,
}

#[derive(Args)]
pub struct TokenArgs {
  /// Repository URL, remote, or host
  pub repository: String,

  /// The token, or '-' to read it from stdin
  pub token: String,

  /// Username to store alongside the token
  #[arg(long, short = 'u')]
  pub username: Option<String>,

  /// How the secret is used (token, oauth, basic)
  #[arg(long, short = 'm', default_value = "token")]
  pub method: AuthMethod,

  /// Store to write to (defaults to the first writable store)
  #[arg(long)]
  pub store: Option<String>,

  /// Check the token against the platform before keeping it
  #[arg(long)]
  pub verify: bool,
}

/// Handle the auth command
pub(crate) fn handle_auth_command(auth: AuthArgs, config: Option<&Path>) -> Result<()> {
  let session = Session::load(config, Interaction::Terminal)?;
  match auth.subcommand {
    AuthSubcommands::Login(args) => handle_login_command(&session, args),
    AuthSubcommands::Status(args) => handle_status_command(&session, args),
    AuthSubcommands::List(args) => handle_list_command(&session, args),
    AuthSubcommands::Logout(args) => handle_logout_command(&session, args),
    AuthSubcommands::Token(args) => handle_token_command(&session, args),
  }
}

/// Show the remediation hint for a failure and hand it back for reporting
fn with_hint(err: CredentialError) -> anyhow::Error {
  print_info(&err.hint());
  anyhow::Error::new(err)
}

fn warn_without_passphrase(session: &Session) {
  if !session.has_passphrase() {
    print_warning(&format!(
      "{PASSPHRASE_ENV} is not set, so the encrypted credential file was not opened"
    ));
  }
}

fn describe(credential: &Credential) -> String {
  let who = credential
    .username
    .as_deref()
    .map(|user| format!(" as {user}"))
    .unwrap_or_default();
  let source = credential
    .metadata
    .get(meta::SOURCE)
    .map(|source| format!(" (from {source})"))
    .unwrap_or_default();
  format!(
    "{} on {}{} using {}{}",
    credential.platform,
    format_key(&credential.key),
    who,
    credential.method,
    source
  )
}

fn handle_login_command(session: &Session, args: LoginArgs) -> Result<()> {
  let repository = session.repository(args.repository.as_deref())?;
  let (platform, key) = session.target(&repository)?;
  let manager = session.manager()?;

  let mut request = AuthRequest::new(platform, &key).with_scopes(args.scopes);
  if let Some(method) = args.method.or(session.settings().preferred_method) {
    request = request.with_method(method);
  }

  match manager.get_credential(&request) {
    Ok(existing) => {
      print_info(&format!("Already authenticated: {}", describe(&existing)));
      println!(
        "Run {} first to log in again.",
        format_command(&format!("forgeauth auth logout {key}"))
      );
      return Ok(());
    }
    Err(err) if err.is(AuthErrorKind::NotFound) || err.is(AuthErrorKind::ExpiredToken) => {}
    Err(err) => return Err(with_hint(err)),
  }

  warn_without_passphrase(session);
  let credential = manager.get_credential(&request.interactive(true)).map_err(with_hint)?;
  print_success(&format!("Logged in: {}", describe(&credential)));
  Ok(())
}

fn handle_status_command(session: &Session, args: StatusArgs) -> Result<()> {
  let manager = session.manager()?;

  print_header("Credential stores");
  for store in manager.stores() {
    let state = if store.is_available() { "available" } else { "unavailable" };
    println!("  {:<10} {}", store.name(), state);
  }
  println!("  file: {}", session.credential_file().display());
  warn_without_passphrase(session);

  print_header("Credential helpers");
  for helper in manager.helpers() {
    let state = if helper.is_available() { "available" } else { "not installed" };
    println!("  {:<16} {}", helper.name(), state);
  }

  let Ok(repository) = session.repository(args.repository.as_deref()) else {
    println!();
    print_info("No repository given; pass one to check its credential.");
    return Ok(());
  };
  let (platform, key) = session.target(&repository)?;

  println!();
  match manager.validate_credential(platform, &key, &args.scopes) {
    Ok(credential) => {
      print_success(&format!("Authenticated: {}", describe(&credential)));
      if let Some(expires_at) = credential.expires_at() {
        println!("  expires {}", format_timestamp(&expires_at.to_rfc3339()));
      }
      Ok(())
    }
    Err(err) => {
      print_error(&format!("Not authenticated to {} ({platform})", format_key(&key)));
      Err(with_hint(err))
    }
  }
}

fn print_summary(summary: &CredentialSummary) {
  println!(
    "  {:<10} {:<32} {:<6} {:<16} {} [{}]",
    summary.platform.as_str(),
    summary.key,
    summary.method.as_str(),
    summary.username.as_deref().unwrap_or("-"),
    format_freshness(summary.stale),
    summary.source
  );
}

fn handle_list_command(session: &Session, args: ListArgs) -> Result<()> {
  let manager = session.manager()?;
  let summaries = manager.list_credentials().map_err(with_hint)?;

  if args.format == ListFormat::Json {
    println!("{}", serde_json::to_string_pretty(&summaries)?);
    return Ok(());
  }

  warn_without_passphrase(session);
  if summaries.is_empty() {
    print_info("No stored credentials.");
    println!("Add one with {}", format_command("forgeauth auth login <REPOSITORY>"));
    return Ok(());
  }

  print_header("Stored credentials");
  for summary in &summaries {
    print_summary(summary);
  }
  Ok(())
}

fn handle_logout_command(session: &Session, args: LogoutArgs) -> Result<()> {
  let (platform, key) = session.target(&args.repository)?;
  let manager = session.manager()?;

  let removed = manager.delete_credential(platform, &key).map_err(with_hint)?;
  if removed == 0 {
    print_warning(&format!("No stored credential for {}", format_key(&key)));
  } else {
    print_success(&format!("Logged out of {} ({platform})", format_key(&key)));
  }
  Ok(())
}

fn read_token(arg: String) -> Result<Secret> {
  if arg != "-" {
    return Ok(Secret::from(arg));
  }
  let mut input = Zeroizing::new(String::new());
  io::stdin().read_to_string(&mut input)?;
  Ok(Secret::from(input.trim_end_matches(['\r', '\n'])))
}

fn handle_token_command(session: &Session, args: TokenArgs) -> Result<()> {
  let (platform, key) = session.target(&args.repository)?;
  if args.method == AuthMethod::Ssh {
    anyhow::bail!("SSH credentials come from the SSH agent; use 'forgeauth auth login --method ssh'");
  }
  if args.method == AuthMethod::Basic && args.username.is_none() {
    anyhow::bail!("--username is required when storing a password");
  }

  let secret = read_token(args.token)?;
  let mut credential = Credential::new(platform, &key, args.method, secret);
  if let Some(username) = args.username {
    credential = credential.with_username(username);
  }

  let manager = session.manager()?;
  warn_without_passphrase(session);
  let store = manager
    .store_credential(&credential, args.store.as_deref())
    .map_err(with_hint)?;

  if args.verify
    && let Err(err) = manager.validate_credential(platform, &key, &[])
  {
    manager.delete_credential(platform, &key).map_err(with_hint)?;
    print_error(&format!("The platform rejected the token for {}", format_key(&key)));
    return Err(with_hint(err));
  }

  print_success(&format!("Stored {} for {} in the {store} store", args.method, format_key(&key)));
  Ok(())
}
