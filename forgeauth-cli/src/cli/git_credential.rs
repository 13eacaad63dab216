//! # Git Credential Helper Mode
//!
//! `forgeauth git-credential get|store|erase` implements git's credential
//! helper protocol on top of the credential manager. Nothing but protocol
//! output is written to stdout.

use std::io::{self, Read, Write};
use std::path::Path;

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use forgeauth_core::error::AuthErrorKind;
use forgeauth_core::helper::protocol::HelperMessage;
use forgeauth_core::model::{AuthMethod, AuthRequest, Credential, Platform};
use tracing::debug;
use zeroize::Zeroizing;

use crate::session::{Interaction, Session, credential_key};

#[derive(Args)]
pub struct GitCredentialArgs {
  /// Operation requested by git
  #[command(subcommand)]
  pub operation: Operation,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
  /// Print the stored credential for the host described on stdin
  Get,
  /// Save the credential described on stdin
  Store,
  /// Remove the credential for the host described on stdin
  Erase,
}

/// Handle the git-credential command
pub(crate) fn handle_git_credential_command(args: GitCredentialArgs, config: Option<&Path>) -> Result<()> {
  let mut input = Zeroizing::new(String::new());
  io::stdin()
    .read_to_string(&mut input)
    .context("Failed to read credential request from stdin")?;
  let message = HelperMessage::parse(&input).context("Malformed credential request")?;

  let Some(host) = message.host.as_deref().filter(|h| !h.is_empty()) else {
    debug!("Credential request has no host, ignoring");
    return Ok(());
  };

  let session = Session::load(config, Interaction::Never)?;
  let key = credential_key(host)?;
  let platform = session.settings().platform_for(host);
  let manager = session.manager_without_helpers()?;

  match args.operation {
    Operation::Get => {
      let credential = match manager.get_credential(&AuthRequest::new(platform, &key)) {
        Ok(credential) => credential,
        Err(err) if err.is(AuthErrorKind::NotFound) || err.is(AuthErrorKind::ExpiredToken) => {
          debug!(code = err.code(), "No usable credential for host");
          return Ok(());
        }
        Err(err) => return Err(err.into()),
      };
      if credential.method == AuthMethod::Ssh {
        debug!("Stored credential is an SSH identity, nothing to hand to git");
        return Ok(());
      }

      let response = HelperMessage {
        protocol: message.protocol.clone(),
        host: message.host.clone(),
        path: None,
        username: Some(helper_username(&credential)),
        password: Some(credential.secret.clone()),
      };
      let encoded = response.encode()?;
      let mut stdout = io::stdout().lock();
      stdout.write_all(encoded.as_bytes())?;
      stdout.flush()?;
    }
    Operation::Store => {
      let Some(password) = message.password.clone().filter(|p| !p.is_empty()) else {
        debug!("Store request carries no password, ignoring");
        return Ok(());
      };
      let mut credential = Credential::new(platform, &key, AuthMethod::Token, password);
      if let Some(username) = message.username.clone() {
        credential = credential.with_username(username);
      }
      let store = manager.store_credential(&credential, None)?;
      debug!(store = %store, "Stored credential from git");
    }
    Operation::Erase => {
      let removed = manager.delete_credential(platform, &key)?;
      debug!(removed, "Erased credential for host");
    }
  }
  Ok(())
}

/// Username reported to git. Token logins often have none, and git needs one.
fn helper_username(credential: &Credential) -> String {
  if let Some(username) = &credential.username {
    return username.clone();
  }
  match credential.platform {
    Platform::GitHub => "x-access-token",
    Platform::GitLab => "oauth2",
    Platform::Bitbucket => "x-token-auth",
    Platform::Generic => "git",
  }
  .to_string()
}
