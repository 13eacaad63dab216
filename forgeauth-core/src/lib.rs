//! # forgeauth Core Library
//!
//! Credential model, stores, helper bridging, SSH agent access, and the
//! credential manager that composes them. Platform-specific login flows live
//! in `forgeauth-forges`; the `forgeauth` binary is a thin consumer of
//! [`CredentialManager`].

pub mod authenticator;
pub mod config;
pub mod error;
pub mod git;
pub mod helper;
pub mod manager;
pub mod model;
pub mod prompt;
pub mod retry;
pub mod secret;
pub mod ssh_agent;
pub mod store;

pub use authenticator::Authenticator;
pub use config::{AuthConfig, ConfigDirs, ManagerConfig, get_config_dirs};
pub use error::{AuthError, AuthErrorKind, CredentialError, ValidationError};
pub use helper::CredentialHelper;
pub use manager::CredentialManager;
pub use model::{
  AuthMethod, AuthRequest, AuthResult, Credential, CredentialSummary, Platform, TwoFactorChallenge, TwoFactorMethod,
  TwoFactorResponse,
};
pub use prompt::Prompter;
pub use secret::Secret;
pub use ssh_agent::{SshAgent, SshAgentClient, SshKey};
pub use store::CredentialStore;
