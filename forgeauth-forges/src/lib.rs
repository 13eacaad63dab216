//! # forgeauth Platform Authenticators
//!
//! Per-platform login flows for GitHub, GitLab, Bitbucket, and generic git
//! servers, the HTTP and OAuth plumbing they share, and the bootstrap that
//! wires them into a [`forgeauth_core::CredentialManager`].

pub mod bitbucket;
pub mod bootstrap;
pub mod client;
pub mod consts;
pub mod generic;
pub mod github;
pub mod gitlab;
pub mod oauth;
pub mod ssh;

pub use bitbucket::BitbucketAuthenticator;
pub use bootstrap::{Bootstrap, default_manager};
pub use client::ApiClient;
pub use generic::GenericAuthenticator;
pub use github::GitHubAuthenticator;
pub use gitlab::GitLabAuthenticator;
pub use oauth::{OAuthClient, OAuthEndpoints, TokenGrant};
