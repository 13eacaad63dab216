//! Test utilities shared across the forgeauth workspace
//!
//! This crate provides common testing infrastructure including:
//! - XDG and HOME isolation ([`EnvTestGuard`], [`VarGuard`])
//! - Fake credential helper programs ([`FakeHelperScript`])
//! - A fake SSH agent listening on a Unix socket ([`FakeSshAgent`])
//! - A mock platform API usable from synchronous tests ([`MockApi`])
//! - Scripted prompts and authenticators for manager tests
//!
//! The dead_code lint is disabled for this crate because test utilities may
//! not be used by all tests, and the compiler cannot detect usage across
//! crate boundaries in development dependencies.

#![allow(dead_code)]

pub mod agent;
pub mod auth;
pub mod env;
pub mod helper;
pub mod http;
pub mod prompt;

#[cfg(unix)]
pub use agent::{FakeIdentity, FakeSshAgent};
pub use auth::CountingAuthenticator;
pub use env::{EnvTestGuard, VarGuard};
#[cfg(unix)]
pub use helper::FakeHelperScript;
pub use http::MockApi;
pub use prompt::ScriptedPrompter;
