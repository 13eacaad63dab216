//! # forgeauth CLI Library
//!
//! Command definitions and handlers for the `forgeauth` binary. The binary
//! only parses arguments and installs logging; everything else lives here so
//! it can be exercised from tests.

pub mod cli;
pub mod output;
pub mod prompt;
pub mod session;
