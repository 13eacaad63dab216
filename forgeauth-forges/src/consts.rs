//! Constants for the platform clients

use std::time::Duration;

/// User-Agent header value for every platform request
pub const USER_AGENT: &str = concat!("forgeauth/", env!("CARGO_PKG_VERSION"));

/// Per-request timeout for platform HTTP calls
pub const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

pub const GITHUB_API_URL: &str = "https://api.github.com";
pub const GITHUB_WEB_URL: &str = "https://github.com";
/// Accept header value for the GitHub REST API
pub const GITHUB_ACCEPT: &str = "application/vnd.github+json";

pub const GITLAB_API_URL: &str = "https://gitlab.com/api/v4";
pub const GITLAB_WEB_URL: &str = "https://gitlab.com";

pub const BITBUCKET_API_URL: &str = "https://api.bitbucket.org/2.0";
pub const BITBUCKET_WEB_URL: &str = "https://bitbucket.org";
