//! Backend configuration parsed from environment variables.

use std::path::PathBuf;

use tracing::error;

pub const DEFAULT_SITE_URL: &str = "http://localhost:3000";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub request_secs: u64,
    pub connect_secs: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self { request_secs: DEFAULT_REQUEST_TIMEOUT_SECS, connect_secs: DEFAULT_CONNECT_TIMEOUT_SECS }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendConfig {
    /// Project URL, without trailing slash.
    pub url: String,
    /// Public (anon) API key.
    pub anon_key: String,
    /// Origin the OAuth providers send the browser back to.
    pub site_url: String,
    /// Where to mirror the session between runs. `None` keeps it in memory.
    pub session_file: Option<PathBuf>,
    pub timeouts: Timeouts,
}

impl BackendConfig {
    /// Build typed backend config from environment variables.
    ///
    /// Expected:
    /// - `SUPABASE_URL`
    /// - `SUPABASE_ANON_KEY`
    ///
    /// Missing values are logged and left empty; startup continues and
    /// requests fail later with a request error.
    ///
    /// Optional:
    /// - `SITE_URL`: default `http://localhost:3000`
    /// - `SUBTRACK_SESSION_FILE`: session persistence path
    /// - `SUPABASE_REQUEST_TIMEOUT_SECS`: default 30
    /// - `SUPABASE_CONNECT_TIMEOUT_SECS`: default 10
    #[must_use]
    pub fn from_env() -> Self {
        let site_url = env_trimmed("SITE_URL").unwrap_or_else(|| DEFAULT_SITE_URL.to_string());
        let timeouts = Timeouts {
            request_secs: env_parse_u64("SUPABASE_REQUEST_TIMEOUT_SECS", DEFAULT_REQUEST_TIMEOUT_SECS),
            connect_secs: env_parse_u64("SUPABASE_CONNECT_TIMEOUT_SECS", DEFAULT_CONNECT_TIMEOUT_SECS),
        };

        let config = Self {
            url: env_trimmed("SUPABASE_URL")
                .unwrap_or_default()
                .trim_end_matches('/')
                .to_string(),
            anon_key: env_trimmed("SUPABASE_ANON_KEY").unwrap_or_default(),
            site_url: site_url.trim_end_matches('/').to_string(),
            session_file: env_trimmed("SUBTRACK_SESSION_FILE").map(PathBuf::from),
            timeouts,
        };
        if !config.is_complete() {
            error!("Supabase URL or Anon Key is missing");
        }
        config
    }

    /// Both the project URL and the anon key are present.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        !self.url.is_empty() && !self.anon_key.is_empty()
    }

    /// Post-login landing page for OAuth redirects.
    #[must_use]
    pub fn oauth_redirect(&self) -> String {
        format!("{}/app", self.site_url)
    }
}

fn env_trimmed(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_parse_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(default)
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
