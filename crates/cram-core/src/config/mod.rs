//! Sync engine configuration.
//!
//! `RemoteConfig` locates the remote store; `SyncSettings` bounds the work
//! done by one sync cycle and carries the caller-side retry policy.

use std::fmt;
use std::time::Duration;

use crate::util::{is_http_url, normalize_text_option};

const DEFAULT_PULL_PAGE_SIZE: usize = 500;
const DEFAULT_MAX_PULL_PAGES: usize = 20;
const DEFAULT_RETRY_ATTEMPTS: u32 = 3;
const DEFAULT_RETRY_DELAY_SECS: u64 = 5;

/// Remote store endpoint and public API key.
///
/// The anon key is safe to ship but is still kept out of `Debug` output.
#[derive(Clone, PartialEq, Eq)]
pub struct RemoteConfig {
    url: String,
    anon_key: String,
}

impl RemoteConfig {
    /// Validate and normalize a base URL and anon key.
    pub fn new(url: impl Into<String>, anon_key: impl Into<String>) -> Result<Self, String> {
        let url = normalize_text_option(Some(url.into()))
            .ok_or_else(|| "remote URL must not be empty".to_string())?;
        if !is_http_url(&url) {
            return Err("remote URL must include http:// or https://".to_string());
        }
        let anon_key = normalize_text_option(Some(anon_key.into()))
            .ok_or_else(|| "remote anon key must not be empty".to_string())?;

        Ok(Self {
            url: url.trim_end_matches('/').to_string(),
            anon_key,
        })
    }

    /// Build from optional parts; both or neither must be present.
    pub fn from_optional(
        url: Option<String>,
        anon_key: Option<String>,
    ) -> Result<Option<Self>, String> {
        match (normalize_text_option(url), normalize_text_option(anon_key)) {
            (None, None) => Ok(None),
            (Some(url), Some(anon_key)) => Self::new(url, anon_key).map(Some),
            (Some(_), None) => Err("remote anon key is missing".to_string()),
            (None, Some(_)) => Err("remote URL is missing".to_string()),
        }
    }

    /// Base URL without a trailing slash
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn anon_key(&self) -> &str {
        &self.anon_key
    }

    /// Base URL of the REST interface
    pub fn rest_url(&self) -> String {
        format!("{}/rest/v1", self.url)
    }
}

impl fmt::Debug for RemoteConfig {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("RemoteConfig")
            .field("url", &self.url)
            .field("anon_key", &"[REDACTED]")
            .finish()
    }
}

/// Fixed-delay retry owned by whoever triggers sync cycles.
///
/// The engine itself never retries; see [`crate::sync::run_with_retry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    /// Pause between attempts
    pub delay: Duration,
}

impl RetryPolicy {
    /// A single attempt, no retry
    pub const fn none() -> Self {
        Self {
            max_attempts: 1,
            delay: Duration::ZERO,
        }
    }

    #[must_use]
    pub const fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    #[must_use]
    pub const fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_RETRY_ATTEMPTS,
            delay: Duration::from_secs(DEFAULT_RETRY_DELAY_SECS),
        }
    }
}

/// Bounds for one sync cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncSettings {
    /// Rows requested per pull page
    pub pull_page_size: usize,
    /// Pages pulled at most per cycle
    pub max_pull_pages: usize,
    pub retry: RetryPolicy,
}

impl SyncSettings {
    #[must_use]
    pub const fn with_pull_page_size(mut self, pull_page_size: usize) -> Self {
        self.pull_page_size = if pull_page_size == 0 { 1 } else { pull_page_size };
        self
    }

    #[must_use]
    pub const fn with_max_pull_pages(mut self, max_pull_pages: usize) -> Self {
        self.max_pull_pages = if max_pull_pages == 0 { 1 } else { max_pull_pages };
        self
    }

    #[must_use]
    pub const fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            pull_page_size: DEFAULT_PULL_PAGE_SIZE,
            max_pull_pages: DEFAULT_MAX_PULL_PAGES,
            retry: RetryPolicy::default(),
        }
    }
}
