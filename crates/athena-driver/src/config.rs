use std::env;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::driver::PollPolicy;

/// Rows requested per results page.
pub const DEFAULT_PAGE_SIZE: u32 = 50;

/// Athena rejects `MaxResults` above this.
pub const MAX_PAGE_SIZE: u32 = 1000;

const DEFAULT_REGION: &str = "ap-northeast-1";
const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;
const DEFAULT_TIMEOUT_SECONDS: u64 = 300;
const DEFAULT_MAX_STATUS_ERRORS: u32 = 5;

// ── Env lookup ──────────────────────────────────────────────────

/// Env reader scoped to one profile: `{PROFILE}_{KEY}` shadows `{KEY}`.
/// Empty values count as unset.
struct ProfiledEnv<'a> {
    profile: &'a str,
}

impl ProfiledEnv<'_> {
    fn get(&self, key: &str) -> Option<String> {
        let lookup = |k: &str| env::var(k).ok().filter(|v| !v.is_empty());
        if self.profile.is_empty() {
            return lookup(key);
        }
        lookup(&format!("{}_{key}", self.profile)).or_else(|| lookup(key))
    }

    /// Parsed value of `key`; unparsable values fall back to `default`.
    fn parse_or<T: FromStr>(&self, key: &str, default: T) -> T {
        self.get(key).and_then(|v| v.parse().ok()).unwrap_or(default)
    }
}

// ── DriverConfig ─────────────────────────────────────────────────

/// Configuration for the Athena execution driver and result paginator.
///
/// Reads from environment variables with optional profile prefix.
/// When `ATHENA_PROFILE=PROD`, checks `PROD_ATHENA_DATABASE` before `ATHENA_DATABASE`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriverConfig {
    /// AWS region for Athena queries.
    pub region: String,
    /// Default database for unqualified table names (empty = none).
    pub database: String,
    /// Athena workgroup.
    pub workgroup: String,
    /// S3 URI where Athena materializes results.
    pub output_location: String,
    /// Rows requested per results page.
    pub page_size: u32,
    /// Fixed delay between status polls, in milliseconds.
    pub poll_interval_ms: u64,
    /// Maximum number of status polls (0 = unlimited).
    pub max_polls: u32,
    /// Poll deadline in seconds (0 = unlimited).
    pub timeout_seconds: u64,
    /// Consecutive status-fetch failures tolerated before giving up.
    pub max_status_errors: u32,
    /// Static credentials. When absent the default AWS provider chain is used.
    #[serde(skip)]
    pub access_key_id: Option<String>,
    #[serde(skip)]
    pub secret_access_key: Option<String>,
    #[serde(skip)]
    pub session_token: Option<String>,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            region: DEFAULT_REGION.to_string(),
            database: String::new(),
            workgroup: "primary".to_string(),
            output_location: String::new(),
            page_size: DEFAULT_PAGE_SIZE,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            max_polls: 0,
            timeout_seconds: DEFAULT_TIMEOUT_SECONDS,
            max_status_errors: DEFAULT_MAX_STATUS_ERRORS,
            access_key_id: None,
            secret_access_key: None,
            session_token: None,
        }
    }
}

impl DriverConfig {
    /// Build config from environment variables.
    ///
    /// Reads `ATHENA_PROFILE` to determine profile prefix.
    /// For each key, tries `{PROFILE}_ATHENA_*` first, then `ATHENA_*`.
    /// `ATHENA_REGION` falls back to `AWS_REGION` before using the default.
    pub fn from_env() -> Self {
        let profile = ProfiledEnv { profile: "" }
            .get("ATHENA_PROFILE")
            .map(|s| s.to_uppercase())
            .unwrap_or_default();
        Self::from_env_profiled(&profile)
    }

    /// Build config for a specific named profile.
    pub fn from_env_profiled(profile: &str) -> Self {
        let env = ProfiledEnv { profile };
        let defaults = Self::default();

        Self {
            region: env
                .get("ATHENA_REGION")
                .or_else(|| env.get("AWS_REGION"))
                .unwrap_or(defaults.region),
            database: env.get("ATHENA_DATABASE").unwrap_or(defaults.database),
            workgroup: env.get("ATHENA_WORKGROUP").unwrap_or(defaults.workgroup),
            output_location: env
                .get("ATHENA_OUTPUT_LOCATION")
                .unwrap_or(defaults.output_location),
            page_size: env
                .parse_or("ATHENA_PAGE_SIZE", defaults.page_size)
                .clamp(1, MAX_PAGE_SIZE),
            poll_interval_ms: env.parse_or("ATHENA_POLL_INTERVAL_MS", defaults.poll_interval_ms),
            max_polls: env.parse_or("ATHENA_MAX_POLLS", defaults.max_polls),
            timeout_seconds: env.parse_or("ATHENA_TIMEOUT_SECONDS", defaults.timeout_seconds),
            max_status_errors: env.parse_or("ATHENA_MAX_STATUS_ERRORS", defaults.max_status_errors),
            access_key_id: env.get("AWS_ACCESS_KEY_ID"),
            secret_access_key: env.get("AWS_SECRET_ACCESS_KEY"),
            session_token: env.get("AWS_SESSION_TOKEN"),
        }
    }

    /// Returns `true` when an output location has been configured.
    pub fn is_configured(&self) -> bool {
        !self.output_location.is_empty()
    }

    /// Returns `true` when both halves of a static key pair are present.
    pub fn has_static_credentials(&self) -> bool {
        self.access_key_id.is_some() && self.secret_access_key.is_some()
    }

    /// The bounded poll policy described by this config.
    pub fn poll_policy(&self) -> PollPolicy {
        PollPolicy {
            interval: Duration::from_millis(self.poll_interval_ms),
            max_attempts: (self.max_polls > 0).then_some(self.max_polls),
            timeout: (self.timeout_seconds > 0).then(|| Duration::from_secs(self.timeout_seconds)),
            max_status_errors: self.max_status_errors.max(1),
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────
