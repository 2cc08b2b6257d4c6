//! Billing facade options

use std::env;
use std::time::Duration;

/// Default polling interval for volatile resources (60 seconds)
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_millis(60_000);

/// Default number of retries for a failed query
pub const DEFAULT_QUERY_RETRIES: usize = 2;

/// Behaviour switches for [`crate::BillingFacade`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BillingOptions {
    /// Poll volatile resources (subscription, usage, credit balance) on a timer
    pub auto_refresh: bool,
    /// Polling interval used when `auto_refresh` is on
    pub refresh_interval: Duration,
    /// Accept pushed [`crate::BillingEvent`]s
    pub enable_real_time: bool,
    /// Retries for a failed query; mutations are never retried
    pub query_retries: usize,
}

impl Default for BillingOptions {
    fn default() -> Self {
        Self {
            auto_refresh: false,
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
            enable_real_time: false,
            query_retries: DEFAULT_QUERY_RETRIES,
        }
    }
}

impl BillingOptions {
    /// Load options from environment variables, falling back to defaults
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            auto_refresh: env_flag("BILLING_AUTO_REFRESH", defaults.auto_refresh),
            refresh_interval: env::var("BILLING_REFRESH_INTERVAL_MS")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .filter(|ms| *ms > 0)
                .map(Duration::from_millis)
                .unwrap_or(defaults.refresh_interval),
            enable_real_time: env_flag("BILLING_REAL_TIME", defaults.enable_real_time),
            query_retries: env::var("BILLING_QUERY_RETRIES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.query_retries),
        }
    }

    pub fn with_auto_refresh(mut self, interval: Duration) -> Self {
        self.auto_refresh = true;
        self.refresh_interval = interval;
        self
    }

    pub fn with_real_time(mut self) -> Self {
        self.enable_real_time = true;
        self
    }

    pub fn with_query_retries(mut self, retries: usize) -> Self {
        self.query_retries = retries;
        self
    }
}

fn env_flag(name: &str, default: bool) -> bool {
    env::var(name)
        .map(|v| matches!(v.trim().to_lowercase().as_str(), "true" | "1" | "yes"))
        .unwrap_or(default)
}
