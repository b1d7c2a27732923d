//! Runtime settings, read from flags or environment variables.

use std::time::Duration;

use clap::{Args, ValueEnum};

use crate::error::{Error, Result};

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Args)]
pub struct JanitorSettings {
    /// Kubeconfig context to use (defaults to the current context or in-cluster config)
    #[arg(long, env = "CONTEXT")]
    pub context: Option<String>,

    /// Namespace to watch (defaults to all namespaces)
    #[arg(long, env = "JANITOR_NAMESPACE")]
    pub namespace: Option<String>,

    /// Only watch pods matching this label selector
    #[arg(long, env = "JANITOR_LABEL_SELECTOR")]
    pub label_selector: Option<String>,

    /// Seconds to wait between detecting a pod and deleting it
    #[arg(long, env = "JANITOR_GRACE_PERIOD_SECS", default_value = "20")]
    pub grace_period_secs: u64,

    /// Seconds allowed for the initial pod list before giving up
    #[arg(long, env = "JANITOR_CACHE_SYNC_TIMEOUT_SECS", default_value = "120")]
    pub cache_sync_timeout_secs: u64,

    /// Seconds to wait for in-flight cleanups on shutdown
    #[arg(long, env = "JANITOR_DRAIN_TIMEOUT_SECS", default_value = "30")]
    pub drain_timeout_secs: u64,

    /// Also classify pods on update events, not only when first seen
    #[arg(long, env = "JANITOR_RECLASSIFY_UPDATES")]
    pub reclassify_updates: bool,

    /// Log output format
    #[arg(long, env = "JANITOR_LOG_FORMAT", value_enum, default_value = "text")]
    pub log_format: LogFormat,
}

impl JanitorSettings {
    pub fn grace_period(&self) -> Duration {
        Duration::from_secs(self.grace_period_secs)
    }

    pub fn cache_sync_timeout(&self) -> Duration {
        Duration::from_secs(self.cache_sync_timeout_secs)
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_secs(self.drain_timeout_secs)
    }

    pub fn validate(&self) -> Result<()> {
        if self.cache_sync_timeout_secs == 0 {
            return Err(Error::Config(
                "cache sync timeout must be greater than zero".to_string(),
            ));
        }

        for (name, value) in [
            ("context", &self.context),
            ("namespace", &self.namespace),
            ("label selector", &self.label_selector),
        ] {
            if value.as_deref().is_some_and(|v| v.trim().is_empty()) {
                return Err(Error::Config(format!("{name} must not be empty when set")));
            }
        }

        Ok(())
    }
}
