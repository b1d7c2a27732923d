//! Error types for the janitor.

use std::time::Duration;

use thiserror::Error;

/// Errors surfaced by the janitor library.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    #[error("Failed to load kubeconfig: {0}")]
    Kubeconfig(#[from] kube::config::KubeconfigError),

    #[error("Failed to infer cluster configuration: {0}")]
    InferConfig(#[from] kube::config::InferConfigError),

    #[error("Pod cache did not sync within {0:?}")]
    CacheSyncTimeout(Duration),

    #[error("Pod watch stream ended")]
    WatchEnded,

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
