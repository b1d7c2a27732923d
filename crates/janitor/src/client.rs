//! Kubernetes client construction.

use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};
use tracing::{debug, info};

use crate::error::{Error, Result};

/// Build a client for `context`, or infer one when no context is given.
///
/// Inference tries the kubeconfig (`KUBECONFIG` or `~/.kube/config`) and
/// falls back to the in-cluster service account. An explicit context never
/// falls back: it must exist in a readable kubeconfig.
pub async fn build_client(context: Option<&str>) -> Result<Client> {
    let config = match context {
        Some(context) => {
            let kubeconfig = Kubeconfig::read()?;
            if !kubeconfig.contexts.iter().any(|c| c.name == context) {
                return Err(Error::Config(format!(
                    "context '{context}' not found in kubeconfig"
                )));
            }

            info!(context, "Using Kubernetes context");
            let options = KubeConfigOptions {
                context: Some(context.to_string()),
                ..KubeConfigOptions::default()
            };
            Config::from_custom_kubeconfig(kubeconfig, &options).await?
        }
        None => {
            debug!("No context given, inferring cluster configuration");
            Config::infer().await?
        }
    };

    debug!(cluster_url = %config.cluster_url, "Creating Kubernetes client");
    Ok(Client::try_from(config)?)
}
