//! Kube Janitor - Kubernetes pod cleanup controller
//!
//! Watches pods across the cluster and removes failed, evicted and
//! crash-looping pods after a grace period, posting a notification when a
//! pod is detected and when its cleanup finishes.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use kube_janitor::client::build_client;
use kube_janitor::{ApiDeleter, Dispatcher, JanitorSettings, LogFormat, PodWatch, Remediator};
use notify::Notifier;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Kubernetes pod cleanup controller
#[derive(Parser)]
#[command(name = "kube-janitor")]
#[command(about = "Kubernetes pod cleanup controller - reaps failed, evicted and crash-looping pods")]
#[command(version)]
struct Cli {
    #[command(flatten)]
    settings: JanitorSettings,
}

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,kube_janitor=debug".into());
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received Ctrl+C, shutting down gracefully");
        },
        () = terminate => {
            info!("Received SIGTERM, shutting down gracefully");
        },
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = cli.settings;

    init_tracing(settings.log_format);
    settings.validate().context("Invalid configuration")?;

    info!(
        "Starting Kube Janitor v{} - Kubernetes pod cleanup controller",
        env!("CARGO_PKG_VERSION")
    );

    let client = build_client(settings.context.as_deref())
        .await
        .context("Failed to create Kubernetes client")?;
    info!("Connected to Kubernetes cluster");

    let notifier = Arc::new(Notifier::from_env());
    let remediator = Arc::new(Remediator::new(
        Arc::new(ApiDeleter::new(client.clone())),
        notifier,
        settings.grace_period(),
    ));
    let dispatcher = Arc::new(
        Dispatcher::new(Arc::clone(&remediator)).reclassify_updates(settings.reclassify_updates),
    );

    let mut watch = PodWatch::new(client, settings.namespace.as_deref())
        .cache_sync_timeout(settings.cache_sync_timeout());
    if let Some(selector) = settings.label_selector.as_deref() {
        watch = watch.label_selector(selector);
    }

    info!(
        namespace = settings.namespace.as_deref().unwrap_or("<all>"),
        grace_secs = settings.grace_period_secs,
        reclassify_updates = settings.reclassify_updates,
        "Starting pod watcher"
    );

    let result = tokio::select! {
        result = watch.run(dispatcher) => result.context("Pod watcher stopped"),
        () = shutdown_signal() => Ok(()),
    };

    let in_flight = remediator.in_flight();
    if remediator.drain(settings.drain_timeout()).await {
        info!(in_flight, "All in-flight cleanups finished");
    } else {
        warn!(
            remaining = remediator.in_flight(),
            "Drain timeout elapsed, exiting with cleanups still pending"
        );
    }

    result
}
