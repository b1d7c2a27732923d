//! Delayed, deduplicated pod removal.
//!
//! Each offending pod gets at most one remediation sequence at a time:
//!
//! ```text
//! Detected -> GracePeriod -> Deleting -> Succeeded | Failed
//! ```
//!
//! `Detected` is reported before the sequence is spawned. The terminal outcome
//! is reported after the delete attempt, and the pod's UID is released from
//! the [`SeenSet`] last, whatever the outcome. Failed deletes are not retried;
//! a pod that is still unhealthy is picked up again on its next event.
//!
//! The pod is not re-checked after the grace period.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Pod;
use kube::api::{Api, DeleteParams, Preconditions};
use kube::Client;
use tokio::task::JoinHandle;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use crate::classify::Classification;
use crate::error::Result;
use crate::notifier::OutcomeNotifier;
use crate::pod::PodSnapshot;
use crate::seen::SeenSet;

/// Default wait between detection and deletion.
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(20);

/// Issues the actual delete call.
#[async_trait]
pub trait PodDeleter: Send + Sync {
    async fn delete(&self, pod: &PodSnapshot) -> Result<()>;
}

/// Deletes pods through the Kubernetes API.
///
/// The request carries a UID precondition so a pod recreated under the same
/// name is left alone.
#[derive(Clone)]
pub struct ApiDeleter {
    client: Client,
}

impl ApiDeleter {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl PodDeleter for ApiDeleter {
    async fn delete(&self, pod: &PodSnapshot) -> Result<()> {
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), &pod.namespace);
        let params = DeleteParams {
            preconditions: Some(Preconditions {
                uid: Some(pod.uid.clone()),
                resource_version: None,
            }),
            ..DeleteParams::default()
        };
        pods.delete(&pod.name, &params).await?;
        Ok(())
    }
}

/// What a remediation produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Detected(Classification),
    Deleted,
    DeleteFailed { error: String },
}

/// Stages of a remediation sequence, used as a log field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Detected,
    GracePeriod,
    Deleting,
    Succeeded,
    Failed,
}

impl Stage {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Detected => "detected",
            Self::GracePeriod => "grace_period",
            Self::Deleting => "deleting",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        }
    }
}

/// Releases a UID from the seen-set when dropped.
struct SeenGuard {
    seen: SeenSet,
    uid: String,
}

impl Drop for SeenGuard {
    fn drop(&mut self) {
        self.seen.release(&self.uid);
    }
}

/// Schedules remediation sequences.
pub struct Remediator {
    seen: SeenSet,
    deleter: Arc<dyn PodDeleter>,
    notifier: Arc<dyn OutcomeNotifier>,
    grace_period: Duration,
    tracker: TaskTracker,
}

impl Remediator {
    pub fn new(
        deleter: Arc<dyn PodDeleter>,
        notifier: Arc<dyn OutcomeNotifier>,
        grace_period: Duration,
    ) -> Self {
        Self {
            seen: SeenSet::new(),
            deleter,
            notifier,
            grace_period,
            tracker: TaskTracker::new(),
        }
    }

    /// Use a caller-owned seen-set instead of a fresh one.
    #[must_use]
    pub fn with_seen_set(mut self, seen: SeenSet) -> Self {
        self.seen = seen;
        self
    }

    pub fn seen(&self) -> &SeenSet {
        &self.seen
    }

    pub fn grace_period(&self) -> Duration {
        self.grace_period
    }

    /// Number of sequences pending or running.
    pub fn in_flight(&self) -> usize {
        self.seen.len()
    }

    /// Start a remediation for `pod` unless it is healthy or already in flight.
    ///
    /// Returns the handle of the spawned sequence, which resolves to the
    /// terminal outcome.
    pub fn remediate(
        &self,
        pod: PodSnapshot,
        finding: Classification,
    ) -> Option<JoinHandle<Outcome>> {
        if !finding.is_offending() {
            return None;
        }

        if self.tracker.is_closed() {
            debug!(pod = %pod.key(), "Shutting down, not scheduling remediation");
            return None;
        }

        if !self.seen.try_mark(&pod.uid) {
            debug!(
                pod = %pod.key(),
                uid = %pod.uid,
                "Remediation already in flight, dropping duplicate event"
            );
            return None;
        }
        let guard = SeenGuard {
            seen: self.seen.clone(),
            uid: pod.uid.clone(),
        };

        warn!(
            namespace = %pod.namespace,
            pod = %pod.name,
            uid = %pod.uid,
            finding = %finding,
            grace_secs = self.grace_period.as_secs(),
            stage = Stage::Detected.as_str(),
            "Detected unhealthy pod, scheduled for cleanup"
        );
        self.notifier.report(&Outcome::Detected(finding), &pod);

        let deleter = Arc::clone(&self.deleter);
        let notifier = Arc::clone(&self.notifier);
        let grace_period = self.grace_period;

        Some(self.tracker.spawn(async move {
            let _guard = guard;
            run_sequence(&pod, deleter.as_ref(), notifier.as_ref(), grace_period).await
        }))
    }

    /// Stop accepting new work and wait for running sequences.
    ///
    /// Returns `false` if `timeout` elapsed first.
    pub async fn drain(&self, timeout: Duration) -> bool {
        self.tracker.close();
        let pending = self.tracker.len();
        if pending > 0 {
            info!(pending, timeout_secs = timeout.as_secs(), "Waiting for in-flight remediations");
        }
        tokio::time::timeout(timeout, self.tracker.wait()).await.is_ok()
    }
}

async fn run_sequence(
    pod: &PodSnapshot,
    deleter: &dyn PodDeleter,
    notifier: &dyn OutcomeNotifier,
    grace_period: Duration,
) -> Outcome {
    debug!(pod = %pod.key(), stage = Stage::GracePeriod.as_str(), "Waiting out grace period");
    tokio::time::sleep(grace_period).await;

    debug!(pod = %pod.key(), stage = Stage::Deleting.as_str(), "Deleting pod");
    let outcome = match deleter.delete(pod).await {
        Ok(()) => {
            let details = serde_json::to_string(&pod.details()).unwrap_or_default();
            info!(
                pod = %pod.key(),
                uid = %pod.uid,
                stage = Stage::Succeeded.as_str(),
                details = %details,
                "Deleted pod"
            );
            Outcome::Deleted
        }
        Err(e) => {
            error!(
                pod = %pod.key(),
                uid = %pod.uid,
                stage = Stage::Failed.as_str(),
                error = %e,
                "Failed to delete pod"
            );
            Outcome::DeleteFailed {
                error: e.to_string(),
            }
        }
    };

    notifier.report(&outcome, pod);
    outcome
}
