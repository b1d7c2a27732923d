//! Routes watch events to the classifier and remediator.

use std::sync::Arc;

use k8s_openapi::api::core::v1::Pod;
use kube::ResourceExt;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use crate::classify::classify;
use crate::pod::PodSnapshot;
use crate::remediate::{Outcome, Remediator};

/// Label that opts a pod out of cleanup.
pub const EXCLUDE_LABEL: &str = "janitor.io/exclude";

/// A pod change delivered by the watch layer.
#[derive(Debug, Clone)]
pub enum PodEvent {
    Added(Pod),
    Updated(Pod),
}

/// Turns pod events into remediations.
///
/// Added pods are always classified. Updates are only logged unless
/// `reclassify_updates` is set, in which case they take the same path as
/// adds and rely on the seen-set for deduplication.
pub struct Dispatcher {
    remediator: Arc<Remediator>,
    reclassify_updates: bool,
}

impl Dispatcher {
    pub fn new(remediator: Arc<Remediator>) -> Self {
        Self {
            remediator,
            reclassify_updates: false,
        }
    }

    #[must_use]
    pub fn reclassify_updates(mut self, enabled: bool) -> Self {
        self.reclassify_updates = enabled;
        self
    }

    pub fn remediator(&self) -> &Arc<Remediator> {
        &self.remediator
    }

    /// Handle one event. Never waits on a remediation.
    pub fn dispatch(&self, event: &PodEvent) -> Option<JoinHandle<Outcome>> {
        match event {
            PodEvent::Added(pod) => self.on_added(pod),
            PodEvent::Updated(pod) => self.on_updated(pod),
        }
    }

    pub fn on_added(&self, pod: &Pod) -> Option<JoinHandle<Outcome>> {
        self.evaluate(pod)
    }

    pub fn on_updated(&self, pod: &Pod) -> Option<JoinHandle<Outcome>> {
        if let Some(status) = &pod.status {
            if let Ok(status) = serde_json::to_string(status) {
                debug!(
                    namespace = %pod.namespace().unwrap_or_default(),
                    pod = %pod.name_any(),
                    status = %status,
                    "Pod status update"
                );
            }
        }

        if self.reclassify_updates {
            self.evaluate(pod)
        } else {
            None
        }
    }

    fn evaluate(&self, pod: &Pod) -> Option<JoinHandle<Outcome>> {
        let Some(snapshot) = PodSnapshot::from_pod(pod) else {
            trace!(pod = %pod.name_any(), "Pod has no UID yet, skipping");
            return None;
        };

        if is_excluded(&snapshot) {
            debug!(pod = %snapshot.key(), label = EXCLUDE_LABEL, "Pod excluded from cleanup");
            return None;
        }

        let finding = classify(&snapshot);
        if !finding.is_offending() {
            if let Ok(details) = serde_json::to_string(&snapshot.details()) {
                debug!(pod = %snapshot.key(), details = %details, "Tracking pod");
            }
            return None;
        }

        self.remediator.remediate(snapshot, finding)
    }
}

fn is_excluded(pod: &PodSnapshot) -> bool {
    pod.labels
        .get(EXCLUDE_LABEL)
        .is_some_and(|v| v.eq_ignore_ascii_case("true"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::notifier::OutcomeNotifier;
    use crate::pod::fixtures::{crash_looping_pod, pod_with_status};
    use crate::remediate::PodDeleter;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Default)]
    struct Counter {
        deletes: AtomicUsize,
        reports: AtomicUsize,
    }

    #[async_trait]
    impl PodDeleter for Counter {
        async fn delete(&self, _pod: &PodSnapshot) -> Result<()> {
            self.deletes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    impl OutcomeNotifier for Counter {
        fn report(&self, _outcome: &Outcome, _pod: &PodSnapshot) {
            self.reports.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn dispatcher(counter: &Arc<Counter>) -> Dispatcher {
        let remediator = Remediator::new(counter.clone(), counter.clone(), Duration::from_secs(20));
        Dispatcher::new(Arc::new(remediator))
    }

    #[tokio::test(start_paused = true)]
    async fn test_updates_are_observed_only_by_default() {
        let counter = Arc::new(Counter::default());
        let dispatcher = dispatcher(&counter);

        let pod = crash_looping_pod("api-0", "uid-1", 12);
        assert!(dispatcher.dispatch(&PodEvent::Updated(pod)).is_none());
        assert_eq!(counter.reports.load(Ordering::SeqCst), 0);
        assert!(dispatcher.remediator().seen().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_updates_reclassified_when_enabled() {
        let counter = Arc::new(Counter::default());
        let dispatcher = dispatcher(&counter).reclassify_updates(true);

        let pod = crash_looping_pod("api-0", "uid-1", 12);
        let handle = dispatcher.dispatch(&PodEvent::Updated(pod.clone())).unwrap();
        // A follow-up update for the same pod while in flight is a no-op.
        assert!(dispatcher.dispatch(&PodEvent::Updated(pod)).is_none());

        assert_eq!(handle.await.unwrap(), Outcome::Deleted);
        assert_eq!(counter.deletes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_excluded_pod_is_left_alone() {
        let counter = Arc::new(Counter::default());
        let dispatcher = dispatcher(&counter);

        let mut pod = pod_with_status("keep-me", "uid-2", json!({ "phase": "Failed" }));
        pod.labels_mut()
            .insert(EXCLUDE_LABEL.to_string(), "true".to_string());

        assert!(dispatcher.on_added(&pod).is_none());
        assert_eq!(counter.reports.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pod_without_uid_is_skipped() {
        let counter = Arc::new(Counter::default());
        let dispatcher = dispatcher(&counter);

        let pod: Pod = serde_json::from_value(json!({
            "metadata": { "name": "fresh", "namespace": "default" },
            "status": { "phase": "Failed" }
        }))
        .unwrap();
        assert!(dispatcher.on_added(&pod).is_none());
    }
}
