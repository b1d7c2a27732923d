//! Bridges remediation outcomes to the `notify` crate.

use chrono::Utc;
use notify::{Notifier, NotifyEvent};
use tracing::debug;

use crate::classify::Classification;
use crate::pod::PodSnapshot;
use crate::remediate::Outcome;

/// Receives one call per meaningful remediation transition.
///
/// Implementations must not block and must swallow their own failures.
pub trait OutcomeNotifier: Send + Sync {
    fn report(&self, outcome: &Outcome, pod: &PodSnapshot);
}

impl OutcomeNotifier for Notifier {
    fn report(&self, outcome: &Outcome, pod: &PodSnapshot) {
        match outcome_event(outcome, pod) {
            Some(event) => self.notify(event),
            None => debug!(pod = %pod.key(), "Outcome has no notification"),
        }
    }
}

/// Map an outcome onto the notification event operators see.
pub fn outcome_event(outcome: &Outcome, pod: &PodSnapshot) -> Option<NotifyEvent> {
    let namespace = pod.namespace.clone();
    let name = pod.name.clone();
    let timestamp = Utc::now();

    let event = match outcome {
        Outcome::Detected(Classification::Healthy) => return None,
        Outcome::Detected(Classification::TerminalFailure { reason }) => {
            NotifyEvent::PodTerminalFailure {
                namespace,
                pod: name,
                reason: reason.clone(),
                timestamp,
            }
        }
        Outcome::Detected(Classification::CrashLooping {
            container,
            restart_count,
        }) => NotifyEvent::PodCrashLooping {
            namespace,
            pod: name,
            container: container.clone(),
            restart_count: *restart_count,
            timestamp,
        },
        Outcome::Deleted => NotifyEvent::PodDeleted {
            namespace,
            pod: name,
            timestamp,
        },
        Outcome::DeleteFailed { error } => NotifyEvent::PodDeleteFailed {
            namespace,
            pod: name,
            error: error.clone(),
            timestamp,
        },
    };

    Some(event)
}
