//! Notification event types for pod cleanup.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Events that can trigger notifications.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NotifyEvent {
    // =========================================================================
    // Detection events (emitted before the grace period starts)
    // =========================================================================
    /// A container in the pod is stuck in `CrashLoopBackOff`
    PodCrashLooping {
        namespace: String,
        pod: String,
        container: String,
        restart_count: i32,
        #[serde(default = "Utc::now")]
        timestamp: DateTime<Utc>,
    },

    /// The pod has failed or was evicted
    PodTerminalFailure {
        namespace: String,
        pod: String,
        reason: String,
        #[serde(default = "Utc::now")]
        timestamp: DateTime<Utc>,
    },

    // =========================================================================
    // Cleanup outcome events
    // =========================================================================
    /// The pod was deleted after its grace period
    PodDeleted {
        namespace: String,
        pod: String,
        #[serde(default = "Utc::now")]
        timestamp: DateTime<Utc>,
    },

    /// The delete call was rejected or could not reach the API server
    PodDeleteFailed {
        namespace: String,
        pod: String,
        error: String,
        #[serde(default = "Utc::now")]
        timestamp: DateTime<Utc>,
    },
}

impl NotifyEvent {
    /// Get a short title for this event type.
    #[must_use]
    pub const fn title(&self) -> &'static str {
        match self {
            Self::PodCrashLooping { .. } => "Pod CrashLoopBackOff Detected",
            Self::PodTerminalFailure { .. } => "Failed/Evicted Pod Detected",
            Self::PodDeleted { .. } => "Pod Cleanup Complete",
            Self::PodDeleteFailed { .. } => "Pod Deletion Failed",
        }
    }

    /// Short human-readable reason shown next to the pod name.
    #[must_use]
    pub fn reason(&self) -> String {
        match self {
            Self::PodCrashLooping { restart_count, .. } => {
                format!("CrashLoopBackOff ({restart_count} restarts)")
            }
            Self::PodTerminalFailure { reason, .. } => reason.clone(),
            Self::PodDeleted { .. } => "Cleaned Up".to_string(),
            Self::PodDeleteFailed { .. } => "Deletion Error".to_string(),
        }
    }

    /// Namespace of the pod this event is about.
    #[must_use]
    pub fn namespace(&self) -> &str {
        match self {
            Self::PodCrashLooping { namespace, .. }
            | Self::PodTerminalFailure { namespace, .. }
            | Self::PodDeleted { namespace, .. }
            | Self::PodDeleteFailed { namespace, .. } => namespace,
        }
    }

    /// Name of the pod this event is about.
    #[must_use]
    pub fn pod(&self) -> &str {
        match self {
            Self::PodCrashLooping { pod, .. }
            | Self::PodTerminalFailure { pod, .. }
            | Self::PodDeleted { pod, .. }
            | Self::PodDeleteFailed { pod, .. } => pod,
        }
    }

    /// Get the timestamp for this event.
    #[must_use]
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::PodCrashLooping { timestamp, .. }
            | Self::PodTerminalFailure { timestamp, .. }
            | Self::PodDeleted { timestamp, .. }
            | Self::PodDeleteFailed { timestamp, .. } => *timestamp,
        }
    }
}
