//! Failure policy: decides whether a pod should be reaped.
//!
//! Rules are checked in priority order and the first match wins:
//! 1. Phase `Failed` or status reason `Evicted` -> [`Classification::TerminalFailure`]
//! 2. A container waiting in `CrashLoopBackOff` with at least
//!    [`CRASH_LOOP_RESTART_THRESHOLD`] restarts -> [`Classification::CrashLooping`]
//! 3. Anything else -> [`Classification::Healthy`]

use std::fmt;

use crate::pod::PodSnapshot;

pub const PHASE_FAILED: &str = "Failed";
pub const REASON_EVICTED: &str = "Evicted";
pub const REASON_CRASH_LOOP: &str = "CrashLoopBackOff";

/// Minimum restart count before a crash-looping container gets its pod reaped.
pub const CRASH_LOOP_RESTART_THRESHOLD: i32 = 5;

/// Verdict for one pod snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    Healthy,
    TerminalFailure { reason: String },
    CrashLooping { container: String, restart_count: i32 },
}

impl Classification {
    pub fn is_offending(&self) -> bool {
        !matches!(self, Self::Healthy)
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Healthy => f.write_str("healthy"),
            Self::TerminalFailure { reason } => write!(f, "terminal failure ({reason})"),
            Self::CrashLooping {
                container,
                restart_count,
            } => write!(f, "crash looping ({container}, {restart_count} restarts)"),
        }
    }
}

pub fn classify(pod: &PodSnapshot) -> Classification {
    let evicted = pod.reason.as_deref() == Some(REASON_EVICTED);
    if evicted || pod.phase.as_deref() == Some(PHASE_FAILED) {
        let reason = if evicted {
            REASON_EVICTED.to_string()
        } else {
            PHASE_FAILED.to_string()
        };
        return Classification::TerminalFailure { reason };
    }

    pod.containers
        .iter()
        .find(|c| {
            c.waiting_reason.as_deref() == Some(REASON_CRASH_LOOP)
                && c.restart_count >= CRASH_LOOP_RESTART_THRESHOLD
        })
        .map_or(Classification::Healthy, |c| Classification::CrashLooping {
            container: c.name.clone(),
            restart_count: c.restart_count,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pod::ContainerDiagnostics;
    use std::collections::BTreeMap;

    type Container<'a> = (&'a str, Option<&'a str>, i32);

    fn snapshot(phase: Option<&str>, reason: Option<&str>, containers: &[Container<'_>]) -> PodSnapshot {
        PodSnapshot {
            uid: "uid".to_string(),
            namespace: "default".to_string(),
            name: "pod".to_string(),
            phase: phase.map(str::to_string),
            reason: reason.map(str::to_string),
            containers: containers
                .iter()
                .map(|(name, waiting, restarts)| ContainerDiagnostics {
                    name: (*name).to_string(),
                    waiting_reason: waiting.map(str::to_string),
                    restart_count: *restarts,
                })
                .collect(),
            start_time: None,
            labels: BTreeMap::new(),
        }
    }

    #[test]
    fn test_failed_phase_is_terminal() {
        let pod = snapshot(Some("Failed"), None, &[]);
        assert_eq!(
            classify(&pod),
            Classification::TerminalFailure {
                reason: "Failed".to_string()
            }
        );
    }

    #[test]
    fn test_evicted_reason_is_terminal() {
        let pod = snapshot(Some("Failed"), Some("Evicted"), &[]);
        assert_eq!(
            classify(&pod),
            Classification::TerminalFailure {
                reason: "Evicted".to_string()
            }
        );

        // Evicted wins even without a Failed phase.
        let pod = snapshot(Some("Running"), Some("Evicted"), &[]);
        assert!(matches!(classify(&pod), Classification::TerminalFailure { .. }));
    }

    #[test]
    fn test_terminal_takes_priority_over_crash_loop() {
        let pod = snapshot(Some("Failed"), None, &[("app", Some("CrashLoopBackOff"), 50)]);
        assert!(matches!(classify(&pod), Classification::TerminalFailure { .. }));
    }

    #[test]
    fn test_crash_loop_threshold() {
        let at = snapshot(Some("Running"), None, &[("app", Some("CrashLoopBackOff"), 5)]);
        assert_eq!(
            classify(&at),
            Classification::CrashLooping {
                container: "app".to_string(),
                restart_count: 5
            }
        );

        let below = snapshot(Some("Running"), None, &[("app", Some("CrashLoopBackOff"), 4)]);
        assert_eq!(classify(&below), Classification::Healthy);

        let three = snapshot(Some("Running"), None, &[("app", Some("CrashLoopBackOff"), 3)]);
        assert_eq!(classify(&three), Classification::Healthy);
    }

    #[test]
    fn test_crash_loop_requires_waiting_reason() {
        let pod = snapshot(
            Some("Running"),
            None,
            &[("app", None, 40), ("side", Some("ImagePullBackOff"), 40)],
        );
        assert_eq!(classify(&pod), Classification::Healthy);
    }

    #[test]
    fn test_first_matching_container_reported() {
        let pod = snapshot(
            Some("Running"),
            None,
            &[
                ("init-ok", None, 0),
                ("worker", Some("CrashLoopBackOff"), 6),
                ("sidecar", Some("CrashLoopBackOff"), 12),
            ],
        );
        assert_eq!(
            classify(&pod),
            Classification::CrashLooping {
                container: "worker".to_string(),
                restart_count: 6
            }
        );
    }

    #[test]
    fn test_missing_status_is_healthy() {
        let pod = snapshot(None, None, &[]);
        assert_eq!(classify(&pod), Classification::Healthy);
        assert!(!classify(&pod).is_offending());
    }
}
