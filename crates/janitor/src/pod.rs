//! Read-only pod snapshots handed to the classifier and remediator.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use k8s_openapi::api::core::v1::Pod;
use kube::ResourceExt;
use serde::Serialize;

/// Restart diagnostics for one container, in `status.containerStatuses` order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerDiagnostics {
    pub name: String,
    /// `state.waiting.reason`, when the container is waiting.
    pub waiting_reason: Option<String>,
    pub restart_count: i32,
}

/// The subset of a pod the janitor reasons about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PodSnapshot {
    pub uid: String,
    pub namespace: String,
    pub name: String,
    pub phase: Option<String>,
    /// `status.reason`, e.g. `Evicted`.
    pub reason: Option<String>,
    pub containers: Vec<ContainerDiagnostics>,
    pub start_time: Option<DateTime<Utc>>,
    pub labels: BTreeMap<String, String>,
}

impl PodSnapshot {
    /// Snapshot a pod. Returns `None` when the pod has no UID yet.
    pub fn from_pod(pod: &Pod) -> Option<Self> {
        let uid = pod.uid()?;
        let status = pod.status.as_ref();

        let containers = status
            .and_then(|s| s.container_statuses.as_ref())
            .map(|statuses| {
                statuses
                    .iter()
                    .map(|cs| ContainerDiagnostics {
                        name: cs.name.clone(),
                        waiting_reason: cs
                            .state
                            .as_ref()
                            .and_then(|state| state.waiting.as_ref())
                            .and_then(|waiting| waiting.reason.clone()),
                        restart_count: cs.restart_count,
                    })
                    .collect()
            })
            .unwrap_or_default();

        Some(Self {
            uid,
            namespace: pod.namespace().unwrap_or_default(),
            name: pod.name_any(),
            phase: status.and_then(|s| s.phase.clone()),
            reason: status.and_then(|s| s.reason.clone()),
            containers,
            start_time: status.and_then(|s| s.start_time.as_ref()).map(|t| t.0),
            labels: pod.labels().clone(),
        })
    }

    /// `namespace/name`, for logs.
    pub fn key(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }

    pub fn details(&self) -> PodDetails<'_> {
        PodDetails {
            name: &self.name,
            namespace: &self.namespace,
            phase: self.phase.as_deref().unwrap_or_default(),
            start_time: self.start_time,
        }
    }
}

/// Compact view logged for tracked and deleted pods.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PodDetails<'a> {
    pub name: &'a str,
    pub namespace: &'a str,
    pub phase: &'a str,
    pub start_time: Option<DateTime<Utc>>,
}
