//! Pod watch driver.
//!
//! Runs a `kube` watcher feeding a reflector store, turns raw watcher events
//! into add/update notifications, and holds them back until the store has
//! completed its first list.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use k8s_openapi::api::core::v1::Pod;
use kube::runtime::{reflector, watcher, WatchStreamExt};
use kube::{Api, Client, ResourceExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::dispatch::{Dispatcher, PodEvent};
use crate::error::{Error, Result};

/// Default time allowed for the initial pod list.
pub const DEFAULT_CACHE_SYNC_TIMEOUT: Duration = Duration::from_secs(120);

/// Tracks which pod UIDs the watch has already delivered, so applies can be
/// split into adds and updates.
#[derive(Debug, Default)]
pub struct KnownPods {
    known: HashSet<String>,
    relisting: Option<HashSet<String>>,
}

impl KnownPods {
    /// Translate one watcher event. Returns `None` for bookkeeping events.
    pub fn observe(&mut self, event: watcher::Event<Pod>) -> Option<PodEvent> {
        match event {
            watcher::Event::Init => {
                self.relisting = Some(HashSet::new());
                None
            }
            watcher::Event::InitApply(pod) => {
                if let (Some(relisting), Some(uid)) = (self.relisting.as_mut(), pod.uid()) {
                    relisting.insert(uid);
                }
                Some(self.applied(pod))
            }
            watcher::Event::InitDone => {
                // Forget pods that disappeared while the watch was down.
                if let Some(relisted) = self.relisting.take() {
                    self.known.retain(|uid| relisted.contains(uid));
                }
                None
            }
            watcher::Event::Apply(pod) => Some(self.applied(pod)),
            watcher::Event::Delete(pod) => {
                if let Some(uid) = pod.uid() {
                    self.known.remove(&uid);
                }
                None
            }
        }
    }

    pub fn len(&self) -> usize {
        self.known.len()
    }

    pub fn is_empty(&self) -> bool {
        self.known.is_empty()
    }

    fn applied(&mut self, pod: Pod) -> PodEvent {
        let first_sighting = pod.uid().map_or(true, |uid| self.known.insert(uid));
        if first_sighting {
            PodEvent::Added(pod)
        } else {
            PodEvent::Updated(pod)
        }
    }
}

/// Aborts the wrapped task when dropped.
struct AbortOnDrop(JoinHandle<()>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Watches pods and feeds them to a [`Dispatcher`].
pub struct PodWatch {
    api: Api<Pod>,
    config: watcher::Config,
    cache_sync_timeout: Duration,
}

impl PodWatch {
    /// Watch one namespace, or the whole cluster when `namespace` is `None`.
    pub fn new(client: Client, namespace: Option<&str>) -> Self {
        let api = match namespace {
            Some(ns) => Api::namespaced(client, ns),
            None => Api::all(client),
        };
        Self {
            api,
            config: watcher::Config::default().any_semantic(),
            cache_sync_timeout: DEFAULT_CACHE_SYNC_TIMEOUT,
        }
    }

    #[must_use]
    pub fn label_selector(mut self, selector: &str) -> Self {
        self.config = self.config.labels(selector);
        self
    }

    #[must_use]
    pub fn cache_sync_timeout(mut self, timeout: Duration) -> Self {
        self.cache_sync_timeout = timeout;
        self
    }

    /// Run until the watch stream ends. Only returns on error.
    #[instrument(skip_all)]
    pub async fn run(self, dispatcher: Arc<Dispatcher>) -> Result<()> {
        let Self {
            api,
            config,
            cache_sync_timeout,
        } = self;

        let (reader, writer) = reflector::store::<Pod>();
        let stream = reflector(writer, watcher(api, config)).default_backoff();
        let (tx, mut rx) = mpsc::unbounded_channel::<PodEvent>();

        let _driver = AbortOnDrop(tokio::spawn(async move {
            let mut known = KnownPods::default();
            let mut stream = std::pin::pin!(stream);
            while let Some(item) = stream.next().await {
                match item {
                    Ok(event) => {
                        if let Some(event) = known.observe(event) {
                            if tx.send(event).is_err() {
                                break;
                            }
                        }
                    }
                    Err(e) => warn!(error = %e, "Pod watch error, backing off"),
                }
            }
            debug!("Pod watch stream finished");
        }));

        info!(
            timeout_secs = cache_sync_timeout.as_secs(),
            "Waiting for pod cache to sync"
        );
        match tokio::time::timeout(cache_sync_timeout, reader.wait_until_ready()).await {
            Ok(Ok(())) => info!(
                cached_pods = reader.state().len(),
                "Cache synced, watching for pod events"
            ),
            Ok(Err(_)) => return Err(Error::WatchEnded),
            Err(_) => return Err(Error::CacheSyncTimeout(cache_sync_timeout)),
        }

        while let Some(event) = rx.recv().await {
            dispatcher.dispatch(&event);
        }

        Err(Error::WatchEnded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pod::fixtures::pod_with_status;
    use serde_json::json;

    fn pod(name: &str, uid: &str) -> Pod {
        pod_with_status(name, uid, json!({ "phase": "Running" }))
    }

    #[test]
    fn test_first_apply_is_add_then_update() {
        let mut known = KnownPods::default();
        assert!(matches!(
            known.observe(watcher::Event::Apply(pod("a", "1"))),
            Some(PodEvent::Added(_))
        ));
        assert!(matches!(
            known.observe(watcher::Event::Apply(pod("a", "1"))),
            Some(PodEvent::Updated(_))
        ));
    }

    #[test]
    fn test_delete_forgets_uid() {
        let mut known = KnownPods::default();
        known.observe(watcher::Event::Apply(pod("a", "1")));
        assert!(known.observe(watcher::Event::Delete(pod("a", "1"))).is_none());
        assert!(known.is_empty());

        // Same name, new UID: a fresh pod.
        assert!(matches!(
            known.observe(watcher::Event::Apply(pod("a", "2"))),
            Some(PodEvent::Added(_))
        ));
    }

    #[test]
    fn test_relist_prunes_vanished_pods() {
        let mut known = KnownPods::default();
        known.observe(watcher::Event::Apply(pod("a", "1")));
        known.observe(watcher::Event::Apply(pod("b", "2")));

        assert!(known.observe(watcher::Event::Init).is_none());
        assert!(matches!(
            known.observe(watcher::Event::InitApply(pod("a", "1"))),
            Some(PodEvent::Updated(_))
        ));
        assert!(matches!(
            known.observe(watcher::Event::InitApply(pod("c", "3"))),
            Some(PodEvent::Added(_))
        ));
        assert!(known.observe(watcher::Event::InitDone).is_none());

        assert_eq!(known.len(), 2);
        assert!(matches!(
            known.observe(watcher::Event::Apply(pod("b", "2"))),
            Some(PodEvent::Added(_))
        ));
    }
}
