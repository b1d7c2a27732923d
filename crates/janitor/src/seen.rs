//! Seen-set: pod UIDs with a remediation pending or in flight.

use std::sync::Arc;

use dashmap::DashSet;

/// Concurrent set of in-flight pod UIDs.
///
/// A UID is present exactly while its remediation sequence is running.
/// Clones share the same underlying set.
#[derive(Debug, Clone, Default)]
pub struct SeenSet {
    inner: Arc<DashSet<String>>,
}

impl SeenSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically mark `uid` as in flight. Returns `false` if it already was.
    pub fn try_mark(&self, uid: &str) -> bool {
        self.inner.insert(uid.to_string())
    }

    pub fn release(&self, uid: &str) {
        self.inner.remove(uid);
    }

    pub fn contains(&self, uid: &str) -> bool {
        self.inner.contains(uid)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mark_and_release() {
        let seen = SeenSet::new();
        assert!(seen.try_mark("a"));
        assert!(!seen.try_mark("a"));
        assert!(seen.contains("a"));

        seen.release("a");
        assert!(!seen.contains("a"));
        assert!(seen.try_mark("a"));

        // Releasing an unknown uid is a no-op.
        seen.release("missing");
        assert_eq!(seen.len(), 1);
    }

    #[test]
    fn test_clones_share_state() {
        let seen = SeenSet::new();
        let other = seen.clone();
        assert!(seen.try_mark("x"));
        assert!(!other.try_mark("x"));
        other.release("x");
        assert!(seen.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_marks_admit_exactly_one() {
        let seen = SeenSet::new();
        let mut handles = Vec::new();
        for _ in 0..64 {
            let seen = seen.clone();
            handles.push(tokio::spawn(async move { seen.try_mark("same-uid") }));
        }

        let mut admitted = 0;
        for handle in handles {
            if handle.await.unwrap() {
                admitted += 1;
            }
        }
        assert_eq!(admitted, 1);
        assert_eq!(seen.len(), 1);
    }
}
