//! Kube Janitor - Kubernetes pod cleanup controller.
//!
//! Watches pods, classifies each one against a small set of failure policies
//! and, for pods that match, deletes them after a grace period while keeping
//! operators informed through [`notify`].
//!
//! Data flow:
//!
//! ```text
//! watch -> Dispatcher -> classify -> SeenSet -> Remediator -> delete -> notify -> release
//! ```

pub mod classify;
pub mod client;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod notifier;
pub mod pod;
pub mod remediate;
pub mod seen;
pub mod watch;

pub use classify::{classify, Classification, CRASH_LOOP_RESTART_THRESHOLD};
pub use config::{JanitorSettings, LogFormat};
pub use dispatch::{Dispatcher, PodEvent, EXCLUDE_LABEL};
pub use error::{Error, Result};
pub use notifier::OutcomeNotifier;
pub use pod::{ContainerDiagnostics, PodSnapshot};
pub use remediate::{ApiDeleter, Outcome, PodDeleter, Remediator, Stage};
pub use seen::SeenSet;
pub use watch::{KnownPods, PodWatch};
