//! Reconcilers for adopted resources.
//!
//! A reconciler reads the current resource, converges it one step toward the
//! desired state and tells the caller when to look again.

pub mod adopted;

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::Result;

pub use adopted::AdoptionReconciler;

/// What the caller should do after a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Reconcile again after the delay, even without a change.
    Requeue(Duration),
    /// Nothing more to do until the resource changes.
    AwaitChange,
}

impl Action {
    pub fn requeue_after(&self) -> Option<Duration> {
        match self {
            Self::Requeue(delay) => Some(*delay),
            Self::AwaitChange => None,
        }
    }
}

/// The steps of one pass, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Step {
    Finalizer,
    Acceptance,
    Connectivity,
    NodeInfo,
    Health,
    Link,
    Sync,
    Unregister,
    Teardown,
}

/// How a single step went.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepResult {
    Ok,
    /// The step did not apply (disabled integration, gate closed).
    Skipped,
    /// The step failed; the pass carried on where the policy allows.
    Degraded(String),
}

impl StepResult {
    pub fn is_degraded(&self) -> bool {
        matches!(self, Self::Degraded(_))
    }
}

/// Result of one reconciliation pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileOutcome {
    pub action: Action,
    pub steps: BTreeMap<Step, StepResult>,
}

impl ReconcileOutcome {
    pub fn new(action: Action) -> Self {
        Self {
            action,
            steps: BTreeMap::new(),
        }
    }

    pub(crate) fn record(&mut self, step: Step, result: StepResult) {
        self.steps.insert(step, result);
    }

    pub fn step(&self, step: Step) -> Option<&StepResult> {
        self.steps.get(&step)
    }

    /// Steps that failed during the pass.
    pub fn degraded(&self) -> impl Iterator<Item = (Step, &str)> {
        self.steps.iter().filter_map(|(step, result)| match result {
            StepResult::Degraded(reason) => Some((*step, reason.as_str())),
            _ => None,
        })
    }
}

/// Trait for resource reconcilers.
#[async_trait]
pub trait Reconciler: Send + Sync {
    /// Run one pass for the named resource.
    ///
    /// `Err` is reserved for failures of the pass itself (e.g. the store);
    /// step failures are reported through the outcome and the resource.
    async fn reconcile(&self, name: &str, cancel: &CancellationToken) -> Result<ReconcileOutcome>;
}
