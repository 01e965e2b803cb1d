//! Adopted resource reconciler.
//!
//! One pass runs a fixed sequence: finalizer, acceptance gate, connectivity,
//! node facts, health, link monitoring, registry sync, readiness. Only a
//! failed connectivity probe cuts the pass short; every later step fails on
//! its own and is surfaced as a condition, an event and a step result.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{Action, ReconcileOutcome, Reconciler, Step, StepResult};
use crate::clients::{LinkManager, NodeAgent};
use crate::conditions::{ConditionStatus, ConditionType, Severity};
use crate::config::ReconcilerConfig;
use crate::error::{Error, Result};
use crate::events::{EventSink, Recorder};
use crate::resource::{AdoptedResource, HealthSnapshot, HealthState, RegistrySyncStatus};
use crate::store::{ResourceStore, StoreError};

/// Attempts to persist a new cluster id before leaving it to the next pass.
const CLUSTER_ID_SAVE_ATTEMPTS: usize = 3;
use crate::sync::SyncService;

/// Reconciler for adopted resources.
pub struct AdoptionReconciler {
    store: Arc<dyn ResourceStore>,
    node: Arc<dyn NodeAgent>,
    link: Arc<dyn LinkManager>,
    events: Arc<dyn EventSink>,
    config: ReconcilerConfig,
}

impl AdoptionReconciler {
    pub fn new(
        store: Arc<dyn ResourceStore>,
        node: Arc<dyn NodeAgent>,
        link: Arc<dyn LinkManager>,
        events: Arc<dyn EventSink>,
        config: ReconcilerConfig,
    ) -> Self {
        Self {
            store,
            node,
            link,
            events,
            config,
        }
    }

    /// Run a network step under the caller's cancellation and the step deadline.
    async fn guarded<T, F>(&self, cancel: &CancellationToken, step: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let deadline = self.config.step_timeout;
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(Error::Cancelled),
            result = tokio::time::timeout(deadline, step) => {
                result.unwrap_or_else(|_| Err(Error::DeadlineExceeded(deadline)))
            }
        }
    }

    async fn reconcile_normal(
        &self,
        resource: &mut AdoptedResource,
        recorder: &Recorder,
        outcome: &mut ReconcileOutcome,
        cancel: &CancellationToken,
    ) -> Action {
        let name = resource.name.clone();
        info!(resource = %name, "Reconciling adopted resource");

        resource.status.conditions.set_true(ConditionType::Adopted);

        // Connectivity gates everything else.
        let probe = self.guarded(cancel, self.node.probe(&resource.spec.node)).await;
        let status = &mut resource.status;
        match probe {
            Err(e) => {
                error!(resource = %name, error = %e, "Failed to check node connectivity");
                status.conditions.set_false(
                    ConditionType::Connected,
                    "ConnectivityCheckFailed",
                    Severity::Error,
                    e.to_string(),
                );
                status.connected = false;
                status.ready = false;
                recorder.warning(
                    "ConnectivityCheckFailed",
                    format!("Failed to check node API connectivity: {}", e),
                );
                outcome.record(Step::Connectivity, StepResult::Degraded(e.to_string()));
                return Action::Requeue(self.config.health_check_interval);
            }
            Ok(false) => {
                info!(resource = %name, endpoint = %resource.spec.node.endpoint, "Node API not reachable");
                status.conditions.set_false(
                    ConditionType::Connected,
                    "Unreachable",
                    Severity::Warning,
                    "Node API endpoint is not reachable",
                );
                status.connected = false;
                status.ready = false;
                recorder.warning("Unreachable", "Node API endpoint is not reachable");
                outcome.record(
                    Step::Connectivity,
                    StepResult::Degraded("unreachable".to_string()),
                );
                return Action::Requeue(self.config.health_check_interval);
            }
            Ok(true) => {
                debug!(resource = %name, "Node API is reachable");
                status.conditions.set_true(ConditionType::Connected);
                status.connected = true;
                status.last_contact_time = Some(Utc::now());
                outcome.record(Step::Connectivity, StepResult::Ok);
            }
        }

        // Node facts (best effort)
        match self.guarded(cancel, self.node.gather_info(&resource.spec.node)).await {
            Ok(facts) => {
                resource.status.node_info = Some(facts.info);
                if !facts.addresses.is_empty() {
                    resource.status.addresses = facts.addresses;
                }
                outcome.record(Step::NodeInfo, StepResult::Ok);
            }
            Err(e) => {
                warn!(resource = %name, error = %e, "Failed to gather node information");
                outcome.record(Step::NodeInfo, StepResult::Degraded(e.to_string()));
            }
        }

        // Health (best effort)
        match self.guarded(cancel, self.node.health_check(&resource.spec.node)).await {
            Ok(snapshot) => {
                resource.status.health = Some(snapshot);
                outcome.record(Step::Health, StepResult::Ok);
            }
            Err(e) => {
                warn!(resource = %name, error = %e, "Failed to perform health check");
                resource.status.health = Some(HealthSnapshot {
                    status: HealthState::Unknown,
                    message: format!("health check failed: {}", e),
                    last_check_time: Utc::now(),
                });
                outcome.record(Step::Health, StepResult::Degraded(e.to_string()));
            }
        }

        let link = self.reconcile_link(resource, recorder, cancel).await;
        outcome.record(Step::Link, link);

        let sync = self.reconcile_sync(resource, recorder, cancel).await;
        outcome.record(Step::Sync, sync);

        // Only connectivity decides readiness.
        resource.status.ready = resource.status.connected;

        Action::Requeue(self.config.health_check_interval)
    }

    async fn reconcile_link(
        &self,
        resource: &mut AdoptedResource,
        recorder: &Recorder,
        cancel: &CancellationToken,
    ) -> StepResult {
        let Some(spec) = resource.link().cloned() else {
            resource.status.conditions.clear(ConditionType::LinkReady);
            resource.status.link = None;
            return StepResult::Skipped;
        };

        let current = resource.status.link.clone();
        let setup = self
            .guarded(cancel, self.link.setup(&resource.name, &spec, current))
            .await;
        match setup {
            Ok(link) => {
                resource.status.link = Some(link);
                resource.status.conditions.set_true(ConditionType::LinkReady);
                StepResult::Ok
            }
            Err(e) => {
                error!(resource = %resource.name, error = %e, "Failed to set up link monitoring");
                resource.status.conditions.set_false(
                    ConditionType::LinkReady,
                    "SetupFailed",
                    Severity::Warning,
                    e.to_string(),
                );
                if let Some(link) = resource.status.link.as_mut() {
                    link.connected = false;
                }
                recorder.warning(
                    "LinkSetupFailed",
                    format!("Failed to set up link monitoring: {}", e),
                );
                StepResult::Degraded(e.to_string())
            }
        }
    }

    async fn reconcile_sync(
        &self,
        resource: &mut AdoptedResource,
        recorder: &Recorder,
        cancel: &CancellationToken,
    ) -> StepResult {
        let Some(spec) = resource.registry().cloned() else {
            resource.status.conditions.clear(ConditionType::RemoteSync);
            resource.status.registry = None;
            return StepResult::Skipped;
        };

        info!(resource = %resource.name, endpoint = %spec.endpoint, "Syncing with registry");
        let had_cluster_id = spec.cluster_id.as_deref().is_some_and(|id| !id.is_empty());
        let result = match SyncService::connect(&spec, &self.config) {
            Ok(service) => self.guarded(cancel, service.sync(resource)).await,
            Err(e) => Err(e),
        };
        if !had_cluster_id {
            self.save_cluster_id(resource).await;
        }

        match result {
            Ok(report) => {
                debug!(
                    resource = %resource.name,
                    cluster_id = %report.cluster_id,
                    node_id = %report.node_id,
                    registered = report.cluster_registered,
                    "Registry sync complete"
                );
                resource.status.conditions.set_true(ConditionType::RemoteSync);
                resource.status.registry = Some(RegistrySyncStatus {
                    synced: true,
                    last_sync_time: Some(Utc::now()),
                    error: None,
                });
                StepResult::Ok
            }
            Err(e) => {
                let message = e.to_string();
                error!(resource = %resource.name, error = %message, "Failed to sync with registry");

                // A broken integration config is reported once, not every pass.
                let repeated = e.is_configuration()
                    && resource
                        .status
                        .conditions
                        .get(ConditionType::RemoteSync)
                        .is_some_and(|c| {
                            c.status == ConditionStatus::False && c.message == message
                        });

                resource.status.conditions.set_false(
                    ConditionType::RemoteSync,
                    "SyncFailed",
                    Severity::Warning,
                    message.clone(),
                );
                let sync = resource.status.registry.get_or_insert_with(Default::default);
                sync.synced = false;
                sync.error = Some(message.clone());

                if !repeated {
                    recorder.warning(
                        "RemoteSyncFailed",
                        format!("Failed to sync with registry: {}", message),
                    );
                }
                StepResult::Degraded(message)
            }
        }
    }

    /// Persist a freshly issued cluster id on the latest stored version.
    ///
    /// Runs right after registration so a conflict on the end-of-pass patch
    /// cannot lose the id. The local copy only adopts the new version when
    /// nothing else wrote the resource in between; otherwise the final patch
    /// conflicts and the next pass starts from the stored state.
    async fn save_cluster_id(&self, resource: &mut AdoptedResource) {
        let Some(cluster_id) = resource
            .spec
            .registry
            .as_ref()
            .and_then(|r| r.cluster_id.clone())
            .filter(|id| !id.is_empty())
        else {
            return;
        };

        for _ in 0..CLUSTER_ID_SAVE_ATTEMPTS {
            let mut latest = match self.store.get(&resource.name).await {
                Ok(Some(latest)) => latest,
                Ok(None) => return,
                Err(e) => {
                    warn!(resource = %resource.name, error = %e, "Failed to read resource for cluster id");
                    return;
                }
            };
            let unchanged = latest.resource_version == resource.resource_version;
            let Some(registry) = latest.spec.registry.as_mut() else {
                return;
            };
            registry.cluster_id = Some(cluster_id.clone());

            match self.store.patch(&latest).await {
                Ok(saved) => {
                    debug!(resource = %resource.name, cluster_id = %cluster_id, "Cluster id saved");
                    if unchanged {
                        resource.resource_version = saved.resource_version;
                    }
                    return;
                }
                Err(StoreError::Conflict { .. }) => {
                    debug!(resource = %resource.name, "Resource changed while saving cluster id, retrying");
                }
                Err(e) => {
                    warn!(resource = %resource.name, error = %e, "Failed to save cluster id");
                    return;
                }
            }
        }
        warn!(resource = %resource.name, cluster_id = %cluster_id, "Gave up saving cluster id after repeated conflicts");
    }

    async fn reconcile_delete(
        &self,
        mut resource: AdoptedResource,
        recorder: &Recorder,
        cancel: &CancellationToken,
    ) -> Result<ReconcileOutcome> {
        let mut outcome = ReconcileOutcome::new(Action::AwaitChange);
        if !resource.has_finalizer(&self.config.finalizer) {
            return Ok(outcome);
        }
        info!(resource = %resource.name, "Deleting adopted resource");

        // Cleanup is attempted, never required.
        let unregister = match resource.registry().cloned() {
            Some(spec) => {
                let result = match SyncService::connect(&spec, &self.config) {
                    Ok(service) => self.guarded(cancel, service.unregister(&resource)).await,
                    Err(e) => Err(e),
                };
                match result {
                    Ok(()) => StepResult::Ok,
                    Err(e) => {
                        error!(resource = %resource.name, error = %e, "Failed to unregister from registry");
                        recorder.warning(
                            "UnregisterFailed",
                            format!("Failed to unregister from registry: {}", e),
                        );
                        StepResult::Degraded(e.to_string())
                    }
                }
            }
            None => StepResult::Skipped,
        };
        outcome.record(Step::Unregister, unregister);

        let teardown = match resource.link().cloned() {
            Some(spec) => {
                match self
                    .guarded(cancel, self.link.teardown(&resource.name, &spec))
                    .await
                {
                    Ok(()) => StepResult::Ok,
                    Err(e) => {
                        error!(resource = %resource.name, error = %e, "Failed to tear down link monitoring");
                        recorder.warning(
                            "LinkTeardownFailed",
                            format!("Failed to tear down link monitoring: {}", e),
                        );
                        StepResult::Degraded(e.to_string())
                    }
                }
            }
            None => StepResult::Skipped,
        };
        outcome.record(Step::Teardown, teardown);

        resource.remove_finalizer(&self.config.finalizer);
        self.store.patch(&resource).await?;
        outcome.record(Step::Finalizer, StepResult::Ok);

        recorder.normal("Deleted", "Adopted resource deleted successfully");
        Ok(outcome)
    }
}

#[async_trait]
impl Reconciler for AdoptionReconciler {
    async fn reconcile(&self, name: &str, cancel: &CancellationToken) -> Result<ReconcileOutcome> {
        let Some(mut resource) = self.store.get(name).await? else {
            info!(resource = %name, "Adopted resource not found, assuming it was deleted");
            return Ok(ReconcileOutcome::new(Action::AwaitChange));
        };
        let recorder = Recorder::new(Arc::clone(&self.events), name);

        if resource.is_being_deleted() {
            return self.reconcile_delete(resource, &recorder, cancel).await;
        }

        let mut outcome = ReconcileOutcome::new(Action::AwaitChange);

        // Persist the finalizer before anything can need cleanup.
        if resource.add_finalizer(&self.config.finalizer) {
            debug!(resource = %name, finalizer = %self.config.finalizer, "Adding finalizer");
            resource = self.store.patch(&resource).await?;
            outcome.record(Step::Finalizer, StepResult::Ok);
        }

        let was_ready = resource.status.ready;

        if resource.spec.accepted {
            outcome.record(Step::Acceptance, StepResult::Ok);
            outcome.action = self
                .reconcile_normal(&mut resource, &recorder, &mut outcome, cancel)
                .await;
        } else {
            info!(resource = %name, "Adopted resource not accepted, skipping reconciliation");
            resource.status.ready = false;
            resource.status.conditions.set_false(
                ConditionType::Adopted,
                "NotAccepted",
                Severity::Info,
                "Resource not accepted for management",
            );
            outcome.record(Step::Acceptance, StepResult::Skipped);
            outcome.action = Action::Requeue(self.config.resync_interval);
        }

        self.store.patch(&resource).await?;

        if resource.status.ready && !was_ready {
            recorder.normal("Ready", "Adopted resource is ready and being monitored");
        }

        Ok(outcome)
    }
}
