//! Controller driver: schedules reconciliation passes per resource.
//!
//! Every resync tick the store is listed and each resource without a running
//! worker gets one. A worker loops on the reconciler, sleeping for the
//! requeue delay, and exits on `AwaitChange`, on an error or on cancellation.
//! The next tick picks the resource up again.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::reconciler::{Action, Reconciler};
use crate::store::ResourceStore;

/// Default number of passes allowed to run at the same time.
pub const DEFAULT_WORKERS: usize = 4;

pub struct Controller {
    store: Arc<dyn ResourceStore>,
    reconciler: Arc<dyn Reconciler>,
    resync_interval: Duration,
    workers: usize,
}

impl Controller {
    pub fn new(
        store: Arc<dyn ResourceStore>,
        reconciler: Arc<dyn Reconciler>,
        resync_interval: Duration,
    ) -> Self {
        Self {
            store,
            reconciler,
            resync_interval,
            workers: DEFAULT_WORKERS,
        }
    }

    /// Limit the number of concurrent passes across all resources.
    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Run until `cancel` fires, then wait for in-flight workers.
    pub async fn run(&self, cancel: CancellationToken) {
        info!(
            resync_interval = ?self.resync_interval,
            workers = self.workers,
            "Starting controller"
        );

        let permits = Arc::new(Semaphore::new(self.workers));
        let mut running: HashMap<String, JoinHandle<()>> = HashMap::new();
        let mut ticker = interval(self.resync_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            running.retain(|_, handle| !handle.is_finished());

            let names = match self.store.list().await {
                Ok(names) => names,
                Err(e) => {
                    error!(error = %e, "Failed to list adopted resources");
                    continue;
                }
            };

            for name in names {
                if running.contains_key(&name) {
                    continue;
                }
                debug!(resource = %name, "Starting worker");
                let handle = tokio::spawn(worker(
                    name.clone(),
                    Arc::clone(&self.reconciler),
                    Arc::clone(&permits),
                    cancel.child_token(),
                ));
                running.insert(name, handle);
            }
        }

        info!(workers = running.len(), "Stopping controller");
        for (name, handle) in running {
            if let Err(e) = handle.await {
                error!(resource = %name, error = %e, "Worker panicked");
            }
        }
    }
}

async fn worker(
    name: String,
    reconciler: Arc<dyn Reconciler>,
    permits: Arc<Semaphore>,
    cancel: CancellationToken,
) {
    loop {
        let result = {
            let _permit = tokio::select! {
                _ = cancel.cancelled() => return,
                permit = permits.acquire() => match permit {
                    Ok(permit) => permit,
                    Err(_) => return,
                },
            };
            reconciler.reconcile(&name, &cancel).await
        };

        let delay = match result {
            Ok(outcome) => {
                for (step, reason) in outcome.degraded() {
                    debug!(resource = %name, ?step, reason, "Step degraded");
                }
                match outcome.action {
                    Action::Requeue(delay) => delay,
                    Action::AwaitChange => return,
                }
            }
            Err(e) if e.is_conflict() => {
                debug!(resource = %name, error = %e, "Resource changed during reconcile, retrying next tick");
                return;
            }
            Err(e) => {
                warn!(resource = %name, error = %e, "Reconcile failed, retrying next tick");
                return;
            }
        };

        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(delay) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;

    use crate::error::{Error, Result};
    use crate::reconciler::ReconcileOutcome;
    use crate::resource::{AdoptedResource, AdoptedSpec};
    use crate::store::{MemoryStore, StoreError};

    /// Reconciler that records calls and detects overlapping passes.
    struct CountingReconciler {
        action: Action,
        fail: bool,
        pass: Duration,
        calls: Mutex<HashMap<String, usize>>,
        in_flight: Mutex<HashMap<String, usize>>,
        overlaps: AtomicUsize,
        active: AtomicUsize,
        peak: AtomicUsize,
    }

    impl CountingReconciler {
        fn new(action: Action) -> Self {
            Self {
                action,
                fail: false,
                pass: Duration::from_millis(50),
                calls: Mutex::new(HashMap::new()),
                in_flight: Mutex::new(HashMap::new()),
                overlaps: AtomicUsize::new(0),
                active: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            }
        }

        fn calls(&self, name: &str) -> usize {
            self.calls.lock().unwrap().get(name).copied().unwrap_or(0)
        }
    }

    #[async_trait]
    impl Reconciler for CountingReconciler {
        async fn reconcile(&self, name: &str, _cancel: &CancellationToken) -> Result<ReconcileOutcome> {
            *self.calls.lock().unwrap().entry(name.to_string()).or_default() += 1;
            {
                let mut in_flight = self.in_flight.lock().unwrap();
                let count = in_flight.entry(name.to_string()).or_default();
                *count += 1;
                if *count > 1 {
                    self.overlaps.fetch_add(1, Ordering::SeqCst);
                }
            }

            let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(active, Ordering::SeqCst);

            tokio::time::sleep(self.pass).await;

            self.active.fetch_sub(1, Ordering::SeqCst);
            *self.in_flight.lock().unwrap().get_mut(name).unwrap() -= 1;
            if self.fail {
                return Err(Error::Store(StoreError::Conflict {
                    name: name.to_string(),
                    expected: 1,
                    actual: 2,
                }));
            }
            Ok(ReconcileOutcome::new(self.action))
        }
    }

    async fn store_with(names: &[&str]) -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        for name in names {
            store
                .create(AdoptedResource::new(*name, AdoptedSpec::default()))
                .await
                .unwrap();
        }
        store
    }

    async fn run_for(controller: Controller, duration: Duration) {
        let cancel = CancellationToken::new();
        let stop = cancel.clone();
        let handle = tokio::spawn(async move { controller.run(cancel).await });
        tokio::time::sleep(duration).await;
        stop.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_requeue_never_overlaps_per_resource() {
        let store = store_with(&["node-a", "node-b"]).await;
        let reconciler = Arc::new(CountingReconciler::new(Action::Requeue(
            Duration::from_millis(10),
        )));
        let controller = Controller::new(store, reconciler.clone(), Duration::from_millis(20));

        run_for(controller, Duration::from_secs(2)).await;

        assert!(reconciler.calls("node-a") > 10);
        assert!(reconciler.calls("node-b") > 10);
        assert_eq!(reconciler.overlaps.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_await_change_waits_for_next_tick() {
        let store = store_with(&["node-a"]).await;
        let reconciler = Arc::new(CountingReconciler::new(Action::AwaitChange));
        let controller = Controller::new(store, reconciler.clone(), Duration::from_secs(10));

        run_for(controller, Duration::from_secs(25)).await;

        // Ticks at 0s, 10s and 20s.
        assert_eq!(reconciler.calls("node-a"), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_errors_are_retried_on_next_tick() {
        let store = store_with(&["node-a"]).await;
        let mut reconciler = CountingReconciler::new(Action::Requeue(Duration::from_millis(1)));
        reconciler.fail = true;
        let reconciler = Arc::new(reconciler);
        let controller = Controller::new(store, reconciler.clone(), Duration::from_secs(10));

        run_for(controller, Duration::from_secs(25)).await;

        assert_eq!(reconciler.calls("node-a"), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_interrupts_requeue_sleep() {
        let store = store_with(&["node-a"]).await;
        let reconciler = Arc::new(CountingReconciler::new(Action::Requeue(
            Duration::from_secs(3600),
        )));
        let controller = Controller::new(store, reconciler.clone(), Duration::from_secs(7200));

        let cancel = CancellationToken::new();
        let stop = cancel.clone();
        let handle = tokio::spawn(async move { controller.run(cancel).await });
        tokio::time::sleep(Duration::from_secs(1)).await;
        stop.cancel();

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("controller did not stop")
            .unwrap();
        assert_eq!(reconciler.calls("node-a"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_worker_limit_serializes_passes() {
        let names = ["node-a", "node-b", "node-c"];
        let store = store_with(&names).await;
        let reconciler = Arc::new(CountingReconciler::new(Action::Requeue(
            Duration::from_millis(10),
        )));
        let controller =
            Controller::new(store, reconciler.clone(), Duration::from_secs(1)).workers(1);

        run_for(controller, Duration::from_secs(1)).await;

        assert_eq!(reconciler.peak.load(Ordering::SeqCst), 1);
        for name in names {
            assert!(reconciler.calls(name) > 0, "{name} never reconciled");
        }
    }
}
