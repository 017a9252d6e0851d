use crate::activity::ActivityDetector;
use crate::config::Policy;
use crate::launcher::Launcher;
use crate::lifecycle::LifecycleController;
use crate::probe::{self, ProcessProbe};
use crate::state::ReconciliationTick;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tracing::debug;

/// What one tick decided to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reaction {
    Start,
    Stop,
    Refresh,
}

pub fn decide(policy: &Policy, tick: &ReconciliationTick) -> Reaction {
    if !policy.is_activity_aware() {
        return if tick.managed_running {
            Reaction::Refresh
        } else {
            Reaction::Start
        };
    }

    match (tick.competing_active, tick.managed_running) {
        (true, true) => Reaction::Stop,
        (false, false) => Reaction::Start,
        _ => Reaction::Refresh,
    }
}

// ---------------------------------------------------------------------------
// ActionTracker
// ---------------------------------------------------------------------------

/// Handles of spawned start/stop tasks, kept so shutdown can join them.
#[derive(Clone, Default)]
pub struct ActionTracker {
    handles: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl ActionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn spawn<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(task);
        let mut handles = self.handles.lock().unwrap_or_else(PoisonError::into_inner);
        handles.retain(|h| !h.is_finished());
        handles.push(handle);
    }

    pub fn in_flight(&self) -> usize {
        let handles = self.handles.lock().unwrap_or_else(PoisonError::into_inner);
        handles.iter().filter(|h| !h.is_finished()).count()
    }

    /// Wait for every tracked task, including ones spawned while waiting.
    pub async fn join_all(&self) {
        loop {
            let batch = std::mem::take(
                &mut *self.handles.lock().unwrap_or_else(PoisonError::into_inner),
            );
            if batch.is_empty() {
                return;
            }
            for handle in batch {
                if let Err(e) = handle.await {
                    debug!(error = %e, "action task ended abnormally");
                }
            }
        }
    }
}

/// Sleep for `duration`; returns true early if shutdown was requested.
pub async fn wait_or_shutdown(duration: Duration, shutdown_rx: &mut watch::Receiver<bool>) -> bool {
    if *shutdown_rx.borrow() {
        return true;
    }
    tokio::select! {
        _ = tokio::time::sleep(duration) => {}
        // A dropped sender counts as shutdown too.
        _ = async { let _ = shutdown_rx.wait_for(|stop| *stop).await; } => return true,
    }
    *shutdown_rx.borrow()
}

// ---------------------------------------------------------------------------
// ReconciliationLoop
// ---------------------------------------------------------------------------

pub struct ReconciliationLoop<P, L> {
    controller: LifecycleController<P, L>,
    detector: ActivityDetector<P>,
    grace: Duration,
    interval: Duration,
    actions: ActionTracker,
    ticks: watch::Sender<Option<ReconciliationTick>>,
}

impl<P: ProcessProbe, L: Launcher> ReconciliationLoop<P, L> {
    pub fn new(
        controller: LifecycleController<P, L>,
        detector: ActivityDetector<P>,
        grace: Duration,
        interval: Duration,
        actions: ActionTracker,
    ) -> Self {
        let (ticks, _) = watch::channel(None);
        Self {
            controller,
            detector,
            grace,
            interval,
            actions,
            ticks,
        }
    }

    pub fn subscribe_ticks(&self) -> watch::Receiver<Option<ReconciliationTick>> {
        self.ticks.subscribe()
    }

    /// Idle through the grace period, then tick every interval until shutdown.
    /// In-flight actions are left to the tracker.
    pub async fn run(self, mut shutdown_rx: watch::Receiver<bool>) {
        if wait_or_shutdown(self.grace, &mut shutdown_rx).await {
            debug!("shutdown during startup grace");
            return;
        }
        self.controller.refresh().await;

        while !wait_or_shutdown(self.interval, &mut shutdown_rx).await {
            self.tick().await;
        }
        debug!("reconciliation loop stopped");
    }

    pub async fn tick(&self) -> Reaction {
        // One snapshot, taken off the async workers, answers both questions.
        let snapshot = probe::query(self.controller.probe(), |p| p.process_names())
            .await
            .unwrap_or_default();
        let competing = self.detector.should_suspend_in(&snapshot);
        let process_name = self.controller.process_name();
        let managed = snapshot.iter().any(|name| probe::names_match(name, process_name));
        let tick = ReconciliationTick::new(managed, competing);
        let reaction = decide(self.detector.policy(), &tick);
        debug!(managed, competing, ?reaction, "tick");
        self.ticks.send_replace(Some(tick));

        match reaction {
            Reaction::Start | Reaction::Stop => self.dispatch(reaction).await,
            Reaction::Refresh => self.controller.refresh().await,
        }
        reaction
    }

    /// Spawn the transition and return once it is queued on the lock, so the
    /// next observation is never taken ahead of it.
    async fn dispatch(&self, reaction: Reaction) {
        let (queued_tx, queued_rx) = oneshot::channel();
        let controller = self.controller.clone();
        self.actions.spawn(async move {
            let _ = queued_tx.send(());
            match reaction {
                Reaction::Stop => {
                    controller.stop().await;
                }
                _ => {
                    controller.start().await;
                }
            }
        });
        let _ = queued_rx.await;
    }
}
