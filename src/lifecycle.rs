use crate::launcher::Launcher;
use crate::probe::{self, ProcessProbe};
use crate::state::DisplayState;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, watch};
use tracing::{debug, info, warn};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

pub const PORT_POLL_INTERVAL: Duration = Duration::from_secs(1);
pub const PORT_WAIT_TIMEOUT: Duration = Duration::from_secs(15);
pub const START_SETTLE_DELAY: Duration = Duration::from_secs(5);
pub const STOP_DRAIN_DELAY: Duration = Duration::from_secs(3);
pub const STOP_SETTLE_DELAY: Duration = Duration::from_secs(2);

/// Fixed waits standing in for readiness signals the managed tool does not
/// offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timings {
    pub port_poll: Duration,
    pub port_wait_timeout: Duration,
    pub start_settle: Duration,
    pub stop_drain: Duration,
    pub stop_settle: Duration,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            port_poll: PORT_POLL_INTERVAL,
            port_wait_timeout: PORT_WAIT_TIMEOUT,
            start_settle: START_SETTLE_DELAY,
            stop_drain: STOP_DRAIN_DELAY,
            stop_settle: STOP_SETTLE_DELAY,
        }
    }
}

/// Outcome of a `start()` or `stop()` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// The process was already in the requested state.
    Skipped,
    /// External side effects were issued.
    Performed,
}

// ---------------------------------------------------------------------------
// LifecycleController
// ---------------------------------------------------------------------------

struct Inner<P, L> {
    process_name: String,
    rc_port: u16,
    probe: Arc<P>,
    launcher: L,
    timings: Timings,
    lock: Mutex<()>,
    display: watch::Sender<DisplayState>,
}

/// Owns start/stop of the managed process. Every transition runs under one
/// lock, shared with the reconciliation loop through clones of this handle.
pub struct LifecycleController<P, L> {
    inner: Arc<Inner<P, L>>,
}

impl<P, L> Clone for LifecycleController<P, L> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<P: ProcessProbe, L: Launcher> LifecycleController<P, L> {
    pub fn new(
        process_name: impl Into<String>,
        rc_port: u16,
        probe: Arc<P>,
        launcher: L,
        timings: Timings,
    ) -> Self {
        let process_name = process_name.into();
        let initial = DisplayState::from_running(probe.is_running(&process_name));
        let (display, _) = watch::channel(initial);
        Self {
            inner: Arc::new(Inner {
                process_name,
                rc_port,
                probe,
                launcher,
                timings,
                lock: Mutex::new(()),
                display,
            }),
        }
    }

    pub fn process_name(&self) -> &str {
        &self.inner.process_name
    }

    pub fn probe(&self) -> &Arc<P> {
        &self.inner.probe
    }

    pub fn is_running(&self) -> bool {
        self.inner.probe.is_running(&self.inner.process_name)
    }

    /// `is_running` on the blocking pool. A failed query reads as not running.
    pub async fn probe_running(&self) -> bool {
        let name = self.inner.process_name.clone();
        probe::query(&self.inner.probe, move |p| p.is_running(&name))
            .await
            .unwrap_or(false)
    }

    pub fn subscribe(&self) -> watch::Receiver<DisplayState> {
        self.inner.display.subscribe()
    }

    pub fn display_state(&self) -> DisplayState {
        *self.inner.display.borrow()
    }

    /// True while a transition holds the lock.
    pub fn is_busy(&self) -> bool {
        self.inner.lock.try_lock().is_err()
    }

    /// Publish the probed state, unless a transition is in flight: `Busy`
    /// belongs to whoever holds the lock.
    pub async fn refresh(&self) {
        if let Ok(_guard) = self.inner.lock.try_lock() {
            self.publish_observed().await;
        }
    }

    async fn publish_observed(&self) {
        let running = self.probe_running().await;
        self.set_display(DisplayState::from_running(running));
    }

    fn set_display(&self, state: DisplayState) {
        self.inner.display.send_if_modified(|current| {
            if *current == state {
                return false;
            }
            debug!(from = %current, to = %state, "display state");
            *current = state;
            true
        });
    }

    pub async fn start(&self) -> Transition {
        let _guard = self.inner.lock.lock().await;
        if self.probe_running().await {
            self.publish_observed().await;
            return Transition::Skipped;
        }

        info!(process = %self.inner.process_name, "starting");
        self.set_display(DisplayState::Busy);
        self.wait_for_port_free().await;

        if let Err(e) = self.inner.launcher.trigger_start().await {
            warn!(error = %e, "start action failed");
        }
        tokio::time::sleep(self.inner.timings.start_settle).await;

        self.publish_observed().await;
        Transition::Performed
    }

    pub async fn stop(&self) -> Transition {
        let _guard = self.inner.lock.lock().await;
        if !self.probe_running().await {
            self.publish_observed().await;
            return Transition::Skipped;
        }

        info!(process = %self.inner.process_name, "stopping");
        self.set_display(DisplayState::Busy);

        if let Err(e) = self.inner.launcher.request_quit().await {
            debug!(error = %e, "graceful quit failed, falling back to kill");
        }
        tokio::time::sleep(self.inner.timings.stop_drain).await;

        let name = self.inner.process_name.clone();
        let killed = probe::query(&self.inner.probe, move |p| p.kill_all(&name))
            .await
            .unwrap_or(0);
        if killed > 0 {
            info!(killed, "force-killed leftover processes");
        }
        tokio::time::sleep(self.inner.timings.stop_settle).await;

        self.publish_observed().await;
        Transition::Performed
    }

    /// Stop if running, start otherwise. The choice is made before taking the
    /// lock; the transition re-checks under it.
    pub async fn toggle(&self) -> Transition {
        if self.probe_running().await {
            self.stop().await
        } else {
            self.start().await
        }
    }

    /// Poll until the RC port is free. Gives up silently after the timeout.
    async fn wait_for_port_free(&self) {
        let timings = &self.inner.timings;
        let deadline = tokio::time::Instant::now() + timings.port_wait_timeout;
        let port = self.inner.rc_port;
        while probe::query(&self.inner.probe, move |p| p.port_in_use(port))
            .await
            .unwrap_or(false)
        {
            if tokio::time::Instant::now() >= deadline {
                warn!(port = self.inner.rc_port, "rc port still in use, starting anyway");
                return;
            }
            tokio::time::sleep(timings.port_poll).await;
        }
    }
}
