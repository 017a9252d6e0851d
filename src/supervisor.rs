use crate::activity::ActivityDetector;
use crate::config::SupervisorConfig;
use crate::launcher::{LaunchError, Launcher, SystemLauncher};
use crate::lifecycle::{LifecycleController, Timings};
use crate::probe::{ProcessProbe, SystemProbe};
use crate::reconcile::{ActionTracker, ReconciliationLoop};
use crate::state::{DisplayState, ReconciliationTick};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopSettings {
    pub startup_grace: Duration,
    pub check_interval: Duration,
}

impl LoopSettings {
    pub fn from_config(config: &SupervisorConfig) -> Self {
        Self {
            startup_grace: config.startup_grace(),
            check_interval: config.check_interval(),
        }
    }
}

/// Manual actions the presenter can request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManualAction {
    Start,
    Stop,
    Toggle,
}

/// Running supervisor: the reconciliation task plus every start/stop task it
/// or the user spawned. Dropping it without `shutdown` leaves tasks running.
pub struct Supervisor<P, L> {
    controller: LifecycleController<P, L>,
    shutdown_tx: watch::Sender<bool>,
    reconciler: JoinHandle<()>,
    actions: ActionTracker,
    ticks: watch::Receiver<Option<ReconciliationTick>>,
}

pub type SystemSupervisor = Supervisor<SystemProbe, SystemLauncher>;

pub type SystemController = LifecycleController<SystemProbe, SystemLauncher>;

/// Controller over the real process table, scheduler and RC endpoint.
pub fn system_controller(config: &SupervisorConfig) -> Result<SystemController, SupervisorError> {
    let launcher = SystemLauncher::from_config(config)?;
    let rc_port = config
        .rc_port()
        .map_err(|e| SupervisorError::Config(e.to_string()))?;
    Ok(LifecycleController::new(
        config.process_name.clone(),
        rc_port,
        Arc::new(SystemProbe::new()),
        launcher,
        Timings::default(),
    ))
}

impl SystemSupervisor {
    pub fn from_config(config: &SupervisorConfig) -> Result<Self, SupervisorError> {
        let controller = system_controller(config)?;
        let detector = ActivityDetector::new(config.policy.clone(), Arc::clone(controller.probe()));
        Ok(Supervisor::spawn(
            controller,
            detector,
            LoopSettings::from_config(config),
        ))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    #[error(transparent)]
    Launch(#[from] LaunchError),
    #[error("{0}")]
    Config(String),
}

impl<P: ProcessProbe, L: Launcher> Supervisor<P, L> {
    pub fn spawn(
        controller: LifecycleController<P, L>,
        detector: ActivityDetector<P>,
        settings: LoopSettings,
    ) -> Self {
        let actions = ActionTracker::new();
        let reconcile = ReconciliationLoop::new(
            controller.clone(),
            detector,
            settings.startup_grace,
            settings.check_interval,
            actions.clone(),
        );
        let ticks = reconcile.subscribe_ticks();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let reconciler = tokio::spawn(reconcile.run(shutdown_rx));
        info!(
            process = controller.process_name(),
            grace_secs = settings.startup_grace.as_secs(),
            interval_secs = settings.check_interval.as_secs(),
            "supervisor started"
        );

        Self {
            controller,
            shutdown_tx,
            reconciler,
            actions,
            ticks,
        }
    }

    pub fn controller(&self) -> &LifecycleController<P, L> {
        &self.controller
    }

    pub fn subscribe(&self) -> watch::Receiver<DisplayState> {
        self.controller.subscribe()
    }

    pub fn ticks(&self) -> watch::Receiver<Option<ReconciliationTick>> {
        self.ticks.clone()
    }

    pub fn in_flight(&self) -> usize {
        self.actions.in_flight()
    }

    /// Run a manual action on its own task; returns immediately.
    pub fn request(&self, action: ManualAction) {
        debug!(?action, "manual action requested");
        let controller = self.controller.clone();
        self.actions.spawn(async move {
            match action {
                ManualAction::Start => {
                    controller.start().await;
                }
                ManualAction::Stop => {
                    controller.stop().await;
                }
                ManualAction::Toggle => {
                    controller.toggle().await;
                }
            }
        });
    }

    /// Stop ticking, then wait for the loop and every in-flight action.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        if let Err(e) = self.reconciler.await {
            debug!(error = %e, "reconciliation task ended abnormally");
        }
        self.actions.join_all().await;
        info!("supervisor stopped");
    }
}
