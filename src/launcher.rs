use crate::config::{StartAction, SupervisorConfig};
use crate::rpc::{self, RcClient, RpcError};
use crate::sys;
use std::future::Future;
use std::process::Stdio;
use tracing::{debug, warn};

#[derive(Debug, thiserror::Error)]
pub enum LaunchError {
    #[error("invalid start command: {0}")]
    InvalidCommand(String),
    #[error("failed to run start action: {0}")]
    SpawnFailed(#[from] std::io::Error),
    #[error(transparent)]
    Rpc(#[from] RpcError),
}

/// The two external side effects a lifecycle transition can trigger.
pub trait Launcher: Send + Sync + 'static {
    /// Fire the configured start action. Returning `Ok` says nothing about
    /// whether the managed process came up.
    fn trigger_start(&self) -> impl Future<Output = Result<(), LaunchError>> + Send;

    /// Ask the managed process to exit on its own.
    fn request_quit(&self) -> impl Future<Output = Result<(), LaunchError>> + Send;
}

pub struct SystemLauncher {
    start: StartAction,
    rc: RcClient,
}

impl SystemLauncher {
    pub fn new(start: StartAction, rc: RcClient) -> Self {
        Self { start, rc }
    }

    pub fn from_config(config: &SupervisorConfig) -> Result<Self, LaunchError> {
        let rc = RcClient::new(
            &config.rc_addr,
            config.credentials(),
            rpc::RC_QUIT_TIMEOUT,
        )?;
        Ok(Self::new(config.start.clone(), rc))
    }
}

pub fn parse_command(command: &str) -> Result<(String, Vec<String>), LaunchError> {
    let words = shell_words::split(command)
        .map_err(|e| LaunchError::InvalidCommand(format!("failed to parse: {e}")))?;

    let Some((program, args)) = words.split_first() else {
        return Err(LaunchError::InvalidCommand("command is empty".to_string()));
    };
    Ok((program.clone(), args.to_vec()))
}

async fn run_scheduled_task(name: &str) -> Result<(), LaunchError> {
    let status = sys::scheduled_task_command(name)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await?;
    if !status.success() {
        warn!(task = name, %status, "scheduled task trigger exited unsuccessfully");
    }
    Ok(())
}

/// The script is expected to outlive us, so it gets its own process group and
/// is never waited on.
fn spawn_script(command: &str) -> Result<(), LaunchError> {
    let (program, args) = parse_command(command)?;
    let mut cmd = std::process::Command::new(&program);
    cmd.args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());
    sys::configure_detached_cmd(&mut cmd);
    let child = cmd.spawn()?;
    debug!(pid = child.id(), program, "start script launched");
    Ok(())
}

impl Launcher for SystemLauncher {
    async fn trigger_start(&self) -> Result<(), LaunchError> {
        match &self.start {
            StartAction::ScheduledTask(name) => run_scheduled_task(name).await,
            StartAction::Script(command) => spawn_script(command),
        }
    }

    async fn request_quit(&self) -> Result<(), LaunchError> {
        Ok(self.rc.quit().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_parse_simple_command() {
        let (prog, args) = parse_command("wscript.exe mount.vbs").unwrap();
        assert_eq!(prog, "wscript.exe");
        assert_eq!(args, vec!["mount.vbs"]);
    }

    #[test]
    fn test_parse_command_quoted_args() {
        let (prog, args) = parse_command(r#"sh -c "rclone mount remote: /mnt""#).unwrap();
        assert_eq!(prog, "sh");
        assert_eq!(args, vec!["-c", "rclone mount remote: /mnt"]);
    }

    #[test]
    fn test_parse_empty_command() {
        assert!(matches!(
            parse_command("   ").unwrap_err(),
            LaunchError::InvalidCommand(_)
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_script_start_action_runs_detached() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("started");
        let command = format!("sh -c 'touch {}'", marker.display());

        let rc = RcClient::new("127.0.0.1:1", None, Duration::from_millis(100)).unwrap();
        let launcher = SystemLauncher::new(StartAction::Script(command), rc);
        launcher.trigger_start().await.unwrap();

        for _ in 0..50 {
            if marker.exists() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(marker.exists());
    }

    #[tokio::test]
    async fn test_missing_script_program_is_spawn_error() {
        let rc = RcClient::new("127.0.0.1:1", None, Duration::from_millis(100)).unwrap();
        let launcher = SystemLauncher::new(
            StartAction::Script("/definitely/not/here --flag".to_string()),
            rc,
        );
        assert!(matches!(
            launcher.trigger_start().await,
            Err(LaunchError::SpawnFailed(_))
        ));
    }
}
