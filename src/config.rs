use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_PROCESS_NAME: &str = "rclone";
pub const DEFAULT_RC_ADDR: &str = "127.0.0.1:7576";
pub const DEFAULT_TASK_NAME: &str = "RcloneRemount";
pub const DEFAULT_CHECK_INTERVAL_SECS: u64 = 5;
pub const DEFAULT_STARTUP_GRACE_SECS: u64 = 40;
pub const DEFAULT_REMOTE: &str = "Cloud Volume";
pub const DEFAULT_RC_USER: &str = "username";
pub const DEFAULT_RC_PASS: &str = "password";
pub const REDACTED: &str = "***";

pub const RC_USER_ENV: &str = "RCLONE_TRAY_RC_USER";
pub const RC_PASS_ENV: &str = "RCLONE_TRAY_RC_PASS";

/// Desired-state policy for the managed process.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum Policy {
    /// Keep it running; restart whenever it disappears.
    #[default]
    Always,
    /// Keep it running unless one of `activity_set` is running, then keep it stopped.
    #[serde(alias = "game_aware")]
    SuspendWhileActivitySetRunning { activity_set: Vec<String> },
}

impl Policy {
    pub fn is_activity_aware(&self) -> bool {
        matches!(self, Policy::SuspendWhileActivitySetRunning { .. })
    }

    pub fn activity_set(&self) -> &[String] {
        match self {
            Policy::Always => &[],
            Policy::SuspendWhileActivitySetRunning { activity_set } => activity_set,
        }
    }
}

impl std::fmt::Display for Policy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Policy::Always => write!(f, "always"),
            Policy::SuspendWhileActivitySetRunning { activity_set } => {
                write!(f, "suspend while running: {}", activity_set.join(", "))
            }
        }
    }
}

/// How the managed process gets launched. Neither variant reports success;
/// the next probe decides.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StartAction {
    ScheduledTask(String),
    Script(String),
}

impl Default for StartAction {
    fn default() -> Self {
        StartAction::ScheduledTask(DEFAULT_TASK_NAME.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SupervisorConfig {
    pub process_name: String,
    pub display_name: String,
    pub rc_addr: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rc_user: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rc_pass: Option<String>,
    pub check_interval: u64,
    pub startup_grace: u64,
    pub start: StartAction,
    pub policy: Policy,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            process_name: DEFAULT_PROCESS_NAME.to_string(),
            display_name: "Rclone".to_string(),
            rc_addr: DEFAULT_RC_ADDR.to_string(),
            rc_user: Some(DEFAULT_RC_USER.to_string()),
            rc_pass: Some(DEFAULT_RC_PASS.to_string()),
            check_interval: DEFAULT_CHECK_INTERVAL_SECS,
            startup_grace: DEFAULT_STARTUP_GRACE_SECS,
            start: StartAction::default(),
            policy: Policy::default(),
        }
    }
}

impl SupervisorConfig {
    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval)
    }

    pub fn startup_grace(&self) -> Duration {
        Duration::from_secs(self.startup_grace)
    }

    pub fn rc_port(&self) -> Result<u16, ConfigError> {
        parse_port(&self.rc_addr)
    }

    pub fn credentials(&self) -> Option<(&str, &str)> {
        match (&self.rc_user, &self.rc_pass) {
            (Some(user), Some(pass)) => Some((user.as_str(), pass.as_str())),
            (Some(user), None) => Some((user.as_str(), "")),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct UploadConfig {
    pub rclone: String,
    pub remote: String,
    pub buffer_size: String,
    pub stats: String,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            rclone: DEFAULT_PROCESS_NAME.to_string(),
            remote: DEFAULT_REMOTE.to_string(),
            buffer_size: "1G".to_string(),
            stats: "1s".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub supervisor: SupervisorConfig,
    pub upload: UploadConfig,
}

impl Config {
    /// Replace RC credentials with the ones found in the environment.
    pub fn with_env_credentials(mut self) -> Self {
        if let Ok(user) = std::env::var(RC_USER_ENV) {
            self.supervisor.rc_user = Some(user);
        }
        if let Ok(pass) = std::env::var(RC_PASS_ENV) {
            self.supervisor.rc_pass = Some(pass);
        }
        self
    }

    /// Copy safe to print: the RC password is masked.
    pub fn redacted(&self) -> Self {
        let mut config = self.clone();
        if config.supervisor.rc_pass.is_some() {
            config.supervisor.rc_pass = Some(REDACTED.to_string());
        }
        config
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::TomlSerialize(e.to_string()))
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let sup = &self.supervisor;
        if sup.process_name.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "supervisor.process_name is empty".to_string(),
            ));
        }
        if sup.check_interval == 0 {
            return Err(ConfigError::Invalid(
                "supervisor.check_interval must be at least 1 second".to_string(),
            ));
        }
        sup.rc_port()?;
        if sup.policy.is_activity_aware() && sup.policy.activity_set().is_empty() {
            return Err(ConfigError::Invalid(
                "supervisor.policy.activity_set is empty".to_string(),
            ));
        }
        match &sup.start {
            StartAction::ScheduledTask(name) if name.trim().is_empty() => {
                return Err(ConfigError::Invalid(
                    "supervisor.start.scheduled_task is empty".to_string(),
                ));
            }
            StartAction::Script(cmd) => {
                let words = shell_words::split(cmd)
                    .map_err(|e| ConfigError::Invalid(format!("supervisor.start.script: {e}")))?;
                if words.is_empty() {
                    return Err(ConfigError::Invalid(
                        "supervisor.start.script is empty".to_string(),
                    ));
                }
            }
            _ => {}
        }
        if self.upload.rclone.trim().is_empty() {
            return Err(ConfigError::Invalid("upload.rclone is empty".to_string()));
        }
        Ok(())
    }
}

#[derive(Debug, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("TOML parse error: {0}")]
    TomlParse(String),
    #[error("TOML serialize error: {0}")]
    TomlSerialize(String),
    #[error("invalid config: {0}")]
    Invalid(String),
    #[error("{0}")]
    IoError(String),
}

pub fn parse_port(addr: &str) -> Result<u16, ConfigError> {
    let (_, port) = addr
        .rsplit_once(':')
        .ok_or_else(|| ConfigError::Invalid(format!("address is missing a port: {addr}")))?;
    port.parse()
        .map_err(|_| ConfigError::Invalid(format!("invalid port in address: {addr}")))
}

/// A missing file is not an error: the defaults apply.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Config::default()),
        Err(e) => return Err(ConfigError::IoError(format!("{}: {}", path.display(), e))),
    };
    parse_config(&content)
}

pub fn parse_config(content: &str) -> Result<Config, ConfigError> {
    let config: Config =
        toml::from_str(content).map_err(|e| ConfigError::TomlParse(e.to_string()))?;
    config.validate()?;
    Ok(config)
}
