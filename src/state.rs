use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

/// What the tray shows. `Busy` exists only while a transition holds the lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisplayState {
    Stopped,
    Running,
    Busy,
}

impl DisplayState {
    pub fn from_running(running: bool) -> Self {
        if running {
            DisplayState::Running
        } else {
            DisplayState::Stopped
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            DisplayState::Stopped => "Stopped",
            DisplayState::Running => "Running",
            DisplayState::Busy => "Working…",
        }
    }

    /// Tray tooltip, e.g. `Rclone: Running`.
    pub fn tooltip(&self, display_name: &str) -> String {
        format!("{display_name}: {}", self.label())
    }
}

impl std::fmt::Display for DisplayState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DisplayState::Stopped => write!(f, "stopped"),
            DisplayState::Running => write!(f, "running"),
            DisplayState::Busy => write!(f, "busy"),
        }
    }
}

/// One observation taken by the reconciliation loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationTick {
    pub at: DateTime<Local>,
    pub managed_running: bool,
    pub competing_active: bool,
}

impl ReconciliationTick {
    pub fn new(managed_running: bool, competing_active: bool) -> Self {
        Self {
            at: Local::now(),
            managed_running,
            competing_active,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tooltip() {
        assert_eq!(DisplayState::Stopped.tooltip("Rclone"), "Rclone: Stopped");
        assert_eq!(DisplayState::Running.tooltip("Rclone"), "Rclone: Running");
        assert_eq!(DisplayState::Busy.tooltip("Mount"), "Mount: Working…");
    }

    #[test]
    fn test_from_running() {
        assert_eq!(DisplayState::from_running(true), DisplayState::Running);
        assert_eq!(DisplayState::from_running(false), DisplayState::Stopped);
    }

    #[test]
    fn test_serializes_snake_case() {
        let json = serde_json::to_string(&DisplayState::Busy).unwrap();
        assert_eq!(json, "\"busy\"");
    }
}
