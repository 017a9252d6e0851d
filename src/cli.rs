use crate::transfer::TransferMode;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(
    name = "rclone-tray",
    about = "Keeps an rclone mount running and uploads files through rclone",
    version
)]
pub struct Cli {
    /// Config file (default: $RCLONE_TRAY_CONFIG or the user config dir)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the supervisor with the tray view (the default command)
    Supervise {
        /// Log to stderr instead of drawing the tray view
        #[arg(long)]
        headless: bool,
    },
    /// Start the managed process now
    Start,
    /// Stop the managed process now
    Stop,
    /// Show the managed process, RC port and policy
    Status {
        #[arg(long)]
        json: bool,
    },
    /// Upload files to the configured remote
    Upload {
        files: Vec<PathBuf>,
        /// Folder on the remote; empty for the remote root
        #[arg(long, value_name = "FOLDER")]
        dest: Option<String>,
        #[arg(long, value_enum)]
        mode: Option<TransferMode>,
    },
    /// Print the effective configuration
    Config,
}

impl Command {
    pub fn or_default(command: Option<Command>) -> Command {
        command.unwrap_or(Command::Supervise { headless: false })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_command_means_supervise() {
        let cli = Cli::try_parse_from(["rclone-tray"]).unwrap();
        assert!(matches!(
            Command::or_default(cli.command),
            Command::Supervise { headless: false }
        ));
    }

    #[test]
    fn test_supervise_headless() {
        let cli = Cli::try_parse_from(["rclone-tray", "supervise", "--headless"]).unwrap();
        assert!(matches!(
            cli.command.unwrap(),
            Command::Supervise { headless: true }
        ));
    }

    #[test]
    fn test_start_stop() {
        let cli = Cli::try_parse_from(["rclone-tray", "start"]).unwrap();
        assert!(matches!(cli.command.unwrap(), Command::Start));
        let cli = Cli::try_parse_from(["rclone-tray", "stop"]).unwrap();
        assert!(matches!(cli.command.unwrap(), Command::Stop));
    }

    #[test]
    fn test_status_json() {
        let cli = Cli::try_parse_from(["rclone-tray", "status", "--json"]).unwrap();
        assert!(matches!(cli.command.unwrap(), Command::Status { json: true }));
    }

    #[test]
    fn test_upload_without_args() {
        let cli = Cli::try_parse_from(["rclone-tray", "upload"]).unwrap();
        match cli.command.unwrap() {
            Command::Upload { files, dest, mode } => {
                assert!(files.is_empty());
                assert!(dest.is_none());
                assert!(mode.is_none());
            }
            _ => panic!("expected Upload"),
        }
    }

    #[test]
    fn test_upload_with_everything() {
        let cli = Cli::try_parse_from([
            "rclone-tray",
            "upload",
            "a.mp4",
            "b.mp4",
            "--dest",
            "videos/2024",
            "--mode",
            "move",
        ])
        .unwrap();
        match cli.command.unwrap() {
            Command::Upload { files, dest, mode } => {
                assert_eq!(files, vec![PathBuf::from("a.mp4"), PathBuf::from("b.mp4")]);
                assert_eq!(dest.as_deref(), Some("videos/2024"));
                assert_eq!(mode, Some(TransferMode::Move));
            }
            _ => panic!("expected Upload"),
        }
    }

    #[test]
    fn test_upload_empty_dest_allowed() {
        let cli = Cli::try_parse_from(["rclone-tray", "upload", "a.mp4", "--dest", ""]).unwrap();
        match cli.command.unwrap() {
            Command::Upload { dest, .. } => assert_eq!(dest.as_deref(), Some("")),
            _ => panic!("expected Upload"),
        }
    }

    #[test]
    fn test_upload_rejects_unknown_mode() {
        assert!(Cli::try_parse_from(["rclone-tray", "upload", "--mode", "sync"]).is_err());
    }

    #[test]
    fn test_global_config_after_subcommand() {
        let cli = Cli::try_parse_from(["rclone-tray", "status", "--config", "/tmp/c.toml"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/c.toml")));
    }

    #[test]
    fn test_unknown_subcommand() {
        assert!(Cli::try_parse_from(["rclone-tray", "restart"]).is_err());
    }
}
