use clap::Parser;
use color_eyre::eyre::eyre;
use comfy_table::{Attribute, Cell, Color, Table, presets::UTF8_FULL_CONDENSED};
use owo_colors::OwoColorize;
use rclone_tray::activity::ActivityDetector;
use rclone_tray::cli::{Cli, Command};
use rclone_tray::config::{self, Config};
use rclone_tray::lifecycle::Transition;
use rclone_tray::paths::Paths;
use rclone_tray::probe::ProcessProbe;
use rclone_tray::select::{self, Preselected};
use rclone_tray::state::DisplayState;
use rclone_tray::supervisor::{self, SystemSupervisor};
use rclone_tray::transfer::{self, CancellationGate, TransferCommand, TransferDriver, TransferMode};
use rclone_tray::{logging, tray, uploader};
use serde::Serialize;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::Arc;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();

    let mut paths = Paths::new()?;
    if let Some(path) = cli.config {
        paths = paths.with_config_file(path);
    }
    let config = config::load_config(paths.config_file())
        .map_err(|e| eyre!("{e}"))?
        .with_env_credentials();

    match Command::or_default(cli.command) {
        Command::Supervise { headless } => {
            let _log = logging::init(&paths, headless)?;
            supervise(&config, headless).await
        }
        Command::Start => {
            let _log = logging::init(&paths, true)?;
            one_shot(&config, true).await
        }
        Command::Stop => {
            let _log = logging::init(&paths, true)?;
            one_shot(&config, false).await
        }
        Command::Status { json } => {
            let _log = logging::init(&paths, false)?;
            status(&config, json)
        }
        Command::Upload { files, dest, mode } => {
            let _log = logging::init(&paths, false)?;
            upload(&config, files, dest, mode).await
        }
        Command::Config => {
            println!("# {}", paths.config_file().display());
            print!("{}", config.redacted().to_toml().map_err(|e| eyre!("{e}"))?);
            Ok(())
        }
    }
}

async fn supervise(config: &Config, headless: bool) -> color_eyre::Result<()> {
    let sup = &config.supervisor;
    let supervisor = SystemSupervisor::from_config(sup)?;

    let result = if headless {
        tray::run_headless(&supervisor, &sup.display_name).await;
        Ok(())
    } else {
        tray::run_tui(&supervisor, &sup.display_name, &sup.policy)
    };

    if supervisor.in_flight() > 0 {
        eprintln!("{}", "Waiting for the running start/stop to finish…".dimmed());
    }
    supervisor.shutdown().await;
    result
}

async fn one_shot(config: &Config, start: bool) -> color_eyre::Result<()> {
    let controller = supervisor::system_controller(&config.supervisor)?;
    let name = &config.supervisor.display_name;
    let transition = if start {
        controller.start().await
    } else {
        controller.stop().await
    };

    let state = controller.display_state();
    match (transition, start) {
        (Transition::Skipped, true) => println!("{}", format!("{name} is already running").yellow()),
        (Transition::Skipped, false) => println!("{}", format!("{name} is not running").yellow()),
        (Transition::Performed, _) => match state {
            DisplayState::Running => println!("{}", state.tooltip(name).green()),
            _ => println!("{}", state.tooltip(name).red()),
        },
    }
    Ok(())
}

#[derive(Debug, Serialize)]
struct StatusReport {
    process_name: String,
    state: DisplayState,
    rc_addr: String,
    rc_port_in_use: bool,
    policy: config::Policy,
    competing: Vec<String>,
}

fn status(config: &Config, json: bool) -> color_eyre::Result<()> {
    let sup = &config.supervisor;
    let controller = supervisor::system_controller(sup)?;
    let probe = Arc::clone(controller.probe());
    let detector = ActivityDetector::new(sup.policy.clone(), Arc::clone(&probe));
    let rc_port = sup.rc_port().map_err(|e| eyre!("{e}"))?;

    let report = StatusReport {
        process_name: sup.process_name.clone(),
        state: DisplayState::from_running(controller.is_running()),
        rc_addr: sup.rc_addr.clone(),
        rc_port_in_use: probe.port_in_use(rc_port),
        policy: sup.policy.clone(),
        competing: detector.active_competitors(),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(UTF8_FULL_CONDENSED);
    table.set_header(vec![
        Cell::new("process").add_attribute(Attribute::Bold),
        Cell::new("state").add_attribute(Attribute::Bold),
        Cell::new("rc").add_attribute(Attribute::Bold),
        Cell::new("policy").add_attribute(Attribute::Bold),
        Cell::new("competing").add_attribute(Attribute::Bold),
    ]);
    let state_color = match report.state {
        DisplayState::Running => Color::Green,
        DisplayState::Stopped => Color::Red,
        DisplayState::Busy => Color::Yellow,
    };
    let rc = if report.rc_port_in_use {
        format!("{} (listening)", report.rc_addr)
    } else {
        format!("{} (free)", report.rc_addr)
    };
    let competing = if report.competing.is_empty() {
        "-".to_string()
    } else {
        report.competing.join(", ")
    };
    table.add_row(vec![
        Cell::new(&report.process_name).fg(Color::Cyan),
        Cell::new(report.state).fg(state_color),
        Cell::new(rc),
        Cell::new(report.policy.to_string()).fg(Color::Magenta),
        Cell::new(competing),
    ]);
    println!("{table}");
    Ok(())
}

async fn upload(
    config: &Config,
    files: Vec<PathBuf>,
    dest: Option<String>,
    mode: Option<TransferMode>,
) -> color_eyre::Result<()> {
    let pre = Preselected {
        files,
        folder: dest,
        mode,
    };
    let Some(job) = select::select(pre, &config.upload.remote)? else {
        return Ok(());
    };

    let gate = Arc::new(CancellationGate::new());
    let (events_tx, events_rx) = transfer::event_channel();
    let driver = TransferDriver::new(
        TransferCommand::from_config(&config.upload),
        Arc::clone(&gate),
        events_tx,
    )
    .spawn(job.clone());

    let presented = if std::io::stdout().is_terminal() {
        uploader::run_tui(&job, events_rx, &gate)
    } else {
        Ok(uploader::run_plain(&job, events_rx, &gate).await)
    };
    let board = match presented {
        Ok(board) => board,
        Err(e) => {
            gate.abort();
            let _ = driver.await;
            return Err(e);
        }
    };

    driver
        .await
        .map_err(|e| eyre!("upload task failed: {e}"))?;
    println!("{}", uploader::summary_table(&board));
    Ok(())
}
