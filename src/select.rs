use crate::transfer::{Destination, TransferJob, TransferMode};
use color_eyre::eyre::bail;
use std::io::{self, BufRead, IsTerminal, Write};
use std::path::PathBuf;

/// Whatever the command line already answered.
#[derive(Debug, Clone, Default)]
pub struct Preselected {
    pub files: Vec<PathBuf>,
    pub folder: Option<String>,
    pub mode: Option<TransferMode>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ModeChoice {
    Copy,
    Move,
    Cancel,
}

/// Ask for whatever is missing. `Ok(None)` means the user backed out at some
/// step; nothing has been started at that point.
pub fn select(pre: Preselected, remote: &str) -> color_eyre::Result<Option<TransferJob>> {
    if !pre.files.is_empty() {
        check_files_exist(&pre.files)?;
    }
    if io::stdin().is_terminal() {
        match run_interactive(pre, remote) {
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {
                let _ = cliclack::outro_cancel("Upload cancelled.");
                Ok(None)
            }
            other => Ok(other?),
        }
    } else {
        let stdin = io::stdin();
        let mut reader = stdin.lock();
        run_piped(pre, remote, &mut reader)
    }
}

fn check_files_exist(files: &[PathBuf]) -> color_eyre::Result<()> {
    let missing: Vec<String> = files
        .iter()
        .filter(|f| !f.is_file())
        .map(|f| f.display().to_string())
        .collect();
    if !missing.is_empty() {
        bail!("not a file: {}", missing.join(", "));
    }
    Ok(())
}

/// Shell-style word list; quotes keep spaces inside one name.
pub fn parse_file_list(input: &str) -> Result<Vec<PathBuf>, String> {
    let words = shell_words::split(input).map_err(|e| format!("could not parse file list: {e}"))?;
    let files: Vec<PathBuf> = words.into_iter().map(PathBuf::from).collect();
    let missing: Vec<String> = files
        .iter()
        .filter(|f| !f.is_file())
        .map(|f| f.display().to_string())
        .collect();
    if !missing.is_empty() {
        return Err(format!("not a file: {}", missing.join(", ")));
    }
    Ok(files)
}

fn parse_mode(input: &str) -> Option<ModeChoice> {
    match input.trim().to_lowercase().as_str() {
        "" | "c" | "copy" => Some(ModeChoice::Copy),
        "m" | "move" => Some(ModeChoice::Move),
        "x" | "cancel" => Some(ModeChoice::Cancel),
        _ => None,
    }
}

fn finish(files: Vec<PathBuf>, remote: &str, folder: &str, mode: ModeChoice) -> Option<TransferJob> {
    let mode = match mode {
        ModeChoice::Copy => TransferMode::Copy,
        ModeChoice::Move => TransferMode::Move,
        ModeChoice::Cancel => return None,
    };
    Some(TransferJob {
        files,
        destination: Destination::new(remote, folder),
        mode,
    })
}

fn preset_mode(mode: Option<TransferMode>) -> Option<ModeChoice> {
    mode.map(|m| match m {
        TransferMode::Copy => ModeChoice::Copy,
        TransferMode::Move => ModeChoice::Move,
    })
}

// ── Interactive mode (cliclack) ─────────────────────────────────────

fn run_interactive(pre: Preselected, remote: &str) -> io::Result<Option<TransferJob>> {
    cliclack::intro("rclone-tray upload")?;

    let files = if pre.files.is_empty() {
        let input: String = cliclack::input("Files to upload")
            .placeholder("~/Videos/clip.mp4 \"with space.mkv\"")
            .required(true)
            .validate(|input: &String| parse_file_list(input).map(|_| ()))
            .interact()?;
        match parse_file_list(&input) {
            Ok(files) if !files.is_empty() => files,
            _ => return Err(io::ErrorKind::Interrupted.into()),
        }
    } else {
        pre.files
    };

    let folder = match pre.folder {
        Some(folder) => folder,
        None => cliclack::input(format!("Destination folder on {remote}"))
            .placeholder("leave empty for the remote root")
            .default_input("")
            .required(false)
            .interact()?,
    };

    let mode = match preset_mode(pre.mode) {
        Some(mode) => mode,
        None => cliclack::select(format!("Upload {} file(s)", files.len()))
            .item(ModeChoice::Copy, "Copy", "keep originals")
            .item(ModeChoice::Move, "Move", "delete originals after upload")
            .item(ModeChoice::Cancel, "Cancel", "")
            .initial_value(ModeChoice::Copy)
            .interact()?,
    };

    let job = finish(files, remote, &folder, mode);
    match &job {
        Some(job) => cliclack::outro(format!(
            "{} {} file(s) to {}",
            if job.mode == TransferMode::Move { "Moving" } else { "Copying" },
            job.files.len(),
            job.destination
        ))?,
        None => cliclack::outro_cancel("Upload cancelled.")?,
    }
    Ok(job)
}

// ── Piped mode (plain stdin/stderr) ─────────────────────────────────

/// `None` on end of input.
fn plain_prompt(reader: &mut impl BufRead, prompt: &str) -> color_eyre::Result<Option<String>> {
    let stderr = io::stderr();
    let mut stderr = stderr.lock();
    write!(stderr, "{prompt}: ")?;
    stderr.flush()?;

    let mut line = String::new();
    if reader.read_line(&mut line)? == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim_end_matches('\n').trim_end_matches('\r').to_string()))
}

pub fn run_piped(
    pre: Preselected,
    remote: &str,
    reader: &mut impl BufRead,
) -> color_eyre::Result<Option<TransferJob>> {
    let files = if pre.files.is_empty() {
        let Some(input) = plain_prompt(reader, "Files to upload")? else {
            return Ok(None);
        };
        match parse_file_list(&input) {
            Ok(files) if files.is_empty() => return Ok(None),
            Ok(files) => files,
            Err(e) => {
                eprintln!("{e}");
                return Ok(None);
            }
        }
    } else {
        pre.files
    };

    let folder = match pre.folder {
        Some(folder) => folder,
        None => {
            let prompt = format!("Destination folder on {remote} (empty for root)");
            match plain_prompt(reader, &prompt)? {
                Some(folder) => folder,
                None => return Ok(None),
            }
        }
    };

    let mode = match preset_mode(pre.mode) {
        Some(mode) => mode,
        None => loop {
            let Some(input) = plain_prompt(reader, "Mode (copy/move/cancel) [copy]")? else {
                return Ok(None);
            };
            match parse_mode(&input) {
                Some(mode) => break mode,
                None => eprintln!("Must be one of: copy, move, cancel"),
            }
        },
    };

    Ok(finish(files, remote, &folder, mode))
}
