use std::io;

// =========================================================================
// Unix implementation
// =========================================================================

#[cfg(unix)]
mod platform {
    use super::*;
    use std::os::unix::process::CommandExt;

    /// `Ok(false)` when the pid was already gone.
    pub fn force_kill(pid: u32) -> io::Result<bool> {
        let pid = nix::unistd::Pid::from_raw(pid as i32);
        match nix::sys::signal::kill(pid, nix::sys::signal::Signal::SIGKILL) {
            Ok(()) => Ok(true),
            Err(nix::errno::Errno::ESRCH) => Ok(false),
            Err(e) => Err(io::Error::other(e)),
        }
    }

    pub fn is_pid_alive(pid: u32) -> bool {
        match nix::sys::signal::kill(nix::unistd::Pid::from_raw(pid as i32), None) {
            Ok(()) => true,
            Err(nix::errno::Errno::EPERM) => true,
            Err(_) => false,
        }
    }

    // -- Detached launch --

    pub fn configure_detached_cmd(cmd: &mut std::process::Command) {
        cmd.process_group(0);
    }

    pub fn configure_hidden_cmd(_cmd: &mut tokio::process::Command) {}

    // -- Scheduler trigger --

    #[cfg(target_os = "macos")]
    pub fn scheduled_task_command(name: &str) -> tokio::process::Command {
        let mut cmd = tokio::process::Command::new("launchctl");
        cmd.arg("start").arg(name);
        cmd
    }

    #[cfg(not(target_os = "macos"))]
    pub fn scheduled_task_command(name: &str) -> tokio::process::Command {
        let mut cmd = tokio::process::Command::new("systemctl");
        cmd.args(["--user", "start"]).arg(name);
        cmd
    }

    // -- Signal shutdown (async) --

    pub async fn signal_shutdown() {
        let (Ok(mut sigterm), Ok(mut sigint)) = (
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()),
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt()),
        ) else {
            std::future::pending::<()>().await;
            return;
        };

        tokio::select! {
            _ = sigterm.recv() => {}
            _ = sigint.recv() => {}
        }
    }
}

// =========================================================================
// Windows implementation
// =========================================================================

#[cfg(windows)]
mod platform {
    use super::*;

    const CREATE_NO_WINDOW: u32 = 0x0800_0000;
    const CREATE_NEW_PROCESS_GROUP: u32 = 0x0000_0200;
    const STILL_ACTIVE: u32 = 259;

    pub fn force_kill(pid: u32) -> io::Result<bool> {
        use windows_sys::Win32::Foundation::CloseHandle;
        use windows_sys::Win32::System::Threading::{
            OpenProcess, PROCESS_TERMINATE, TerminateProcess,
        };

        unsafe {
            let handle = OpenProcess(PROCESS_TERMINATE, 0, pid);
            if handle.is_null() {
                if !is_pid_alive(pid) {
                    return Ok(false);
                }
                return Err(io::Error::last_os_error());
            }
            let result = TerminateProcess(handle, 1);
            CloseHandle(handle);
            if result == 0 {
                return Err(io::Error::last_os_error());
            }
        }
        Ok(true)
    }

    pub fn is_pid_alive(pid: u32) -> bool {
        use windows_sys::Win32::Foundation::CloseHandle;
        use windows_sys::Win32::System::Threading::{
            GetExitCodeProcess, OpenProcess, PROCESS_QUERY_INFORMATION,
        };

        unsafe {
            let handle = OpenProcess(PROCESS_QUERY_INFORMATION, 0, pid);
            if handle.is_null() {
                return false;
            }
            let mut exit_code: u32 = 0;
            let result = GetExitCodeProcess(handle, &mut exit_code);
            CloseHandle(handle);
            result != 0 && exit_code == STILL_ACTIVE
        }
    }

    // -- Detached launch --

    pub fn configure_detached_cmd(cmd: &mut std::process::Command) {
        use std::os::windows::process::CommandExt;
        cmd.creation_flags(CREATE_NO_WINDOW | CREATE_NEW_PROCESS_GROUP);
    }

    pub fn configure_hidden_cmd(cmd: &mut tokio::process::Command) {
        cmd.creation_flags(CREATE_NO_WINDOW);
    }

    // -- Scheduler trigger --

    pub fn scheduled_task_command(name: &str) -> tokio::process::Command {
        let mut cmd = tokio::process::Command::new("schtasks");
        cmd.args(["/run", "/tn"]).arg(name);
        configure_hidden_cmd(&mut cmd);
        cmd
    }

    // -- Signal shutdown (async) --

    pub async fn signal_shutdown() {
        tokio::signal::ctrl_c().await.ok();
    }
}

// =========================================================================
// Re-exports
// =========================================================================

pub use platform::*;

/// Platform executable suffix stripped before comparing process names.
pub const EXE_SUFFIX: &str = ".exe";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_self_is_alive() {
        assert!(is_pid_alive(std::process::id()));
    }

    #[cfg(unix)]
    #[test]
    fn test_force_kill_missing_pid_is_not_an_error() {
        // Beyond the default pid_max on Linux and macOS.
        assert!(!force_kill(4_194_304 + 17).unwrap());
    }

    #[cfg(unix)]
    #[test]
    fn test_force_kill_child() {
        let mut child = std::process::Command::new("sleep")
            .arg("30")
            .spawn()
            .unwrap();
        assert!(force_kill(child.id()).unwrap());
        let status = child.wait().unwrap();
        assert!(!status.success());
    }

    #[cfg(all(unix, not(target_os = "macos")))]
    #[test]
    fn test_scheduled_task_uses_systemd_user_unit() {
        let cmd = scheduled_task_command("rclone-mount");
        let std_cmd = cmd.as_std();
        assert_eq!(std_cmd.get_program(), "systemctl");
        let args: Vec<_> = std_cmd.get_args().collect();
        assert_eq!(args, ["--user", "start", "rclone-mount"]);
    }
}
