//! Process table and socket table queries.
//!
//! Every call takes a fresh snapshot. Query failures read as "not found" so a
//! caller polling in a loop never has to handle them.

use crate::sys;
use std::sync::Arc;
use sysinfo::{ProcessesToUpdate, System};
use tracing::{debug, warn};

/// Read-mostly view of the OS process table plus the one mutating operation
/// the supervisor needs.
pub trait ProcessProbe: Send + Sync + 'static {
    /// Names of every running process, as the OS reports them.
    fn process_names(&self) -> Vec<String>;

    /// Force-kill every process matching `name`. Returns how many were killed.
    fn kill_all(&self, name: &str) -> usize;

    fn port_in_use(&self, port: u16) -> bool;

    fn is_running(&self, name: &str) -> bool {
        self.process_names()
            .iter()
            .any(|candidate| names_match(candidate, name))
    }
}

/// Run a probe query on the blocking pool so table scans never stall an async
/// worker. `None` if the query panicked.
pub async fn query<P, T, F>(probe: &Arc<P>, f: F) -> Option<T>
where
    P: ProcessProbe,
    T: Send + 'static,
    F: FnOnce(&P) -> T + Send + 'static,
{
    let probe = Arc::clone(probe);
    match tokio::task::spawn_blocking(move || f(&probe)).await {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(error = %e, "process query failed");
            None
        }
    }
}

/// Case-insensitive comparison that ignores a trailing executable suffix on
/// either side, so `rclone`, `rclone.exe` and `RCLONE.EXE` are the same name.
pub fn names_match(candidate: &str, wanted: &str) -> bool {
    normalize_name(candidate) == normalize_name(wanted)
}

fn normalize_name(name: &str) -> String {
    let lower = name.trim().to_lowercase();
    match lower.strip_suffix(sys::EXE_SUFFIX) {
        Some(stem) => stem.to_string(),
        None => lower,
    }
}

/// Probe backed by `sysinfo` for processes and `netstat2` for sockets.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemProbe;

impl SystemProbe {
    pub fn new() -> Self {
        Self
    }

    fn snapshot() -> System {
        let mut sys = System::new();
        sys.refresh_processes(ProcessesToUpdate::All, true);
        sys
    }
}

impl ProcessProbe for SystemProbe {
    fn process_names(&self) -> Vec<String> {
        Self::snapshot()
            .processes()
            .values()
            .map(|p| p.name().to_string_lossy().into_owned())
            .collect()
    }

    fn kill_all(&self, name: &str) -> usize {
        let sys = Self::snapshot();
        let mut killed = 0;
        for process in sys.processes().values() {
            if !names_match(&process.name().to_string_lossy(), name) {
                continue;
            }
            let pid = process.pid().as_u32();
            match sys::force_kill(pid) {
                Ok(true) => {
                    debug!(pid, name, "killed");
                    killed += 1;
                }
                // Exited between snapshot and kill.
                Ok(false) => {}
                Err(e) => warn!(pid, name, error = %e, "kill failed"),
            }
        }
        killed
    }

    fn port_in_use(&self, port: u16) -> bool {
        use netstat2::{AddressFamilyFlags, ProtocolFlags, ProtocolSocketInfo};

        let af = AddressFamilyFlags::IPV4 | AddressFamilyFlags::IPV6;
        let sockets = match netstat2::iterate_sockets_info(af, ProtocolFlags::TCP) {
            Ok(sockets) => sockets,
            Err(e) => {
                debug!(port, error = %e, "socket table unavailable");
                return false;
            }
        };

        sockets.filter_map(Result::ok).any(|info| match info.protocol_socket_info {
            ProtocolSocketInfo::Tcp(tcp) => tcp.local_port == port,
            ProtocolSocketInfo::Udp(_) => false,
        })
    }
}
