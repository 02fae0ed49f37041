use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sysinfo::{ProcessesToUpdate, System};
use tracing::debug;

use crate::window_api::{WindowInfo, WindowManager};

/// Per-tick snapshot of one running process. No identity is kept across
/// ticks except the PID, which [ProcessMonitor::diff] uses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessInfo {
    pub pid: u32,
    pub name: String,
    pub cpu_percent: f32,
    pub memory_percent: f32,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub create_time: DateTime<Utc>,
}

/// Result of diffing the current process set against the previous tick.
#[derive(Debug, Clone, Default)]
pub struct ProcessChanges {
    pub new: Vec<ProcessInfo>,
    pub terminated: Vec<ProcessInfo>,
    pub total: usize,
}

/// Monitors running processes and the foreground window.
pub struct ProcessMonitor {
    system: System,
    previous: HashMap<u32, ProcessInfo>,
    window_manager: Box<dyn WindowManager>,
}

impl ProcessMonitor {
    pub fn new(window_manager: Box<dyn WindowManager>) -> Self {
        Self {
            system: System::new_all(),
            previous: HashMap::new(),
            window_manager,
        }
    }

    /// Enumerates all running processes. Entries that vanish mid-enumeration
    /// or are access-denied are simply missing from the result.
    pub fn list_processes(&mut self) -> Vec<ProcessInfo> {
        self.system.refresh_processes(ProcessesToUpdate::All, true);
        let total_memory = self.system.total_memory().max(1);

        self.system
            .processes()
            .iter()
            .map(|(pid, process)| ProcessInfo {
                pid: pid.as_u32(),
                name: process.name().to_string_lossy().into_owned(),
                cpu_percent: process.cpu_usage(),
                memory_percent: process.memory() as f32 / total_memory as f32 * 100.0,
                create_time: DateTime::from_timestamp(process.start_time() as i64, 0)
                    .unwrap_or(DateTime::UNIX_EPOCH),
            })
            .collect()
    }

    /// Computes the new and terminated process sets relative to the previous
    /// snapshot by PID difference. Only the latest PID mapping is retained.
    pub fn diff(&mut self, current: &[ProcessInfo]) -> ProcessChanges {
        let current_map: HashMap<u32, ProcessInfo> =
            current.iter().map(|p| (p.pid, p.clone())).collect();

        let new = current_map
            .values()
            .filter(|p| !self.previous.contains_key(&p.pid))
            .cloned()
            .collect();
        let terminated = self
            .previous
            .values()
            .filter(|p| !current_map.contains_key(&p.pid))
            .cloned()
            .collect();

        self.previous = current_map;

        ProcessChanges {
            new,
            terminated,
            total: current.len(),
        }
    }

    /// Queries the OS for the currently focused window. Absent on any
    /// platform or permission failure.
    pub fn foreground_window(&mut self) -> Option<WindowInfo> {
        match self.window_manager.foreground_window() {
            Ok(window) => Some(window),
            Err(e) => {
                debug!("Foreground window unavailable {e:?}");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use anyhow::anyhow;

    use crate::window_api::MockWindowManager;

    use super::*;

    fn info(pid: u32, name: &str) -> ProcessInfo {
        ProcessInfo {
            pid,
            name: name.into(),
            cpu_percent: 0.0,
            memory_percent: 0.0,
            create_time: DateTime::UNIX_EPOCH,
        }
    }

    fn monitor() -> ProcessMonitor {
        ProcessMonitor::new(Box::new(MockWindowManager::new()))
    }

    #[test]
    fn first_diff_reports_everything_as_new() {
        let mut monitor = monitor();
        let current = vec![info(1, "init"), info(2, "bash")];

        let changes = monitor.diff(&current);
        assert_eq!(changes.new.len(), 2);
        assert!(changes.terminated.is_empty());
        assert_eq!(changes.total, 2);
    }

    #[test]
    fn diff_tracks_new_and_terminated_pids() {
        let mut monitor = monitor();
        monitor.diff(&[info(1, "init"), info(2, "bash")]);

        let changes = monitor.diff(&[info(1, "init"), info(3, "vim")]);
        assert_eq!(changes.new.len(), 1);
        assert_eq!(changes.new[0].pid, 3);
        assert_eq!(changes.terminated.len(), 1);
        assert_eq!(changes.terminated[0].pid, 2);
        assert_eq!(changes.total, 2);
    }

    #[test]
    fn diff_retains_only_the_latest_snapshot() {
        let mut monitor = monitor();
        monitor.diff(&[info(1, "init")]);
        monitor.diff(&[info(2, "bash")]);

        // pid 1 terminated on the previous diff, it must not resurface.
        let changes = monitor.diff(&[info(2, "bash")]);
        assert!(changes.new.is_empty());
        assert!(changes.terminated.is_empty());
    }

    #[test]
    fn window_lookup_failure_degrades_to_absent() {
        let mut manager = MockWindowManager::new();
        manager
            .expect_foreground_window()
            .returning(|| Err(anyhow!("denied")));
        let mut monitor = ProcessMonitor::new(Box::new(manager));
        assert!(monitor.foreground_window().is_none());
    }

    #[test]
    fn lists_at_least_the_current_process() {
        let mut monitor = monitor();
        let processes = monitor.list_processes();
        let own_pid = std::process::id();
        assert!(processes.iter().any(|p| p.pid == own_pid));
    }
}
