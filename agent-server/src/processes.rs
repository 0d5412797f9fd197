use std::collections::VecDeque;
use std::sync::Mutex as StdMutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use sysinfo::{Pid, ProcessesToUpdate, Signal, System};

/// How long a per-process history ring buffer retains samples before the
/// oldest point is dropped (spec supplement: `/api/processes/{pid}/history`
/// needs a bounded in-memory window, not an unbounded log).
const HISTORY_RETENTION: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Clone, Serialize)]
pub struct ProcessSummary {
    pub pid: u32,
    pub name: String,
    pub cpu_percent: f32,
    pub memory_percent: f32,
    pub memory_bytes: u64,
    pub status: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProcessDetail {
    #[serde(flatten)]
    pub summary: ProcessSummary,
    pub parent_pid: Option<u32>,
    pub start_time_secs: u64,
    pub run_time_secs: u64,
    pub command: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProcessTree {
    pub pid: u32,
    pub name: String,
    pub parent: Option<ProcessSummary>,
    pub children: Vec<ProcessSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProcessHistoryPoint {
    pub timestamp: DateTime<Utc>,
    pub cpu_percent: f32,
    pub memory_percent: f32,
}

#[derive(Debug, Clone, Serialize)]
pub struct HistoryStatistics {
    pub samples: usize,
    pub avg_cpu_percent: f32,
    pub max_cpu_percent: f32,
    pub avg_memory_percent: f32,
    pub max_memory_percent: f32,
}

/// Sort key accepted by `GET /api/processes?sortBy=`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessSortKey {
    Cpu,
    Memory,
}

impl std::str::FromStr for ProcessSortKey {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cpu" => Ok(Self::Cpu),
            "memory" => Ok(Self::Memory),
            _ => Err(()),
        }
    }
}

/// Host process table plus a bounded per-pid history ring, backing the
/// `/api/processes*` routes (spec §6). Distinct from [`crate::MetricSampler`]
/// in `agent-core`, which samples aggregate host metrics rather than
/// tracking individual processes across ticks.
pub struct ProcessRegistry {
    system: StdMutex<System>,
    history: DashMap<u32, StdMutex<VecDeque<ProcessHistoryPoint>>>,
}

impl ProcessRegistry {
    pub fn new() -> Self {
        Self { system: StdMutex::new(System::new_all()), history: DashMap::new() }
    }

    /// Refreshes the process table and appends one history point per
    /// process. Intended to be called on the same cadence as the metric
    /// sampler.
    pub fn refresh(&self) {
        let mut system = self.system.lock().unwrap();
        system.refresh_processes(ProcessesToUpdate::All, true);
        let total_mem = system.total_memory();
        let now = Utc::now();
        let cutoff = now - chrono::Duration::from_std(HISTORY_RETENTION).unwrap_or_default();

        for (pid, process) in system.processes() {
            let memory_percent = if total_mem > 0 { (process.memory() as f64 / total_mem as f64 * 100.0) as f32 } else { 0.0 };
            let point = ProcessHistoryPoint { timestamp: now, cpu_percent: process.cpu_usage(), memory_percent };
            let mut ring = self.history.entry(pid.as_u32()).or_insert_with(|| StdMutex::new(VecDeque::new())).lock().unwrap();
            ring.push_back(point);
            while ring.front().is_some_and(|p| p.timestamp < cutoff) {
                ring.pop_front();
            }
        }
    }

    pub fn list(&self, sort_by: ProcessSortKey, limit: usize) -> Vec<ProcessSummary> {
        let system = self.system.lock().unwrap();
        let total_mem = system.total_memory();
        let mut processes: Vec<ProcessSummary> = system.processes().values().map(|p| to_summary(p, total_mem)).collect();
        match sort_by {
            ProcessSortKey::Cpu => processes.sort_by(|a, b| b.cpu_percent.partial_cmp(&a.cpu_percent).unwrap_or(std::cmp::Ordering::Equal)),
            ProcessSortKey::Memory => processes.sort_by(|a, b| b.memory_percent.partial_cmp(&a.memory_percent).unwrap_or(std::cmp::Ordering::Equal)),
        }
        processes.truncate(limit);
        processes
    }

    pub fn detail(&self, pid: u32) -> Option<ProcessDetail> {
        let system = self.system.lock().unwrap();
        let total_mem = system.total_memory();
        let process = system.process(Pid::from_u32(pid))?;
        Some(ProcessDetail {
            summary: to_summary(process, total_mem),
            parent_pid: process.parent().map(|p| p.as_u32()),
            start_time_secs: process.start_time(),
            run_time_secs: process.run_time(),
            command: process.cmd().iter().map(|s| s.to_string_lossy().into_owned()).collect(),
        })
    }

    pub fn tree(&self, pid: u32) -> Option<ProcessTree> {
        let system = self.system.lock().unwrap();
        let total_mem = system.total_memory();
        let process = system.process(Pid::from_u32(pid))?;
        let parent = process.parent().and_then(|ppid| system.process(ppid)).map(|p| to_summary(p, total_mem));
        let children = system.processes().values().filter(|p| p.parent().map(|ppid| ppid.as_u32()) == Some(pid)).map(|p| to_summary(p, total_mem)).collect();
        Some(ProcessTree { pid, name: process.name().to_string_lossy().into_owned(), parent, children })
    }

    pub fn history(&self, pid: u32, hours: u64) -> Option<(Vec<ProcessHistoryPoint>, HistoryStatistics)> {
        let ring = self.history.get(&pid)?;
        let ring = ring.lock().unwrap();
        let cutoff = Utc::now() - chrono::Duration::hours(hours as i64);
        let points: Vec<ProcessHistoryPoint> = ring.iter().filter(|p| p.timestamp >= cutoff).cloned().collect();
        if points.is_empty() {
            return Some((points, HistoryStatistics { samples: 0, avg_cpu_percent: 0.0, max_cpu_percent: 0.0, avg_memory_percent: 0.0, max_memory_percent: 0.0 }));
        }
        let samples = points.len();
        let avg_cpu_percent = points.iter().map(|p| p.cpu_percent).sum::<f32>() / samples as f32;
        let max_cpu_percent = points.iter().fold(0.0f32, |m, p| m.max(p.cpu_percent));
        let avg_memory_percent = points.iter().map(|p| p.memory_percent).sum::<f32>() / samples as f32;
        let max_memory_percent = points.iter().fold(0.0f32, |m, p| m.max(p.memory_percent));
        Some((points, HistoryStatistics { samples, avg_cpu_percent, max_cpu_percent, avg_memory_percent, max_memory_percent }))
    }

    /// Terminates a process: `force=true` sends `SIGKILL`, otherwise a
    /// graceful `SIGTERM` is attempted first. Returns `Some(true)` if the
    /// signal was delivered, `Some(false)` if the platform does not
    /// support it, `None` if the pid is not present.
    pub fn kill(&self, pid: u32, force: bool) -> Option<bool> {
        let mut system = self.system.lock().unwrap();
        system.refresh_processes(ProcessesToUpdate::Some(&[Pid::from_u32(pid)]), true);
        let process = system.process(Pid::from_u32(pid))?;
        if force {
            Some(process.kill_with(Signal::Kill).unwrap_or_else(|| process.kill()))
        } else {
            Some(process.kill_with(Signal::Term).unwrap_or_else(|| process.kill()))
        }
    }
}

impl Default for ProcessRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn to_summary(process: &sysinfo::Process, total_mem: u64) -> ProcessSummary {
    let memory_percent = if total_mem > 0 { (process.memory() as f64 / total_mem as f64 * 100.0) as f32 } else { 0.0 };
    ProcessSummary {
        pid: process.pid().as_u32(),
        name: process.name().to_string_lossy().into_owned(),
        cpu_percent: process.cpu_usage(),
        memory_percent,
        memory_bytes: process.memory(),
        status: process.status().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn current_process_appears_after_refresh() {
        let registry = ProcessRegistry::new();
        registry.refresh();
        let mine = std::process::id();
        assert!(registry.detail(mine).is_some());
    }

    #[test]
    fn history_starts_empty_for_unknown_pid() {
        let registry = ProcessRegistry::new();
        assert!(registry.history(999_999, 1).is_none());
    }

    #[test]
    fn sort_key_parses_known_values_only() {
        assert_eq!("cpu".parse::<ProcessSortKey>().unwrap(), ProcessSortKey::Cpu);
        assert_eq!("memory".parse::<ProcessSortKey>().unwrap(), ProcessSortKey::Memory);
        assert!("bogus".parse::<ProcessSortKey>().is_err());
    }
}
