use std::fmt;
#[cfg(feature = "cli")]
use std::sync::Mutex;
#[cfg(feature = "cli")]
use std::time::{Duration, Instant};
#[cfg(feature = "cli")]
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, RefreshKind, System};

/// 匯出流程的檢查點，依序為 Start → Extract → Execute → Export
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// 尚未讀取查詢
    Start,
    /// 查詢已讀入並切割
    Extract,
    /// 所有查詢都已執行
    Execute,
    /// 檔案已寫出
    Export,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Phase::Start => "Start",
            Phase::Extract => "Extract",
            Phase::Execute => "Execute",
            Phase::Export => "Export",
        })
    }
}

#[cfg(feature = "cli")]
#[derive(Debug, Clone)]
pub struct ProcessStats {
    pub cpu_usage: f32,
    pub memory_mb: u64,
    pub peak_memory_mb: u64,
}

#[cfg(feature = "cli")]
#[derive(Default)]
struct Timeline {
    last: Option<Instant>,
    phases: Vec<(Phase, Duration)>,
    peak_memory_mb: u64,
}

/// 每個階段結束時記錄本程序的 CPU、記憶體與該階段耗時。
///
/// 階段耗時是與上一個檢查點的差；`Start` 只當作起點。
/// 取不到 PID 時只記錄耗時。
#[cfg(feature = "cli")]
pub struct SystemMonitor {
    system: Mutex<System>,
    pid: Option<Pid>,
    started: Instant,
    timeline: Mutex<Timeline>,
    enabled: bool,
}

#[cfg(feature = "cli")]
fn process_refresh() -> ProcessRefreshKind {
    ProcessRefreshKind::nothing().with_cpu().with_memory()
}

#[cfg(feature = "cli")]
impl SystemMonitor {
    pub fn new(enabled: bool) -> Self {
        let refresh = if enabled {
            RefreshKind::nothing().with_processes(process_refresh())
        } else {
            RefreshKind::nothing()
        };
        let system = System::new_with_specifics(refresh);

        let pid = match sysinfo::get_current_pid() {
            Ok(pid) => Some(pid),
            Err(e) => {
                if enabled {
                    tracing::warn!("⚠️ Cannot resolve current PID, only timing phases: {}", e);
                }
                None
            }
        };

        Self {
            system: Mutex::new(system),
            pid,
            started: Instant::now(),
            timeline: Mutex::new(Timeline::default()),
            enabled,
        }
    }

    fn process_stats(&self, peak_memory_mb: &mut u64) -> Option<ProcessStats> {
        let pid = self.pid?;
        let mut system = self.system.lock().ok()?;
        system.refresh_processes_specifics(ProcessesToUpdate::Some(&[pid]), true, process_refresh());

        let process = system.process(pid)?;
        let memory_mb = process.memory() / 1024 / 1024;
        *peak_memory_mb = (*peak_memory_mb).max(memory_mb);

        Some(ProcessStats {
            cpu_usage: process.cpu_usage(),
            memory_mb,
            peak_memory_mb: *peak_memory_mb,
        })
    }

    pub fn log_stats(&self, phase: Phase) {
        if !self.enabled {
            return;
        }
        let Ok(mut timeline) = self.timeline.lock() else {
            return;
        };

        let now = Instant::now();
        let took = now.duration_since(timeline.last.unwrap_or(self.started));
        timeline.last = Some(now);
        if phase != Phase::Start {
            timeline.phases.push((phase, took));
        }

        match self.process_stats(&mut timeline.peak_memory_mb) {
            Some(stats) => tracing::info!(
                "📊 {} - {:?}, CPU: {:.1}%, Memory: {}MB, Peak: {}MB",
                phase,
                took,
                stats.cpu_usage,
                stats.memory_mb,
                stats.peak_memory_mb
            ),
            None => tracing::info!("📊 {} - {:?}", phase, took),
        }
    }

    pub fn log_final_stats(&self) {
        if let Some((total, phases)) = self.summary() {
            let breakdown: Vec<String> = phases
                .iter()
                .map(|(phase, took)| format!("{} {:?}", phase, took))
                .collect();
            let peak = self.timeline.lock().map(|t| t.peak_memory_mb).unwrap_or(0);
            tracing::info!(
                "📊 Final Stats - Total Time: {:?}, Peak Memory: {}MB ({})",
                total,
                peak,
                breakdown.join(", ")
            );
        }
    }

    /// 總耗時與各階段耗時；未啟用時為 None
    pub fn summary(&self) -> Option<(Duration, Vec<(Phase, Duration)>)> {
        if !self.enabled {
            return None;
        }
        let timeline = self.timeline.lock().ok()?;
        Some((self.started.elapsed(), timeline.phases.clone()))
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
}

#[cfg(feature = "cli")]
impl Default for SystemMonitor {
    fn default() -> Self {
        Self::new(false)
    }
}

// 非 CLI 環境的空實作
#[cfg(not(feature = "cli"))]
#[derive(Default)]
pub struct SystemMonitor;

#[cfg(not(feature = "cli"))]
impl SystemMonitor {
    pub fn new(_enabled: bool) -> Self {
        Self
    }

    pub fn log_stats(&self, _phase: Phase) {}

    pub fn log_final_stats(&self) {}

    pub fn is_enabled(&self) -> bool {
        false
    }
}
