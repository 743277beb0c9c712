//! Report and monitor rendering
//!
//! Line-based text with stable column widths: the `report-util` file, the
//! `screen -ls` status block, the `process-smi` memory monitor, and the
//! `vmstat` counters.

use simos_core::clock;
use simos_memory::VmStats;

use crate::snapshot::{MemoryStatus, ProcessSnapshot, SystemStatus};

const RULE: &str = "---------------------------------------------";

/// CPU status block shared by `screen -ls` and the report file.
pub fn render_system_status(status: &SystemStatus) -> String {
    let mut out = String::new();
    out.push_str(RULE);
    out.push('\n');
    out.push_str("CPU Status:\n");
    out.push_str(&format!("Total Cores      : {}\n", status.total_cores));
    out.push_str(&format!("Cores Used       : {}\n", status.cores_used));
    out.push_str(&format!("Cores Available  : {}\n", status.cores_available));
    out.push_str(&format!("CPU Utilization  : {}%\n", status.cpu_utilization));
    out
}

/// Running and finished process tables.
pub fn render_process_tables(running: &[ProcessSnapshot], finished: &[ProcessSnapshot]) -> String {
    let mut out = String::new();
    out.push_str(RULE);
    out.push('\n');
    out.push_str("Running processes:\n");
    if running.is_empty() {
        out.push_str("No processes currently running.\n");
    } else {
        for p in running {
            out.push_str(&format!(
                "{:<12}  (Started: {})  Core: {}  {} / {}\n",
                p.name,
                p.created_at,
                p.core.map(|c| c as i64).unwrap_or(-1),
                p.executed,
                p.total
            ));
        }
    }

    out.push_str("\nFinished processes:\n");
    if finished.is_empty() {
        out.push_str("No processes have finished yet.\n");
    } else {
        for p in finished {
            out.push_str(&format!(
                "{:<12}  ({})  Finished  {} / {}\n",
                p.name,
                p.completed_at.as_deref().unwrap_or("-"),
                p.executed,
                p.total
            ));
        }
    }
    out.push_str(RULE);
    out.push('\n');
    out
}

/// The full `report-util` file contents.
pub fn build_report(
    status: &SystemStatus,
    running: &[ProcessSnapshot],
    finished: &[ProcessSnapshot],
) -> String {
    let mut out = String::new();
    out.push_str("SimOS Emulator Report\n");
    out.push_str(&format!("Generated: {}\n\n", clock::wall_clock_now()));
    out.push_str(&render_system_status(status));
    out.push('\n');
    out.push_str(&render_process_tables(running, finished));
    out
}

/// The `process-smi` process-and-memory monitor.
pub fn render_memory_monitor(stats: &VmStats, memory: &MemoryStatus) -> String {
    let cpu_util = if stats.total_ticks > 0 {
        stats.active_ticks as f64 / stats.total_ticks as f64 * 100.0
    } else {
        0.0
    };

    let mut out = String::new();
    out.push_str("==========================================\n");
    out.push_str("| SimOS Process and Memory Monitor       |\n");
    out.push_str("==========================================\n");
    out.push_str(&format!("CPU-Util: {:.1}%\n", cpu_util));
    out.push_str(&format!(
        "Memory: {} / {} bytes\n",
        memory.used_bytes, memory.total_bytes
    ));
    out.push_str("==========================================\n");
    out.push_str("Running processes and memory usage:\n");
    out.push_str("------------------------------------------\n");
    for (name, bytes) in &memory.allocations {
        out.push_str(&format!("{:<20}{:>10} bytes\n", name, bytes));
    }
    out.push_str("------------------------------------------\n");
    out
}

/// The `vmstat` counter dump.
pub fn render_vmstat(stats: &VmStats, memory: &MemoryStatus) -> String {
    let mut out = String::new();
    out.push_str(&format!("Total memory: {} bytes\n", memory.total_bytes));
    out.push_str(&format!("Used memory: {} bytes\n", memory.used_bytes));
    out.push_str(&format!("Free memory: {} bytes\n", memory.free_bytes));
    out.push_str(&format!("Idle CPU ticks: {}\n", stats.idle_ticks));
    out.push_str(&format!("Active CPU ticks: {}\n", stats.active_ticks));
    out.push_str(&format!("Total CPU ticks: {}\n", stats.total_ticks));
    out.push_str(&format!("Num paged in: {}\n", stats.pages_paged_in));
    out.push_str(&format!("Num paged out: {}\n", stats.pages_paged_out));
    out
}
