//! Performance statistics collection for `--stats` output.

use std::time::{Duration, Instant};

use crate::device::DeviceCounters;

/// Collects setup phase timings and device counters.
///
/// Created when `--stats` is passed, threaded as `Option<&mut Stats>`.
pub struct Stats {
    total_start: Instant,
    phases: Vec<(&'static str, Duration)>,
    pub device_name: &'static str,
    pub levels: usize,
    pub host_mirrors: usize,
    pub prolongations: u32,
    // Read from the device at the end.
    pub device: DeviceCounters,
}

impl Default for Stats {
    fn default() -> Self {
        Self::new()
    }
}

impl Stats {
    pub fn new() -> Self {
        Self {
            total_start: Instant::now(),
            phases: Vec::new(),
            device_name: "",
            levels: 0,
            host_mirrors: 0,
            prolongations: 0,
            device: DeviceCounters::default(),
        }
    }

    /// Record a completed phase with its duration.
    pub fn add_phase(&mut self, name: &'static str, duration: Duration) {
        self.phases.push((name, duration));
    }

    pub fn phases(&self) -> &[(&'static str, Duration)] {
        &self.phases
    }

    /// Print the stats table to stderr.
    pub fn display(&self) {
        let total = self.total_start.elapsed();
        eprintln!();
        eprintln!("=== hpcg-mg Setup Stats ({}) ===", self.device_name);

        for (name, dur) in &self.phases {
            eprintln!("  {:<24} {:>8.3}s", name, dur.as_secs_f64());
        }

        eprintln!("  Levels:                 {}", self.levels);
        if self.host_mirrors > 0 {
            eprintln!("  Host mirrors:           {}", self.host_mirrors);
        }
        if self.prolongations > 0 {
            eprintln!("  Prolongations:          {}", self.prolongations);
        }

        eprintln!("  ─────────────────────────────────");
        eprintln!("  Total:                  {:>8.3}s", total.as_secs_f64());
        eprintln!("  Device allocations:     {}", self.device.allocations);
        eprintln!(
            "  Device bytes:           {:.1} MiB",
            self.device.bytes_allocated as f64 / (1024.0 * 1024.0)
        );
        eprintln!("  Kernel launches:        {}", self.device.launches);
        eprintln!("  Readbacks:              {}", self.device.readbacks);
    }
}
