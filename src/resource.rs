//! Best-effort memory pressure monitoring.
//!
//! A background sampler reads process residency on an interval. When
//! residency crosses the configured fraction of the heap ceiling, registered
//! flush hooks run (caches drop what they can), rate-limited by a cooldown.
//! Queries keep serving committed state throughout; the monitor never blocks
//! the pipeline.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

/// Sampler configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResourceConfig {
    pub heap_ceiling_bytes: u64,
    pub heap_critical_pct: f64,
    pub memory_monitor_interval_ms: u64,
    pub gc_cooldown_ms: u64,
}

impl Default for ResourceConfig {
    fn default() -> Self {
        Self {
            heap_ceiling_bytes: 1024 * 1024 * 1024,
            heap_critical_pct: 0.75,
            memory_monitor_interval_ms: 5_000,
            gc_cooldown_ms: 30_000,
        }
    }
}

type FlushHook = Box<dyn Fn() + Send + Sync>;

struct Shared {
    hooks: Mutex<Vec<FlushHook>>,
    stop: AtomicBool,
}

/// Background memory sampler with registered flush hooks.
pub struct ResourceMonitor {
    shared: Arc<Shared>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl ResourceMonitor {
    /// Start sampling on a background thread.
    pub fn start(cfg: ResourceConfig) -> Self {
        let shared = Arc::new(Shared {
            hooks: Mutex::new(Vec::new()),
            stop: AtomicBool::new(false),
        });
        let thread_shared = shared.clone();
        let handle = std::thread::Builder::new()
            .name("anchor-resource".to_string())
            .spawn(move || sample_loop(cfg, thread_shared))
            .ok();
        Self {
            shared,
            handle: Mutex::new(handle),
        }
    }

    /// Register a best-effort cache flush, run under memory pressure.
    pub fn register_flush_hook<F: Fn() + Send + Sync + 'static>(&self, hook: F) {
        if let Ok(mut hooks) = self.shared.hooks.lock() {
            hooks.push(Box::new(hook));
        }
    }

    /// Stop the sampler and join its thread.
    pub fn stop(&self) {
        self.shared.stop.store(true, Ordering::Relaxed);
        if let Ok(mut guard) = self.handle.lock() {
            if let Some(handle) = guard.take() {
                let _ = handle.join();
            }
        }
    }

    /// Run all flush hooks immediately (also used by tests).
    pub fn flush_now(&self) {
        if let Ok(hooks) = self.shared.hooks.lock() {
            for hook in hooks.iter() {
                hook();
            }
        }
    }
}

impl Drop for ResourceMonitor {
    fn drop(&mut self) {
        self.shared.stop.store(true, Ordering::Relaxed);
    }
}

fn sample_loop(cfg: ResourceConfig, shared: Arc<Shared>) {
    let interval = Duration::from_millis(cfg.memory_monitor_interval_ms.max(100));
    let cooldown = Duration::from_millis(cfg.gc_cooldown_ms);
    let threshold = (cfg.heap_ceiling_bytes as f64 * cfg.heap_critical_pct) as u64;
    let mut last_flush: Option<Instant> = None;

    'outer: while !shared.stop.load(Ordering::Relaxed) {
        // Sleep in short slices so stop() never waits a full interval.
        let wake = Instant::now() + interval;
        while Instant::now() < wake {
            if shared.stop.load(Ordering::Relaxed) {
                break 'outer;
            }
            std::thread::sleep(Duration::from_millis(50));
        }
        let Some(resident) = resident_bytes() else {
            continue;
        };
        if resident <= threshold {
            continue;
        }
        let cooled = last_flush.map_or(true, |t| t.elapsed() >= cooldown);
        if !cooled {
            continue;
        }
        warn!(
            resident_bytes = resident,
            threshold_bytes = threshold,
            "memory_pressure_flush"
        );
        if let Ok(hooks) = shared.hooks.lock() {
            for hook in hooks.iter() {
                hook();
            }
        }
        last_flush = Some(Instant::now());
    }
    debug!("resource_monitor_stopped");
}

/// Current resident set size, if the platform exposes it.
#[cfg(target_os = "linux")]
fn resident_bytes() -> Option<u64> {
    let statm = std::fs::read_to_string("/proc/self/statm").ok()?;
    let resident_pages: u64 = statm.split_whitespace().nth(1)?.parse().ok()?;
    Some(resident_pages * 4096)
}

#[cfg(not(target_os = "linux"))]
fn resident_bytes() -> Option<u64> {
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn hooks_run_on_flush_now() {
        let monitor = ResourceMonitor::start(ResourceConfig {
            memory_monitor_interval_ms: 60_000,
            ..Default::default()
        });
        let count = Arc::new(AtomicUsize::new(0));
        let seen = count.clone();
        monitor.register_flush_hook(move || {
            seen.fetch_add(1, Ordering::Relaxed);
        });
        monitor.flush_now();
        monitor.flush_now();
        assert_eq!(count.load(Ordering::Relaxed), 2);
        monitor.stop();
    }

    #[test]
    fn stop_is_idempotent() {
        let monitor = ResourceMonitor::start(ResourceConfig {
            memory_monitor_interval_ms: 100,
            ..Default::default()
        });
        monitor.stop();
        monitor.stop();
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn resident_bytes_reads_something() {
        let resident = resident_bytes().expect("statm readable on linux");
        assert!(resident > 0);
    }
}
