//! Optional periodic CPU/RSS sampler, enabled by `JRS_SYSTEM_METRICS`.

use std::time::Duration;
use tokio::time::interval;
use tracing::debug;

use crate::metrics::MetricsRegistry;

/// Spawn a background task sampling process memory and CPU usage into the
/// registry every `period`. The returned handle may be aborted on shutdown;
/// dropping it without aborting simply leaves the task running until the
/// process exits, which is fine for a process-lifetime sampler.
#[cfg(feature = "sysinfo")]
pub fn start(registry: &'static MetricsRegistry, period: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut system = sysinfo::System::new();
        let pid = sysinfo::Pid::from_u32(std::process::id());
        let mut ticker = interval(period);
        debug!(?period, "system metrics sampler started");

        loop {
            ticker.tick().await;
            system.refresh_processes(sysinfo::ProcessesToUpdate::Some(&[pid]), true);
            if let Some(process) = system.process(pid) {
                registry.memory_usage_bytes.set(process.memory() as f64);
                registry.cpu_usage_percent.set(process.cpu_usage() as f64);
            }
        }
    })
}

/// No-op sampler when the `sysinfo` feature is disabled.
#[cfg(not(feature = "sysinfo"))]
pub fn start(_registry: &'static MetricsRegistry, _period: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async {})
}
