//! Host resource measurement.
//!
//! All memory figures are KiB, the unit `/proc/meminfo` already reports in.

use hearth_model::{AgentResourceUsage, AgentResources};

/// Raw host measurements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SystemResources {
    pub cpus: u32,
    pub total_memory_kib: u64,
    pub available_memory_kib: u64,
}

impl SystemResources {
    /// What the agent reports: memory minus the OS reservation, clamped at zero.
    pub fn report(
        &self,
        os_memory_reservation_kib: u64,
        ip_addresses: u32,
    ) -> (AgentResources, AgentResourceUsage) {
        let resources = AgentResources {
            cpus: self.cpus,
            memory_kib: self.total_memory_kib.saturating_sub(os_memory_reservation_kib),
            ip_addresses,
        };
        let usage = AgentResourceUsage {
            memory_kib: self
                .total_memory_kib
                .saturating_sub(self.available_memory_kib)
                .saturating_sub(os_memory_reservation_kib),
        };
        (resources, usage)
    }
}

/// Source of host measurements.
pub trait ResourceProbe: Send + Sync {
    fn measure(&self) -> SystemResources;
}

/// Reads the running host.
#[derive(Debug, Clone, Copy, Default)]
pub struct HostProbe;

impl ResourceProbe for HostProbe {
    fn measure(&self) -> SystemResources {
        let (total_memory_kib, available_memory_kib) = get_memory_info();
        SystemResources {
            cpus: get_cpu_count(),
            total_memory_kib,
            available_memory_kib,
        }
    }
}

/// A fixed snapshot, for tests and simulated hosts.
impl ResourceProbe for SystemResources {
    fn measure(&self) -> SystemResources {
        *self
    }
}

fn get_cpu_count() -> u32 {
    std::thread::available_parallelism()
        .map(|p| p.get() as u32)
        .unwrap_or(1)
}

#[cfg(target_os = "linux")]
fn get_memory_info() -> (u64, u64) {
    std::fs::read_to_string("/proc/meminfo")
        .map(|content| parse_meminfo(&content))
        .unwrap_or((0, 0))
}

#[cfg(not(target_os = "linux"))]
fn get_memory_info() -> (u64, u64) {
    (0, 0)
}

/// `(MemTotal, MemAvailable)` in KiB.
///
/// Kernels without `MemAvailable` fall back to free + buffers + cached.
fn parse_meminfo(content: &str) -> (u64, u64) {
    let mut total = 0;
    let mut available = None;
    let mut free = 0;
    let mut buffers = 0;
    let mut cached = 0;

    for line in content.lines() {
        let mut parts = line.split_whitespace();
        let (Some(key), Some(value)) = (parts.next(), parts.next()) else {
            continue;
        };
        let value: u64 = value.parse().unwrap_or(0);
        match key {
            "MemTotal:" => total = value,
            "MemAvailable:" => available = Some(value),
            "MemFree:" => free = value,
            "Buffers:" => buffers = value,
            "Cached:" => cached = value,
            _ => {}
        }
    }

    let available = available.unwrap_or(free + buffers + cached).min(total);
    (total, available)
}
