// Copyright 2026 lazygraph Project Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::{
    fmt::Debug,
    sync::atomic::{AtomicU64, Ordering},
};

use serde::{Deserialize, Serialize};

use crate::error::{Error, ErrorKind, Result};

/// A snapshot of memory consumption, in bytes.
///
/// `committed` is the amount of memory guaranteed to be available to the process. `max` is the upper bound the
/// process may grow to, or `0` if unknown. A snapshot with `committed == 0` carries no information and never
/// indicates pressure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MemoryStatistics {
    /// Bytes in use.
    pub used: u64,
    /// Bytes guaranteed to be available.
    pub committed: u64,
    /// Upper bound, `0` if unknown.
    pub max: u64,
}

impl MemoryStatistics {
    /// Returns `true` if the snapshot carries real numbers.
    pub fn is_available(&self) -> bool {
        self.committed > 0
    }

    /// Bytes committed but not in use.
    pub fn free(&self) -> u64 {
        self.committed.saturating_sub(self.used)
    }
}

/// Source of [`MemoryStatistics`] snapshots.
///
/// Taking a snapshot may be comparably expensive, callers are expected to amortize it over many decisions.
pub trait MemoryProbe: Send + Sync + 'static + Debug {
    /// Take a snapshot of the current memory consumption.
    fn snapshot(&self) -> MemoryStatistics;
}

/// Read the memory statistics of the current process.
///
/// `used` is the resident set size of the process. `committed` and `max` are `used` plus the memory the host can
/// still hand out without swapping (`MemAvailable`), so reclaimable page cache does not count as pressure.
#[cfg(target_os = "linux")]
pub fn system_memory() -> Result<MemoryStatistics> {
    // SAFETY: `sysconf` has no preconditions.
    let page_size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if page_size <= 0 {
        return Err(std::io::Error::last_os_error().into());
    }

    let statm = std::fs::read_to_string("/proc/self/statm")?;
    let used = parse_resident(&statm, page_size as u64)
        .ok_or_else(|| Error::new(ErrorKind::Io, "malformed /proc/self/statm"))?;
    let meminfo = std::fs::read_to_string("/proc/meminfo")?;
    let available =
        parse_available(&meminfo).ok_or_else(|| Error::new(ErrorKind::Io, "MemAvailable missing in /proc/meminfo"))?;

    let committed = used.saturating_add(available);
    Ok(MemoryStatistics {
        used,
        committed,
        max: committed,
    })
}

/// Resident bytes from the content of `/proc/self/statm`.
#[cfg_attr(all(not(target_os = "linux"), not(test)), expect(dead_code))]
fn parse_resident(statm: &str, page_size: u64) -> Option<u64> {
    let pages = statm.split_whitespace().nth(1)?.parse::<u64>().ok()?;
    pages.checked_mul(page_size)
}

/// `MemAvailable` bytes from the content of `/proc/meminfo`.
#[cfg_attr(all(not(target_os = "linux"), not(test)), expect(dead_code))]
fn parse_available(meminfo: &str) -> Option<u64> {
    meminfo.lines().find_map(|line| {
        let kib = line.strip_prefix("MemAvailable:")?.trim().strip_suffix("kB")?.trim();
        kib.parse::<u64>().ok()?.checked_mul(1024)
    })
}

/// Read the memory statistics of the current process.
#[cfg(not(target_os = "linux"))]
pub fn system_memory() -> Result<MemoryStatistics> {
    Err(Error::new(
        ErrorKind::Unsupported,
        "system_memory() is not supported on this platform",
    ))
}

/// Probe reading the memory statistics of the current process, see [`system_memory`].
///
/// Falls back to an unavailable snapshot if the platform cannot report memory, which disables pressure based
/// decisions instead of failing them.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemMemoryProbe;

impl MemoryProbe for SystemMemoryProbe {
    fn snapshot(&self) -> MemoryStatistics {
        match system_memory() {
            Ok(statistics) => statistics,
            Err(e) => {
                if e.kind() != ErrorKind::Unsupported {
                    tracing::warn!("[memory]: failed to read memory statistics: {e}");
                }
                MemoryStatistics::default()
            }
        }
    }
}

/// Probe reporting whatever it was told to.
#[derive(Debug, Default)]
pub struct FixedMemoryProbe {
    used: AtomicU64,
    committed: AtomicU64,
    max: AtomicU64,
}

impl FixedMemoryProbe {
    /// Create a probe reporting `statistics`.
    pub fn new(statistics: MemoryStatistics) -> Self {
        let probe = Self::default();
        probe.set(statistics);
        probe
    }

    /// Change the reported statistics.
    pub fn set(&self, statistics: MemoryStatistics) {
        self.used.store(statistics.used, Ordering::Relaxed);
        self.committed.store(statistics.committed, Ordering::Relaxed);
        self.max.store(statistics.max, Ordering::Relaxed);
    }

    /// Change the reported used bytes only.
    pub fn set_used(&self, used: u64) {
        self.used.store(used, Ordering::Relaxed);
    }
}

impl MemoryProbe for FixedMemoryProbe {
    fn snapshot(&self) -> MemoryStatistics {
        MemoryStatistics {
            used: self.used.load(Ordering::Relaxed),
            committed: self.committed.load(Ordering::Relaxed),
            max: self.max.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_probe() {
        let probe = FixedMemoryProbe::new(MemoryStatistics {
            used: 10,
            committed: 100,
            max: 200,
        });
        assert_eq!(probe.snapshot().free(), 90);

        probe.set_used(150);
        let snapshot = probe.snapshot();
        assert_eq!(snapshot.used, 150);
        assert_eq!(snapshot.free(), 0);
        assert!(snapshot.is_available());
    }

    #[test]
    fn test_unavailable_statistics() {
        assert!(!MemoryStatistics::default().is_available());
    }

    #[test]
    fn test_parse_proc_files() {
        assert_eq!(parse_resident("1024 300 120 10 0 200 0\n", 4096), Some(300 * 4096));
        assert_eq!(parse_resident("1024", 4096), None);

        let meminfo = "MemTotal:       16000000 kB\n\
                       MemFree:          200000 kB\n\
                       MemAvailable:    9000000 kB\n\
                       Cached:          8000000 kB\n";
        assert_eq!(parse_available(meminfo), Some(9_000_000 * 1024));
        assert_eq!(parse_available("MemTotal: 16000000 kB\n"), None);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_system_memory_measures_the_process() {
        const SIZE: usize = 64 << 20;

        let before = system_memory().unwrap();
        assert!(before.is_available());
        assert!(before.used > 0);
        assert!(before.used <= before.committed);

        // Touched pages count as used, whatever the host caches.
        let buffer = std::hint::black_box(vec![1u8; SIZE]);
        let after = system_memory().unwrap();
        assert!(after.used >= before.used + (SIZE as u64) / 2, "{before:?} -> {after:?}");
        drop(buffer);
    }
}
