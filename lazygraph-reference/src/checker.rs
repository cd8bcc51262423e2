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

use std::{fmt::Debug, sync::Arc, time::Duration};

use lazygraph_common::{
    clock::{Clock, MonotonicClock, Timestamp},
    error::{Error, Result},
    memory::{MemoryProbe, MemoryStatistics, SystemMemoryProbe},
};
use serde::{Deserialize, Serialize};

use crate::lazy::{ClearingEvaluator, Reference, ReferenceState};

/// The memory snapshot is refreshed after this many clears within one cycle.
const SNAPSHOT_REFRESH_CLEARS: u64 = 128;

/// Eviction policy consulted once per tracked reference per sweep.
pub trait Checker: Send + 'static {
    /// Prepare a new check cycle.
    fn begin_check_cycle(&mut self) {}

    /// Check `reference` and drop its value if it is eligible. Returns `true` if the value has been dropped.
    fn check(&mut self, reference: &dyn Reference) -> bool;

    /// Finish the current check cycle.
    fn end_check_cycle(&mut self) {}
}

/// Memory threshold beyond which the [`DefaultChecker`] clears references regardless of their idle time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum MemoryQuota {
    /// Memory is not considered.
    Disabled,
    /// Ratio of committed memory, in `[0.0, 1.0]`. `0.0` disables the check.
    Relative(f64),
    /// Used bytes.
    Absolute(u64),
}

impl Default for MemoryQuota {
    fn default() -> Self {
        Self::Relative(1.0)
    }
}

impl MemoryQuota {
    /// Byte limit for `memory`, `None` if memory must not be considered.
    pub fn limit(&self, memory: &MemoryStatistics) -> Option<u64> {
        match *self {
            Self::Disabled => None,
            Self::Relative(ratio) if ratio == 0.0 || !memory.is_available() => None,
            Self::Relative(ratio) => Some((memory.committed as f64 * ratio) as u64),
            Self::Absolute(bytes) => Some(bytes),
        }
    }
}

/// [`DefaultChecker`] config.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CheckerConfig {
    /// Idle time after which a resident value is dropped.
    ///
    /// Must be greater than zero. [`Duration::MAX`] never times out.
    pub timeout: Duration,
    /// Memory threshold forcing values to be dropped before they time out.
    pub memory_quota: MemoryQuota,
}

impl Default for CheckerConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(1_000_000),
            memory_quota: MemoryQuota::default(),
        }
    }
}

impl CheckerConfig {
    /// Validate the config.
    pub fn validate(&self) -> Result<()> {
        if self.timeout.is_zero() {
            return Err(
                Error::config("timeout must be greater than 0").with_context("timeout", format!("{:?}", self.timeout))
            );
        }
        if let MemoryQuota::Relative(ratio) = self.memory_quota {
            if !(0.0..=1.0).contains(&ratio) {
                return Err(Error::config("relative memory quota must be in [0.0, 1.0]").with_context("ratio", ratio));
            }
        }
        Ok(())
    }
}

/// Custom eviction decision consulted before the generic one.
///
/// Receives the reference state, the memory snapshot of the cycle and the configured timeout. Returning `None`
/// defers to the generic decision.
pub trait CustomCheck:
    Fn(&ReferenceState, &MemoryStatistics, Duration) -> Option<bool> + Send + Sync + 'static
{
}

impl<T> CustomCheck for T where
    T: Fn(&ReferenceState, &MemoryStatistics, Duration) -> Option<bool> + Send + Sync + 'static
{
}

/// Observer of finished check cycles.
///
/// Receives the last memory snapshot of the cycle, the number of cleared references and the configured quota.
pub trait CycleEvaluator: Fn(&MemoryStatistics, u64, MemoryQuota) + Send + Sync + 'static {}

impl<T> CycleEvaluator for T where T: Fn(&MemoryStatistics, u64, MemoryQuota) + Send + Sync + 'static {}

#[derive(Debug)]
struct Cycle {
    now: Timestamp,
    memory: MemoryStatistics,
    memory_limit: Option<u64>,
    clears: u64,
}

/// The default eviction policy.
///
/// A stored, resident reference is cleared if it has been idle for at least the configured timeout, or if the
/// memory snapshot of the current cycle exceeds the configured quota. The snapshot is taken once per cycle and
/// refreshed every 128 clears, so clearing under pressure stops soon after the pressure is gone.
pub struct DefaultChecker {
    config: CheckerConfig,
    clock: Arc<dyn Clock>,
    probe: Arc<dyn MemoryProbe>,
    custom_check: Option<Arc<dyn CustomCheck>>,
    cycle_evaluator: Option<Arc<dyn CycleEvaluator>>,

    cycle: Option<Cycle>,
}

impl Debug for DefaultChecker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DefaultChecker")
            .field("config", &self.config)
            .field("clock", &self.clock)
            .field("probe", &self.probe)
            .field("cycle", &self.cycle)
            .finish()
    }
}

impl Default for DefaultChecker {
    fn default() -> Self {
        Self::new(CheckerConfig::default())
    }
}

impl DefaultChecker {
    /// Create a checker with the monotonic clock and the system memory probe.
    pub fn new(config: CheckerConfig) -> Self {
        Self {
            config,
            clock: Arc::new(MonotonicClock),
            probe: Arc::new(SystemMemoryProbe),
            custom_check: None,
            cycle_evaluator: None,
            cycle: None,
        }
    }

    /// Set the clock idle times are measured with.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Set the memory probe snapshots are taken from.
    pub fn with_memory_probe(mut self, probe: Arc<dyn MemoryProbe>) -> Self {
        self.probe = probe;
        self
    }

    /// Set a custom decision consulted before the generic one.
    pub fn with_custom_check(mut self, custom_check: impl CustomCheck) -> Self {
        self.custom_check = Some(Arc::new(custom_check));
        self
    }

    /// Set an observer of finished check cycles.
    pub fn with_cycle_evaluator(mut self, cycle_evaluator: impl CycleEvaluator) -> Self {
        self.cycle_evaluator = Some(Arc::new(cycle_evaluator));
        self
    }

    /// Get the checker config.
    pub fn config(&self) -> &CheckerConfig {
        &self.config
    }

    fn snapshot(&self) -> (MemoryStatistics, Option<u64>) {
        let memory = self.probe.snapshot();
        let limit = self.config.memory_quota.limit(&memory);
        (memory, limit)
    }

    fn cycle(&mut self) -> &mut Cycle {
        if self.cycle.is_none() {
            self.begin_check_cycle();
        }
        self.cycle.get_or_insert_with(|| Cycle {
            now: Timestamp::ZERO,
            memory: MemoryStatistics::default(),
            memory_limit: None,
            clears: 0,
        })
    }

    fn decide(&mut self, state: &ReferenceState) -> bool {
        let timeout = self.config.timeout;
        let custom_check = self.custom_check.clone();
        let cycle = self.cycle();

        if let Some(decision) = custom_check.and_then(|check| check(state, &cycle.memory, timeout)) {
            return decision;
        }

        if state.last_touched.saturating_add(timeout) <= cycle.now {
            tracing::debug!("[checker]: Timeout-clearing {}.", state.object_id);
            return true;
        }

        cycle.memory_limit.is_some_and(|limit| cycle.memory.used > limit)
    }
}

impl ClearingEvaluator for DefaultChecker {
    fn needs_clearing(&mut self, state: &ReferenceState) -> bool {
        if !self.decide(state) {
            return false;
        }

        let cycle = self.cycle();
        cycle.clears += 1;
        if cycle.clears % SNAPSHOT_REFRESH_CLEARS == 0 {
            let (memory, limit) = self.snapshot();
            let cycle = self.cycle();
            cycle.memory = memory;
            cycle.memory_limit = limit;
        }
        true
    }
}

impl Checker for DefaultChecker {
    fn begin_check_cycle(&mut self) {
        let (memory, memory_limit) = self.snapshot();
        let cycle = Cycle {
            now: self.clock.now(),
            memory,
            memory_limit,
            clears: 0,
        };
        tracing::trace!("[checker]: Begin check cycle: {cycle:?}");
        self.cycle = Some(cycle);
    }

    fn check(&mut self, reference: &dyn Reference) -> bool {
        reference.clear_if(self)
    }

    fn end_check_cycle(&mut self) {
        let Some(cycle) = self.cycle.take() else {
            return;
        };
        match &self.cycle_evaluator {
            Some(evaluator) => evaluator(&cycle.memory, cycle.clears, self.config.memory_quota),
            None => tracing::trace!("[checker]: End check cycle, cleared {} references.", cycle.clears),
        }
    }
}

/// Policy clearing every stored, resident reference.
#[derive(Debug, Default)]
pub struct Clearer {
    cleared: u64,
}

impl Clearer {
    /// References cleared so far.
    pub fn cleared(&self) -> u64 {
        self.cleared
    }
}

impl Checker for Clearer {
    fn check(&mut self, reference: &dyn Reference) -> bool {
        let cleared = reference.clear_if(&mut |_: &ReferenceState| true);
        if cleared {
            self.cleared += 1;
        }
        cleared
    }
}
