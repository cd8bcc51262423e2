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
    sync::{
        atomic::{AtomicU64, Ordering},
        LazyLock,
    },
    time::{Duration, Instant},
};

static EPOCH: LazyLock<Instant> = LazyLock::new(Instant::now);

/// A point on the monotonic timeline of the process.
///
/// Timestamps are durations since a lazily fixed process epoch, so they are `Copy`, totally ordered and cheap to
/// store inside every lazy reference. [`Timestamp::MAX`] is never reached by a real clock and is used to mark
/// references that must never look idle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(Duration);

impl Timestamp {
    /// The process epoch.
    pub const ZERO: Self = Self(Duration::ZERO);
    /// A timestamp later than any timestamp a clock returns.
    pub const MAX: Self = Self(Duration::MAX);

    /// Create a timestamp at `offset` after the process epoch.
    pub const fn from_offset(offset: Duration) -> Self {
        Self(offset)
    }

    /// Offset since the process epoch.
    pub const fn offset(&self) -> Duration {
        self.0
    }

    /// Current timestamp of the process monotonic clock.
    pub fn now() -> Self {
        Self(EPOCH.elapsed())
    }

    /// Add `duration`, saturating at [`Timestamp::MAX`].
    pub fn saturating_add(self, duration: Duration) -> Self {
        Self(self.0.saturating_add(duration))
    }

    /// Time elapsed from `earlier` to `self`, zero if `earlier` is later.
    pub fn saturating_duration_since(self, earlier: Self) -> Duration {
        self.0.saturating_sub(earlier.0)
    }
}

/// Source of [`Timestamp`]s.
///
/// The checker of the reference manager reads "now" through this trait, so tests can drive eviction
/// deterministically. Clocks share the epoch of [`Timestamp::now`], which references use for their accesses.
pub trait Clock: Send + Sync + 'static + Debug {
    /// Current timestamp.
    fn now(&self) -> Timestamp;
}

/// The process monotonic clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct MonotonicClock;

impl Clock for MonotonicClock {
    fn now(&self) -> Timestamp {
        Timestamp::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    nanos: AtomicU64,
}

impl ManualClock {
    /// Create a manual clock at `start`.
    pub fn new(start: Duration) -> Self {
        Self {
            nanos: AtomicU64::new(start.as_nanos() as u64),
        }
    }

    /// Move the clock to `offset`.
    pub fn set(&self, offset: Duration) {
        self.nanos.store(offset.as_nanos() as u64, Ordering::Release);
    }

    /// Move the clock forward by `duration`.
    pub fn advance(&self, duration: Duration) {
        self.nanos.fetch_add(duration.as_nanos() as u64, Ordering::AcqRel);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        Timestamp::from_offset(Duration::from_nanos(self.nanos.load(Ordering::Acquire)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamp_saturation() {
        let t = Timestamp::from_offset(Duration::from_secs(1));
        assert_eq!(t.saturating_add(Duration::MAX), Timestamp::MAX);
        assert_eq!(Timestamp::ZERO.saturating_duration_since(t), Duration::ZERO);
        assert_eq!(Timestamp::MAX.saturating_duration_since(t), Duration::MAX - Duration::from_secs(1));
    }

    #[test]
    fn test_monotonic_clock() {
        let clock = MonotonicClock;
        let a = clock.now();
        let b = clock.now();
        assert!(b >= a);
        assert!(b < Timestamp::MAX);
    }

    #[test]
    fn test_manual_clock() {
        let clock = ManualClock::new(Duration::from_millis(10));
        assert_eq!(clock.now().offset(), Duration::from_millis(10));
        clock.advance(Duration::from_millis(5));
        assert_eq!(clock.now().offset(), Duration::from_millis(15));
        clock.set(Duration::from_secs(1));
        assert_eq!(clock.now().offset(), Duration::from_secs(1));
    }
}
