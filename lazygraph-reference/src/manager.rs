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
    borrow::Cow,
    fmt::Debug,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Weak,
    },
    thread::JoinHandle,
    time::{Duration, Instant},
};

use flume::{RecvTimeoutError, TrySendError};
use itertools::Itertools;
use lazygraph_common::{
    clock::{Clock, MonotonicClock},
    error::{Error, ErrorKind, Result},
    memory::{MemoryProbe, SystemMemoryProbe},
    metrics::{model::Metrics, registry::noop::NoopMetricsRegistry, RegistryOps},
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::{
    checker::{Checker, CheckerConfig, Clearer, DefaultChecker},
    controller::Controller,
    lazy::{Lazy, Reference},
};

/// Tracked references are fetched in batches of this size, to keep the tracking lock short.
const BATCH: usize = 128;

/// [`ReferenceManager`] config.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReferenceManagerConfig {
    /// Pause between two scheduled sweeps.
    pub interval: Duration,
    /// Time budget of one scheduled sweep.
    ///
    /// A sweep checks at least one reference, and stops checking once the budget is exhausted. The next sweep
    /// resumes where the previous one stopped.
    pub time_budget: Duration,
    /// Config of the default checker.
    pub checker: CheckerConfig,
}

impl Default for ReferenceManagerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(1000),
            time_budget: Duration::from_millis(1),
            checker: CheckerConfig::default(),
        }
    }
}

impl ReferenceManagerConfig {
    /// Validate the config.
    pub fn validate(&self) -> Result<()> {
        if self.interval.is_zero() {
            return Err(Error::config("sweep interval must be greater than 0"));
        }
        self.checker.validate()
    }
}

/// Outcome of one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Tracked entries visited.
    pub visited: usize,
    /// References whose value has been dropped.
    pub cleared: usize,
    /// Entries whose reference no longer exists.
    pub released: usize,
    /// Whether the sweep visited every entry.
    pub lapped: bool,
}

enum Command {
    CleanUp,
    Stop,
}

struct Worker {
    tx: flume::Sender<Command>,
    stop: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

#[derive(Default)]
struct Control {
    running: bool,
    controllers: Vec<Weak<dyn Controller>>,
    /// Controllers added and not explicitly removed, including dropped ones.
    controller_count: usize,
    worker: Option<Worker>,
}

struct Sweep {
    cursor: usize,
    checker: Box<dyn Checker>,
}

struct Inner {
    name: Cow<'static, str>,
    interval: Duration,
    time_budget: Duration,

    entries: Mutex<Vec<Weak<dyn Reference>>>,
    sweep: Mutex<Sweep>,
    control: Mutex<Control>,

    metrics: Metrics,
}

impl Inner {
    /// Check tracked references, starting at `cursor`, until every entry has been visited, the budget is exhausted
    /// or `abort` is set. Advances `cursor` past the visited entries.
    ///
    /// Entries are only appended outside of sweeps and only removed by sweeps, which are serialized by the sweep
    /// lock held by the caller, so indices below the length observed at the start stay valid.
    fn sweep(
        &self,
        cursor: &mut usize,
        checker: &mut dyn Checker,
        time_budget: Option<Duration>,
        abort: Option<&AtomicBool>,
    ) -> SweepReport {
        let start = Instant::now();
        // An unrepresentable deadline is no deadline.
        let deadline = time_budget.and_then(|budget| start.checked_add(budget));
        let interrupted = || {
            deadline.is_some_and(|deadline| Instant::now() >= deadline)
                || abort.is_some_and(|abort| abort.load(Ordering::Acquire))
        };

        let mut report = SweepReport::default();
        checker.begin_check_cycle();

        let len = self.entries.lock().len();
        if *cursor >= len {
            *cursor = 0;
        }

        let mut batch = Vec::with_capacity(BATCH.min(len));
        'sweep: while report.visited < len {
            {
                let entries = self.entries.lock();
                let count = BATCH.min(len - report.visited);
                batch.extend((0..count).filter_map(|k| entries.get((*cursor + report.visited + k) % len).cloned()));
            }
            for entry in batch.drain(..) {
                report.visited += 1;
                match entry.upgrade() {
                    Some(reference) => {
                        self.metrics.reference_check.increase(1);
                        if checker.check(reference.as_ref()) {
                            report.cleared += 1;
                        }
                    }
                    None => report.released += 1,
                }
                if interrupted() {
                    break 'sweep;
                }
            }
        }

        report.lapped = report.visited == len;
        *cursor = match len {
            0 => 0,
            len => (*cursor + report.visited) % len,
        };
        if report.released > 0 && (report.lapped || report.released * 4 >= len) {
            self.compact(cursor);
        }

        checker.end_check_cycle();

        self.metrics.reference_sweep.increase(1);
        self.metrics.reference_clear.increase(report.cleared as u64);
        self.metrics
            .reference_sweep_duration
            .record(start.elapsed().as_secs_f64());
        tracing::trace!("[reference manager]: {} swept: {report:?}", self.name);

        report
    }

    /// Drop entries of released references, keeping `cursor` on the same live entry.
    fn compact(&self, cursor: &mut usize) {
        let mut entries = self.entries.lock();
        let limit = *cursor;
        let mut index = 0;
        let mut before_cursor = 0;
        entries.retain(|entry| {
            let live = entry.strong_count() > 0;
            if live && index < limit {
                before_cursor += 1;
            }
            index += 1;
            live
        });
        *cursor = before_cursor;
        self.metrics.reference_tracked.absolute(entries.len() as u64);
    }
}

/// Tracks lazy references and drops the values of idle ones.
///
/// A manager owns at most one sweeping thread. The thread wakes up every configured interval and runs one sweep
/// with the configured checker and time budget. Sweeps can also be run synchronously on any thread, e.g. with
/// [`ReferenceManager::clean_up`].
///
/// References are tracked weakly. A reference dropped by the application is released from tracking during the
/// following sweeps. Registering the same reference twice tracks it twice.
///
/// The manager is cheap to clone, clones share the same state.
#[derive(Clone)]
pub struct ReferenceManager {
    inner: Arc<Inner>,
}

impl Debug for ReferenceManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let running = self.inner.control.lock().running;
        f.debug_struct("ReferenceManager")
            .field("name", &self.inner.name)
            .field("interval", &self.inner.interval)
            .field("time_budget", &self.inner.time_budget)
            .field("tracked", &self.tracked())
            .field("running", &running)
            .finish()
    }
}

impl Default for ReferenceManager {
    fn default() -> Self {
        ReferenceManagerBuilder::new().assemble()
    }
}

impl ReferenceManager {
    /// Create a builder with the default config.
    pub fn builder() -> ReferenceManagerBuilder {
        ReferenceManagerBuilder::new()
    }

    /// Name of the manager, used as metrics label.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Returns `true` if both share the same state.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Number of tracked entries, including entries of released references not yet swept.
    pub fn tracked(&self) -> usize {
        self.inner.entries.lock().len()
    }

    /// Track `lazy`.
    pub fn register<T>(&self, lazy: &Lazy<T>)
    where
        T: Send + Sync + 'static,
    {
        self.track([lazy.downgrade()]);
    }

    fn track(&self, references: impl IntoIterator<Item = Weak<dyn Reference>>) {
        let mut entries = self.inner.entries.lock();
        let before = entries.len();
        entries.extend(references);
        let (added, len) = (entries.len() - before, entries.len());
        drop(entries);

        self.inner.metrics.reference_register.increase(added as u64);
        self.inner.metrics.reference_tracked.absolute(len as u64);
    }

    /// Track every live reference and add every live controller of `other`.
    ///
    /// Used to migrate from one manager to another. A manager cannot absorb itself.
    pub fn register_all(&self, other: &ReferenceManager) -> Result<()> {
        if self.ptr_eq(other) {
            return Err(Error::new(ErrorKind::Unsupported, "a reference manager cannot register itself")
                .with_context("name", self.name()));
        }

        let references = other
            .inner
            .entries
            .lock()
            .iter()
            .filter(|entry| entry.strong_count() > 0)
            .cloned()
            .collect_vec();
        self.track(references);

        for controller in other.live_controllers() {
            self.attach(Arc::downgrade(&controller));
        }
        Ok(())
    }

    /// Visit every tracked live reference once.
    ///
    /// References registered during the iteration may or may not be visited.
    pub fn iterate(&self, mut visitor: impl FnMut(&dyn Reference)) {
        let entries = self.inner.entries.lock().clone();
        for reference in entries.iter().filter_map(Weak::upgrade) {
            visitor(reference.as_ref());
        }
    }

    /// Visit every live controller once.
    pub fn iterate_controllers(&self, mut visitor: impl FnMut(&dyn Controller)) {
        for controller in self.live_controllers() {
            visitor(controller.as_ref());
        }
    }

    /// Run one sweep with the configured checker, bounded by `time_budget`.
    pub fn clean_up(&self, time_budget: Duration) -> SweepReport {
        let mut sweep = self.inner.sweep.lock();
        let Sweep { cursor, checker } = &mut *sweep;
        self.inner.sweep(cursor, checker.as_mut(), Some(time_budget), None)
    }

    /// Run one sweep with `checker`, bounded by `time_budget`.
    pub fn clean_up_with(&self, time_budget: Duration, checker: &mut dyn Checker) -> SweepReport {
        let mut sweep = self.inner.sweep.lock();
        self.inner.sweep(&mut sweep.cursor, checker, Some(time_budget), None)
    }

    /// Run one sweep over every tracked reference with the configured checker.
    pub fn clean_up_all(&self) -> SweepReport {
        let mut sweep = self.inner.sweep.lock();
        let Sweep { cursor, checker } = &mut *sweep;
        self.inner.sweep(cursor, checker.as_mut(), None, None)
    }

    /// Drop the value of every tracked, stored reference right away.
    pub fn clear(&self) -> SweepReport {
        let mut clearer = Clearer::default();
        let mut sweep = self.inner.sweep.lock();
        let report = self.inner.sweep(&mut sweep.cursor, &mut clearer, None, None);
        tracing::debug!("[reference manager]: {} cleared {} references.", self.name(), clearer.cleared());
        report
    }

    fn scheduled_clean_up(&self, stop: &AtomicBool) -> SweepReport {
        let mut sweep = self.inner.sweep.lock();
        let Sweep { cursor, checker } = &mut *sweep;
        self.inner
            .sweep(cursor, checker.as_mut(), Some(self.inner.time_budget), Some(stop))
    }

    fn live_controllers(&self) -> Vec<Arc<dyn Controller>> {
        self.inner
            .control
            .lock()
            .controllers
            .iter()
            .filter_map(Weak::upgrade)
            .collect_vec()
    }

    /// Whether the controllers allow the manager to run.
    pub fn may_run(&self) -> bool {
        let (controllers, controller_count) = {
            let mut control = self.inner.control.lock();
            control.controllers.retain(|controller| controller.strong_count() > 0);
            let controllers = control.controllers.iter().filter_map(Weak::upgrade).collect_vec();
            (controllers, control.controller_count)
        };
        match controllers.is_empty() {
            // Self controlled until a controller is added, dead once all controllers have been dropped.
            true => controller_count == 0,
            false => controllers.iter().any(|controller| controller.may_run(self)),
        }
    }

    /// Whether the sweeping thread is running and still allowed to.
    pub fn is_running(&self) -> bool {
        let running = self.inner.control.lock().running;
        running && self.may_run()
    }

    /// Start the sweeping thread and notify the controllers.
    ///
    /// No-op if the thread is already running or the controllers do not allow running.
    pub fn start(&self) -> Result<()> {
        if !self.may_run() {
            tracing::debug!("[reference manager]: {} is not allowed to run.", self.name());
            return Ok(());
        }

        {
            let mut control = self.inner.control.lock();
            if control.running {
                return Ok(());
            }

            // Pending triggers are merged into one.
            let (tx, rx) = flume::bounded(1);
            let stop = Arc::new(AtomicBool::new(false));
            let inner = Arc::downgrade(&self.inner);
            let interval = self.inner.interval;
            let handle = std::thread::Builder::new()
                .name("lazygraph-reference-manager".to_string())
                .spawn({
                    let stop = stop.clone();
                    move || run(inner, rx, stop, interval)
                })?;

            control.worker = Some(Worker { tx, stop, handle });
            control.running = true;
        }

        tracing::info!("[reference manager]: Start sweeping thread of {}.", self.name());
        for controller in self.live_controllers() {
            controller.on_start(self);
        }
        Ok(())
    }

    /// Stop the sweeping thread and notify the controllers.
    ///
    /// A sleeping thread wakes up immediately. A sweeping thread finishes the reference in flight and abandons the
    /// rest of the sweep. Returns after the thread has terminated, unless called from the thread itself.
    pub fn stop(&self) {
        let worker = {
            let mut control = self.inner.control.lock();
            control.running = false;
            control.worker.take()
        };
        let Some(worker) = worker else {
            return;
        };

        worker.stop.store(true, Ordering::Release);
        // A full channel wakes the thread as well, and the thread checks the stop flag after every wake up.
        let _ = worker.tx.try_send(Command::Stop);
        if worker.handle.thread().id() != std::thread::current().id() && worker.handle.join().is_err() {
            tracing::warn!("[reference manager]: Sweeping thread of {} panicked.", self.name());
        }

        tracing::info!("[reference manager]: Stop sweeping thread of {}.", self.name());
        for controller in self.live_controllers() {
            controller.on_stop(self);
        }
    }

    /// Ask the sweeping thread to sweep right away. Returns `false` if there is no sweeping thread.
    ///
    /// Triggers arriving while an earlier one is still pending are merged into it.
    pub fn trigger_clean_up(&self) -> bool {
        let control = self.inner.control.lock();
        let Some(worker) = control.worker.as_ref() else {
            return false;
        };
        self.inner.metrics.reference_trigger.increase(1);
        match worker.tx.try_send(Command::CleanUp) {
            Ok(()) | Err(TrySendError::Full(_)) => true,
            Err(e @ TrySendError::Disconnected(_)) => {
                tracing::warn!("[reference manager]: Failed to trigger clean up of {}: {e}", self.name());
                false
            }
        }
    }

    /// Add `controller`. Returns `false` if it has already been added.
    pub fn add_controller<C>(&self, controller: &Arc<C>) -> bool
    where
        C: Controller,
    {
        self.attach(Arc::downgrade(controller) as Weak<dyn Controller>)
    }

    fn attach(&self, controller: Weak<dyn Controller>) -> bool {
        let mut control = self.inner.control.lock();
        control.controllers.retain(|c| c.strong_count() > 0);
        if control
            .controllers
            .iter()
            .any(|c| std::ptr::addr_eq(c.as_ptr(), controller.as_ptr()))
        {
            return false;
        }
        control.controllers.push(controller);
        control.controller_count += 1;
        true
    }

    /// Remove `controller`. Stops the manager if it was the last one.
    ///
    /// Returns `false` if `controller` has not been added.
    pub fn remove_controller<C>(&self, controller: &Arc<C>) -> bool
    where
        C: Controller,
    {
        let target = Arc::as_ptr(controller);
        let last = {
            let mut control = self.inner.control.lock();
            let Some(index) = control
                .controllers
                .iter()
                .position(|c| std::ptr::addr_eq(c.as_ptr(), target))
            else {
                return false;
            };
            control.controllers.remove(index);
            control.controller_count -= 1;
            control.controller_count == 0
        };
        if last {
            tracing::debug!("[reference manager]: Last controller of {} removed.", self.name());
            self.stop();
        }
        true
    }
}

fn run(inner: Weak<Inner>, rx: flume::Receiver<Command>, stop: Arc<AtomicBool>, interval: Duration) {
    tracing::debug!("[reference manager]: Sweeping thread started.");
    loop {
        match rx.recv_timeout(interval) {
            Ok(Command::Stop) | Err(RecvTimeoutError::Disconnected) => break,
            Ok(Command::CleanUp) | Err(RecvTimeoutError::Timeout) => {}
        }
        if stop.load(Ordering::Acquire) {
            break;
        }

        let Some(inner) = inner.upgrade() else {
            break;
        };
        let manager = ReferenceManager { inner };
        if !manager.may_run() {
            tracing::debug!("[reference manager]: {} is no longer allowed to run.", manager.name());
            manager.stop();
            break;
        }
        manager.scheduled_clean_up(&stop);
    }
    tracing::debug!("[reference manager]: Sweeping thread exits.");
}

/// Builder of [`ReferenceManager`].
pub struct ReferenceManagerBuilder {
    name: Cow<'static, str>,
    config: ReferenceManagerConfig,
    checker: Option<Box<dyn Checker>>,
    clock: Arc<dyn Clock>,
    probe: Arc<dyn MemoryProbe>,
    registry: Box<dyn RegistryOps>,
}

impl Default for ReferenceManagerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ReferenceManagerBuilder {
    /// Create a builder with the default config.
    pub fn new() -> Self {
        Self {
            name: "lazygraph".into(),
            config: ReferenceManagerConfig::default(),
            checker: None,
            clock: Arc::new(MonotonicClock),
            probe: Arc::new(SystemMemoryProbe),
            registry: Box::new(NoopMetricsRegistry),
        }
    }

    /// Set the name of the manager, used as metrics label.
    ///
    /// Default: `lazygraph`.
    pub fn with_name(mut self, name: impl Into<Cow<'static, str>>) -> Self {
        self.name = name.into();
        self
    }

    /// Replace the whole config.
    pub fn with_config(mut self, config: ReferenceManagerConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the pause between two scheduled sweeps.
    ///
    /// Default: 1s.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.config.interval = interval;
        self
    }

    /// Set the time budget of one scheduled sweep.
    ///
    /// Default: 1ms.
    pub fn with_time_budget(mut self, time_budget: Duration) -> Self {
        self.config.time_budget = time_budget;
        self
    }

    /// Set the config of the default checker.
    pub fn with_checker_config(mut self, checker: CheckerConfig) -> Self {
        self.config.checker = checker;
        self
    }

    /// Use `checker` instead of the default checker.
    ///
    /// The checker config, the clock and the memory probe of the builder are ignored then.
    pub fn with_checker(mut self, checker: impl Checker) -> Self {
        self.checker = Some(Box::new(checker));
        self
    }

    /// Set the clock of the default checker.
    ///
    /// Only the checker's notion of "now" follows `clock`. References stamp their accesses with
    /// [`Timestamp::now`](lazygraph_common::clock::Timestamp::now), so a manual clock should start from a
    /// timestamp taken that way, e.g. [`Lazy::last_touched`].
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Set the memory probe of the default checker.
    pub fn with_memory_probe(mut self, probe: Arc<dyn MemoryProbe>) -> Self {
        self.probe = probe;
        self
    }

    /// Set the registry metrics are registered to.
    ///
    /// Default: [`NoopMetricsRegistry`].
    pub fn with_metrics_registry(mut self, registry: impl RegistryOps) -> Self {
        self.registry = Box::new(registry);
        self
    }

    /// Validate the config and build the manager. The sweeping thread is not started.
    pub fn build(self) -> Result<ReferenceManager> {
        self.config.validate()?;
        Ok(self.assemble())
    }

    fn assemble(self) -> ReferenceManager {
        let checker = match self.checker {
            Some(checker) => checker,
            None => Box::new(
                DefaultChecker::new(self.config.checker)
                    .with_clock(self.clock)
                    .with_memory_probe(self.probe),
            ),
        };
        let metrics = Metrics::new(self.name.clone(), self.registry.as_ref());

        ReferenceManager {
            inner: Arc::new(Inner {
                name: self.name,
                interval: self.config.interval,
                time_budget: self.config.time_budget,
                entries: Mutex::new(Vec::new()),
                sweep: Mutex::new(Sweep { cursor: 0, checker }),
                control: Mutex::new(Control::default()),
                metrics,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::atomic::AtomicUsize,
        thread,
    };

    use lazygraph_common::code::ObjectId;

    use super::*;
    use crate::{checker::MemoryQuota, test_utils::CountingLoader};

    fn is_send_sync_static<T: Send + Sync + 'static>() {}

    #[test]
    fn test_send_sync_static() {
        is_send_sync_static::<ReferenceManager>();
    }

    fn loaded(loader: &Arc<CountingLoader<u64>>, id: u64) -> Lazy<u64> {
        loader.insert(ObjectId::new(id), id);
        let lazy = Lazy::stub_shared(ObjectId::new(id), loader.clone());
        lazy.get().unwrap();
        lazy
    }

    fn eager_config() -> CheckerConfig {
        CheckerConfig {
            timeout: Duration::from_millis(1),
            memory_quota: MemoryQuota::Disabled,
        }
    }

    fn wait_until(mut f: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if f() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        false
    }

    /// Records visited object ids without clearing anything.
    #[derive(Debug, Default)]
    struct Recorder {
        visited: Arc<Mutex<Vec<ObjectId>>>,
    }

    impl Checker for Recorder {
        fn check(&mut self, reference: &dyn Reference) -> bool {
            self.visited.lock().push(reference.object_id());
            false
        }
    }

    #[derive(Debug, Default)]
    struct Gate {
        open: AtomicBool,
        started: AtomicUsize,
        stopped: AtomicUsize,
    }

    impl Gate {
        fn opened() -> Arc<Self> {
            let gate = Arc::new(Self::default());
            gate.open.store(true, Ordering::Relaxed);
            gate
        }
    }

    impl Controller for Gate {
        fn may_run(&self, _: &ReferenceManager) -> bool {
            self.open.load(Ordering::Relaxed)
        }

        fn on_start(&self, _: &ReferenceManager) {
            self.started.fetch_add(1, Ordering::Relaxed);
        }

        fn on_stop(&self, _: &ReferenceManager) {
            self.stopped.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[test]
    fn test_config_validation() {
        let err = ReferenceManager::builder()
            .with_interval(Duration::ZERO)
            .build()
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);

        let config = ReferenceManagerConfig::default();
        assert_eq!(config.interval, Duration::from_secs(1));
        assert_eq!(config.time_budget, Duration::from_millis(1));
        let json = serde_json::to_string(&config).unwrap();
        assert_eq!(serde_json::from_str::<ReferenceManagerConfig>(&json).unwrap(), config);
    }

    #[test_log::test]
    fn test_clean_up_clears_idle_references() {
        let loader = Arc::new(CountingLoader::new());
        let manager = ReferenceManager::builder()
            .with_checker_config(eager_config())
            .build()
            .unwrap();

        let lazy = loaded(&loader, 1);
        manager.register(&lazy);
        thread::sleep(Duration::from_millis(5));

        let report = manager.clean_up(Duration::from_secs(1));
        assert_eq!(report.cleared, 1);
        assert!(report.lapped);
        assert!(lazy.peek().is_none());
        assert_eq!(lazy.object_id(), ObjectId::new(1));
    }

    #[test]
    fn test_sweep_resumes_at_cursor() {
        let loader = Arc::new(CountingLoader::new());
        let manager = ReferenceManager::default();
        let references = (1..=3).map(|id| loaded(&loader, id)).collect_vec();
        references.iter().for_each(|lazy| manager.register(lazy));

        let mut recorder = Recorder::default();
        for _ in 0..4 {
            let report = manager.clean_up_with(Duration::ZERO, &mut recorder);
            assert_eq!(report.visited, 1);
        }

        let visited = recorder.visited.lock().iter().map(ObjectId::raw).collect_vec();
        assert_eq!(visited, vec![1, 2, 3, 1]);
    }

    #[test]
    fn test_released_references_are_compacted() {
        let loader = Arc::new(CountingLoader::new());
        let manager = ReferenceManager::default();
        let mut references = (1..=4).map(|id| loaded(&loader, id)).collect_vec();
        references.iter().for_each(|lazy| manager.register(lazy));
        assert_eq!(manager.tracked(), 4);

        references.remove(1);
        let report = manager.clean_up_with(Duration::MAX, &mut Recorder::default());
        assert_eq!(report.visited, 4);
        assert_eq!(report.released, 1);
        assert_eq!(manager.tracked(), 3);

        let mut visited = 0;
        manager.iterate(|_| visited += 1);
        assert_eq!(visited, 3);
    }

    #[test]
    fn test_compaction_keeps_cursor() {
        let loader = Arc::new(CountingLoader::new());
        let manager = ReferenceManager::default();
        let mut references = (1..=4).map(|id| loaded(&loader, id)).collect_vec();
        references.iter().for_each(|lazy| manager.register(lazy));

        let mut recorder = Recorder::default();
        // Visit 1 and 2, then release 1 and 2.
        manager.clean_up_with(Duration::ZERO, &mut recorder);
        manager.clean_up_with(Duration::ZERO, &mut recorder);
        references.drain(0..2);

        // Visits 3, 4, then the released entries, and compacts.
        let report = manager.clean_up_with(Duration::MAX, &mut recorder);
        assert_eq!(report.released, 2);
        assert_eq!(manager.tracked(), 2);

        manager.clean_up_with(Duration::ZERO, &mut recorder);
        let visited = recorder.visited.lock().iter().map(ObjectId::raw).collect_vec();
        assert_eq!(visited, vec![1, 2, 3, 4, 3]);
    }

    #[test]
    fn test_clear_drops_every_stored_value() {
        let loader = Arc::new(CountingLoader::new());
        let manager = ReferenceManager::default();
        let stored = (1..=3).map(|id| loaded(&loader, id)).collect_vec();
        let unstored = Lazy::reference(42u64);
        stored.iter().for_each(|lazy| manager.register(lazy));
        manager.register(&unstored);

        let report = manager.clear();
        assert_eq!(report.cleared, 3);
        assert!(stored.iter().all(|lazy| !lazy.is_loaded()));
        assert_eq!(unstored.peek().as_deref(), Some(&42));
    }

    #[test_log::test]
    fn test_sweeping_thread() {
        let loader = Arc::new(CountingLoader::new());
        let manager = ReferenceManager::builder()
            .with_interval(Duration::from_millis(10))
            .with_checker_config(eager_config())
            .build()
            .unwrap();
        let lazy = loaded(&loader, 1);
        manager.register(&lazy);

        manager.start().unwrap();
        manager.start().unwrap();
        assert!(manager.is_running());

        assert!(wait_until(|| !lazy.is_loaded()));

        manager.stop();
        assert!(!manager.is_running());
        assert!(!manager.trigger_clean_up());
    }

    #[test]
    fn test_stop_wakes_sleeping_thread() {
        let manager = ReferenceManager::builder()
            .with_interval(Duration::from_secs(3600))
            .build()
            .unwrap();
        manager.start().unwrap();

        let now = Instant::now();
        manager.stop();
        assert!(now.elapsed() < Duration::from_secs(60));
        assert!(manager.inner.control.lock().worker.is_none());

        // Restartable after stop.
        manager.start().unwrap();
        assert!(manager.is_running());
        manager.stop();
    }

    #[test]
    fn test_trigger_clean_up() {
        let loader = Arc::new(CountingLoader::new());
        let manager = ReferenceManager::builder()
            .with_interval(Duration::from_secs(3600))
            .with_checker_config(eager_config())
            .build()
            .unwrap();
        let lazy = loaded(&loader, 1);
        manager.register(&lazy);

        manager.start().unwrap();
        thread::sleep(Duration::from_millis(5));
        assert!(manager.trigger_clean_up());
        assert!(wait_until(|| !lazy.is_loaded()));
        manager.stop();
    }

    /// Sleeps on every check, counting checks and cycles.
    #[derive(Debug, Default)]
    struct Slow {
        delay: Duration,
        cycles: Arc<AtomicUsize>,
        checks: Arc<AtomicUsize>,
    }

    impl Checker for Slow {
        fn begin_check_cycle(&mut self) {
            self.cycles.fetch_add(1, Ordering::Relaxed);
        }

        fn check(&mut self, _: &dyn Reference) -> bool {
            self.checks.fetch_add(1, Ordering::Relaxed);
            thread::sleep(self.delay);
            false
        }
    }

    #[test]
    fn test_pending_triggers_are_merged() {
        let loader = Arc::new(CountingLoader::new());
        let checker = Slow {
            delay: Duration::from_millis(50),
            ..Default::default()
        };
        let cycles = checker.cycles.clone();
        let manager = ReferenceManager::builder()
            .with_interval(Duration::from_secs(3600))
            .with_time_budget(Duration::from_secs(60))
            .with_checker(checker)
            .build()
            .unwrap();
        let lazy = loaded(&loader, 1);
        manager.register(&lazy);
        manager.start().unwrap();

        for _ in 0..10 {
            assert!(manager.trigger_clean_up());
        }
        assert!(wait_until(|| cycles.load(Ordering::Relaxed) > 0));
        thread::sleep(Duration::from_millis(300));
        let swept = cycles.load(Ordering::Relaxed);
        assert!((1..=2).contains(&swept), "swept {swept} times");

        manager.stop();
    }

    #[test_log::test]
    fn test_stop_abandons_running_sweep() {
        const COUNT: u64 = 100;

        let loader = Arc::new(CountingLoader::new());
        let checker = Slow {
            delay: Duration::from_millis(10),
            ..Default::default()
        };
        let checks = checker.checks.clone();
        let manager = ReferenceManager::builder()
            .with_interval(Duration::from_millis(10))
            .with_time_budget(Duration::from_secs(60))
            .with_checker(checker)
            .build()
            .unwrap();
        let lazies = (1..=COUNT).map(|id| loaded(&loader, id)).collect_vec();
        for lazy in &lazies {
            manager.register(lazy);
        }

        manager.start().unwrap();
        assert!(wait_until(|| checks.load(Ordering::Relaxed) > 0));
        manager.stop();

        let visited = checks.load(Ordering::Relaxed);
        assert!(visited < COUNT as usize, "visited {visited} references");
        thread::sleep(Duration::from_millis(50));
        assert_eq!(checks.load(Ordering::Relaxed), visited);
        assert!(lazies.iter().all(Lazy::is_loaded));
    }

    #[test]
    fn test_controllers_multiplex_one_manager() {
        let manager = ReferenceManager::builder()
            .with_interval(Duration::from_secs(3600))
            .build()
            .unwrap();
        let a = Gate::opened();
        let b = Gate::opened();

        assert!(manager.add_controller(&a));
        assert!(!manager.add_controller(&a));
        assert!(manager.add_controller(&b));

        manager.start().unwrap();
        assert_eq!(a.started.load(Ordering::Relaxed), 1);
        assert_eq!(b.started.load(Ordering::Relaxed), 1);

        let mut controllers = 0;
        manager.iterate_controllers(|_| controllers += 1);
        assert_eq!(controllers, 2);

        a.open.store(false, Ordering::Relaxed);
        assert!(manager.is_running());

        assert!(manager.remove_controller(&b));
        assert!(!manager.is_running());

        assert!(manager.remove_controller(&a));
        assert!(!manager.remove_controller(&a));
        assert!(manager.inner.control.lock().worker.is_none());
        assert_eq!(a.stopped.load(Ordering::Relaxed), 0);
        assert_eq!(b.stopped.load(Ordering::Relaxed), 0);

        // No controller left, the manager controls itself again.
        assert!(manager.may_run());
    }

    #[test]
    fn test_closed_controller_prevents_start() {
        let manager = ReferenceManager::default();
        let gate = Arc::new(Gate::default());
        manager.add_controller(&gate);

        manager.start().unwrap();
        assert!(!manager.is_running());
        assert_eq!(gate.started.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_dropped_controllers_stop_sweeping_thread() {
        let manager = ReferenceManager::builder()
            .with_interval(Duration::from_millis(10))
            .build()
            .unwrap();
        let gate = Gate::opened();
        manager.add_controller(&gate);
        manager.start().unwrap();

        drop(gate);
        assert!(!manager.may_run());
        assert!(wait_until(|| manager.inner.control.lock().worker.is_none()));
    }

    #[test]
    fn test_register_all() {
        let loader = Arc::new(CountingLoader::new());
        let old = ReferenceManager::default();
        let new = ReferenceManager::default();

        let lazy = loaded(&loader, 1);
        old.register(&lazy);
        let gate = Gate::opened();
        old.add_controller(&gate);

        assert_eq!(old.register_all(&old).unwrap_err().kind(), ErrorKind::Unsupported);

        new.register_all(&old).unwrap();
        assert_eq!(new.tracked(), 1);
        let mut controllers = 0;
        new.iterate_controllers(|_| controllers += 1);
        assert_eq!(controllers, 1);
    }

    #[test]
    fn test_dropped_manager_ends_sweeping_thread() {
        let manager = ReferenceManager::builder()
            .with_interval(Duration::from_millis(5))
            .build()
            .unwrap();
        manager.start().unwrap();
        let inner = Arc::downgrade(&manager.inner);
        drop(manager);
        assert!(wait_until(|| inner.strong_count() == 0));
    }
}
