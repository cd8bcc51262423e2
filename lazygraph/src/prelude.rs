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

pub use lazygraph_common::{
    clock::{Clock, ManualClock, MonotonicClock, Timestamp},
    code::ObjectId,
    error::{Error, ErrorKind, Result},
    memory::{FixedMemoryProbe, MemoryProbe, MemoryStatistics, SystemMemoryProbe},
    metrics::{registry::noop::NoopMetricsRegistry, RegistryOps},
};
#[cfg(feature = "prometheus")]
pub use lazygraph_common::metrics::registry::prometheus::PrometheusMetricsRegistry;
pub use lazygraph_persistence::{
    store_lazy, EntryDeserializer, EntrySerializer, LazyRecord, MemoryStorage, Persist, Session, Statistics, Storage,
    Storer,
};
pub use lazygraph_reference::{
    global_manager, set_global_manager, Assignment, Checker, CheckerConfig, ClearingEvaluator, Clearer, Controller,
    CustomCheck, CycleEvaluator, DefaultChecker, GraphTraverser, Lazy, Loader, MemoryQuota, Reference, ReferenceManager,
    ReferenceManagerBuilder, ReferenceManagerConfig, ReferenceState, SweepReport, TraversalMode, Traverse,
};
