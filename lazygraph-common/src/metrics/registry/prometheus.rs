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
    collections::HashMap,
    hash::{Hash, Hasher},
    sync::{Arc, LazyLock},
};

use itertools::Itertools;
use parking_lot::Mutex;
use prometheus::{
    core::Collector, Histogram, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, IntGaugeVec, Opts,
    Registry,
};

use crate::metrics::{
    BoxedCounter, BoxedCounterVec, BoxedGauge, BoxedGaugeVec, BoxedHistogram, BoxedHistogramVec, Boxer, CounterOps,
    CounterVecOps, GaugeOps, GaugeVecOps, HistogramOps, HistogramVecOps, RegistryOps,
};

/// Metric vectors already registered, keyed by registry identity and metadata.
///
/// Registering the same metadata twice through clones of one [`PrometheusMetricsRegistry`] hands out the vector
/// registered first.
static METRICS: LazyLock<Mutex<HashMap<PrometheusMetricsRegistry, HashMap<Metadata, MetricVec>>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));

#[derive(Debug, Clone)]
enum MetricVec {
    Counter(IntCounterVec),
    Gauge(IntGaugeVec),
    Histogram(HistogramVec),
}

#[derive(Debug, Clone, Hash, PartialEq, Eq)]
struct Metadata {
    name: Cow<'static, str>,
    desc: Cow<'static, str>,
    label_names: &'static [&'static str],
}

impl Metadata {
    fn opts(&self) -> Opts {
        Opts::new(self.name.as_ref(), self.desc.as_ref())
    }
}

/// Register `collector` to the backing registry.
///
/// A failed registration leaves the collector working but unexported.
fn register<C>(registry: &PrometheusMetricsRegistry, metadata: &Metadata, collector: C) -> C
where
    C: Collector + Clone + 'static,
{
    if let Err(e) = registry.registry.register(Box::new(collector.clone())) {
        tracing::warn!("[metrics]: failed to register {}: {e}", metadata.name);
    }
    collector
}

fn get_or_register<F>(registry: &PrometheusMetricsRegistry, metadata: Metadata, create: F) -> MetricVec
where
    F: FnOnce(&Metadata) -> MetricVec,
{
    let mut metrics = METRICS.lock();
    let vecs = metrics.entry(registry.clone()).or_default();
    vecs.entry(metadata.clone()).or_insert_with(|| create(&metadata)).clone()
}

fn unregistrable(metadata: &Metadata, e: prometheus::Error) -> ! {
    // Only reachable with malformed metric names or labels, which are compile time constants.
    panic!("invalid metric {}: {e}", metadata.name)
}

impl CounterOps for IntCounter {
    fn increase(&self, val: u64) {
        self.inc_by(val);
    }
}

impl CounterVecOps for IntCounterVec {
    fn counter(&self, labels: &[Cow<'static, str>]) -> BoxedCounter {
        let labels = labels.iter().map(Cow::as_ref).collect_vec();
        self.with_label_values(&labels).boxed()
    }
}

impl GaugeOps for IntGauge {
    fn increase(&self, val: u64) {
        self.add(val as _);
    }

    fn decrease(&self, val: u64) {
        self.sub(val as _);
    }

    fn absolute(&self, val: u64) {
        self.set(val as _);
    }
}

impl GaugeVecOps for IntGaugeVec {
    fn gauge(&self, labels: &[Cow<'static, str>]) -> BoxedGauge {
        let labels = labels.iter().map(Cow::as_ref).collect_vec();
        self.with_label_values(&labels).boxed()
    }
}

impl HistogramOps for Histogram {
    fn record(&self, val: f64) {
        self.observe(val);
    }
}

impl HistogramVecOps for HistogramVec {
    fn histogram(&self, labels: &[Cow<'static, str>]) -> BoxedHistogram {
        let labels = labels.iter().map(Cow::as_ref).collect_vec();
        self.with_label_values(&labels).boxed()
    }
}

/// Prometheus metric registry with lib `prometheus`.
///
/// The [`PrometheusMetricsRegistry`] can be cloned and shared by multiple reference managers without registering
/// the same metric twice.
#[derive(Debug, Clone)]
pub struct PrometheusMetricsRegistry {
    registry: Arc<Registry>,
}

impl PartialEq for PrometheusMetricsRegistry {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.registry, &other.registry)
    }
}

impl Eq for PrometheusMetricsRegistry {}

impl Hash for PrometheusMetricsRegistry {
    fn hash<H: Hasher>(&self, state: &mut H) {
        Arc::as_ptr(&self.registry).hash(state);
    }
}

impl PrometheusMetricsRegistry {
    /// Create an Prometheus metrics registry.
    pub fn new(registry: Registry) -> Self {
        let this = Self {
            registry: Arc::new(registry),
        };
        METRICS.lock().insert(this.clone(), HashMap::new());
        this
    }
}

impl RegistryOps for PrometheusMetricsRegistry {
    fn register_counter_vec(
        &self,
        name: Cow<'static, str>,
        desc: Cow<'static, str>,
        label_names: &'static [&'static str],
    ) -> BoxedCounterVec {
        let metadata = Metadata {
            name,
            desc,
            label_names,
        };
        let vec = get_or_register(self, metadata, |metadata| {
            let vec = IntCounterVec::new(metadata.opts(), metadata.label_names)
                .unwrap_or_else(|e| unregistrable(metadata, e));
            MetricVec::Counter(register(self, metadata, vec))
        });
        match vec {
            MetricVec::Counter(v) => v.boxed(),
            _ => unreachable!("metric kind mismatch"),
        }
    }

    fn register_gauge_vec(
        &self,
        name: Cow<'static, str>,
        desc: Cow<'static, str>,
        label_names: &'static [&'static str],
    ) -> BoxedGaugeVec {
        let metadata = Metadata {
            name,
            desc,
            label_names,
        };
        let vec = get_or_register(self, metadata, |metadata| {
            let vec =
                IntGaugeVec::new(metadata.opts(), metadata.label_names).unwrap_or_else(|e| unregistrable(metadata, e));
            MetricVec::Gauge(register(self, metadata, vec))
        });
        match vec {
            MetricVec::Gauge(v) => v.boxed(),
            _ => unreachable!("metric kind mismatch"),
        }
    }

    fn register_histogram_vec(
        &self,
        name: Cow<'static, str>,
        desc: Cow<'static, str>,
        label_names: &'static [&'static str],
    ) -> BoxedHistogramVec {
        let metadata = Metadata {
            name,
            desc,
            label_names,
        };
        let vec = get_or_register(self, metadata, |metadata| {
            let opts = HistogramOpts::new(metadata.name.as_ref(), metadata.desc.as_ref());
            let vec = HistogramVec::new(opts, metadata.label_names).unwrap_or_else(|e| unregistrable(metadata, e));
            MetricVec::Histogram(register(self, metadata, vec))
        });
        match vec {
            MetricVec::Histogram(v) => v.boxed(),
            _ => unreachable!("metric kind mismatch"),
        }
    }
}

#[cfg(test)]
mod tests {
    use prometheus::TextEncoder;

    use super::*;

    fn case(registry: &PrometheusMetricsRegistry) {
        let cv = registry.register_counter_vec("test_counter_1".into(), "test counter 1".into(), &["name", "op"]);
        let c = cv.counter(&["manager".into(), "clear".into()]);
        c.increase(42);

        let gv = registry.register_gauge_vec("test_gauge_1".into(), "test gauge 1".into(), &["name"]);
        let g = gv.gauge(&["manager".into()]);
        g.increase(514);
        g.decrease(114);
        g.absolute(400);

        let hv = registry.register_histogram_vec("test_histogram_1".into(), "test histogram 1".into(), &["name"]);
        let h = hv.histogram(&["manager".into()]);
        h.record(0.25);
    }

    #[test]
    fn test_prometheus_metrics_registry() {
        let registry = Registry::new();
        let p8s = PrometheusMetricsRegistry::new(registry.clone());
        case(&p8s);

        let text = TextEncoder::new().encode_to_string(&registry.gather()).unwrap();
        assert!(text.contains("test_counter_1"));
    }

    #[test]
    fn test_shared_prometheus_metrics_registry() {
        let registry = Registry::new();
        let p8s1 = PrometheusMetricsRegistry::new(registry.clone());
        let p8s2 = p8s1.clone();
        case(&p8s1);
        case(&p8s2);

        let text = TextEncoder::new().encode_to_string(&registry.gather()).unwrap();
        assert!(text.contains(r#"test_counter_1{name="manager",op="clear"} 84"#));
    }
}
