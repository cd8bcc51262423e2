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

use std::borrow::Cow;

use super::{registry::noop::NoopMetricsRegistry, BoxedCounter, BoxedGauge, BoxedHistogram, RegistryOps};

/// Metrics of a reference manager.
///
/// All metrics carry the manager name as the `name` label, so several managers can share one registry.
#[derive(Debug)]
pub struct Metrics {
    /// Handles registered for tracking.
    pub reference_register: BoxedCounter,
    /// Handles evaluated by a checker.
    pub reference_check: BoxedCounter,
    /// Handles whose loaded value has been dropped.
    pub reference_clear: BoxedCounter,
    /// Sweep passes executed.
    pub reference_sweep: BoxedCounter,
    /// Sweep passes requested out of schedule.
    pub reference_trigger: BoxedCounter,

    /// Handles currently tracked, including ones not yet found dead.
    pub reference_tracked: BoxedGauge,

    /// Wall time of a sweep pass, in seconds.
    pub reference_sweep_duration: BoxedHistogram,
}

impl Metrics {
    /// Create a new metric with the given name.
    pub fn new(name: impl Into<Cow<'static, str>>, registry: &dyn RegistryOps) -> Self {
        let name = name.into();

        let op_total = registry.register_counter_vec(
            "lazygraph_reference_op_total".into(),
            "lazygraph reference manager operations".into(),
            &["name", "op"],
        );
        let tracked = registry.register_gauge_vec(
            "lazygraph_reference_tracked".into(),
            "lazygraph tracked lazy references".into(),
            &["name"],
        );
        let sweep_duration = registry.register_histogram_vec(
            "lazygraph_reference_sweep_duration".into(),
            "lazygraph reference manager sweep durations".into(),
            &["name"],
        );

        let op = |op: &'static str| op_total.counter(&[name.clone(), op.into()]);

        Self {
            reference_register: op("register"),
            reference_check: op("check"),
            reference_clear: op("clear"),
            reference_sweep: op("sweep"),
            reference_trigger: op("trigger"),
            reference_tracked: tracked.gauge(&[name.clone()]),
            reference_sweep_duration: sweep_duration.histogram(&[name]),
        }
    }

    /// Build noop metrics.
    ///
    /// Only for test or benchmark.
    pub fn noop() -> Self {
        Self::new("test", &NoopMetricsRegistry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_noop_metrics() {
        let metrics = Metrics::noop();
        metrics.reference_register.increase(1);
        metrics.reference_tracked.absolute(1);
        metrics.reference_sweep_duration.record(0.001);
    }

    #[cfg(feature = "prometheus")]
    #[test]
    fn test_named_metrics_share_registry() {
        use prometheus::{Registry, TextEncoder};

        use crate::metrics::registry::prometheus::PrometheusMetricsRegistry;

        let registry = Registry::new();
        let p8s = PrometheusMetricsRegistry::new(registry.clone());

        let a = Metrics::new("a", &p8s);
        let b = Metrics::new("b", &p8s);
        a.reference_clear.increase(3);
        b.reference_clear.increase(5);

        let text = TextEncoder::new().encode_to_string(&registry.gather()).unwrap();
        assert!(text.contains(r#"lazygraph_reference_op_total{name="a",op="clear"} 3"#));
        assert!(text.contains(r#"lazygraph_reference_op_total{name="b",op="clear"} 5"#));
    }
}
