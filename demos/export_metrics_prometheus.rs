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

use lazygraph::{Lazy, PrometheusMetricsRegistry, ReferenceManager, Result};
use prometheus::{Registry, TextEncoder};

fn main() -> Result<()> {
    let registry = Registry::new();
    let manager = ReferenceManager::builder()
        .with_name("demo")
        .with_metrics_registry(PrometheusMetricsRegistry::new(registry.clone()))
        .build()?;

    let values = (0..16u64).map(Lazy::reference).collect::<Vec<_>>();
    values.iter().for_each(|value| manager.register(value));
    manager.clean_up_all();

    match TextEncoder::new().encode_to_string(&registry.gather()) {
        Ok(text) => println!("{text}"),
        Err(e) => eprintln!("failed to encode metrics: {e}"),
    }
    Ok(())
}
