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

use std::{thread, time::Duration};

use lazygraph::{
    CheckerConfig, Lazy, LazyRecord, MemoryQuota, MemoryStorage, ReferenceManager, Result, Session, Storage,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
struct Page {
    number: u32,
    text: String,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let manager = ReferenceManager::builder()
        .with_interval(Duration::from_millis(50))
        .with_checker_config(CheckerConfig {
            timeout: Duration::from_millis(100),
            memory_quota: MemoryQuota::Relative(0.9),
        })
        .build()?;
    let storage = MemoryStorage::new();
    let session = Session::open(storage.clone(), manager.clone())?;

    let pages = (1..=8)
        .map(|number| {
            Lazy::reference(Page {
                number,
                text: format!("page {number}"),
            })
        })
        .collect::<Vec<_>>();
    let records = pages
        .iter()
        .map(|page| session.store_lazy(page))
        .collect::<Result<Vec<LazyRecord>>>()?;
    tracing::info!("stored {} pages: {records:?}", records.len());

    thread::sleep(Duration::from_millis(500));
    let resident = pages.iter().filter(|page| page.is_loaded()).count();
    tracing::info!("{resident} of {} pages still resident after idling", pages.len());

    if let Some(page) = pages[3].get()? {
        tracing::info!("reloaded page {}: {}", page.number, page.text);
    }
    tracing::info!("storage reads: {}", storage.statistics().reads());

    session.close();
    assert!(!manager.is_running());
    Ok(())
}
