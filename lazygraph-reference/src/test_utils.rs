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
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use lazygraph_common::{
    code::ObjectId,
    error::{Error, ErrorKind, Result},
};
use parking_lot::Mutex;

use crate::loader::Loader;

/// A loader serving values from memory that counts fetches per object id.
#[derive(Debug)]
pub struct CountingLoader<T> {
    values: Mutex<HashMap<ObjectId, Arc<T>>>,
    fetches: Mutex<HashMap<ObjectId, usize>>,
    delay: Option<Duration>,
    failing: AtomicBool,
}

impl<T> Default for CountingLoader<T> {
    fn default() -> Self {
        Self {
            values: Mutex::new(HashMap::new()),
            fetches: Mutex::new(HashMap::new()),
            delay: None,
            failing: AtomicBool::new(false),
        }
    }
}

impl<T> CountingLoader<T> {
    /// Create an empty loader.
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every fetch by `delay`, to widen race windows.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Serve `value` for `object_id`.
    pub fn insert(&self, object_id: ObjectId, value: T) {
        self.values.lock().insert(object_id, Arc::new(value));
    }

    /// Stop serving `object_id`.
    pub fn remove(&self, object_id: ObjectId) {
        self.values.lock().remove(&object_id);
    }

    /// Make every following fetch fail with [`ErrorKind::External`] while `failing` is set.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::Relaxed);
    }

    /// Number of fetches of `object_id`, failed ones included.
    pub fn fetches(&self, object_id: ObjectId) -> usize {
        self.fetches.lock().get(&object_id).copied().unwrap_or_default()
    }
}

impl<T> Loader<T> for CountingLoader<T>
where
    T: Send + Sync + 'static,
{
    fn fetch(&self, object_id: ObjectId) -> Result<Arc<T>> {
        *self.fetches.lock().entry(object_id).or_default() += 1;
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        if self.failing.load(Ordering::Relaxed) {
            return Err(Error::new(ErrorKind::External, "injected fetch failure").with_context("object_id", object_id));
        }
        self.values
            .lock()
            .get(&object_id)
            .cloned()
            .ok_or_else(|| Error::not_found(object_id))
    }
}
