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
    fmt::Debug,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use bytes::Bytes;
use lazygraph_common::{
    code::ObjectId,
    error::{Error, ErrorKind, Result},
};
use parking_lot::RwLock;

use crate::statistics::Statistics;

/// Object storage backing a persistence session.
///
/// A storage may be shared by several sessions, one after another or at the same time.
pub trait Storage: Send + Sync + Debug + 'static {
    /// Reserve a fresh proper object id.
    fn allocate(&self) -> ObjectId;

    /// Persist `data` as the object `object_id`, replacing any previous content.
    fn write(&self, object_id: ObjectId, data: Bytes) -> Result<()>;

    /// Read the object `object_id`.
    ///
    /// Fails with [`ErrorKind::NotFound`] if it has never been written.
    fn read(&self, object_id: ObjectId) -> Result<Bytes>;

    /// Remove the object `object_id`. Returns `true` if it existed.
    fn remove(&self, object_id: ObjectId) -> Result<bool>;

    /// Operation counters.
    fn statistics(&self) -> &Arc<Statistics>;
}

#[derive(Debug)]
struct MemoryStorageInner {
    objects: RwLock<HashMap<ObjectId, Bytes>>,
    next: AtomicU64,
    statistics: Arc<Statistics>,
}

/// A [`Storage`] keeping all objects in memory.
///
/// Clones share the same objects, so a storage outlives the sessions opened on it.
#[derive(Debug, Clone)]
pub struct MemoryStorage {
    inner: Arc<MemoryStorageInner>,
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStorage {
    /// Create an empty storage. Ids are allocated from 1.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MemoryStorageInner {
                objects: RwLock::new(HashMap::new()),
                next: AtomicU64::new(1),
                statistics: Arc::default(),
            }),
        }
    }

    /// Number of persisted objects.
    pub fn len(&self) -> usize {
        self.inner.objects.read().len()
    }

    /// Returns `true` if nothing has been persisted.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Storage for MemoryStorage {
    fn allocate(&self) -> ObjectId {
        ObjectId::new(self.inner.next.fetch_add(1, Ordering::Relaxed))
    }

    fn write(&self, object_id: ObjectId, data: Bytes) -> Result<()> {
        if !object_id.is_proper() {
            return Err(Error::new(ErrorKind::Unsupported, "write to a reserved object id")
                .with_context("object_id", object_id));
        }
        self.inner.statistics.writes.fetch_add(1, Ordering::Relaxed);
        self.inner
            .statistics
            .written_bytes
            .fetch_add(data.len(), Ordering::Relaxed);
        self.inner.objects.write().insert(object_id, data);
        Ok(())
    }

    fn read(&self, object_id: ObjectId) -> Result<Bytes> {
        self.inner.statistics.reads.fetch_add(1, Ordering::Relaxed);
        self.inner
            .objects
            .read()
            .get(&object_id)
            .cloned()
            .ok_or_else(|| Error::not_found(object_id))
    }

    fn remove(&self, object_id: ObjectId) -> Result<bool> {
        Ok(self.inner.objects.write().remove(&object_id).is_some())
    }

    fn statistics(&self) -> &Arc<Statistics> {
        &self.inner.statistics
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_storage() {
        let storage = MemoryStorage::new();
        let shared = storage.clone();
        assert!(storage.is_empty());

        let a = storage.allocate();
        let b = storage.allocate();
        assert_eq!(a, ObjectId::new(1));
        assert_eq!(b, ObjectId::new(2));

        storage.write(a, Bytes::from_static(b"alpha")).unwrap();
        assert_eq!(shared.read(a).unwrap(), Bytes::from_static(b"alpha"));
        assert_eq!(shared.read(b).unwrap_err().kind(), ErrorKind::NotFound);
        assert_eq!(
            storage.write(ObjectId::NULL, Bytes::new()).unwrap_err().kind(),
            ErrorKind::Unsupported
        );

        assert!(shared.remove(a).unwrap());
        assert!(!shared.remove(a).unwrap());
        assert!(storage.is_empty());

        let statistics = storage.statistics();
        assert_eq!(statistics.writes(), 1);
        assert_eq!(statistics.reads(), 2);
        assert_eq!(statistics.written_bytes(), 5);
    }
}
