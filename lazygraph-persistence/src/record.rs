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

use std::sync::Arc;

use lazygraph_common::{code::ObjectId, error::Result};
use lazygraph_reference::{Assignment, Lazy, Loader};
use serde::{Deserialize, Serialize};

/// What gets persisted in place of a lazy reference.
///
/// A lazy reference is a leaf with at most one outgoing edge, so its record is either the edge or nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LazyRecord {
    /// The referenced object has been stored along with the record.
    Stored(ObjectId),
    /// Points to an object persisted earlier.
    Pointer(ObjectId),
    /// An empty reference.
    Empty,
}

impl LazyRecord {
    /// The referenced identity, if any.
    pub fn object_id(&self) -> Option<ObjectId> {
        match self {
            LazyRecord::Stored(object_id) | LazyRecord::Pointer(object_id) => Some(*object_id),
            LazyRecord::Empty => None,
        }
    }
}

/// Persists objects referenced by lazy references.
pub trait Storer<T> {
    /// Persist `value` and return its fresh identity.
    ///
    /// Runs under the lock of the reference being stored, which must not be accessed again.
    fn store(&mut self, value: &T) -> Result<ObjectId>;

    /// Loader to bind freshly stored references to.
    fn loader(&self) -> Arc<dyn Loader<T>>;
}

/// Persist `lazy` through `storer` and return its record.
///
/// Every reference yields a record:
///
/// | identity   | resident | record                                   |
/// |------------|----------|------------------------------------------|
/// | unassigned | yes      | [`LazyRecord::Stored`], then linked      |
/// | assigned   | no       | [`LazyRecord::Pointer`], nothing loaded  |
/// | assigned   | yes      | [`LazyRecord::Pointer`], value untouched |
/// | unassigned | no       | [`LazyRecord::Empty`]                    |
///
/// An unassigned reference is stored under its lock, so graphs sharing it store it once even when stored
/// concurrently.
pub fn store_lazy<T, S>(lazy: &Lazy<T>, storer: &mut S) -> Result<LazyRecord>
where
    T: Send + Sync + 'static,
    S: Storer<T> + ?Sized,
{
    let assignment = lazy.assign_with(|value| {
        let object_id = storer.store(value)?;
        Ok((object_id, storer.loader()))
    })?;
    match assignment {
        Assignment::Existing(object_id) => Ok(LazyRecord::Pointer(object_id)),
        Assignment::Assigned(object_id) => {
            tracing::debug!("[record]: Stored lazy reference as {object_id}.");
            Ok(LazyRecord::Stored(object_id))
        }
        Assignment::Empty => Ok(LazyRecord::Empty),
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{
            atomic::{AtomicUsize, Ordering},
            Barrier,
        },
        thread,
        time::Duration,
    };

    use lazygraph_common::error::{Error, ErrorKind};

    use super::*;

    /// Records stored values and hands out ids from 42.
    #[derive(Default)]
    struct SpyStorer {
        stored: Vec<String>,
    }

    impl Storer<String> for SpyStorer {
        fn store(&mut self, value: &String) -> Result<ObjectId> {
            self.stored.push(value.clone());
            Ok(ObjectId::new(42 + self.stored.len() as u64 - 1))
        }

        fn loader(&self) -> Arc<dyn Loader<String>> {
            let stored = self.stored.clone();
            Arc::new(move |object_id: ObjectId| {
                stored
                    .get((object_id.raw() - 42) as usize)
                    .cloned()
                    .map(Arc::new)
                    .ok_or_else(|| Error::not_found(object_id))
            })
        }
    }

    fn unreachable_loader() -> Arc<dyn Loader<String>> {
        Arc::new(|object_id: ObjectId| -> Result<Arc<String>> { Err(Error::not_found(object_id)) })
    }

    #[test_log::test]
    fn test_four_cases() {
        let mut storer = SpyStorer::default();

        let fresh = Lazy::reference("fresh".to_string());
        let unloaded = Lazy::stub_shared(ObjectId::new(7), unreachable_loader());
        let loaded = Lazy::reference("loaded".to_string());
        loaded.link(ObjectId::new(8), unreachable_loader()).unwrap();
        let empty = Lazy::<String>::empty();

        let records = [&fresh, &unloaded, &loaded, &empty]
            .into_iter()
            .map(|lazy| store_lazy(lazy, &mut storer).unwrap())
            .collect::<Vec<_>>();

        assert_eq!(
            records,
            vec![
                LazyRecord::Stored(ObjectId::new(42)),
                LazyRecord::Pointer(ObjectId::new(7)),
                LazyRecord::Pointer(ObjectId::new(8)),
                LazyRecord::Empty,
            ]
        );
        assert_eq!(storer.stored, vec!["fresh".to_string()]);
        assert_eq!(fresh.object_id(), ObjectId::new(42));
        assert!(!unloaded.is_loaded());
        assert_eq!(loaded.peek().as_deref().map(String::as_str), Some("loaded"));
    }

    #[test]
    fn test_stored_reference_reloads() {
        let mut storer = SpyStorer::default();
        let lazy = Lazy::reference("hello".to_string());
        assert_eq!(store_lazy(&lazy, &mut storer).unwrap(), LazyRecord::Stored(ObjectId::new(42)));

        // Storing again only points to it.
        assert_eq!(store_lazy(&lazy, &mut storer).unwrap(), LazyRecord::Pointer(ObjectId::new(42)));
        assert_eq!(storer.stored.len(), 1);

        lazy.clear();
        assert!(!lazy.is_loaded());
        assert_eq!(lazy.get().unwrap().as_deref().map(String::as_str), Some("hello"));
    }

    #[test]
    fn test_persisted_null_is_a_pointer() {
        let mut storer = SpyStorer::default();
        let lazy = Lazy::stub_shared(ObjectId::NULL, unreachable_loader());
        assert_eq!(store_lazy(&lazy, &mut storer).unwrap(), LazyRecord::Pointer(ObjectId::NULL));
        assert_eq!(LazyRecord::Empty.object_id(), None);
        assert!(storer.stored.is_empty());
        assert!(lazy.is_loaded());
        assert!(lazy.get().unwrap().is_none());
    }

    #[test_log::test]
    fn test_shared_reference_is_stored_once() {
        /// Hands out ids from 100, slowly.
        #[derive(Clone, Default)]
        struct SlowStorer {
            stores: Arc<AtomicUsize>,
        }

        impl Storer<String> for SlowStorer {
            fn store(&mut self, _: &String) -> Result<ObjectId> {
                let n = self.stores.fetch_add(1, Ordering::Relaxed);
                thread::sleep(Duration::from_millis(50));
                Ok(ObjectId::new(100 + n as u64))
            }

            fn loader(&self) -> Arc<dyn Loader<String>> {
                unreachable_loader()
            }
        }

        let storer = SlowStorer::default();
        let shared = Lazy::reference("shared".to_string());
        let barrier = Arc::new(Barrier::new(2));

        let handles = (0..2)
            .map(|_| {
                let mut storer = storer.clone();
                let shared = shared.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    barrier.wait();
                    store_lazy(&shared, &mut storer).unwrap()
                })
            })
            .collect::<Vec<_>>();
        let mut records = handles.into_iter().map(|h| h.join().unwrap()).collect::<Vec<_>>();
        records.sort_by_key(|record| matches!(record, LazyRecord::Pointer(_)));

        assert_eq!(
            records,
            vec![
                LazyRecord::Stored(ObjectId::new(100)),
                LazyRecord::Pointer(ObjectId::new(100)),
            ]
        );
        assert_eq!(storer.stores.load(Ordering::Relaxed), 1);
        assert_eq!(shared.object_id(), ObjectId::new(100));
    }

    #[test]
    fn test_failed_store_leaves_reference_unassigned() {
        struct FailingStorer;

        impl Storer<String> for FailingStorer {
            fn store(&mut self, _: &String) -> Result<ObjectId> {
                Err(Error::new(ErrorKind::Io, "disk full"))
            }

            fn loader(&self) -> Arc<dyn Loader<String>> {
                unreachable_loader()
            }
        }

        let lazy = Lazy::reference("hello".to_string());
        assert_eq!(store_lazy(&lazy, &mut FailingStorer).unwrap_err().kind(), ErrorKind::Io);
        assert!(!lazy.is_stored());
        assert!(lazy.peek().is_some());
    }
}
