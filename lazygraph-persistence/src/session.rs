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
    marker::PhantomData,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
};

use lazygraph_common::{
    code::ObjectId,
    error::{Error, ErrorKind, Result},
};
use lazygraph_reference::{Controller, Lazy, Loader, ReferenceManager};
use serde::{de::DeserializeOwned, Serialize};

use crate::{
    record::{store_lazy, LazyRecord, Storer},
    serde::{EntryDeserializer, EntrySerializer},
    storage::Storage,
};

/// Objects that can be persisted by a [`Session`].
pub trait Persist: Serialize + DeserializeOwned + Send + Sync + 'static {}
impl<T> Persist for T where T: Serialize + DeserializeOwned + Send + Sync + 'static {}

static SESSION_ID: AtomicU64 = AtomicU64::new(0);

/// Loads objects of one session. Fails once the session has been closed.
struct SessionLoader<T> {
    session: u64,
    storage: Arc<dyn Storage>,
    open: Arc<AtomicBool>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Loader<T> for SessionLoader<T>
where
    T: Persist,
{
    fn fetch(&self, object_id: ObjectId) -> Result<Arc<T>> {
        if !self.open.load(Ordering::Acquire) {
            return Err(Error::session_closed(object_id).with_context("session", self.session));
        }
        let buffer = self.storage.read(object_id)?;
        let value = EntryDeserializer::deserialize(&buffer)?;
        Ok(Arc::new(value))
    }
}

/// Keeps the shared reference manager running while the session is open.
#[derive(Debug)]
struct SessionController {
    session: u64,
    open: Arc<AtomicBool>,
}

impl Controller for SessionController {
    fn may_run(&self, _: &ReferenceManager) -> bool {
        self.open.load(Ordering::Acquire)
    }

    fn on_start(&self, manager: &ReferenceManager) {
        tracing::debug!("[session]: Session {} attached to {} sweeping.", self.session, manager.name());
    }

    fn on_stop(&self, manager: &ReferenceManager) {
        tracing::debug!("[session]: Session {} detached from {} sweeping.", self.session, manager.name());
    }
}

struct SessionStorer<'a, T> {
    session: &'a Session<T>,
}

impl<T> Storer<T> for SessionStorer<'_, T>
where
    T: Persist,
{
    fn store(&mut self, value: &T) -> Result<ObjectId> {
        self.session.store(value)
    }

    fn loader(&self) -> Arc<dyn Loader<T>> {
        self.session.loader()
    }
}

/// A persistence session over a [`Storage`], for objects of type `T`.
///
/// Opening a session attaches it to a [`ReferenceManager`] as a controller and starts the manager. Several sessions
/// may share one manager and its sweeping thread. Closing the session detaches it, the manager stops once no open
/// session is left.
///
/// References resolved by a session load through it. Once it is closed they fail with
/// [`ErrorKind::SessionClosed`](lazygraph_common::error::ErrorKind::SessionClosed) until they are rebound to
/// another session with [`Session::rebind`].
pub struct Session<T> {
    id: u64,
    storage: Arc<dyn Storage>,
    manager: ReferenceManager,
    loader: Arc<SessionLoader<T>>,
    controller: Arc<SessionController>,
    open: Arc<AtomicBool>,
}

impl<T> Debug for Session<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("storage", &self.storage)
            .field("manager", &self.manager.name())
            .field("open", &self.open.load(Ordering::Relaxed))
            .finish()
    }
}

impl<T> Session<T>
where
    T: Persist,
{
    /// Open a session on `storage`, attached to `manager`.
    pub fn open(storage: impl Storage, manager: ReferenceManager) -> Result<Self> {
        let id = SESSION_ID.fetch_add(1, Ordering::Relaxed);
        let storage: Arc<dyn Storage> = Arc::new(storage);
        let open = Arc::new(AtomicBool::new(true));
        let loader = Arc::new(SessionLoader {
            session: id,
            storage: storage.clone(),
            open: open.clone(),
            _marker: PhantomData,
        });
        let controller = Arc::new(SessionController {
            session: id,
            open: open.clone(),
        });

        manager.add_controller(&controller);
        let session = Self {
            id,
            storage,
            manager,
            loader,
            controller,
            open,
        };
        session.manager.start()?;
        tracing::info!("[session]: Session {id} opened.");
        Ok(session)
    }

    /// Persist `value` as a new object.
    pub fn store(&self, value: &T) -> Result<ObjectId> {
        self.ensure_open()?;
        let object_id = self.storage.allocate();
        let buffer = EntrySerializer::serialize(value)?;
        self.storage.write(object_id, buffer)?;
        Ok(object_id)
    }

    /// Persist `lazy` and return the record to persist in its place.
    ///
    /// A reference stored for the first time is bound to this session and tracked by its manager.
    pub fn store_lazy(&self, lazy: &Lazy<T>) -> Result<LazyRecord> {
        self.ensure_open()?;
        let record = store_lazy(lazy, &mut SessionStorer { session: self })?;
        if let LazyRecord::Stored(_) = record {
            self.manager.register(lazy);
        }
        Ok(record)
    }

    /// Create the lazy reference described by `record`, bound to this session and tracked by its manager.
    ///
    /// Nothing is loaded.
    pub fn resolve(&self, record: LazyRecord) -> Result<Lazy<T>> {
        self.ensure_open()?;
        let lazy = match record.object_id() {
            Some(object_id) => Lazy::stub_shared(object_id, self.loader()),
            None => return Ok(Lazy::empty()),
        };
        self.manager.register(&lazy);
        Ok(lazy)
    }

    /// Load through this session from now on, e.g. after the session `lazy` has been resolved by was closed.
    pub fn rebind(&self, lazy: &Lazy<T>) -> Result<()> {
        self.ensure_open()?;
        lazy.set_loader(self.loader());
        Ok(())
    }

    /// Loader of this session.
    pub fn loader(&self) -> Arc<dyn Loader<T>> {
        self.loader.clone()
    }

    /// The manager the session is attached to.
    pub fn manager(&self) -> &ReferenceManager {
        &self.manager
    }

    /// Returns `true` until the session is closed.
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    /// Close the session and detach it from its manager. No-op if already closed.
    pub fn close(&self) {
        if !self.open.swap(false, Ordering::AcqRel) {
            return;
        }
        self.manager.remove_controller(&self.controller);
        tracing::info!("[session]: Session {} closed.", self.id);
    }

    fn ensure_open(&self) -> Result<()> {
        match self.is_open() {
            true => Ok(()),
            false => Err(Error::new(ErrorKind::SessionClosed, "session is closed").with_context("session", self.id)),
        }
    }
}

impl<T> Drop for Session<T> {
    fn drop(&mut self) {
        if self.open.swap(false, Ordering::AcqRel) {
            self.manager.remove_controller(&self.controller);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::storage::MemoryStorage;

    fn manager() -> ReferenceManager {
        ReferenceManager::builder()
            .with_interval(Duration::from_secs(3600))
            .build()
            .unwrap()
    }

    #[test_log::test]
    fn test_store_and_resolve() {
        let storage = MemoryStorage::new();
        let session = Session::<String>::open(storage.clone(), manager()).unwrap();
        assert!(session.manager().is_running());

        let lazy = Lazy::reference("hello".to_string());
        let record = session.store_lazy(&lazy).unwrap();
        let LazyRecord::Stored(object_id) = record else {
            panic!("expected a stored record, got {record:?}");
        };
        assert_eq!(lazy.object_id(), object_id);
        assert_eq!(session.manager().tracked(), 1);

        let resolved = session.resolve(LazyRecord::Pointer(object_id)).unwrap();
        assert!(!resolved.is_loaded());
        assert_eq!(resolved.get().unwrap().as_deref().map(String::as_str), Some("hello"));
        assert_eq!(storage.statistics().reads(), 1);
        assert_eq!(session.manager().tracked(), 2);

        assert!(session.resolve(LazyRecord::Empty).unwrap().get().unwrap().is_none());
    }

    #[test_log::test]
    fn test_closed_session_and_rebind() {
        let storage = MemoryStorage::new();
        let manager = manager();
        let first = Session::<String>::open(storage.clone(), manager.clone()).unwrap();
        let object_id = first.store(&"hello".to_string()).unwrap();
        let lazy = first.resolve(LazyRecord::Pointer(object_id)).unwrap();

        first.close();
        first.close();
        assert!(!manager.is_running());
        assert_eq!(lazy.get().unwrap_err().kind(), ErrorKind::SessionClosed);
        assert_eq!(
            first.store(&"again".to_string()).unwrap_err().kind(),
            ErrorKind::SessionClosed
        );

        let second = Session::<String>::open(storage, manager.clone()).unwrap();
        assert!(manager.is_running());
        second.rebind(&lazy).unwrap();
        assert_eq!(lazy.get().unwrap().as_deref().map(String::as_str), Some("hello"));
    }

    #[test]
    fn test_sessions_share_one_manager() {
        let manager = manager();
        let a = Session::<u64>::open(MemoryStorage::new(), manager.clone()).unwrap();
        let b = Session::<u64>::open(MemoryStorage::new(), manager.clone()).unwrap();

        let mut controllers = 0;
        manager.iterate_controllers(|_| controllers += 1);
        assert_eq!(controllers, 2);

        a.close();
        assert!(manager.is_running());
        drop(b);
        assert!(!manager.is_running());
    }
}
