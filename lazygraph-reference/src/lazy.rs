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
    fmt::{Debug, Display},
    sync::{Arc, Weak},
};

use lazygraph_common::{
    clock::Timestamp,
    code::ObjectId,
    error::{Error, Result},
};
use parking_lot::Mutex;

use crate::loader::Loader;

/// A point-in-time view of a lazy reference, taken under its lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReferenceState {
    /// Identity of the referenced object.
    pub object_id: ObjectId,
    /// Last time the value has been loaded or accessed. [`Timestamp::MAX`] if the value is not resident.
    pub last_touched: Timestamp,
    /// Whether the value is resident.
    pub cached: bool,
}

/// Decides whether a resident value of a stored lazy reference should be dropped.
///
/// The evaluator runs while the reference is locked, so it must not access the same reference again.
pub trait ClearingEvaluator {
    /// Returns `true` if the value of the reference described by `state` should be dropped.
    fn needs_clearing(&mut self, state: &ReferenceState) -> bool;
}

impl<F> ClearingEvaluator for F
where
    F: FnMut(&ReferenceState) -> bool,
{
    fn needs_clearing(&mut self, state: &ReferenceState) -> bool {
        self(state)
    }
}

/// Type erased view of a lazy reference, as tracked by the reference manager.
pub trait Reference: Send + Sync + 'static {
    /// Take a snapshot of the reference.
    fn state(&self) -> ReferenceState;

    /// Identity of the referenced object.
    fn object_id(&self) -> ObjectId {
        self.state().object_id
    }

    /// Last time the value has been loaded or accessed.
    fn last_touched(&self) -> Timestamp {
        self.state().last_touched
    }

    /// Whether the referenced object has been persisted.
    fn is_stored(&self) -> bool {
        self.state().object_id.is_proper()
    }

    /// Whether reading the reference needs no load.
    fn is_loaded(&self) -> bool {
        let state = self.state();
        !state.object_id.is_proper() || state.cached
    }

    /// Drop the resident value. Returns `true` if a value has been dropped.
    fn clear(&self) -> bool;

    /// Drop the resident value if the reference is stored, loaded and `evaluator` agrees.
    fn clear_if(&self, evaluator: &mut dyn ClearingEvaluator) -> bool;
}

/// Outcome of [`Lazy::assign_with`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Assignment {
    /// The reference already had an identity, nothing has been stored.
    Existing(ObjectId),
    /// The resident object has been stored and the reference bound to its fresh identity.
    Assigned(ObjectId),
    /// The reference has neither an identity nor an object.
    Empty,
}

struct State<T> {
    object_id: ObjectId,
    cached: Option<Arc<T>>,
    last_touched: Timestamp,
    /// Bumped on every access, so [`Lazy::inspect`] can tell whether someone else used the value meanwhile.
    accesses: u64,
    loader: Option<Arc<dyn Loader<T>>>,
}

impl<T: 'static> State<T> {
    fn touch(&mut self) {
        self.accesses = self.accesses.wrapping_add(1);
        self.last_touched = match self.cached {
            Some(_) => Timestamp::now(),
            None => Timestamp::MAX,
        };
    }

    fn load(&mut self) -> Result<()> {
        if self.cached.is_none() && self.object_id.is_proper() {
            let object_id = self.object_id;
            let loader = self.loader.clone().ok_or_else(|| Error::loader_missing(object_id))?;
            tracing::debug!("[lazy]: Loading {object_id}.");
            self.cached = Some(loader.fetch(object_id)?);
        }
        Ok(())
    }

    /// Unstored values are never dropped, nothing could bring them back.
    fn take(&mut self) -> Option<Arc<T>> {
        if !self.object_id.is_proper() {
            return None;
        }
        let value = self.cached.take();
        self.touch();
        value
    }

    fn snapshot(&self) -> ReferenceState {
        ReferenceState {
            object_id: self.object_id,
            last_touched: self.last_touched,
            cached: self.cached.is_some(),
        }
    }
}

pub(crate) struct LazyInner<T> {
    state: Mutex<State<T>>,
}

impl<T> Reference for LazyInner<T>
where
    T: Send + Sync + 'static,
{
    fn state(&self) -> ReferenceState {
        self.state.lock().snapshot()
    }

    fn clear(&self) -> bool {
        self.state.lock().take().is_some()
    }

    fn clear_if(&self, evaluator: &mut dyn ClearingEvaluator) -> bool {
        let mut state = self.state.lock();
        if !state.object_id.is_proper() || state.cached.is_none() {
            return false;
        }
        if !evaluator.needs_clearing(&state.snapshot()) {
            return false;
        }
        state.take().is_some()
    }
}

/// A lazily loaded reference to a persisted object.
///
/// A [`Lazy`] holds the [`ObjectId`] of the referenced object, the object itself when it is resident, and the
/// [`Loader`] to bring it back after it has been dropped. Clones share the same reference.
///
/// All operations on one reference are serialized by a per reference lock, so concurrent [`Lazy::get`] calls load
/// the object at most once, and [`Lazy::clear`] never interleaves with a load.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
///
/// use lazygraph_common::{code::ObjectId, error::Result};
/// use lazygraph_reference::Lazy;
///
/// let lazy = Lazy::stub(ObjectId::new(42), |_: ObjectId| -> Result<Arc<String>> {
///     Ok(Arc::new("hello".to_string()))
/// });
/// assert!(!lazy.is_loaded());
/// assert_eq!(lazy.get().unwrap().as_deref().map(String::as_str), Some("hello"));
/// assert!(lazy.is_loaded());
/// ```
pub struct Lazy<T> {
    inner: Arc<LazyInner<T>>,
}

impl<T> Clone for Lazy<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> Lazy<T>
where
    T: Send + Sync + 'static,
{
    fn with_state(state: State<T>) -> Self {
        Self {
            inner: Arc::new(LazyInner {
                state: Mutex::new(state),
            }),
        }
    }

    /// Wrap an in-memory value that has never been stored.
    pub fn reference(value: T) -> Self {
        Self::from_arc(Arc::new(value))
    }

    /// Wrap a shared in-memory value that has never been stored.
    pub fn from_arc(value: Arc<T>) -> Self {
        Self::with_state(State {
            object_id: ObjectId::UNASSIGNED,
            cached: Some(value),
            last_touched: Timestamp::now(),
            accesses: 0,
            loader: None,
        })
    }

    /// An explicit empty reference.
    pub fn empty() -> Self {
        Self::with_state(State {
            object_id: ObjectId::UNASSIGNED,
            cached: None,
            last_touched: Timestamp::MAX,
            accesses: 0,
            loader: None,
        })
    }

    /// A reference to the persisted object `object_id` that is not resident yet.
    pub fn stub(object_id: ObjectId, loader: impl Loader<T>) -> Self {
        Self::stub_shared(object_id, Arc::new(loader))
    }

    /// Like [`Lazy::stub`], with a loader shared by many references.
    pub fn stub_shared(object_id: ObjectId, loader: Arc<dyn Loader<T>>) -> Self {
        Self::with_state(State {
            object_id,
            cached: None,
            last_touched: Timestamp::MAX,
            accesses: 0,
            loader: Some(loader),
        })
    }

    /// Get the referenced object, loading it if it is not resident.
    ///
    /// Returns `None` for the persisted `null` and for empty references. Load errors are returned unchanged.
    pub fn get(&self) -> Result<Option<Arc<T>>> {
        let mut state = self.inner.state.lock();
        state.load()?;
        state.touch();
        Ok(state.cached.clone())
    }

    /// Get the referenced object if it is resident, without loading or touching it.
    pub fn peek(&self) -> Option<Arc<T>> {
        self.inner.state.lock().cached.clone()
    }

    /// Drop the resident object and return it.
    ///
    /// The identity is kept, so the object can be loaded again. A reference that has never been stored keeps its
    /// object, because nothing could load it again.
    pub fn clear(&self) -> Option<Arc<T>> {
        self.inner.state.lock().take()
    }

    /// Drop the resident object if the reference is stored, resident and `evaluator` agrees.
    pub fn clear_if(&self, mut evaluator: impl ClearingEvaluator) -> bool {
        self.inner.clear_if(&mut evaluator)
    }

    /// Returns `true` if reading the reference needs no load.
    ///
    /// Persisted `null`, empty and never stored references always count as loaded.
    pub fn is_loaded(&self) -> bool {
        Reference::is_loaded(self.inner.as_ref())
    }

    /// Returns `true` if the referenced object has been persisted.
    pub fn is_stored(&self) -> bool {
        self.inner.state.lock().object_id.is_proper()
    }

    /// Identity of the referenced object.
    pub fn object_id(&self) -> ObjectId {
        self.inner.state.lock().object_id
    }

    /// Last time the object has been loaded or accessed, [`Timestamp::MAX`] if it is not resident.
    pub fn last_touched(&self) -> Timestamp {
        self.inner.state.lock().last_touched
    }

    /// Mark the reference as accessed now.
    pub fn touch(&self) {
        self.inner.state.lock().touch();
    }

    /// Take a snapshot of the reference.
    pub fn state(&self) -> ReferenceState {
        self.inner.state.lock().snapshot()
    }

    /// Bind the reference to its persisted identity and install `loader`.
    ///
    /// Assigning an identity different from an already assigned one fails with
    /// [`ErrorKind::IdentityMismatch`](lazygraph_common::error::ErrorKind::IdentityMismatch) and leaves the
    /// reference untouched.
    pub fn link(&self, object_id: ObjectId, loader: Arc<dyn Loader<T>>) -> Result<()> {
        let mut state = self.inner.state.lock();
        if state.object_id.is_proper() && state.object_id != object_id {
            return Err(Error::identity_mismatch(state.object_id, object_id));
        }
        state.object_id = object_id;
        state.loader = Some(loader);
        Ok(())
    }

    /// Store the resident object of a never stored reference with `store`, and bind the reference to the returned
    /// identity and loader.
    ///
    /// `store` runs under the reference lock, so a reference shared by concurrently stored graphs is stored once.
    /// `store` must not access the same reference again.
    pub fn assign_with<F>(&self, store: F) -> Result<Assignment>
    where
        F: FnOnce(&T) -> Result<(ObjectId, Arc<dyn Loader<T>>)>,
    {
        let mut state = self.inner.state.lock();
        if state.object_id.is_assigned() {
            return Ok(Assignment::Existing(state.object_id));
        }
        let Some(value) = state.cached.clone() else {
            return Ok(Assignment::Empty);
        };
        let (object_id, loader) = store(value.as_ref())?;
        state.object_id = object_id;
        state.loader = Some(loader);
        Ok(Assignment::Assigned(object_id))
    }

    /// Replace the loader, e.g. after the session the reference has been loaded from was closed.
    pub fn set_loader(&self, loader: Arc<dyn Loader<T>>) {
        self.inner.state.lock().loader = Some(loader);
    }

    /// Run `f` on the referenced object without changing whether it stays resident.
    ///
    /// If the object had to be loaded for the visit, it is dropped again afterwards and the reference looks as if
    /// it had never been touched. `f` runs without holding the reference lock.
    pub fn inspect<R>(&self, f: impl FnOnce(Option<&T>) -> R) -> Result<R> {
        let (value, restore) = {
            let mut state = self.inner.state.lock();
            match state.cached.clone() {
                Some(value) => (Some(value), None),
                None => {
                    let last_touched = state.last_touched;
                    state.load()?;
                    state.touch();
                    (state.cached.clone(), Some((last_touched, state.accesses)))
                }
            }
        };

        let res = f(value.as_deref());

        if let (Some(loaded), Some((last_touched, accesses))) = (value, restore) {
            let mut state = self.inner.state.lock();
            // Accessed by someone else meanwhile, the value stays.
            if state.accesses == accesses && state.cached.as_ref().is_some_and(|cached| Arc::ptr_eq(cached, &loaded)) {
                state.cached = None;
                state.last_touched = last_touched;
            }
        }

        Ok(res)
    }

    /// Returns `true` if both point to the same reference.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn as_reference(&self) -> &dyn Reference {
        self.inner.as_ref()
    }

    pub(crate) fn downgrade(&self) -> Weak<dyn Reference> {
        Arc::downgrade(&self.inner) as Weak<dyn Reference>
    }

    /// Address of the shared reference, stable for its lifetime.
    pub(crate) fn addr(&self) -> usize {
        Arc::as_ptr(&self.inner) as *const () as usize
    }
}

impl<T> Debug for Lazy<T>
where
    T: Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("Lazy")
            .field("object_id", &state.object_id)
            .field("cached", &state.cached)
            .field("last_touched", &state.last_touched)
            .finish()
    }
}

impl<T> Display for Lazy<T>
where
    T: Display,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.lock();
        match &state.cached {
            Some(value) => write!(f, "{} {}", state.object_id, value),
            None => write!(f, "({} not loaded)", state.object_id),
        }
    }
}
