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

/// Materializes persisted objects by their [`ObjectId`].
///
/// A loader is scoped to one persistence session. It may be called concurrently for different ids. Once its session
/// has been closed, it must fail with [`ErrorKind::SessionClosed`] instead of returning stale data.
///
/// Any `Fn(ObjectId) -> Result<Arc<T>>` closure is a loader.
///
/// [`ErrorKind::SessionClosed`]: lazygraph_common::error::ErrorKind::SessionClosed
pub trait Loader<T>: Send + Sync + 'static {
    /// Load the object identified by `object_id`.
    fn fetch(&self, object_id: ObjectId) -> Result<Arc<T>>;
}

impl<T, F> Loader<T> for F
where
    F: Fn(ObjectId) -> Result<Arc<T>> + Send + Sync + 'static,
{
    fn fetch(&self, object_id: ObjectId) -> Result<Arc<T>> {
        self(object_id)
    }
}
