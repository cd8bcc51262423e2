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

//! The process wide [`ReferenceManager`].

use std::sync::LazyLock;

use lazygraph_common::error::Result;
use parking_lot::RwLock;

use crate::manager::ReferenceManager;

static GLOBAL: LazyLock<RwLock<ReferenceManager>> = LazyLock::new(|| RwLock::new(ReferenceManager::default()));

/// Get the process wide reference manager.
///
/// A manager with the default config is created on first access. It is not started.
pub fn get() -> ReferenceManager {
    GLOBAL.read().clone()
}

/// Replace the process wide reference manager with `manager` and return the previous one.
///
/// References and controllers of the previous manager are registered to `manager` first, so nothing tracked gets
/// lost. The previous manager keeps running if it was.
pub fn set(manager: ReferenceManager) -> Result<ReferenceManager> {
    let mut global = GLOBAL.write();
    if global.ptr_eq(&manager) {
        return Ok(manager);
    }
    manager.register_all(&global)?;
    let previous = std::mem::replace(&mut *global, manager);
    tracing::debug!(
        "[reference manager]: Global manager replaced, {} -> {}.",
        previous.name(),
        global.name()
    );
    Ok(previous)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use lazygraph_common::code::ObjectId;

    use super::*;
    use crate::{controller::Controller, lazy::Lazy, test_utils::CountingLoader};

    struct Participant;

    impl Controller for Participant {}

    #[test_log::test]
    fn test_set_migrates_tracked_references() {
        let loader = Arc::new(CountingLoader::new());
        loader.insert(ObjectId::new(1), 1u64);
        let lazy = Lazy::stub_shared(ObjectId::new(1), loader.clone());

        let participant = Arc::new(Participant);
        let first = get();
        first.register(&lazy);
        first.add_controller(&participant);

        let replacement = ReferenceManager::builder().with_name("replacement").build().unwrap();
        let previous = set(replacement.clone()).unwrap();
        assert!(previous.ptr_eq(&first));
        assert!(get().ptr_eq(&replacement));

        let mut migrated = false;
        replacement.iterate(|reference| migrated |= reference.object_id() == ObjectId::new(1));
        assert!(migrated);
        let mut controllers = 0;
        replacement.iterate_controllers(|_| controllers += 1);
        assert_eq!(controllers, 1);

        // Setting the current manager again is a no-op.
        let same = set(replacement.clone()).unwrap();
        assert!(same.ptr_eq(&replacement));
        assert!(get().ptr_eq(&replacement));
    }
}
