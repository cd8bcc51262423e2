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

use crate::manager::ReferenceManager;

/// A lifecycle participant of a [`ReferenceManager`].
///
/// Controllers let several independent persistence sessions share one manager and its sweep thread. The manager
/// only holds controllers weakly: a dropped controller stops counting as a participant.
///
/// While no controller has ever been added, the manager may always run. Afterwards it may only run as long as at
/// least one live controller allows it.
pub trait Controller: Send + Sync + 'static {
    /// Whether the manager is allowed to run.
    fn may_run(&self, manager: &ReferenceManager) -> bool {
        let _ = manager;
        true
    }

    /// Called after the manager has started its sweep thread.
    fn on_start(&self, manager: &ReferenceManager) {
        let _ = manager;
    }

    /// Called after the manager has stopped its sweep thread.
    fn on_stop(&self, manager: &ReferenceManager) {
        let _ = manager;
    }
}
