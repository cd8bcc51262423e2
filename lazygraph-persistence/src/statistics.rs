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

//! [`Statistics`] are read back by tests and sessions to sense what the storage has been asked to do. They are
//! exact, unlike metrics which are only exported.

use std::sync::atomic::{AtomicUsize, Ordering};

/// Operation counters of a storage.
#[derive(Debug, Default)]
pub struct Statistics {
    /// Objects written.
    pub writes: AtomicUsize,
    /// Objects read, failed reads included.
    pub reads: AtomicUsize,
    /// Bytes written.
    pub written_bytes: AtomicUsize,
}

impl Statistics {
    /// Objects written so far.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::Relaxed)
    }

    /// Objects read so far.
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::Relaxed)
    }

    /// Bytes written so far.
    pub fn written_bytes(&self) -> usize {
        self.written_bytes.load(Ordering::Relaxed)
    }
}
