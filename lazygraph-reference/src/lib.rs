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

//! Lazy references for lazygraph.
//!
//! A [`Lazy`] reference points to a persisted object that may or may not be resident in memory. The
//! [`ReferenceManager`] tracks lazy references and periodically drops the values of idle ones, so object graphs
//! larger than the available memory can stay reachable.
//!
//! [`Lazy`]: crate::lazy::Lazy
//! [`ReferenceManager`]: crate::manager::ReferenceManager

mod checker;
mod controller;
mod global;
mod lazy;
mod loader;
mod manager;
mod traverse;

/// Utilities for testing.
#[cfg(any(test, feature = "test_utils"))]
pub mod test_utils;

mod prelude;
pub use prelude::*;
