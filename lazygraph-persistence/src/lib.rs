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

//! Persistence glue for lazygraph.
//!
//! Lazy references are persisted as [`LazyRecord`]s. A [`Session`] stores objects into a [`Storage`], resolves
//! records back into lazy references bound to it, and keeps the shared reference manager running while it is open.

mod record;
mod serde;
mod session;
mod statistics;
mod storage;

mod prelude;
pub use prelude::*;
