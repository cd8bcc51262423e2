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

//! lazygraph keeps object graphs larger than memory reachable through lazy references.
//!
//! A [`Lazy`] reference loads its object on first access. A [`ReferenceManager`] tracks lazy references and
//! drops the objects of idle ones in the background. A [`Session`] persists objects into a [`Storage`] and binds
//! lazy references to it.

mod prelude;
pub use prelude::*;
