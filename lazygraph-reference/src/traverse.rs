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

use std::{any::Any, collections::HashSet};

use lazygraph_common::error::Result;

use crate::lazy::Lazy;

/// An object whose outgoing references can be walked by a [`GraphTraverser`].
pub trait Traverse: Any + Send + Sync {
    /// Hand every object directly referenced by `self` to `traverser`.
    ///
    /// Lazily referenced objects must go through [`GraphTraverser::visit_lazy`], so they do not stay resident.
    fn traverse(&self, traverser: &mut GraphTraverser<'_>) -> Result<()>;
}

/// How a [`GraphTraverser`] treats lazy references whose object is not resident.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TraversalMode {
    /// Skip objects that are not resident.
    #[default]
    Resident,
    /// Load objects that are not resident, and drop them again after the visit.
    Full,
}

/// Walks an object graph and hands every reachable object to an acceptor.
///
/// A walk never changes which objects stay resident. Each lazy reference is followed at most once per walk, which
/// also breaks reference cycles.
pub struct GraphTraverser<'a> {
    mode: TraversalMode,
    /// Addresses of followed references.
    visited: HashSet<usize>,
    /// Followed references, kept alive for the walk so their addresses are not reused by references created later.
    followed: Vec<Box<dyn Any + Send + Sync>>,
    acceptor: &'a mut dyn FnMut(&dyn Any),
}

impl std::fmt::Debug for GraphTraverser<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphTraverser")
            .field("mode", &self.mode)
            .field("visited", &self.visited.len())
            .finish()
    }
}

impl<'a> GraphTraverser<'a> {
    /// Create a traverser handing visited objects to `acceptor`.
    pub fn new(mode: TraversalMode, acceptor: &'a mut dyn FnMut(&dyn Any)) -> Self {
        Self {
            mode,
            visited: HashSet::new(),
            followed: vec![],
            acceptor,
        }
    }

    /// Walk the graph reachable from `root`, `root` included.
    pub fn traverse_root<T>(&mut self, root: &T) -> Result<()>
    where
        T: Traverse,
    {
        self.visit(root)
    }

    /// Accept `value` and walk its references.
    pub fn visit<T>(&mut self, value: &T) -> Result<()>
    where
        T: Traverse,
    {
        (self.acceptor)(value);
        value.traverse(self)
    }

    /// Follow `lazy` according to the traversal mode.
    pub fn visit_lazy<T>(&mut self, lazy: &Lazy<T>) -> Result<()>
    where
        T: Traverse,
    {
        if !self.visited.insert(lazy.addr()) {
            return Ok(());
        }
        self.followed.push(Box::new(lazy.clone()));
        match self.mode {
            TraversalMode::Resident => match lazy.peek() {
                Some(value) => self.visit(value.as_ref()),
                None => Ok(()),
            },
            TraversalMode::Full => lazy.inspect(|value| match value {
                Some(value) => self.visit(value),
                None => Ok(()),
            })?,
        }
    }

    /// Number of lazy references followed so far.
    pub fn followed(&self) -> usize {
        self.followed.len()
    }
}
