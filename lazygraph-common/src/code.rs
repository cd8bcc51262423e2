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

use std::fmt::{Debug, Display};

use serde::{Deserialize, Serialize};

/// Identifier of a persisted object.
///
/// Two values are reserved:
///
/// - [`ObjectId::NULL`] identifies a persisted `null`. Nothing has to be loaded for it.
/// - [`ObjectId::UNASSIGNED`] marks an object that has never been stored.
///
/// Every other value is a *proper* id handed out by the storage.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ObjectId(u64);

impl ObjectId {
    /// The persisted `null`.
    pub const NULL: Self = Self(0);
    /// Not yet assigned, the object has never been stored.
    pub const UNASSIGNED: Self = Self(u64::MAX);

    /// Wrap a raw id.
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Get the raw id.
    pub const fn raw(&self) -> u64 {
        self.0
    }

    /// Returns `true` if the id is neither [`ObjectId::NULL`] nor [`ObjectId::UNASSIGNED`].
    pub const fn is_proper(&self) -> bool {
        self.0 != Self::NULL.0 && self.0 != Self::UNASSIGNED.0
    }

    /// Returns `true` if the id is the persisted `null`.
    pub const fn is_null(&self) -> bool {
        self.0 == Self::NULL.0
    }

    /// Returns `true` if the id has been assigned by a store, including the persisted `null`.
    pub const fn is_assigned(&self) -> bool {
        self.0 != Self::UNASSIGNED.0
    }
}

impl Default for ObjectId {
    fn default() -> Self {
        Self::UNASSIGNED
    }
}

impl Display for ObjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            Self::UNASSIGNED => write!(f, "unassigned"),
            Self::NULL => write!(f, "null"),
            Self(raw) => write!(f, "{raw}"),
        }
    }
}

impl Debug for ObjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ObjectId({self})")
    }
}

impl From<u64> for ObjectId {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sentinels() {
        assert!(!ObjectId::NULL.is_proper());
        assert!(ObjectId::NULL.is_assigned());
        assert!(ObjectId::NULL.is_null());

        assert!(!ObjectId::UNASSIGNED.is_proper());
        assert!(!ObjectId::UNASSIGNED.is_assigned());

        assert!(ObjectId::new(42).is_proper());
        assert_eq!(ObjectId::default(), ObjectId::UNASSIGNED);
    }

    #[test]
    fn test_display() {
        assert_eq!(ObjectId::new(42).to_string(), "42");
        assert_eq!(ObjectId::NULL.to_string(), "null");
        assert_eq!(format!("{:?}", ObjectId::UNASSIGNED), "ObjectId(unassigned)");
    }
}
