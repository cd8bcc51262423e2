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

use bytes::{BufMut, Bytes, BytesMut};
use lazygraph_common::error::{Error, Result};
use serde::{de::DeserializeOwned, Serialize};

/// Encodes persisted objects.
#[derive(Debug)]
pub struct EntrySerializer;

impl EntrySerializer {
    /// Encode `value` into a fresh buffer.
    pub fn serialize<V>(value: &V) -> Result<Bytes>
    where
        V: Serialize,
    {
        let mut buffer = BytesMut::new().writer();
        bincode::serialize_into(&mut buffer, value).map_err(Error::from)?;
        Ok(buffer.into_inner().freeze())
    }
}

/// Decodes persisted objects.
#[derive(Debug)]
pub struct EntryDeserializer;

impl EntryDeserializer {
    /// Decode a value encoded by [`EntrySerializer::serialize`].
    pub fn deserialize<V>(buffer: &[u8]) -> Result<V>
    where
        V: DeserializeOwned,
    {
        bincode::deserialize(buffer).map_err(Error::from)
    }
}
