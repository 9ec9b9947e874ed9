/*
 *  Copyright 2025 Colliery Software
 *
 *  Licensed under the Apache License, Version 2.0 (the "License");
 *  you may not use this file except in compliance with the License.
 *  You may obtain a copy of the License at
 *
 *      http://www.apache.org/licenses/LICENSE-2.0
 *
 *  Unless required by applicable law or agreed to in writing, software
 *  distributed under the License is distributed on an "AS IS" BASIS,
 *  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 *  See the License for the specific language governing permissions and
 *  limitations under the License.
 */

//! Saved-values payload carried between tasks and persisted in the state store.
//!
//! A [`ValueMap`] is the recursive closure of null, boolean, integer,
//! floating-point, string, list, and string-keyed map — exactly what
//! `serde_json::Value` already represents, so we reuse it directly rather
//! than invent a parallel enum.

use std::collections::BTreeMap;

use serde_json::Value;

/// A single saved value. Enforced at insertion time to reject anything that
/// does not round-trip through JSON (e.g. NaN floats), since a non-serializable
/// value must surface as a commit failure rather than corrupt the store.
pub type SavedValue = Value;

/// The map of value-name to saved value a single task accumulates across its
/// action return maps, and the shape stored for it across runs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValueMap(BTreeMap<String, SavedValue>);

impl ValueMap {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    pub fn get(&self, name: &str) -> Option<&SavedValue> {
        self.0.get(name)
    }

    pub fn insert(&mut self, name: impl Into<String>, value: SavedValue) {
        self.0.insert(name.into(), value);
    }

    /// Merge another return map into this one. Later inserts win on key
    /// collision, matching the executor's left-to-right action ordering.
    pub fn merge(&mut self, other: ValueMap) {
        for (k, v) in other.0 {
            self.0.insert(k, v);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &SavedValue)> {
        self.0.iter()
    }

    /// Render the whole map as a single JSON object value, used when
    /// `getargs` requests `None` (the full map) or a group-task's
    /// sub-task-name → value mapping.
    pub fn as_json_object(&self) -> Value {
        Value::Object(self.0.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
    }

    pub fn from_json_object(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(Self(map.into_iter().collect())),
            _ => None,
        }
    }
}

impl From<ValueMap> for serde_json::Value {
    fn from(values: ValueMap) -> Self {
        values.as_json_object()
    }
}
