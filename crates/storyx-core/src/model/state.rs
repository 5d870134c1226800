//! Materialized entity state
//!
//! An [`EntityState`] maps field paths (`"name"`, `"traits.temper"`) to leaf
//! JSON values. `null` is never stored: a null value means the field is absent.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Separator between segments of a field path
pub const PATH_SEPARATOR: char = '.';

/// Serialized as a flat object keyed by field path. Deserialization goes
/// through [`EntityState::from_json`], so nested objects are flattened and
/// nulls are dropped.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(transparent)]
pub struct EntityState {
    fields: BTreeMap<String, Value>,
}

impl EntityState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, path: &str) -> Option<&Value> {
        self.fields.get(path)
    }

    /// Set `path` to `value`; a `null` value removes the field
    pub fn set(&mut self, path: impl Into<String>, value: Value) {
        let path = path.into();
        if value.is_null() {
            self.fields.remove(&path);
        } else {
            self.fields.insert(path, value);
        }
    }

    pub fn remove(&mut self, path: &str) -> Option<Value> {
        self.fields.remove(path)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.fields.contains_key(path)
    }

    /// Field paths in lexicographic order
    pub fn paths(&self) -> impl Iterator<Item = &String> {
        self.fields.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.fields.iter()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Flatten a nested JSON object into dotted field paths.
    ///
    /// Objects are descended into; arrays and scalars are leaves. Non-object
    /// input yields an empty state. Empty nested objects are kept as leaves
    /// so that `{}` is distinguishable from an absent field.
    pub fn from_json(value: &Value) -> Self {
        let mut state = Self::new();
        if let Value::Object(map) = value {
            flatten_into(&mut state, None, map);
        }
        state
    }

    /// Rebuild a nested JSON object from the dotted field paths
    pub fn to_json(&self) -> Value {
        let mut root = Map::new();
        for (path, value) in &self.fields {
            insert_path(&mut root, path, value.clone());
        }
        Value::Object(root)
    }
}

fn flatten_into(state: &mut EntityState, prefix: Option<&str>, map: &Map<String, Value>) {
    for (key, value) in map {
        let path = match prefix {
            Some(p) => format!("{}{}{}", p, PATH_SEPARATOR, key),
            None => key.clone(),
        };
        match value {
            Value::Object(inner) if !inner.is_empty() => flatten_into(state, Some(&path), inner),
            other => state.set(path, other.clone()),
        }
    }
}

fn insert_path(root: &mut Map<String, Value>, path: &str, value: Value) {
    let mut segments = path.split(PATH_SEPARATOR).peekable();
    let mut current = root;
    while let Some(segment) = segments.next() {
        if segments.peek().is_none() {
            current.insert(segment.to_string(), value);
            return;
        }
        if matches!(current.get(segment), Some(v) if !v.is_object()) {
            // A leaf already occupies this prefix; keep the longer path flat
            current.insert(path.to_string(), value);
            return;
        }
        current = match current
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()))
        {
            Value::Object(inner) => inner,
            _ => return,
        };
    }
}

impl<'de> Deserialize<'de> for EntityState {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let fields = Map::<String, Value>::deserialize(deserializer)?;
        Ok(Self::from_json(&Value::Object(fields)))
    }
}

impl FromIterator<(String, Value)> for EntityState {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        let mut state = Self::new();
        for (path, value) in iter {
            state.set(path, value);
        }
        state
    }
}

impl From<BTreeMap<String, Value>> for EntityState {
    fn from(fields: BTreeMap<String, Value>) -> Self {
        fields.into_iter().collect()
    }
}
