//! Typed data tree produced by reconciliation
//!
//! [`VariableSet`] is the storage shape: an ordered mapping from component
//! key to [`Variable`]. [`WireDocument`] is the untyped client-facing shape.

use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};

/// One value in a [`VariableSet`]
#[derive(Debug, Clone, PartialEq)]
pub enum Variable {
    /// Scalar or opaque JSON value of a simple component
    Leaf(Value),
    /// Value of a container component
    Container(VariableSet),
    /// Rows of an array component
    Array(Vec<Variable>),
}

impl Variable {
    /// Convert into plain JSON
    pub fn to_value(&self) -> Value {
        match self {
            Self::Leaf(value) => value.clone(),
            Self::Container(set) => Value::Object(set.to_map()),
            Self::Array(rows) => Value::Array(rows.iter().map(Self::to_value).collect()),
        }
    }

    /// Untyped conversion: objects become containers, arrays become rows
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(map) => Self::Container(VariableSet::from(map)),
            Value::Array(items) => Self::Array(items.into_iter().map(Self::from_value).collect()),
            other => Self::Leaf(other),
        }
    }

    /// Nested set when this is a container
    pub const fn as_container(&self) -> Option<&VariableSet> {
        match self {
            Self::Container(set) => Some(set),
            _ => None,
        }
    }

    /// Rows when this is an array
    pub fn as_array(&self) -> Option<&[Self]> {
        match self {
            Self::Array(rows) => Some(rows),
            _ => None,
        }
    }
}

impl Serialize for Variable {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Leaf(value) => value.serialize(serializer),
            Self::Container(set) => set.serialize(serializer),
            Self::Array(rows) => {
                let mut seq = serializer.serialize_seq(Some(rows.len()))?;
                for row in rows {
                    seq.serialize_element(row)?;
                }
                seq.end()
            }
        }
    }
}

/// Ordered mapping from component key to value
///
/// Keys keep insertion order; equality ignores order.
#[derive(Debug, Clone, Default)]
pub struct VariableSet {
    entries: Vec<(String, Variable)>,
}

impl VariableSet {
    /// Create an empty set
    pub const fn new() -> Self { Self { entries: Vec::new() } }

    /// Value stored under `key`
    pub fn get(&self, key: &str) -> Option<&Variable> {
        self.entries
            .iter()
            .find(|(existing, _)| existing == key)
            .map(|(_, variable)| variable)
    }

    /// Store `variable` under `key`, replacing an existing value in place
    pub fn insert(&mut self, key: impl Into<String>, variable: Variable) {
        let key = key.into();
        if let Some(slot) = self.entries.iter_mut().find(|(existing, _)| *existing == key) {
            slot.1 = variable;
        } else {
            self.entries.push((key, variable));
        }
    }

    /// Entries in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Variable)> {
        self.entries.iter().map(|(key, variable)| (key.as_str(), variable))
    }

    /// Number of entries
    pub fn len(&self) -> usize { self.entries.len() }

    /// Whether the set has no entries
    pub fn is_empty(&self) -> bool { self.entries.is_empty() }

    /// Convert into a plain JSON object
    pub fn to_map(&self) -> Map<String, Value> {
        self.entries
            .iter()
            .map(|(key, variable)| (key.clone(), variable.to_value()))
            .collect()
    }

    /// Convert into a plain JSON value
    pub fn to_value(&self) -> Value { Value::Object(self.to_map()) }
}

impl PartialEq for VariableSet {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len()
            && self
                .iter()
                .all(|(key, variable)| other.get(key) == Some(variable))
    }
}

impl From<Map<String, Value>> for VariableSet {
    fn from(map: Map<String, Value>) -> Self {
        Self {
            entries: map
                .into_iter()
                .map(|(key, value)| (key, Variable::from_value(value)))
                .collect(),
        }
    }
}

impl FromIterator<(String, Variable)> for VariableSet {
    fn from_iter<I: IntoIterator<Item = (String, Variable)>>(iter: I) -> Self {
        let mut set = Self::new();
        for (key, variable) in iter {
            set.insert(key, variable);
        }
        set
    }
}

impl Serialize for VariableSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, variable) in &self.entries {
            map.serialize_entry(key, variable)?;
        }
        map.end()
    }
}

/// Client-facing data object, with array rows possibly row-wrapped
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WireDocument(pub Map<String, Value>);

impl WireDocument {
    /// Create an empty document
    pub fn new() -> Self { Self::default() }

    /// Borrow the underlying object
    pub const fn as_map(&self) -> &Map<String, Value> { &self.0 }

    /// Take the underlying object
    pub fn into_inner(self) -> Map<String, Value> { self.0 }

    /// Value stored under `key`
    pub fn get(&self, key: &str) -> Option<&Value> { self.0.get(key) }

    /// Convert into a plain JSON value
    pub fn into_value(self) -> Value { Value::Object(self.0) }
}

impl From<Map<String, Value>> for WireDocument {
    fn from(map: Map<String, Value>) -> Self { Self(map) }
}
