//! Structural value equality for nodes that are deduplicated.
//!
//! A [`NodeKey`] is the canonical JSON of a node with its bookkeeping fields
//! cleared and object keys sorted. Keys are computed once, when a node is
//! inserted into a table, and are never recomputed; mutating the node later
//! does not move it.

use std::collections::HashMap;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::types::{Artifact, Location, LogicalLocation, ReportingDescriptor, ThreadFlowLocation};

/// Frozen structural identity of a node.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NodeKey(String);

impl NodeKey {
    /// Key of any serializable value, with object keys sorted.
    pub fn of<T: Serialize>(value: &T) -> Self {
        // Model types only have string map keys, so serialization cannot fail.
        let tree = serde_json::to_value(value).unwrap_or(Value::Null);
        NodeKey(canonical(&tree).to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn canonical(value: &Value) -> Value {
    match value {
        Value::Object(object) => {
            let mut entries: Vec<(&String, &Value)> = object.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            let sorted: Map<String, Value> = entries
                .into_iter()
                .map(|(k, v)| (k.clone(), canonical(v)))
                .collect();
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonical).collect()),
        other => other.clone(),
    }
}

/// Nodes with a value-equality identity.
pub trait ValueKeyed {
    fn node_key(&self) -> NodeKey;
}

impl ValueKeyed for Location {
    /// Everything but `id`.
    fn node_key(&self) -> NodeKey {
        let mut normalized = self.clone();
        normalized.id = None;
        NodeKey::of(&normalized)
    }
}

impl ValueKeyed for LogicalLocation {
    /// Every field, `index` included.
    fn node_key(&self) -> NodeKey {
        NodeKey::of(self)
    }
}

impl ValueKeyed for ThreadFlowLocation {
    /// Only the nested location counts. Execution order, timing and the
    /// table index are bookkeeping.
    fn node_key(&self) -> NodeKey {
        match &self.location {
            Some(location) => location.node_key(),
            None => NodeKey::of(&Value::Null),
        }
    }
}

impl ValueKeyed for Artifact {
    fn node_key(&self) -> NodeKey {
        NodeKey::of(self)
    }
}

impl ValueKeyed for ReportingDescriptor {
    fn node_key(&self) -> NodeKey {
        NodeKey::of(self)
    }
}

/// An append-only table that hands out the existing index for a value it
/// already holds.
#[derive(Debug, Clone)]
pub struct Deduplicated<T> {
    items: Vec<T>,
    positions: HashMap<NodeKey, usize>,
}

impl<T: ValueKeyed> Deduplicated<T> {
    pub fn new() -> Self {
        Self {
            items: Vec::new(),
            positions: HashMap::new(),
        }
    }

    /// Seed from an existing table. Every entry is kept, even duplicates;
    /// lookups resolve to the first occurrence.
    pub fn from_items(items: Vec<T>) -> Self {
        let mut positions = HashMap::with_capacity(items.len());
        for (i, item) in items.iter().enumerate() {
            positions.entry(item.node_key()).or_insert(i);
        }
        Self { items, positions }
    }

    /// Index of `item`'s value, appending it when new.
    /// The flag is `true` when the value was not present before.
    pub fn insert(&mut self, item: T) -> (usize, bool) {
        let key = item.node_key();
        if let Some(&index) = self.positions.get(&key) {
            return (index, false);
        }
        let index = self.items.len();
        self.items.push(item);
        self.positions.insert(key, index);
        (index, true)
    }

    pub fn position(&self, item: &T) -> Option<usize> {
        self.positions.get(&item.node_key()).copied()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn as_slice(&self) -> &[T] {
        &self.items
    }

    pub fn into_vec(self) -> Vec<T> {
        self.items
    }
}

impl<T: ValueKeyed> Default for Deduplicated<T> {
    fn default() -> Self {
        Self::new()
    }
}
