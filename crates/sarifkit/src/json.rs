//! Helpers for editing a log as a generic JSON tree.
//!
//! Old logs frequently do not deserialize into the current model, so the
//! upgrader edits [`serde_json::Value`] trees directly. Every helper reports
//! whether it changed anything; callers OR those flags together.

use serde_json::{Map, Value};

/// Editing operations on a JSON object.
pub trait ObjectExt {
    /// Move the value at `from` to `to`. Returns `false` when `from` is absent.
    fn rename(&mut self, from: &str, to: &str) -> bool;

    /// Remove `key`. Returns `false` when it was absent.
    fn remove_present(&mut self, key: &str) -> bool;

    /// Set `key` to the string `value` unless it already holds exactly that.
    fn set_if_different(&mut self, key: &str, value: &str) -> bool;

    /// The string at `key`, if there is one.
    fn string(&self, key: &str) -> Option<&str>;
}

impl ObjectExt for Map<String, Value> {
    fn rename(&mut self, from: &str, to: &str) -> bool {
        match self.shift_remove(from) {
            Some(value) => {
                self.insert(to.to_string(), value);
                true
            }
            None => false,
        }
    }

    fn remove_present(&mut self, key: &str) -> bool {
        self.shift_remove(key).is_some()
    }

    fn set_if_different(&mut self, key: &str, value: &str) -> bool {
        if self.string(key) == Some(value) {
            return false;
        }
        self.insert(key.to_string(), Value::String(value.to_string()));
        true
    }

    fn string(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }
}

/// The objects inside the array at `object[key]`, skipping non-objects.
pub fn objects_in<'a>(
    object: &'a mut Map<String, Value>,
    key: &str,
) -> impl Iterator<Item = &'a mut Map<String, Value>> {
    object
        .get_mut(key)
        .and_then(Value::as_array_mut)
        .into_iter()
        .flatten()
        .filter_map(Value::as_object_mut)
}

/// Apply `action` to every object reached by `path`, starting at `node`.
///
/// Segments are separated by `.`; a segment ending in `[]` fans out over the
/// array stored under that name. An empty path applies `action` to `node`
/// itself. Missing or mistyped intermediate nodes are skipped.
///
/// ```
/// use sarifkit::v1::json::{for_each_object, ObjectExt};
/// use serde_json::json;
///
/// let mut run = json!({ "results": [ { "locations": [ { "id": 1 }, { "id": 2 } ] } ] });
/// let changed = for_each_object(&mut run, "results[].locations[]", &mut |loc| loc.remove_present("id"));
/// assert!(changed);
/// assert_eq!(run, json!({ "results": [ { "locations": [ {}, {} ] } ] }));
/// ```
pub fn for_each_object<F>(node: &mut Value, path: &str, action: &mut F) -> bool
where
    F: FnMut(&mut Map<String, Value>) -> bool,
{
    let Some(object) = node.as_object_mut() else {
        return false;
    };
    if path.is_empty() {
        return action(object);
    }

    let (head, rest) = path.split_once('.').unwrap_or((path, ""));

    if let Some(name) = head.strip_suffix("[]") {
        let Some(Value::Array(items)) = object.get_mut(name) else {
            return false;
        };
        let mut changed = false;
        for item in items {
            changed |= for_each_object(item, rest, action);
        }
        changed
    } else {
        match object.get_mut(head) {
            Some(child) => for_each_object(child, rest, action),
            None => false,
        }
    }
}
