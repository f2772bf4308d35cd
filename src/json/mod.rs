//! Dynamic JSON document model.
//!
//! Responses decoded in JSON mode become a [`JsonValue`] tree navigated by
//! name and index, with no deserialization target type. Objects keep
//! insertion order so a parse/serialize round trip preserves member order.

mod reader;
mod ser;

pub use reader::parse_relaxed;

use crate::error::Result;

/// A node in a dynamic JSON document.
#[derive(Debug, Clone, PartialEq)]
pub enum JsonValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Array(JsonArray),
    Object(JsonObject),
}

impl JsonValue {
    /// Parse text in the relaxed JSON grammar (bare object keys, single- or
    /// double-quoted strings with standard backslash escapes).
    pub fn parse(text: &str) -> Result<JsonValue> {
        parse_relaxed(text)
    }

    /// Serialize to standard JSON text, preserving object member order.
    pub fn to_json_string(&self) -> String {
        // Serialization of this tree cannot fail: no non-string keys, no
        // non-finite floats are representable through the reader.
        serde_json::to_string(self).unwrap_or_default()
    }

    /// The string slice if this is a string value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            JsonValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// The integer if this is an integer value.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            JsonValue::Int(n) => Some(*n),
            _ => None,
        }
    }

    /// The number as a float if this is any numeric value.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            JsonValue::Int(n) => Some(*n as f64),
            JsonValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// The boolean if this is a boolean value.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            JsonValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// The object if this is an object node.
    pub fn as_object(&self) -> Option<&JsonObject> {
        match self {
            JsonValue::Object(o) => Some(o),
            _ => None,
        }
    }

    /// The array if this is an array node.
    pub fn as_array(&self) -> Option<&JsonArray> {
        match self {
            JsonValue::Array(a) => Some(a),
            _ => None,
        }
    }

    /// Returns true if this is the null value.
    pub fn is_null(&self) -> bool {
        matches!(self, JsonValue::Null)
    }

    /// Navigate to a named member of an object node.
    pub fn get(&self, name: &str) -> Option<&JsonValue> {
        self.as_object().and_then(|o| o.get(name))
    }

    /// Navigate to an indexed element of an array node.
    pub fn at(&self, index: usize) -> Option<&JsonValue> {
        self.as_array().and_then(|a| a.get(index))
    }
}

impl From<&str> for JsonValue {
    fn from(value: &str) -> Self {
        JsonValue::String(value.to_string())
    }
}

impl From<String> for JsonValue {
    fn from(value: String) -> Self {
        JsonValue::String(value)
    }
}

impl From<i64> for JsonValue {
    fn from(value: i64) -> Self {
        JsonValue::Int(value)
    }
}

impl From<f64> for JsonValue {
    fn from(value: f64) -> Self {
        JsonValue::Float(value)
    }
}

impl From<bool> for JsonValue {
    fn from(value: bool) -> Self {
        JsonValue::Bool(value)
    }
}

/// An insertion-ordered JSON object node.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JsonObject {
    members: Vec<(String, JsonValue)>,
}

impl JsonObject {
    /// Create an empty object.
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a member by name. Absence is explicit; there is no silent
    /// empty-value substitute.
    pub fn get(&self, name: &str) -> Option<&JsonValue> {
        self.members.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    /// Store a member, overwriting any existing one with the same name
    /// without disturbing its position.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<JsonValue>) {
        let name = name.into();
        let value = value.into();
        match self.members.iter_mut().find(|(n, _)| *n == name) {
            Some(member) => member.1 = value,
            None => self.members.push((name, value)),
        }
    }

    /// Remove a member, returning whether it existed.
    pub fn remove(&mut self, name: &str) -> bool {
        let before = self.members.len();
        self.members.retain(|(n, _)| n != name);
        self.members.len() != before
    }

    /// Returns true if a member with this name exists.
    pub fn contains_key(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Member count.
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Returns true if the object has no members.
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Iterate members in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &JsonValue)> {
        self.members.iter().map(|(n, v)| (n.as_str(), v))
    }
}

/// A JSON array node.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JsonArray {
    members: Vec<JsonValue>,
}

impl JsonArray {
    /// Create an empty array.
    pub fn new() -> Self {
        Self::default()
    }

    /// Indexed lookup.
    pub fn get(&self, index: usize) -> Option<&JsonValue> {
        self.members.get(index)
    }

    /// Indexed overwrite. Returns false if the index is out of bounds.
    pub fn set(&mut self, index: usize, value: impl Into<JsonValue>) -> bool {
        match self.members.get_mut(index) {
            Some(slot) => {
                *slot = value.into();
                true
            }
            None => false,
        }
    }

    /// Append a value.
    pub fn push(&mut self, value: impl Into<JsonValue>) {
        self.members.push(value.into());
    }

    /// Insert a value at `index`, shifting later elements.
    pub fn insert(&mut self, index: usize, value: impl Into<JsonValue>) {
        self.members.insert(index, value.into());
    }

    /// Position of the first element equal to `value`.
    pub fn index_of(&self, value: &JsonValue) -> Option<usize> {
        self.members.iter().position(|m| m == value)
    }

    /// Remove the first element equal to `value`, returning whether one was
    /// found.
    pub fn remove(&mut self, value: &JsonValue) -> bool {
        match self.index_of(value) {
            Some(index) => {
                self.members.remove(index);
                true
            }
            None => false,
        }
    }

    /// Remove the element at `index`.
    pub fn remove_at(&mut self, index: usize) -> JsonValue {
        self.members.remove(index)
    }

    /// Remove all elements.
    pub fn clear(&mut self) {
        self.members.clear();
    }

    /// Element count.
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Returns true if the array is empty.
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Positional iteration; restartable and finite.
    pub fn iter(&self) -> std::slice::Iter<'_, JsonValue> {
        self.members.iter()
    }
}

impl FromIterator<JsonValue> for JsonArray {
    fn from_iter<T: IntoIterator<Item = JsonValue>>(iter: T) -> Self {
        Self {
            members: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_insertion_order_and_overwrite() {
        let mut obj = JsonObject::new();
        obj.set("b", 2i64);
        obj.set("a", 1i64);
        obj.set("b", 3i64);

        let names: Vec<&str> = obj.iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["b", "a"]);
        assert_eq!(obj.get("b"), Some(&JsonValue::Int(3)));
        assert_eq!(obj.len(), 2);
    }

    #[test]
    fn test_object_get_absent_is_explicit() {
        let obj = JsonObject::new();
        assert!(obj.get("missing").is_none());
        assert!(!obj.contains_key("missing"));
    }

    #[test]
    fn test_object_remove() {
        let mut obj = JsonObject::new();
        obj.set("a", 1i64);
        assert!(obj.remove("a"));
        assert!(!obj.remove("a"));
        assert!(obj.is_empty());
    }

    #[test]
    fn test_array_operations() {
        let mut arr = JsonArray::new();
        arr.push(1i64);
        arr.push("two");
        arr.insert(1, true);

        assert_eq!(arr.len(), 3);
        assert_eq!(arr.get(1), Some(&JsonValue::Bool(true)));
        assert_eq!(arr.index_of(&JsonValue::String("two".into())), Some(2));

        assert!(arr.set(0, 10i64));
        assert!(!arr.set(99, 0i64));

        assert!(arr.remove(&JsonValue::Bool(true)));
        assert!(!arr.remove(&JsonValue::Bool(true)));

        let removed = arr.remove_at(0);
        assert_eq!(removed, JsonValue::Int(10));

        arr.clear();
        assert!(arr.is_empty());
    }

    #[test]
    fn test_array_iteration_restartable() {
        let arr: JsonArray = [1i64, 2, 3]
            .into_iter()
            .map(JsonValue::Int)
            .collect();

        let first: Vec<i64> = arr.iter().filter_map(JsonValue::as_i64).collect();
        let second: Vec<i64> = arr.iter().filter_map(JsonValue::as_i64).collect();
        assert_eq!(first, vec![1, 2, 3]);
        assert_eq!(first, second);
    }

    #[test]
    fn test_value_navigation() {
        let mut inner = JsonObject::new();
        inner.set("c", "x");

        let mut arr = JsonArray::new();
        arr.push(1i64);
        arr.push(JsonValue::Object(inner));

        let mut root = JsonObject::new();
        root.set("b", JsonValue::Array(arr));
        let value = JsonValue::Object(root);

        assert_eq!(
            value.get("b").and_then(|b| b.at(1)).and_then(|o| o.get("c")),
            Some(&JsonValue::String("x".into()))
        );
        assert!(value.get("nope").is_none());
    }
}
