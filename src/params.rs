//! Parameter values and the shared parameter bag.
//!
//! Parameters carry everything a request needs beyond the operation name:
//! template token values, query-string entries, and POST form fields. A
//! [`Params`] set keeps insertion order and unique keys; [`SharedParams`] is
//! the bag a [`RestClient`](crate::RestClient) shares by reference with
//! every proxy derived from it by navigation.

use std::sync::{Arc, Mutex};

/// A single parameter value.
///
/// `Callback` is an opaque marker carried for call-site bookkeeping; it is
/// never serialized into a URI or a form body.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    /// Text value.
    Text(String),
    /// Integer value.
    Int(i64),
    /// Floating point value.
    Float(f64),
    /// Boolean value.
    Bool(bool),
    /// Sequence of text members, serialized joined with a literal `+`.
    TextList(Vec<String>),
    /// Nested parameter set, flattened one level as `name.child=value`.
    Nested(Params),
    /// Callback marker, skipped during serialization.
    Callback,
}

impl ParamValue {
    /// Invariant string rendering of a scalar value, used for both template
    /// token substitution and query-string values.
    ///
    /// Text-sequence members are joined with a literal `+`; nested sets and
    /// callback markers have no scalar rendering and yield `None`.
    pub(crate) fn render(&self) -> Option<String> {
        match self {
            ParamValue::Text(s) => Some(s.clone()),
            ParamValue::Int(n) => Some(n.to_string()),
            ParamValue::Float(f) => Some(f.to_string()),
            ParamValue::Bool(b) => Some(b.to_string()),
            ParamValue::TextList(members) => Some(members.join("+")),
            ParamValue::Nested(_) | ParamValue::Callback => None,
        }
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        ParamValue::Text(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        ParamValue::Text(value)
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        ParamValue::Int(value)
    }
}

impl From<i32> for ParamValue {
    fn from(value: i32) -> Self {
        ParamValue::Int(value.into())
    }
}

impl From<u32> for ParamValue {
    fn from(value: u32) -> Self {
        ParamValue::Int(value.into())
    }
}

impl From<f64> for ParamValue {
    fn from(value: f64) -> Self {
        ParamValue::Float(value)
    }
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        ParamValue::Bool(value)
    }
}

impl From<Vec<String>> for ParamValue {
    fn from(value: Vec<String>) -> Self {
        ParamValue::TextList(value)
    }
}

impl From<Vec<&str>> for ParamValue {
    fn from(value: Vec<&str>) -> Self {
        ParamValue::TextList(value.into_iter().map(str::to_string).collect())
    }
}

impl From<Params> for ParamValue {
    fn from(value: Params) -> Self {
        ParamValue::Nested(value)
    }
}

/// An ordered name→value parameter set with unique keys.
///
/// `set` overwrites in place, so iteration order is first-insertion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Params {
    entries: Vec<(String, ParamValue)>,
}

impl Params {
    /// Create an empty parameter set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a value, overwriting any existing entry with the same name.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<ParamValue>) {
        let name = name.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((name, value)),
        }
    }

    /// Chainable `set`, convenient when building invocation arguments.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.set(name, value);
        self
    }

    /// Look up a value by name.
    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.entries.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    /// Returns true if the set holds an entry with this name.
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Remove an entry, returning whether it existed.
    pub fn remove(&mut self, name: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(n, _)| n != name);
        self.entries.len() != before
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the set is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParamValue)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v))
    }

    /// Overlay `other` onto a copy of this set; entries from `other` win on
    /// key collisions and keep their own relative order at the tail.
    pub(crate) fn overlaid_with(&self, other: &Params) -> Params {
        let mut merged = self.clone();
        for (name, value) in other.iter() {
            merged.set(name, value.clone());
        }
        merged
    }
}

/// Parameter bag shared by reference across a navigation chain.
///
/// Every proxy derived from the same root [`RestClient`](crate::RestClient)
/// aliases one bag: a `set` through any of them is visible to all. Two
/// in-flight invocations mutating the same bag concurrently are the
/// caller's race to manage; the bag itself only guarantees that individual
/// operations do not tear.
#[derive(Debug, Clone, Default)]
pub struct SharedParams {
    inner: Arc<Mutex<Params>>,
}

impl SharedParams {
    /// Create an empty shared bag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a value into the bag.
    pub fn set(&self, name: impl Into<String>, value: impl Into<ParamValue>) {
        self.inner.lock().expect("params lock").set(name, value);
    }

    /// Look up a value by name, cloned out of the bag.
    pub fn get(&self, name: &str) -> Option<ParamValue> {
        self.inner.lock().expect("params lock").get(name).cloned()
    }

    /// Snapshot the current contents.
    pub fn snapshot(&self) -> Params {
        self.inner.lock().expect("params lock").clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_overwrites_in_place() {
        let mut params = Params::new();
        params.set("a", 1);
        params.set("b", 2);
        params.set("a", 3);

        assert_eq!(params.len(), 2);
        assert_eq!(params.get("a"), Some(&ParamValue::Int(3)));

        let order: Vec<&str> = params.iter().map(|(n, _)| n).collect();
        assert_eq!(order, vec!["a", "b"]);
    }

    #[test]
    fn test_render_scalars() {
        assert_eq!(ParamValue::from("seattle").render().as_deref(), Some("seattle"));
        assert_eq!(ParamValue::from(7).render().as_deref(), Some("7"));
        assert_eq!(ParamValue::from(2.5).render().as_deref(), Some("2.5"));
        assert_eq!(ParamValue::from(true).render().as_deref(), Some("true"));
        assert_eq!(
            ParamValue::from(vec!["Web", "Image"]).render().as_deref(),
            Some("Web+Image")
        );
        assert_eq!(ParamValue::Callback.render(), None);
        assert_eq!(ParamValue::Nested(Params::new()).render(), None);
    }

    #[test]
    fn test_shared_bag_aliasing() {
        let bag = SharedParams::new();
        let alias = bag.clone();

        alias.set("apiKey", "k-123");
        assert_eq!(bag.get("apiKey"), Some(ParamValue::Text("k-123".into())));

        bag.set("apiKey", "k-456");
        assert_eq!(alias.get("apiKey"), Some(ParamValue::Text("k-456".into())));
    }

    #[test]
    fn test_overlay_invocation_wins() {
        let mut bag = Params::new();
        bag.set("apiKey", "k");
        bag.set("format", "json");

        let args = Params::new().with("format", "xml").with("tags", "seattle");
        let merged = bag.overlaid_with(&args);

        assert_eq!(merged.get("apiKey"), Some(&ParamValue::Text("k".into())));
        assert_eq!(merged.get("format"), Some(&ParamValue::Text("xml".into())));
        assert_eq!(merged.get("tags"), Some(&ParamValue::Text("seattle".into())));
    }
}
