//! serde serialization for the dynamic JSON model.
//!
//! Only the serialize side goes through serde: the relaxed reader owns
//! parsing, while output is standard JSON produced by serde_json with
//! object member order preserved.

use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};

use crate::json::{JsonArray, JsonObject, JsonValue};

impl Serialize for JsonValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            JsonValue::Null => serializer.serialize_unit(),
            JsonValue::Bool(b) => serializer.serialize_bool(*b),
            JsonValue::Int(n) => serializer.serialize_i64(*n),
            JsonValue::Float(f) => serializer.serialize_f64(*f),
            JsonValue::String(s) => serializer.serialize_str(s),
            JsonValue::Array(a) => a.serialize(serializer),
            JsonValue::Object(o) => o.serialize(serializer),
        }
    }
}

impl Serialize for JsonObject {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.len()))?;
        for (name, value) in self.iter() {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

impl Serialize for JsonArray {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.len()))?;
        for value in self.iter() {
            seq.serialize_element(value)?;
        }
        seq.end()
    }
}
