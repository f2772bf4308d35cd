//! Response content modes and the decoded document.

use bytes::Bytes;

use crate::error::Result;
use crate::json::{self, JsonValue};
use crate::xml::{self, XmlNode};

/// How response bodies are decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentMode {
    /// Parse the body with the relaxed JSON grammar.
    Json,
    /// Strip namespace declarations and wrap the root XML element.
    Xml,
    /// Return the raw body bytes untouched.
    Binary,
}

/// A decoded response document.
#[derive(Debug, Clone)]
pub enum Document {
    Json(JsonValue),
    Xml(XmlNode),
    Bytes(Bytes),
}

impl Document {
    /// The JSON tree if this was decoded in JSON mode.
    pub fn as_json(&self) -> Option<&JsonValue> {
        match self {
            Document::Json(value) => Some(value),
            _ => None,
        }
    }

    /// The XML root node if this was decoded in XML mode.
    pub fn as_xml(&self) -> Option<&XmlNode> {
        match self {
            Document::Xml(node) => Some(node),
            _ => None,
        }
    }

    /// The raw bytes if this was a binary-mode response.
    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            Document::Bytes(bytes) => Some(bytes),
            _ => None,
        }
    }
}

/// Decode a response body according to the content mode.
///
/// Decode failures surface as [`ErrorKind::Decode`](crate::ErrorKind::Decode)
/// instead of being silently replaced with an absent value, so "unparseable
/// body" stays distinguishable from "field not present".
pub fn decode(mode: ContentMode, body: Bytes) -> Result<Document> {
    match mode {
        ContentMode::Json => {
            let text = std::str::from_utf8(&body).map_err(|e| {
                crate::Error::with_source(
                    crate::ErrorKind::Decode(format!("body is not UTF-8: {e}")),
                    e,
                )
            })?;
            json::parse_relaxed(text).map(Document::Json)
        }
        ContentMode::Xml => {
            let text = std::str::from_utf8(&body).map_err(|e| {
                crate::Error::with_source(
                    crate::ErrorKind::Decode(format!("body is not UTF-8: {e}")),
                    e,
                )
            })?;
            xml::parse(text).map(Document::Xml)
        }
        ContentMode::Binary => Ok(Document::Bytes(body)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_json_mode() {
        let doc = decode(ContentMode::Json, Bytes::from_static(b"{a: 1}")).unwrap();
        assert_eq!(
            doc.as_json().and_then(|v| v.get("a")).and_then(JsonValue::as_i64),
            Some(1)
        );
        assert!(doc.as_xml().is_none());
    }

    #[test]
    fn test_decode_xml_mode() {
        let doc = decode(ContentMode::Xml, Bytes::from_static(b"<r ok=\"1\" />")).unwrap();
        let node = doc.as_xml().unwrap();
        assert_eq!(node.attribute("ok"), Some("1"));
    }

    #[test]
    fn test_decode_binary_mode_untouched() {
        let body = Bytes::from_static(&[0xFF, 0x00, 0x7F]);
        let doc = decode(ContentMode::Binary, body.clone()).unwrap();
        assert_eq!(doc.as_bytes(), Some(&body));
    }

    #[test]
    fn test_decode_failure_is_surfaced() {
        let err = decode(ContentMode::Json, Bytes::from_static(b"{a:")).unwrap_err();
        assert!(err.is_decode());

        let err = decode(ContentMode::Xml, Bytes::from_static(b"<a><b></a>")).unwrap_err();
        assert!(err.is_decode());
    }
}
