//! Dynamic XML document model.
//!
//! Responses decoded in XML mode become an [`XmlNode`] over an immutable
//! element tree. Before parsing, every `xmlns`/`xmlns:*` attribute is
//! stripped from the raw text so lookups are namespace-unaware and work on
//! local names alone.
//!
//! `get` resolves a name in a fixed order: the reserved pseudo-properties
//! `Name`/`Parent`/`Value`/`Nodes`/`Xml`, then an attribute of that name,
//! then a single child element (returned as scalar text when the child has
//! no sub-elements, as a nested node otherwise). First match wins, so an
//! attribute shadows a child element of the same name.

use std::sync::{Arc, LazyLock};

use quick_xml::escape::escape;
use quick_xml::events::Event;
use quick_xml::Reader;
use regex_lite::Regex;

use crate::error::{Error, ErrorKind, Result};

static XMLNS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"xmlns:?[^=]*="[^"]*""#).expect("xmlns pattern"));

/// Parse XML text into the root [`XmlNode`], stripping namespace
/// declarations first.
pub fn parse(text: &str) -> Result<XmlNode> {
    let stripped = strip_namespace_attributes(text);

    let mut reader = Reader::from_str(&stripped);
    reader.config_mut().trim_text(true);

    let mut elements: Vec<Element> = Vec::new();
    let mut stack: Vec<usize> = Vec::new();

    loop {
        let event = reader
            .read_event()
            .map_err(|e| Error::with_source(ErrorKind::Decode(format!("XML: {e}")), e))?;

        match event {
            Event::Start(start) => {
                let index = push_element(&mut elements, &stack, &start)?;
                stack.push(index);
            }
            Event::Empty(start) => {
                push_element(&mut elements, &stack, &start)?;
            }
            Event::End(_) => {
                stack.pop();
            }
            Event::Text(text) => {
                if let Some(&current) = stack.last() {
                    let decoded = text.unescape().map_err(|e| {
                        Error::with_source(ErrorKind::Decode(format!("XML text: {e}")), e)
                    })?;
                    elements[current].text.push_str(&decoded);
                }
            }
            Event::CData(cdata) => {
                if let Some(&current) = stack.last() {
                    elements[current]
                        .text
                        .push_str(&String::from_utf8_lossy(&cdata));
                }
            }
            Event::Eof => break,
            // Declarations, comments and processing instructions carry no
            // document content.
            _ => {}
        }
    }

    if elements.is_empty() {
        return Err(Error::new(ErrorKind::Decode(
            "XML: document has no root element".into(),
        )));
    }

    Ok(XmlNode {
        tree: Arc::new(XmlTree { elements }),
        index: 0,
    })
}

/// Remove every `xmlns="..."` / `xmlns:prefix="..."` attribute from raw
/// XML text, enabling local-name lookup without namespace handling.
pub(crate) fn strip_namespace_attributes(text: &str) -> String {
    XMLNS_RE.replace_all(text, "").into_owned()
}

fn push_element(
    elements: &mut Vec<Element>,
    stack: &[usize],
    start: &quick_xml::events::BytesStart<'_>,
) -> Result<usize> {
    let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();

    let mut attributes = Vec::new();
    for attr in start.attributes() {
        let attr =
            attr.map_err(|e| Error::with_source(ErrorKind::Decode(format!("XML: {e}")), e))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map_err(|e| Error::with_source(ErrorKind::Decode(format!("XML: {e}")), e))?
            .into_owned();
        attributes.push((key, value));
    }

    let parent = stack.last().copied();
    let index = elements.len();
    elements.push(Element {
        name,
        attributes,
        text: String::new(),
        parent,
        children: Vec::new(),
    });
    if let Some(parent) = parent {
        elements[parent].children.push(index);
    }
    Ok(index)
}

#[derive(Debug)]
struct Element {
    name: String,
    attributes: Vec<(String, String)>,
    text: String,
    parent: Option<usize>,
    children: Vec<usize>,
}

impl Element {
    fn local_name(&self) -> &str {
        self.name.rsplit(':').next().unwrap_or(&self.name)
    }
}

#[derive(Debug)]
struct XmlTree {
    elements: Vec<Element>,
}

/// The result of a dynamic lookup on an [`XmlNode`].
#[derive(Debug, Clone)]
pub enum XmlValue {
    /// Scalar text: an attribute, a leaf child element, or a pseudo-property.
    Text(String),
    /// A nested element node.
    Node(XmlNode),
    /// An ordered list of element nodes.
    List(XmlNodeList),
}

impl XmlValue {
    /// The text if this resolved to a scalar.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            XmlValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// The node if this resolved to a nested element.
    pub fn as_node(&self) -> Option<&XmlNode> {
        match self {
            XmlValue::Node(n) => Some(n),
            _ => None,
        }
    }

    /// The list if this resolved to a node list.
    pub fn as_list(&self) -> Option<&XmlNodeList> {
        match self {
            XmlValue::List(l) => Some(l),
            _ => None,
        }
    }
}

/// A single element in a parsed XML document.
#[derive(Debug, Clone)]
pub struct XmlNode {
    tree: Arc<XmlTree>,
    index: usize,
}

impl XmlNode {
    fn element(&self) -> &Element {
        &self.tree.elements[self.index]
    }

    fn node(&self, index: usize) -> XmlNode {
        XmlNode {
            tree: Arc::clone(&self.tree),
            index,
        }
    }

    /// Local element name.
    pub fn name(&self) -> &str {
        self.element().local_name()
    }

    /// Concatenated text content of the element.
    pub fn value(&self) -> &str {
        &self.element().text
    }

    /// Parent element, if this is not the root.
    pub fn parent(&self) -> Option<XmlNode> {
        self.element().parent.map(|index| self.node(index))
    }

    /// Direct child elements.
    pub fn nodes(&self) -> XmlNodeList {
        XmlNodeList {
            tree: Arc::clone(&self.tree),
            indices: self.element().children.clone(),
        }
    }

    /// An attribute value by local name.
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.element()
            .attributes
            .iter()
            .find(|(key, _)| key.rsplit(':').next().unwrap_or(key) == name)
            .map(|(_, value)| value.as_str())
    }

    /// Dynamic lookup: pseudo-properties, then attributes, then a single
    /// child element. First match wins.
    pub fn get(&self, name: &str) -> Option<XmlValue> {
        match name {
            "Name" => return Some(XmlValue::Text(self.name().to_string())),
            "Parent" => return self.parent().map(XmlValue::Node),
            "Value" => return Some(XmlValue::Text(self.value().to_string())),
            "Nodes" => return Some(XmlValue::List(self.nodes())),
            "Xml" => return Some(XmlValue::Text(self.xml())),
            _ => {}
        }

        if let Some(value) = self.attribute(name) {
            return Some(XmlValue::Text(value.to_string()));
        }

        let child = self
            .element()
            .children
            .iter()
            .copied()
            .find(|&index| self.tree.elements[index].local_name() == name)?;
        if self.tree.elements[child].children.is_empty() {
            Some(XmlValue::Text(self.tree.elements[child].text.clone()))
        } else {
            Some(XmlValue::Node(self.node(child)))
        }
    }

    /// All descendant elements in document order, optionally filtered by
    /// local name.
    pub fn select_all(&self, tag: Option<&str>) -> XmlNodeList {
        let mut indices = Vec::new();
        let mut pending: Vec<usize> = self
            .element()
            .children
            .iter()
            .rev()
            .copied()
            .collect();
        while let Some(index) = pending.pop() {
            if tag.is_none_or(|t| self.tree.elements[index].local_name() == t) {
                indices.push(index);
            }
            pending.extend(self.tree.elements[index].children.iter().rev().copied());
        }
        XmlNodeList {
            tree: Arc::clone(&self.tree),
            indices,
        }
    }

    /// Direct child elements, optionally filtered by local name.
    pub fn select_children(&self, tag: Option<&str>) -> XmlNodeList {
        let indices = self
            .element()
            .children
            .iter()
            .copied()
            .filter(|&index| tag.is_none_or(|t| self.tree.elements[index].local_name() == t))
            .collect();
        XmlNodeList {
            tree: Arc::clone(&self.tree),
            indices,
        }
    }

    /// Serialize this element and its subtree back to XML text.
    pub fn xml(&self) -> String {
        let mut out = String::new();
        self.write_element(self.index, &mut out);
        out
    }

    fn write_element(&self, index: usize, out: &mut String) {
        let element = &self.tree.elements[index];
        out.push('<');
        out.push_str(&element.name);
        for (key, value) in &element.attributes {
            out.push(' ');
            out.push_str(key);
            out.push_str("=\"");
            out.push_str(&escape(value.as_str()));
            out.push('"');
        }
        if element.text.is_empty() && element.children.is_empty() {
            out.push_str(" />");
            return;
        }
        out.push('>');
        if !element.text.is_empty() {
            out.push_str(&escape(element.text.as_str()));
        }
        for &child in &element.children {
            self.write_element(child, out);
        }
        out.push_str("</");
        out.push_str(&element.name);
        out.push('>');
    }
}

/// An ordered list of element nodes with indexed access and restartable
/// iteration.
#[derive(Debug, Clone)]
pub struct XmlNodeList {
    tree: Arc<XmlTree>,
    indices: Vec<usize>,
}

impl XmlNodeList {
    /// Number of nodes in the list.
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    /// Returns true if the list is empty.
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Indexed access, wrapping the element as a node.
    pub fn get(&self, index: usize) -> Option<XmlNode> {
        self.indices.get(index).map(|&element| XmlNode {
            tree: Arc::clone(&self.tree),
            index: element,
        })
    }

    /// Forward iteration over wrapped nodes.
    pub fn iter(&self) -> impl Iterator<Item = XmlNode> + '_ {
        self.indices.iter().map(|&element| XmlNode {
            tree: Arc::clone(&self.tree),
            index: element,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PHOTOS: &str = r#"<rsp stat="ok">
        <photos page="1" total="3">
            <photo id="p1" title="space needle"><views>10</views></photo>
            <photo id="p2" title="rainier" />
            <photo id="p3" title="market" />
        </photos>
    </rsp>"#;

    #[test]
    fn test_attribute_wins_over_child_element() {
        let root = parse(r#"<item id="1"><id>2</id></item>"#).unwrap();
        assert_eq!(root.get("id").unwrap().as_text(), Some("1"));
    }

    #[test]
    fn test_pseudo_properties() {
        let root = parse(PHOTOS).unwrap();
        assert_eq!(root.get("Name").unwrap().as_text(), Some("rsp"));
        assert!(root.get("Parent").is_none());

        let photos = root.get("photos").unwrap();
        let photos = photos.as_node().unwrap();
        assert_eq!(
            photos.get("Parent").unwrap().as_node().unwrap().name(),
            "rsp"
        );
        assert_eq!(photos.get("Nodes").unwrap().as_list().unwrap().len(), 3);
    }

    #[test]
    fn test_leaf_child_resolves_to_text() {
        let root = parse("<r><a>1</a><b><c>2</c></b></r>").unwrap();
        assert_eq!(root.get("a").unwrap().as_text(), Some("1"));
        // Child with sub-elements comes back as a nested node.
        let b = root.get("b").unwrap();
        assert_eq!(b.as_node().unwrap().get("c").unwrap().as_text(), Some("2"));
    }

    #[test]
    fn test_select_all_and_children() {
        let root = parse(PHOTOS).unwrap();

        let all_photos = root.select_all(Some("photo"));
        assert_eq!(all_photos.len(), 3);
        assert_eq!(all_photos.get(0).unwrap().attribute("title"), Some("space needle"));

        // Direct children of the root: only <photos>.
        let children = root.select_children(None);
        assert_eq!(children.len(), 1);
        assert_eq!(children.get(0).unwrap().name(), "photos");
        assert!(root.select_children(Some("photo")).is_empty());

        // All descendants, unfiltered, document order.
        let all = root.select_all(None);
        let names: Vec<String> = all.iter().map(|n| n.name().to_string()).collect();
        assert_eq!(names, vec!["photos", "photo", "views", "photo", "photo"]);
    }

    #[test]
    fn test_node_list_iteration_restartable() {
        let root = parse(PHOTOS).unwrap();
        let list = root.select_all(Some("photo"));
        assert_eq!(list.iter().count(), 3);
        assert_eq!(list.iter().count(), 3);
    }

    #[test]
    fn test_strip_namespace_attributes() {
        let text = r#"<feed xmlns="http://www.w3.org/2005/Atom" xmlns:media="http://search.yahoo.com/mrss/"><title>t</title></feed>"#;
        let stripped = strip_namespace_attributes(text);
        assert!(!stripped.contains("xmlns"));

        let root = parse(text).unwrap();
        assert_eq!(root.get("title").unwrap().as_text(), Some("t"));
    }

    #[test]
    fn test_xml_round_trip() {
        let root = parse(r#"<a x="1"><b>two &amp; three</b><c /></a>"#).unwrap();
        let text = root.xml();
        assert_eq!(text, r#"<a x="1"><b>two &amp; three</b><c /></a>"#);

        let reparsed = parse(&text).unwrap();
        assert_eq!(reparsed.get("b").unwrap().as_text(), Some("two & three"));
    }

    #[test]
    fn test_parse_error_is_decode_error() {
        let err = parse("<a><b></a>").unwrap_err();
        assert!(err.is_decode());
        let err = parse("   ").unwrap_err();
        assert!(err.is_decode());
    }
}
