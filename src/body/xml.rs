//! XML to JSON-tree conversion.
//!
//! Shapes follow the convention clients of this component already rely on:
//!
//! ```text
//! <a><b>1</b><b>2</b></a>            → {"a": {"b": "2"}}          (last sibling wins)
//! <a id="7">hi</a>                   → {"a": {"$": {"id": "7"}, "_": "hi"}}
//! <a><b/></a>                        → {"a": {"b": ""}}
//! ```
//!
//! Repeated siblings are never collected into arrays.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde_json::{Map, Value};
use thiserror::Error;

const ATTRS_KEY: &str = "$";
const TEXT_KEY: &str = "_";

#[derive(Debug, Error)]
pub enum XmlError {
    #[error("{0}")]
    Syntax(#[from] quick_xml::Error),

    #[error("invalid attribute: {0}")]
    Attribute(#[from] quick_xml::events::attributes::AttrError),

    #[error("unclosed element <{0}>")]
    Unclosed(String),

    #[error("unexpected content after root element")]
    TrailingContent,

    #[error("text outside of root element")]
    TextOutsideRoot,
}

struct Element {
    name: String,
    attrs: Map<String, Value>,
    children: Map<String, Value>,
    text: String,
}

impl Element {
    fn open(start: &BytesStart<'_>) -> Result<Self, XmlError> {
        let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
        let mut attrs = Map::new();
        for attr in start.attributes() {
            let attr = attr?;
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            let value = attr.unescape_value()?.into_owned();
            attrs.insert(key, Value::String(value));
        }
        Ok(Self {
            name,
            attrs,
            children: Map::new(),
            text: String::new(),
        })
    }

    fn close(self) -> (String, Value) {
        if self.attrs.is_empty() && self.children.is_empty() {
            return (self.name, Value::String(self.text));
        }

        let mut node = Map::new();
        if !self.attrs.is_empty() {
            node.insert(ATTRS_KEY.to_string(), Value::Object(self.attrs));
        }
        for (key, value) in self.children {
            node.insert(key, value);
        }
        if !self.text.is_empty() {
            node.insert(TEXT_KEY.to_string(), Value::String(self.text));
        }
        (self.name, Value::Object(node))
    }
}

/// Convert an XML document into a tree. Blank input yields an empty object.
pub fn xml_to_tree(input: &str) -> Result<Value, XmlError> {
    let mut root = Map::new();
    if input.trim().is_empty() {
        return Ok(Value::Object(root));
    }

    let mut reader = Reader::from_str(input);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<Element> = Vec::new();
    let mut seen_root = false;

    loop {
        match reader.read_event()? {
            Event::Start(start) => {
                if stack.is_empty() && seen_root {
                    return Err(XmlError::TrailingContent);
                }
                stack.push(Element::open(&start)?);
            }
            Event::Empty(start) => {
                if stack.is_empty() && seen_root {
                    return Err(XmlError::TrailingContent);
                }
                let element = Element::open(&start)?;
                attach(&mut stack, &mut root, &mut seen_root, element);
            }
            Event::End(_) => {
                // quick-xml checks end names against the open element.
                if let Some(element) = stack.pop() {
                    attach(&mut stack, &mut root, &mut seen_root, element);
                }
            }
            Event::Text(text) => {
                let text = text.unescape()?;
                match stack.last_mut() {
                    Some(element) => element.text.push_str(&text),
                    None if text.trim().is_empty() => {}
                    None => return Err(XmlError::TextOutsideRoot),
                }
            }
            Event::CData(data) => {
                let data = data.into_inner();
                match stack.last_mut() {
                    Some(element) => element.text.push_str(&String::from_utf8_lossy(&data)),
                    None => return Err(XmlError::TextOutsideRoot),
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if let Some(open) = stack.pop() {
        return Err(XmlError::Unclosed(open.name));
    }

    Ok(Value::Object(root))
}

fn attach(stack: &mut [Element], root: &mut Map<String, Value>, seen_root: &mut bool, element: Element) {
    let (name, value) = element.close();
    match stack.last_mut() {
        Some(parent) => {
            parent.children.insert(name, value);
        }
        None => {
            root.insert(name, value);
            *seen_root = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn repeated_siblings_keep_last() {
        let tree = xml_to_tree("<a><b>1</b><b>2</b></a>").unwrap();
        assert_eq!(tree, json!({"a": {"b": "2"}}));
    }

    #[test]
    fn attributes_sit_beside_children() {
        let tree = xml_to_tree(r#"<user id="7" role="admin"><name>Ann</name></user>"#).unwrap();
        assert_eq!(
            tree,
            json!({"user": {"$": {"id": "7", "role": "admin"}, "name": "Ann"}})
        );
    }

    #[test]
    fn text_with_attributes_goes_under_underscore() {
        let tree = xml_to_tree(r#"<msg lang="en">hi &amp; bye</msg>"#).unwrap();
        assert_eq!(tree, json!({"msg": {"$": {"lang": "en"}, "_": "hi & bye"}}));
    }

    #[test]
    fn empty_elements_become_empty_strings() {
        let tree = xml_to_tree("<?xml version=\"1.0\"?>\n<a><b/><c></c></a>").unwrap();
        assert_eq!(tree, json!({"a": {"b": "", "c": ""}}));
    }

    #[test]
    fn cdata_is_text() {
        let tree = xml_to_tree("<a><![CDATA[<raw>]]></a>").unwrap();
        assert_eq!(tree, json!({"a": "<raw>"}));
    }

    #[test]
    fn blank_input_is_empty_tree() {
        assert_eq!(xml_to_tree("  \n").unwrap(), json!({}));
    }

    #[test]
    fn malformed_documents_fail() {
        assert!(xml_to_tree("<a><b></a>").is_err());
        assert!(xml_to_tree("<a>").is_err());
        assert!(xml_to_tree("<a/><b/>").is_err());
        assert!(xml_to_tree("just text").is_err());
    }
}
