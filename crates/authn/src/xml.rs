//! Minimal XML tree used by the login-response parser and the SOAP codec.
//!
//! Documents are parsed into a small element tree with namespace prefixes
//! stripped from element names. Mixed content is not preserved: an element's
//! text is the concatenation of its direct text and CDATA nodes.

use quick_xml::{
    Reader,
    events::{BytesStart, Event},
};
use serde_json::{Map, Value};

/// A parsed XML element.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct XmlElement {
    /// Local name (prefix stripped).
    pub name: String,
    /// Attributes by local name, in document order.
    pub attributes: Vec<(String, String)>,
    /// Child elements in document order.
    pub children: Vec<XmlElement>,
    /// Concatenated text content, trimmed.
    pub text: String,
}

impl XmlElement {
    /// First direct child named `name`.
    pub fn child(&self, name: &str) -> Option<&XmlElement> {
        self.children.iter().find(|c| c.name == name)
    }

    /// Value of the attribute named `name`.
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.iter().find(|(k, _)| k == name).map(|(_, v)| v.as_str())
    }

    /// Depth-first search for the first descendant named `name`.
    pub fn find(&self, name: &str) -> Option<&XmlElement> {
        self.children.iter().find_map(|c| if c.name == name { Some(c) } else { c.find(name) })
    }

    /// Converts the element's content into a JSON value.
    ///
    /// Leaves become strings, elements with children become objects, and
    /// repeated child names become arrays.
    pub fn to_json(&self) -> Value {
        if self.children.is_empty() {
            return Value::String(self.text.clone());
        }

        let mut object = Map::new();
        for child in &self.children {
            let value = child.to_json();
            match object.get_mut(&child.name) {
                Some(Value::Array(items)) => items.push(value),
                Some(existing) => {
                    let first = existing.take();
                    *existing = Value::Array(vec![first, value]);
                },
                None => {
                    object.insert(child.name.clone(), value);
                },
            }
        }
        Value::Object(object)
    }
}

/// Parses `input` and returns its root element.
pub(crate) fn parse(input: &str) -> Result<XmlElement, String> {
    let mut reader = Reader::from_str(input);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<XmlElement> = Vec::new();
    let mut root: Option<XmlElement> = None;

    loop {
        match reader.read_event().map_err(|e| format!("at byte {}: {e}", reader.error_position()))? {
            Event::Start(start) => stack.push(open(&start)?),
            Event::Empty(start) => {
                let element = open(&start)?;
                close(element, &mut stack, &mut root)?;
            },
            Event::End(_) => {
                let element = stack.pop().ok_or("unbalanced closing tag")?;
                close(element, &mut stack, &mut root)?;
            },
            Event::Text(text) => {
                let text = text.unescape().map_err(|e| e.to_string())?;
                append_text(&mut stack, &text);
            },
            Event::CData(data) => {
                let data = String::from_utf8_lossy(&data).into_owned();
                append_text(&mut stack, data.trim());
            },
            Event::Eof => break,
            _ => {},
        }
    }

    if !stack.is_empty() {
        return Err("unexpected end of document".into());
    }
    root.ok_or_else(|| "document has no root element".into())
}

fn open(start: &BytesStart<'_>) -> Result<XmlElement, String> {
    let name = String::from_utf8_lossy(start.local_name().as_ref()).into_owned();
    let mut attributes = Vec::new();
    for attribute in start.attributes() {
        let attribute = attribute.map_err(|e| e.to_string())?;
        let key = String::from_utf8_lossy(attribute.key.local_name().as_ref()).into_owned();
        let value = attribute.unescape_value().map_err(|e| e.to_string())?.into_owned();
        attributes.push((key, value));
    }
    Ok(XmlElement { name, attributes, ..XmlElement::default() })
}

fn close(
    element: XmlElement,
    stack: &mut [XmlElement],
    root: &mut Option<XmlElement>,
) -> Result<(), String> {
    match stack.last_mut() {
        Some(parent) => parent.children.push(element),
        None if root.is_none() => *root = Some(element),
        None => return Err("multiple root elements".into()),
    }
    Ok(())
}

fn append_text(stack: &mut [XmlElement], text: &str) {
    if let Some(current) = stack.last_mut() {
        current.text.push_str(text);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_strips_prefixes_and_unescapes() {
        let root = parse(
            r#"<?xml version="1.0"?>
            <soap:Envelope xmlns:soap="http://schemas.xmlsoap.org/soap/envelope/">
              <soap:Body><ns1:reply ns1:id="7">a &amp; b</ns1:reply></soap:Body>
            </soap:Envelope>"#,
        )
        .unwrap();

        assert_eq!(root.name, "Envelope");
        let reply = root.find("reply").unwrap();
        assert_eq!(reply.text, "a & b");
        assert_eq!(reply.attribute("id"), Some("7"));
    }

    #[test]
    fn test_cdata_is_text() {
        let root = parse("<a><![CDATA[<b>not a tag</b>]]></a>").unwrap();
        assert_eq!(root.text, "<b>not a tag</b>");
        assert!(root.children.is_empty());
    }

    #[test]
    fn test_to_json_groups_repeated_children() {
        let root = parse("<r><item>1</item><item>2</item><item>3</item><one>x</one></r>").unwrap();
        assert_eq!(root.to_json(), json!({"item": ["1", "2", "3"], "one": "x"}));
    }

    #[test]
    fn test_empty_element_is_empty_string() {
        let root = parse("<r><empty/></r>").unwrap();
        assert_eq!(root.to_json(), json!({"empty": ""}));
    }

    #[test]
    fn test_rejects_truncated_document() {
        assert!(parse("<a><b>").is_err());
        assert!(parse("").is_err());
    }

    #[test]
    fn test_rejects_multiple_roots() {
        assert!(parse("<a/><b/>").is_err());
    }
}
