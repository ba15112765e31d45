// DBGp Client - Remote Script Debugger
// Copyright (C) 2024 Zhuo Zhang and Wuqi Zhang
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Minimal element tree for engine responses.
//!
//! Responses are small documents that are inspected by name and attribute,
//! so they are parsed once into an owned tree of [`Element`]s.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use quick_xml::{events::Event, Reader};

use crate::error::ProtocolError;

/// One element of a response document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Element {
    /// Local name, without namespace prefix
    pub name: String,
    /// Attributes in document order, keys as written (`xdebug:foo` keeps its prefix)
    pub attributes: Vec<(String, String)>,
    /// Child elements in document order
    pub children: Vec<Element>,
    /// Character data (text and CDATA) directly inside the element
    pub text: String,
}

impl Element {
    /// Parses a document and returns its root element.
    pub fn parse(xml: &str) -> Result<Self, ProtocolError> {
        let mut reader = Reader::from_str(xml);
        let mut stack: Vec<Self> = Vec::new();
        let mut root = None;
        let mut buf = Vec::new();

        loop {
            let event = reader
                .read_event_into(&mut buf)
                .map_err(|e| ProtocolError::Parse(format!("{e} at byte {}", reader.error_position())))?;

            match event {
                Event::Start(ref e) => stack.push(Self::open(e)),
                Event::Empty(ref e) => {
                    let element = Self::open(e);
                    Self::close(&mut stack, &mut root, element)?;
                }
                Event::End(_) => {
                    let mut element = stack
                        .pop()
                        .ok_or_else(|| ProtocolError::Parse("unexpected closing tag".to_string()))?;
                    if !element.children.is_empty() {
                        element.text = element.text.trim().to_string();
                    }
                    Self::close(&mut stack, &mut root, element)?;
                }
                Event::Text(ref e) => {
                    if let Some(top) = stack.last_mut() {
                        top.text.push_str(&String::from_utf8_lossy(e));
                    }
                }
                Event::CData(ref e) => {
                    if let Some(top) = stack.last_mut() {
                        top.text.push_str(&String::from_utf8_lossy(e));
                    }
                }
                Event::GeneralRef(ref e) => {
                    if let Some(top) = stack.last_mut() {
                        let name = String::from_utf8_lossy(e);
                        top.text.push_str(&resolve_entity(&name));
                    }
                }
                Event::Eof => break,
                _ => {}
            }
            buf.clear();
        }

        if !stack.is_empty() {
            return Err(ProtocolError::Parse("unclosed element".to_string()));
        }
        root.ok_or_else(|| ProtocolError::Parse("empty document".to_string()))
    }

    fn open(e: &quick_xml::events::BytesStart<'_>) -> Self {
        let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
        let attributes = e
            .attributes()
            .flatten()
            .map(|attr| {
                let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
                let value = unescape_xml(&String::from_utf8_lossy(&attr.value));
                (key, value)
            })
            .collect();
        Self { name, attributes, ..Default::default() }
    }

    fn close(
        stack: &mut [Self],
        root: &mut Option<Self>,
        element: Self,
    ) -> Result<(), ProtocolError> {
        match stack.last_mut() {
            Some(parent) => parent.children.push(element),
            None if root.is_none() => *root = Some(element),
            None => return Err(ProtocolError::Parse("multiple root elements".to_string())),
        }
        Ok(())
    }

    /// Value of an attribute.
    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attributes.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
    }

    /// Value of a required attribute.
    pub fn require_attr(&self, key: &'static str) -> Result<&str, ProtocolError> {
        self.attr(key).ok_or_else(|| ProtocolError::MissingAttribute {
            element: self.name.clone(),
            attribute: key,
        })
    }

    /// First child with the given name.
    pub fn child(&self, name: &str) -> Option<&Self> {
        self.children.iter().find(|c| c.name == name)
    }

    /// All children with the given name.
    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Self> + 'a {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// Text content, base64-decoded when the element says `encoding="base64"`.
    ///
    /// Undecodable base64 is returned as-is.
    pub fn decoded_text(&self) -> String {
        if self.attr("encoding") == Some("base64") {
            let compact: String = self.text.split_whitespace().collect();
            if let Ok(bytes) = BASE64.decode(compact.as_bytes()) {
                return String::from_utf8_lossy(&bytes).into_owned();
            }
        }
        self.text.clone()
    }
}

/// Unescape the 5 predefined XML entities and numeric character references.
fn unescape_xml(s: &str) -> String {
    if !s.contains('&') {
        return s.to_string();
    }

    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let after = &rest[amp + 1..];
        match after.find(';') {
            Some(semi) => {
                out.push_str(&resolve_entity(&after[..semi]));
                rest = &after[semi + 1..];
            }
            None => {
                out.push('&');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

fn resolve_entity(name: &str) -> String {
    match name {
        "amp" => "&".to_string(),
        "lt" => "<".to_string(),
        "gt" => ">".to_string(),
        "quot" => "\"".to_string(),
        "apos" => "'".to_string(),
        _ => {
            let code = if let Some(hex) = name.strip_prefix("#x").or_else(|| name.strip_prefix("#X")) {
                u32::from_str_radix(hex, 16).ok()
            } else {
                name.strip_prefix('#').and_then(|dec| dec.parse::<u32>().ok())
            };
            match code.and_then(char::from_u32) {
                Some(c) => c.to_string(),
                None => format!("&{name};"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_nested_tree() {
        let xml = r#"<?xml version="1.0" encoding="iso-8859-1"?>
<response xmlns="urn:debugger_protocol_v1" xmlns:xdebug="https://xdebug.org/dbgp/xdebug" command="stack_get" transaction_id="4">
    <stack where="{main}" level="0" type="file" filename="file:///a.php" lineno="3"></stack>
    <stack where="f" level="1" type="file" filename="file:///b.php" lineno="9"/>
</response>"#;
        let root = Element::parse(xml).unwrap();
        assert_eq!(root.name, "response");
        assert_eq!(root.attr("transaction_id"), Some("4"));
        assert_eq!(root.attr("xmlns:xdebug"), Some("https://xdebug.org/dbgp/xdebug"));
        assert_eq!(root.children_named("stack").count(), 2);
        assert_eq!(root.children[1].attr("where"), Some("f"));
        assert_eq!(root.text, "");
    }

    #[test]
    fn test_namespaced_child_uses_local_name() {
        let xml = r#"<response><error code="5"><xdebug:message>not &lt;here&gt;</xdebug:message></error></response>"#;
        let root = Element::parse(xml).unwrap();
        let message = root.child("error").and_then(|e| e.child("message")).unwrap();
        assert_eq!(message.text, "not <here>");
    }

    #[test]
    fn test_text_keeps_spaces_around_entities() {
        let root = Element::parse("<m>a &amp; b &#65;&#x42;</m>").unwrap();
        assert_eq!(root.text, "a & b AB");
    }

    #[test]
    fn test_attribute_entities() {
        let root = Element::parse(r#"<p fullname="$a[&quot;k&quot;]" name="x&amp;y"/>"#).unwrap();
        assert_eq!(root.attr("fullname"), Some("$a[\"k\"]"));
        assert_eq!(root.attr("name"), Some("x&y"));
    }

    #[test]
    fn test_base64_text() {
        let root = Element::parse(r#"<property encoding="base64"><![CDATA[aGVsbG8gd29ybGQ=]]></property>"#)
            .unwrap();
        assert_eq!(root.decoded_text(), "hello world");

        let plain = Element::parse("<property>raw</property>").unwrap();
        assert_eq!(plain.decoded_text(), "raw");
    }

    #[test]
    fn test_malformed_documents() {
        assert!(Element::parse("").is_err());
        assert!(Element::parse("<a><b></a>").is_err());
        assert!(Element::parse("<a>").is_err());
        assert!(Element::parse("<a/><b/>").is_err());
    }

    #[test]
    fn test_require_attr() {
        let root = Element::parse("<init appid=\"1\"/>").unwrap();
        assert_eq!(root.require_attr("appid").unwrap(), "1");
        assert_eq!(
            root.require_attr("fileuri"),
            Err(ProtocolError::MissingAttribute { element: "init".to_string(), attribute: "fileuri" })
        );
    }

    #[test]
    fn test_unescape_helper() {
        assert_eq!(unescape_xml("plain"), "plain");
        assert_eq!(unescape_xml("a &unknown; b & c"), "a &unknown; b & c");
    }
}
