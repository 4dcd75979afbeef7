//! Minimal XML element tree shared by every parser family.
//!
//! Upstream responses are plain element/text documents with no
//! namespaces, so a small tokenizer is enough: tags (with attributes and
//! dotted names such as `ALLLEDGERENTRIES.LIST`), text with numeric and
//! named entity references, comments, CDATA and processing instructions.

use crate::IngestError;
use crate::IngestResult;

#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    pub name: String,
    attributes: Vec<(String, String)>,
    pub children: Vec<Node>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Element(Element),
    Text(String),
}

impl Element {
    #[must_use]
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Concatenated direct text content, trimmed.
    #[must_use]
    pub fn text(&self) -> String {
        let mut out = String::new();
        for node in &self.children {
            if let Node::Text(text) = node {
                out.push_str(text);
            }
        }
        out.trim().to_string()
    }

    pub fn elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|node| match node {
            Node::Element(element) => Some(element),
            Node::Text(_) => None,
        })
    }

    /// First direct child element with the given tag name.
    #[must_use]
    pub fn child(&self, name: &str) -> Option<&Element> {
        self.elements().find(|element| element.name == name)
    }

    #[must_use]
    pub fn child_text(&self, name: &str) -> Option<String> {
        self.child(name).map(Element::text)
    }

    #[must_use]
    pub fn child_text_or(&self, name: &str, default: &str) -> String {
        self.child_text(name)
            .unwrap_or_else(|| default.to_string())
    }

    pub fn children_named<'a>(
        &'a self,
        name: &'a str,
    ) -> impl Iterator<Item = &'a Element> + 'a {
        self.elements().filter(move |element| element.name == name)
    }

    /// All descendant elements with the given tag name, document order.
    #[must_use]
    pub fn descendants(&self, name: &str) -> Vec<&Element> {
        let mut found = Vec::new();
        self.collect_descendants(name, &mut found);
        found
    }

    fn collect_descendants<'a>(&'a self, name: &str, found: &mut Vec<&'a Element>) {
        for element in self.elements() {
            if element.name == name {
                found.push(element);
            }
            element.collect_descendants(name, found);
        }
    }
}

/// Parse a full document and return its root element. The prolog,
/// comments and a DOCTYPE (if any) are skipped.
pub fn parse_document(input: &str) -> IngestResult<Element> {
    let mut parser = Parser {
        bytes: input.as_bytes(),
        input,
        pos: 0,
    };
    parser.skip_misc();
    let root = parser.parse_element()?;
    parser.skip_misc();
    if parser.pos < parser.bytes.len() {
        return Err(IngestError::Xml(format!(
            "trailing content after document root at byte {}",
            parser.pos
        )));
    }
    Ok(root)
}

struct Parser<'a> {
    bytes: &'a [u8],
    input: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn starts_with(&self, needle: &str) -> bool {
        self.input[self.pos..].starts_with(needle)
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.peek(), Some(b' ' | b'\t' | b'\r' | b'\n')) {
            self.pos += 1;
        }
    }

    fn skip_until(&mut self, needle: &str) -> IngestResult<()> {
        match self.input[self.pos..].find(needle) {
            Some(offset) => {
                self.pos += offset + needle.len();
                Ok(())
            }
            None => Err(IngestError::Xml(format!(
                "unterminated construct, expected {needle}"
            ))),
        }
    }

    /// Skip whitespace, the BOM, processing instructions, comments and a
    /// DOCTYPE declaration between elements of the document prolog.
    fn skip_misc(&mut self) {
        loop {
            if self.starts_with("\u{feff}") {
                self.pos += "\u{feff}".len();
                continue;
            }
            self.skip_whitespace();
            if self.starts_with("<?") {
                if self.skip_until("?>").is_err() {
                    self.pos = self.bytes.len();
                }
            } else if self.starts_with("<!--") {
                if self.skip_until("-->").is_err() {
                    self.pos = self.bytes.len();
                }
            } else if self.starts_with("<!DOCTYPE") {
                if self.skip_until(">").is_err() {
                    self.pos = self.bytes.len();
                }
            } else {
                return;
            }
        }
    }

    fn parse_name(&mut self) -> IngestResult<String> {
        let start = self.pos;
        while let Some(byte) = self.peek() {
            let ok = byte.is_ascii_alphanumeric()
                || matches!(byte, b'.' | b'_' | b'-' | b':')
                || byte >= 0x80;
            if !ok {
                break;
            }
            self.pos += 1;
        }
        if self.pos == start {
            return Err(IngestError::Xml(format!(
                "expected tag name at byte {start}"
            )));
        }
        Ok(self.input[start..self.pos].to_string())
    }

    fn parse_attributes(&mut self) -> IngestResult<Vec<(String, String)>> {
        let mut attributes = Vec::new();
        loop {
            self.skip_whitespace();
            match self.peek() {
                Some(b'>') | Some(b'/') | None => return Ok(attributes),
                _ => {}
            }
            let name = self.parse_name()?;
            self.skip_whitespace();
            if self.peek() != Some(b'=') {
                return Err(IngestError::Xml(format!(
                    "attribute {name} is missing '='"
                )));
            }
            self.pos += 1;
            self.skip_whitespace();
            let quote = match self.peek() {
                Some(q @ (b'"' | b'\'')) => q,
                _ => {
                    return Err(IngestError::Xml(format!(
                        "attribute {name} value is not quoted"
                    )));
                }
            };
            self.pos += 1;
            let start = self.pos;
            while let Some(byte) = self.peek() {
                if byte == quote {
                    break;
                }
                self.pos += 1;
            }
            if self.peek() != Some(quote) {
                return Err(IngestError::Xml(format!(
                    "unterminated value for attribute {name}"
                )));
            }
            let value = decode_entities(&self.input[start..self.pos]);
            self.pos += 1;
            attributes.push((name, value));
        }
    }

    fn parse_element(&mut self) -> IngestResult<Element> {
        if self.peek() != Some(b'<') {
            return Err(IngestError::Xml(format!(
                "expected '<' at byte {}",
                self.pos
            )));
        }
        self.pos += 1;
        let name = self.parse_name()?;
        let attributes = self.parse_attributes()?;
        self.skip_whitespace();
        if self.starts_with("/>") {
            self.pos += 2;
            return Ok(Element {
                name,
                attributes,
                children: Vec::new(),
            });
        }
        if self.peek() != Some(b'>') {
            return Err(IngestError::Xml(format!("unterminated open tag {name}")));
        }
        self.pos += 1;

        let mut children = Vec::new();
        loop {
            if self.pos >= self.bytes.len() {
                return Err(IngestError::Xml(format!(
                    "reached end of input inside <{name}>"
                )));
            }
            if self.starts_with("</") {
                self.pos += 2;
                let close = self.parse_name()?;
                if close != name {
                    return Err(IngestError::Xml(format!(
                        "mismatched close tag: expected </{name}>, found </{close}>"
                    )));
                }
                self.skip_whitespace();
                if self.peek() != Some(b'>') {
                    return Err(IngestError::Xml(format!("unterminated close tag {close}")));
                }
                self.pos += 1;
                return Ok(Element {
                    name,
                    attributes,
                    children,
                });
            }
            if self.starts_with("<!--") {
                self.skip_until("-->")?;
                continue;
            }
            if self.starts_with("<![CDATA[") {
                self.pos += "<![CDATA[".len();
                let start = self.pos;
                self.skip_until("]]>")?;
                let end = self.pos - "]]>".len();
                children.push(Node::Text(self.input[start..end].to_string()));
                continue;
            }
            if self.starts_with("<?") {
                self.skip_until("?>")?;
                continue;
            }
            if self.peek() == Some(b'<') {
                children.push(Node::Element(self.parse_element()?));
                continue;
            }
            let start = self.pos;
            while let Some(byte) = self.peek() {
                if byte == b'<' {
                    break;
                }
                self.pos += 1;
            }
            let raw = &self.input[start..self.pos];
            if !raw.is_empty() {
                children.push(Node::Text(decode_entities(raw)));
            }
        }
    }
}

/// Replace the five named entities and numeric character references.
/// Unrecognized references pass through verbatim; the upstream client has
/// already re-escaped stray ampersands before parsing.
#[must_use]
pub fn decode_entities(input: &str) -> String {
    if !input.contains('&') {
        return input.to_string();
    }
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(index) = rest.find('&') {
        out.push_str(&rest[..index]);
        rest = &rest[index..];
        let semicolon = rest.find(';').filter(|&end| {
            end > 1
                && end <= 12
                && rest[1..end]
                    .chars()
                    .all(|ch| ch.is_ascii_alphanumeric() || ch == '#')
        });
        let Some(end) = semicolon else {
            out.push('&');
            rest = &rest[1..];
            continue;
        };
        let entity = &rest[1..end];
        let decoded = match entity {
            "amp" => Some('&'),
            "lt" => Some('<'),
            "gt" => Some('>'),
            "quot" => Some('"'),
            "apos" => Some('\''),
            _ => entity
                .strip_prefix('#')
                .and_then(|digits| {
                    if let Some(hex) = digits.strip_prefix('x').or_else(|| digits.strip_prefix('X'))
                    {
                        u32::from_str_radix(hex, 16).ok()
                    } else {
                        digits.parse::<u32>().ok()
                    }
                })
                .and_then(char::from_u32),
        };
        match decoded {
            Some(ch) => {
                out.push(ch);
                rest = &rest[end + 1..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_nested_elements_with_dotted_names() {
        let doc = parse_document(
            "<ENVELOPE><VOUCHER ACTION=\"Create\"><GUID>g-1</GUID>\
             <ALLLEDGERENTRIES.LIST><LEDGERNAME>Cash</LEDGERNAME></ALLLEDGERENTRIES.LIST>\
             </VOUCHER></ENVELOPE>",
        )
        .expect("document parses");

        let voucher = doc.child("VOUCHER").expect("voucher child");
        assert_eq!(voucher.attr("ACTION"), Some("Create"));
        assert_eq!(voucher.child_text_or("GUID", ""), "g-1");
        let entries = voucher.descendants("ALLLEDGERENTRIES.LIST");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].child_text_or("LEDGERNAME", ""), "Cash");
    }

    #[test]
    fn skips_prolog_comments_and_cdata() {
        let doc = parse_document(
            "<?xml version=\"1.0\" encoding=\"utf-8\"?>\n<!-- header -->\n\
             <ROOT><NOTE><![CDATA[a < b & c]]></NOTE></ROOT>",
        )
        .expect("document parses");
        assert_eq!(doc.child_text_or("NOTE", ""), "a < b & c");
    }

    #[test]
    fn decodes_entities_in_text_and_attributes() {
        let doc = parse_document(
            "<ROOT NAME=\"A &amp; B\"><AMOUNT>-33.93 &#163; = &#63; 3568.76</AMOUNT></ROOT>",
        )
        .expect("document parses");
        assert_eq!(doc.attr("NAME"), Some("A & B"));
        assert_eq!(doc.child_text_or("AMOUNT", ""), "-33.93 £ = ? 3568.76");
    }

    #[test]
    fn self_closing_and_empty_elements() {
        let doc = parse_document("<ROOT><EMPTY/><BLANK></BLANK></ROOT>").expect("parses");
        assert!(doc.child("EMPTY").is_some());
        assert_eq!(doc.child_text_or("BLANK", "x"), "");
    }

    #[test]
    fn mismatched_close_tag_is_an_error() {
        let err = parse_document("<A><B></A></B>").expect_err("must fail");
        assert!(matches!(err, IngestError::Xml(_)));
    }

    #[test]
    fn descendants_are_document_ordered() {
        let doc = parse_document(
            "<R><L><NAME>one</NAME></L><NAME>two</NAME><X><NAME>three</NAME></X></R>",
        )
        .expect("parses");
        let names: Vec<String> = doc
            .descendants("NAME")
            .into_iter()
            .map(Element::text)
            .collect();
        assert_eq!(names, vec!["one", "two", "three"]);
    }

    #[test]
    fn unknown_entities_pass_through() {
        assert_eq!(decode_entities("a &nbsp; b"), "a &nbsp; b");
        assert_eq!(decode_entities("x &amp; y"), "x & y");
        assert_eq!(decode_entities("&#x41;"), "A");
    }
}
