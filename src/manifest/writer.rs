//! Streaming manifest writer.
//!
//! Section containers (`files`, `accounts`, ...) are opened and closed
//! explicitly; each entity inside them is built as a small [`Node`], written
//! at once and dropped.

use std::io::Write;

use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};

use super::N_EXPORT;
use crate::error::{Error, Result};

/// An element with attributes, optional text and children.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pub name: &'static str,
    pub attributes: Vec<(&'static str, String)>,
    pub text: Option<String>,
    pub children: Vec<Node>,
}

impl Node {
    #[must_use]
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            attributes: Vec::new(),
            text: None,
            children: Vec::new(),
        }
    }

    /// A text-only element.
    #[must_use]
    pub fn leaf(name: &'static str, text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::new(name)
        }
    }

    #[must_use]
    pub fn attr(mut self, key: &'static str, value: impl Into<String>) -> Self {
        self.attributes.push((key, value.into()));
        self
    }

    #[must_use]
    pub fn child(mut self, node: Node) -> Self {
        self.children.push(node);
        self
    }

    pub fn push(&mut self, node: Node) {
        self.children.push(node);
    }

    pub fn push_leaf(&mut self, name: &'static str, text: impl Into<String>) {
        self.children.push(Self::leaf(name, text));
    }

    /// Add a container only if it ended up with children.
    pub fn push_nonempty(&mut self, node: Node) {
        if !node.children.is_empty() {
            self.children.push(node);
        }
    }
}

/// Writes a manifest document incrementally.
pub struct ManifestWriter<W: Write> {
    writer: Writer<W>,
    open: Vec<&'static str>,
}

impl<W: Write> ManifestWriter<W> {
    /// Write the XML declaration and open the root element.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying writer fails.
    pub fn new(inner: W) -> Result<Self> {
        let mut writer = Writer::new_with_indent(inner, b' ', 2);
        writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
        let mut this = Self {
            writer,
            open: Vec::new(),
        };
        this.open(N_EXPORT)?;
        Ok(this)
    }

    /// Open a section container.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying writer fails.
    pub fn open(&mut self, name: &'static str) -> Result<()> {
        self.writer
            .write_event(Event::Start(BytesStart::new(name)))?;
        self.open.push(name);
        Ok(())
    }

    /// Close the innermost open section.
    ///
    /// # Errors
    ///
    /// Returns an error if nothing is open or the writer fails.
    pub fn close(&mut self) -> Result<()> {
        let name = self
            .open
            .pop()
            .ok_or_else(|| Error::Export("no open manifest section".into()))?;
        self.writer.write_event(Event::End(BytesEnd::new(name)))?;
        Ok(())
    }

    /// Write one node and everything below it.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying writer fails.
    pub fn write(&mut self, node: &Node) -> Result<()> {
        let mut start = BytesStart::new(node.name);
        for (key, value) in &node.attributes {
            start.push_attribute((*key, value.as_str()));
        }

        let text = node.text.as_deref().unwrap_or_default();
        if node.children.is_empty() && text.is_empty() {
            self.writer.write_event(Event::Empty(start))?;
            return Ok(());
        }

        self.writer.write_event(Event::Start(start))?;
        if !text.is_empty() {
            self.writer.write_event(Event::Text(BytesText::new(text)))?;
        }
        for child in &node.children {
            self.write(child)?;
        }
        self.writer
            .write_event(Event::End(BytesEnd::new(node.name)))?;
        Ok(())
    }

    /// Close every open element, including the root, and return the sink.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying writer fails.
    pub fn finish(mut self) -> Result<W> {
        while !self.open.is_empty() {
            self.close()?;
        }
        let mut inner = self.writer.into_inner();
        inner.flush()?;
        Ok(inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::{Element, Rule, walk};

    #[test]
    fn test_written_manifest_reads_back() {
        let mut writer = ManifestWriter::new(Vec::new()).unwrap();
        writer.open("files").unwrap();
        let mut file = Node::new("file").child(Node::leaf("source", "a & <b>.html"));
        let mut props = Node::new("properties");
        props.push(Node::new("property").attr("type", "shared").child(Node::leaf("name", "Title")));
        file.push_nonempty(props);
        file.push_nonempty(Node::new("relations"));
        writer.write(&file).unwrap();
        let bytes = writer.finish().unwrap();
        let xml = String::from_utf8(bytes).unwrap();

        assert!(xml.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>"));
        assert!(!xml.contains("<relations"));
        assert!(xml.trim_end().ends_with("</export>"));

        fn on_source(out: &mut Vec<String>, e: &Element) -> Result<()> {
            out.push(e.text().to_string());
            Ok(())
        }
        fn on_name(out: &mut Vec<String>, e: &Element) -> Result<()> {
            out.push(e.text().to_string());
            Ok(())
        }
        type Handler = fn(&mut Vec<String>, &Element) -> Result<()>;
        let rules: &[Rule<Handler>] = &[
            Rule::leave("export/files/file/source", on_source),
            Rule::leave("export/files/file/properties/property/name", on_name),
        ];
        let mut seen = Vec::new();
        walk(xml.as_bytes(), rules, |h, e| h(&mut seen, e)).unwrap();
        assert_eq!(seen, vec!["a & <b>.html", "Title"]);
    }

    #[test]
    fn test_close_without_open_section() {
        let mut writer = ManifestWriter::new(Vec::new()).unwrap();
        writer.close().unwrap();
        assert!(writer.close().is_err());
    }
}
