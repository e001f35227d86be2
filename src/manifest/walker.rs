//! Rule-table driven streaming manifest reader.
//!
//! Each dialect describes what it understands as a static table of
//! [`Rule`]s, one per element path, each carrying typed handlers. The walker
//! keeps only the stack of open elements, so memory stays flat however many
//! entities a manifest holds. Elements without a rule are skipped, which
//! keeps readers tolerant of additions made by newer producers.
//!
//! The walker does not call handlers itself; it hands each one to a
//! dispatch closure together with the element. That lets a table hold plain
//! function pointers over a state type that borrows its collaborators.

use std::collections::HashMap;
use std::io::BufRead;

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

use crate::error::{Error, Result};

/// What to do when the walker enters or leaves the element at `path`.
#[derive(Debug, Clone, Copy)]
pub struct Rule<H> {
    /// Slash-separated element path from the root, e.g. `export/files/file`.
    pub path: &'static str,
    pub on_enter: Option<H>,
    pub on_leave: Option<H>,
}

impl<H> Rule<H> {
    /// Rule firing when the element opens.
    #[must_use]
    pub const fn enter(path: &'static str, handler: H) -> Self {
        Self {
            path,
            on_enter: Some(handler),
            on_leave: None,
        }
    }

    /// Rule firing when the element closes, with its text collected.
    #[must_use]
    pub const fn leave(path: &'static str, handler: H) -> Self {
        Self {
            path,
            on_enter: None,
            on_leave: Some(handler),
        }
    }

    /// Rule firing on both ends of an entity container.
    #[must_use]
    pub const fn entity(path: &'static str, enter: H, leave: H) -> Self {
        Self {
            path,
            on_enter: Some(enter),
            on_leave: Some(leave),
        }
    }
}

/// One open element.
#[derive(Debug, Clone, Default)]
pub struct Element {
    pub name: String,
    pub path: String,
    pub attributes: Vec<(String, String)>,
    text: String,
}

impl Element {
    /// Attribute value by name.
    #[must_use]
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Collected text, trimmed. Empty on enter.
    #[must_use]
    pub fn text(&self) -> &str {
        self.text.trim()
    }
}

fn malformed(what: impl std::fmt::Display) -> Error {
    Error::ManifestMalformed(what.to_string())
}

fn open_element(start: &BytesStart<'_>, parent: Option<&Element>) -> Result<Element> {
    let name = std::str::from_utf8(start.name().as_ref())
        .map_err(malformed)?
        .to_string();
    let path = match parent {
        Some(p) => format!("{}/{name}", p.path),
        None => name.clone(),
    };
    let mut attributes = Vec::new();
    for attr in start.attributes() {
        let attr = attr.map_err(malformed)?;
        let key = std::str::from_utf8(attr.key.as_ref())
            .map_err(malformed)?
            .to_string();
        let value = attr.unescape_value()?.into_owned();
        attributes.push((key, value));
    }
    Ok(Element {
        name,
        path,
        attributes,
        text: String::new(),
    })
}

/// Stream a manifest through a rule table.
///
/// `dispatch` runs for every matching handler in document order. An `Err`
/// from it stops the walk and is returned as is; handlers that want to
/// survive bad entities must record the problem and return `Ok`.
///
/// # Errors
///
/// Returns [`Error::ManifestMalformed`] if the document is not well-formed,
/// or the first error `dispatch` returns.
pub fn walk<R, H, F>(source: R, rules: &[Rule<H>], mut dispatch: F) -> Result<()>
where
    R: BufRead,
    H: Copy,
    F: FnMut(H, &Element) -> Result<()>,
{
    let table: HashMap<&str, &Rule<H>> = rules.iter().map(|r| (r.path, r)).collect();

    let mut reader = Reader::from_reader(source);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<Element> = Vec::new();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(start) => {
                let element = open_element(&start, stack.last())?;
                if let Some(enter) = table.get(element.path.as_str()).and_then(|r| r.on_enter) {
                    dispatch(enter, &element)?;
                }
                stack.push(element);
            }
            Event::Empty(start) => {
                let element = open_element(&start, stack.last())?;
                if let Some(rule) = table.get(element.path.as_str()) {
                    if let Some(enter) = rule.on_enter {
                        dispatch(enter, &element)?;
                    }
                    if let Some(leave) = rule.on_leave {
                        dispatch(leave, &element)?;
                    }
                }
            }
            Event::End(_) => {
                let element = stack
                    .pop()
                    .ok_or_else(|| malformed("unbalanced closing tag"))?;
                if let Some(leave) = table.get(element.path.as_str()).and_then(|r| r.on_leave) {
                    dispatch(leave, &element)?;
                }
            }
            Event::Text(text) => {
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&text.unescape()?);
                }
            }
            Event::CData(data) => {
                if let Some(top) = stack.last_mut() {
                    let bytes = data.into_inner();
                    top.text
                        .push_str(std::str::from_utf8(&bytes).map_err(malformed)?);
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    if let Some(open) = stack.last() {
        return Err(malformed(format!("unexpected end of document inside <{}>", open.name)));
    }
    Ok(())
}
