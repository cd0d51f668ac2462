//! Event-driven builder for [`XmlDocument`] trees.

use crate::{Error, Result, Span, XmlAttribute, XmlChild, XmlChildren, XmlDocument, XmlElement};
use quick_xml::Reader;
use quick_xml::events::{BytesCData, BytesEnd, BytesStart, BytesText, Event};

/// Parse XML text into a span-tracked tree.
///
/// ```rust
/// let doc = citeproc_xml::parse("<root><child/></root>").unwrap();
/// assert_eq!(doc.root.name, "root");
/// assert_eq!(doc.root.span.end, 21);
/// ```
pub fn parse(content: &str) -> Result<XmlDocument> {
    TreeBuilder::new(content).run()
}

struct TreeBuilder<'a> {
    source: &'a str,
    reader: Reader<&'a [u8]>,
    open: Vec<OpenElement>,
}

struct OpenElement {
    name: String,
    name_span: Span,
    prefix: Option<String>,
    attributes: Vec<XmlAttribute>,
    start: usize,
    children: Vec<XmlChild>,
}

impl<'a> TreeBuilder<'a> {
    fn new(source: &'a str) -> Self {
        let mut reader = Reader::from_str(source);
        reader.config_mut().trim_text_start = false;
        reader.config_mut().trim_text_end = false;
        Self {
            source,
            reader,
            open: Vec::new(),
        }
    }

    fn run(mut self) -> Result<XmlDocument> {
        let mut root: Option<XmlElement> = None;

        loop {
            let event_start = self.position();
            let finished = match self.reader.read_event() {
                Ok(Event::Start(e)) => {
                    self.open_element(&e, event_start)?;
                    None
                }
                Ok(Event::End(e)) => Some(self.close_element(&e)?),
                Ok(Event::Empty(e)) => Some(self.empty_element(&e, event_start)?),
                Ok(Event::Text(e)) => {
                    self.push_text(&e, event_start)?;
                    None
                }
                Ok(Event::CData(e)) => {
                    self.push_cdata(&e, event_start);
                    None
                }
                Ok(Event::Comment(_) | Event::PI(_) | Event::Decl(_) | Event::DocType(_)) => None,
                Ok(Event::Eof) => break,
                Err(e) => {
                    return Err(Error::Syntax {
                        message: e.to_string(),
                        position: usize::try_from(self.reader.error_position()).ok(),
                    });
                }
            };

            if let Some(element) = finished {
                match self.open.last_mut() {
                    Some(parent) => parent.children.push(XmlChild::Element(element)),
                    None if root.is_some() => {
                        return Err(Error::MultipleRoots {
                            span: Some(element.span),
                        });
                    }
                    None => root = Some(element),
                }
            }
        }

        if let Some(unclosed) = self.open.last() {
            return Err(Error::UnexpectedEof {
                expected: format!("closing tag </{}>", unclosed.name),
                span: Some(unclosed.name_span),
            });
        }

        let root = root.ok_or(Error::EmptyDocument)?;
        Ok(XmlDocument {
            root,
            span: Span::new(0, self.source.len()),
        })
    }

    fn position(&self) -> usize {
        usize::try_from(self.reader.buffer_position()).unwrap_or(usize::MAX)
    }

    fn open_element(&mut self, e: &BytesStart<'_>, start: usize) -> Result<()> {
        let (name, prefix) = split_name(e.name().as_ref());
        let name_span = Span::new(start + 1, start + 1 + e.name().as_ref().len());
        let attributes = self.read_attributes(e, start)?;
        self.open.push(OpenElement {
            name,
            name_span,
            prefix,
            attributes,
            start,
            children: Vec::new(),
        });
        Ok(())
    }

    fn close_element(&mut self, e: &BytesEnd<'_>) -> Result<XmlElement> {
        let (found, _) = split_name(e.name().as_ref());
        let end = self.position();

        let node = self.open.pop().ok_or_else(|| Error::InvalidStructure {
            message: format!("Unexpected closing tag </{}>", found),
            span: Some(Span::new(end.saturating_sub(found.len() + 3), end)),
        })?;

        if node.name != found {
            return Err(Error::MismatchedEndTag {
                expected: node.name,
                found,
                span: Some(node.name_span),
            });
        }

        Ok(XmlElement {
            name: node.name,
            name_span: node.name_span,
            prefix: node.prefix,
            attributes: node.attributes,
            children: finalize_children(node.children),
            span: Span::new(node.start, end),
        })
    }

    fn empty_element(&mut self, e: &BytesStart<'_>, start: usize) -> Result<XmlElement> {
        let (name, prefix) = split_name(e.name().as_ref());
        let name_span = Span::new(start + 1, start + 1 + e.name().as_ref().len());
        let attributes = self.read_attributes(e, start)?;
        Ok(XmlElement {
            name,
            name_span,
            prefix,
            attributes,
            children: XmlChildren::Empty,
            span: Span::new(start, self.position()),
        })
    }

    fn push_text(&mut self, e: &BytesText<'_>, start: usize) -> Result<()> {
        let content = e
            .unescape()
            .map_err(|err| Error::Syntax {
                message: format!("Invalid text content: {}", err),
                position: Some(start),
            })?
            .into_owned();
        let span = Span::new(start, self.position());
        // Text outside the root element carries no meaning.
        if let Some(node) = self.open.last_mut() {
            node.children.push(XmlChild::Text { content, span });
        }
        Ok(())
    }

    fn push_cdata(&mut self, e: &BytesCData<'_>, start: usize) {
        let content = String::from_utf8_lossy(e.as_ref()).into_owned();
        let span = Span::new(start, self.position());
        if let Some(node) = self.open.last_mut() {
            node.children.push(XmlChild::Text { content, span });
        }
    }

    fn read_attributes(&self, e: &BytesStart<'_>, tag_start: usize) -> Result<Vec<XmlAttribute>> {
        // Raw bytes between `<` and `>` (or `/>`).
        let raw = e.as_ref();
        let raw_start = tag_start + 1;
        let mut cursor = e.name().as_ref().len();
        let mut attributes = Vec::new();

        for attr in e.attributes() {
            let attr = attr?;
            let key = attr.key.as_ref();
            let (name, prefix) = split_name(key);
            let value = attr
                .unescape_value()
                .map_err(|err| Error::Syntax {
                    message: format!("Invalid attribute value: {}", err),
                    position: Some(tag_start),
                })?
                .into_owned();

            let (name_range, value_range) = locate_attribute(raw, cursor, key);
            cursor = value_range.1;

            attributes.push(XmlAttribute {
                name,
                name_span: Span::new(raw_start + name_range.0, raw_start + name_range.1),
                prefix,
                value,
                value_span: Span::new(raw_start + value_range.0, raw_start + value_range.1),
            });
        }

        Ok(attributes)
    }
}

fn split_name(raw: &[u8]) -> (String, Option<String>) {
    let full = String::from_utf8_lossy(raw);
    match full.split_once(':') {
        Some((prefix, local)) => (local.to_string(), Some(prefix.to_string())),
        None => (full.into_owned(), None),
    }
}

/// Locate `key` and its value in the raw tag bytes, starting at `from`.
///
/// Returns `(name_start, name_end)` and `(value_start, value_end)` relative to
/// the raw tag; the value range includes the quotes.
fn locate_attribute(raw: &[u8], from: usize, key: &[u8]) -> ((usize, usize), (usize, usize)) {
    let mut at = from;
    let name_start = loop {
        while at < raw.len() && raw[at].is_ascii_whitespace() {
            at += 1;
        }
        if at >= raw.len() {
            return ((from, from), (from, from));
        }
        if raw[at..].starts_with(key) {
            break at;
        }
        // Not this attribute; skip over a name=value pair.
        at = skip_pair(raw, at);
    };
    let name_end = name_start + key.len();

    let mut pos = name_end;
    while pos < raw.len() && (raw[pos].is_ascii_whitespace() || raw[pos] == b'=') {
        pos += 1;
    }
    let value_start = pos;
    let value_end = match raw.get(pos) {
        Some(&quote @ (b'"' | b'\'')) => raw[pos + 1..]
            .iter()
            .position(|&b| b == quote)
            .map_or(raw.len(), |offset| pos + 1 + offset + 1),
        _ => raw[pos..]
            .iter()
            .position(|b| b.is_ascii_whitespace() || *b == b'/')
            .map_or(raw.len(), |offset| pos + offset),
    };

    ((name_start, name_end), (value_start, value_end))
}

fn skip_pair(raw: &[u8], mut at: usize) -> usize {
    while at < raw.len() && raw[at] != b'=' && !raw[at].is_ascii_whitespace() {
        at += 1;
    }
    while at < raw.len() && (raw[at].is_ascii_whitespace() || raw[at] == b'=') {
        at += 1;
    }
    if let Some(&quote @ (b'"' | b'\'')) = raw.get(at) {
        at += 1;
        while at < raw.len() && raw[at] != quote {
            at += 1;
        }
        at += 1;
    }
    at.min(raw.len())
}

/// Collapse collected children into the most specific [`XmlChildren`] form.
///
/// Whitespace-only text is dropped when the element also has child elements.
fn finalize_children(children: Vec<XmlChild>) -> XmlChildren {
    let has_elements = children.iter().any(|c| matches!(c, XmlChild::Element(_)));
    let mut children: Vec<XmlChild> = if has_elements {
        children
            .into_iter()
            .filter(|c| !matches!(c, XmlChild::Text { content, .. } if content.trim().is_empty()))
            .collect()
    } else {
        children
    };

    if children.is_empty() {
        return XmlChildren::Empty;
    }

    if children.iter().all(|c| matches!(c, XmlChild::Element(_))) {
        return XmlChildren::Elements(
            children
                .into_iter()
                .filter_map(|c| match c {
                    XmlChild::Element(e) => Some(e),
                    XmlChild::Text { .. } => None,
                })
                .collect(),
        );
    }

    if !has_elements {
        // Adjacent text and CDATA runs merge into one text node.
        let start = children.first().map_or(0, child_span_start);
        let end = children.last().map_or(0, child_span_end);
        let mut content = String::new();
        for child in children.drain(..) {
            if let XmlChild::Text { content: text, .. } = child {
                content.push_str(&text);
            }
        }
        return XmlChildren::Text {
            content,
            span: Span::new(start, end),
        };
    }

    XmlChildren::Mixed(children)
}

fn child_span_start(child: &XmlChild) -> usize {
    match child {
        XmlChild::Element(e) => e.span.start,
        XmlChild::Text { span, .. } => span.start,
    }
}

fn child_span_end(child: &XmlChild) -> usize {
    match child {
        XmlChild::Element(e) => e.span.end,
        XmlChild::Text { span, .. } => span.end,
    }
}
