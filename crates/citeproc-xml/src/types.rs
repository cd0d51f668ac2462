//! Tree types produced by the parser.

use std::ops::Range;

/// Half-open byte range into the parsed source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn range(&self) -> Range<usize> {
        self.start..self.end
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A parsed XML document.
#[derive(Debug, Clone)]
pub struct XmlDocument {
    pub root: XmlElement,
    /// Span of the whole input.
    pub span: Span,
}

/// An XML element.
#[derive(Debug, Clone)]
pub struct XmlElement {
    /// Local name, without namespace prefix.
    pub name: String,
    pub name_span: Span,
    /// Namespace prefix (`csl` in `<csl:text>`).
    pub prefix: Option<String>,
    pub attributes: Vec<XmlAttribute>,
    pub children: XmlChildren,
    /// From the `<` of the start tag to the `>` of the end tag.
    pub span: Span,
}

/// An attribute with separate spans for name and value.
#[derive(Debug, Clone)]
pub struct XmlAttribute {
    pub name: String,
    pub name_span: Span,
    pub prefix: Option<String>,
    /// Value after entity unescaping.
    pub value: String,
    /// Span of the value in the source, quotes included.
    pub value_span: Span,
}

/// Content of an element.
#[derive(Debug, Clone)]
pub enum XmlChildren {
    Elements(Vec<XmlElement>),
    Text { content: String, span: Span },
    Mixed(Vec<XmlChild>),
    Empty,
}

/// One node of mixed content.
#[derive(Debug, Clone)]
pub enum XmlChild {
    Element(XmlElement),
    Text { content: String, span: Span },
}

impl XmlElement {
    /// Get an attribute value by local name.
    pub fn get_attribute(&self, name: &str) -> Option<&str> {
        self.get_attribute_full(name).map(|a| a.value.as_str())
    }

    /// Get an attribute by local name, spans included.
    pub fn get_attribute_full(&self, name: &str) -> Option<&XmlAttribute> {
        self.attributes.iter().find(|a| a.name == name)
    }

    /// Get an attribute by prefix and local name (`xml:lang`).
    pub fn get_prefixed_attribute(&self, prefix: &str, name: &str) -> Option<&XmlAttribute> {
        self.attributes
            .iter()
            .find(|a| a.name == name && a.prefix.as_deref() == Some(prefix))
    }

    pub fn has_elements(&self) -> bool {
        !self.all_children().is_empty()
    }

    pub fn has_text(&self) -> bool {
        matches!(&self.children, XmlChildren::Text { .. })
    }

    pub fn is_empty(&self) -> bool {
        matches!(&self.children, XmlChildren::Empty)
    }

    /// Text content, if the element contains only text.
    pub fn text(&self) -> Option<&str> {
        match &self.children {
            XmlChildren::Text { content, .. } => Some(content),
            _ => None,
        }
    }

    /// Concatenated text of all direct text children.
    pub fn text_content(&self) -> String {
        match &self.children {
            XmlChildren::Text { content, .. } => content.clone(),
            XmlChildren::Mixed(children) => children
                .iter()
                .filter_map(|c| match c {
                    XmlChild::Text { content, .. } => Some(content.as_str()),
                    XmlChild::Element(_) => None,
                })
                .collect(),
            _ => String::new(),
        }
    }

    /// Direct child elements with the given local name.
    pub fn get_children(&self, name: &str) -> Vec<&XmlElement> {
        self.all_children()
            .into_iter()
            .filter(|e| e.name == name)
            .collect()
    }

    /// First direct child element with the given local name.
    pub fn get_child(&self, name: &str) -> Option<&XmlElement> {
        self.all_children().into_iter().find(|e| e.name == name)
    }

    /// All direct child elements, skipping text.
    pub fn all_children(&self) -> Vec<&XmlElement> {
        match &self.children {
            XmlChildren::Elements(elements) => elements.iter().collect(),
            XmlChildren::Mixed(children) => children
                .iter()
                .filter_map(|c| match c {
                    XmlChild::Element(e) => Some(e),
                    XmlChild::Text { .. } => None,
                })
                .collect(),
            _ => vec![],
        }
    }
}
