//! Span-tracked XML parsing for CSL documents.
//!
//! This crate wraps [`quick-xml`] and produces a small owned tree of
//! [`XmlElement`]s. Every element, attribute name, attribute value and text
//! node remembers the byte range it came from, so the layers above can point
//! at the exact offending attribute when a style or locale is rejected.
//!
//! # Example
//!
//! ```rust
//! use citeproc_xml::parse;
//!
//! let doc = parse(r#"<style version="1.0">
//!   <macro name="author">
//!     <text variable="author"/>
//!   </macro>
//! </style>"#).unwrap();
//!
//! assert_eq!(doc.root.name, "style");
//! assert_eq!(doc.root.get_attribute("version"), Some("1.0"));
//!
//! let macros = doc.root.get_children("macro");
//! assert_eq!(macros.len(), 1);
//! assert_eq!(macros[0].get_attribute("name"), Some("author"));
//! ```
//!
//! Whitespace-only text between child elements is dropped, so an element
//! laid out over several lines still reports [`XmlChildren::Elements`].

pub mod error;
pub mod parser;
pub mod types;

pub use error::{Error, Result};
pub use parser::parse;
pub use types::{Span, XmlAttribute, XmlChild, XmlChildren, XmlDocument, XmlElement};
