//! CSL style and locale document model.
//!
//! [`parse_style`] turns a CSL 1.0 style into a validated [`Style`]: an arena
//! of layout nodes in which every macro reference has already been resolved
//! to a [`MacroId`]. [`parse_locale`] reads standalone locale documents into
//! [`Locale`] values, which can be layered with [`Locale::merge_fallback`].
//!
//! ```rust
//! use citeproc_csl::{ElementKind, TextSource, parse_style};
//!
//! let style = parse_style(r#"<style xmlns="http://purl.org/net/xbiblio/csl" class="in-text" version="1.0">
//!   <macro name="year"><date variable="issued"><date-part name="year"/></date></macro>
//!   <citation><layout><text macro="year"/></layout></citation>
//! </style>"#).unwrap();
//!
//! let first = style.node(style.citation.children[0]);
//! let ElementKind::Text(TextSource::Macro { id, .. }) = &first.kind else { panic!() };
//! assert_eq!(style.macro_def(*id).name, "year");
//! ```
//!
//! Errors carry a stable code and the byte span of the offending markup:
//!
//! ```rust
//! let err = citeproc_csl::parse_style("<style/>").unwrap_err();
//! assert_eq!(err.code(), "S-2");
//! assert!(err.span().is_some());
//! ```

pub mod error;
pub mod locale;
pub mod parser;
pub mod types;

pub use citeproc_xml::Span;
pub use error::{Error, Result};
pub use locale::*;
pub use parser::{parse_locale, parse_style, parse_style_document};
pub use types::*;
