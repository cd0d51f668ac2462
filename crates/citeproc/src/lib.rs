//! Citation Style Language processor.
//!
//! A [`Processor`] holds one parsed CSL style, a store of CSL-JSON
//! [`Reference`]s and a cache of locales obtained on demand from a
//! [`LocaleFetcher`]. Formatting evaluates the style's layout into an
//! intermediate output tree and renders that as plain text, HTML or RTF.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                          citeproc                            │
//! │   Style + References + Locales → citations, bibliography     │
//! └──────────────────────────────┬───────────────────────────────┘
//!                                ▼
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        citeproc-csl                          │
//! │          XmlElement → Style, Element, Macro, Locale          │
//! └──────────────────────────────┬───────────────────────────────┘
//!                                ▼
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        citeproc-xml                          │
//! │                   XML text → XmlElement                      │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```rust
//! use citeproc::{InitOptions, OutputFormat, PredefinedLocales, Processor, Reference};
//!
//! let style = r#"<style xmlns="http://purl.org/net/xbiblio/csl" class="note" version="1.0">
//!   <citation><layout><text variable="title" font-style="italic"/></layout></citation>
//! </style>"#;
//!
//! let mut processor = Processor::new(
//!     InitOptions::new(style)
//!         .format(OutputFormat::Html)
//!         .fetcher(PredefinedLocales::bundled_en_us()),
//! )?;
//! processor.insert_reference(Reference::new("item", "book").with_variable("title", "Dune"));
//!
//! assert_eq!(processor.format_one("item")?, "<i>Dune</i>");
//! # Ok::<(), citeproc::Error>(())
//! ```

pub mod cite;
pub mod error;
pub mod format;
pub mod locale;
pub mod output;
pub mod processor;
pub mod reference;

mod date;
mod disambiguation;
mod eval;
mod names;
mod number;
mod sort;

pub use cite::{Cite, CitePosition, Cluster, ClusterId};
pub use error::{Error, Result};
pub use format::{OutputFormat, ParseFormatError, Rendered};
pub use locale::{FilesystemLocales, LocaleFetchError, LocaleFetcher, PredefinedLocales};
pub use number::{format_page_range, is_numeric};
pub use processor::{BibEntry, InitOptions, Processor};
pub use reference::{DateParts, DateVariable, Name, Reference};
