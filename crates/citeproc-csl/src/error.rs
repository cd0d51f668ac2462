//! Error types for CSL style and locale parsing.

use citeproc_xml::Span;
use std::fmt;

/// Result type alias for citeproc-csl operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while turning an XML tree into a style or locale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The document is not well-formed XML.
    Xml(citeproc_xml::Error),

    MissingAttribute {
        element: String,
        attribute: String,
        span: Span,
    },

    InvalidAttributeValue {
        element: String,
        attribute: String,
        value: String,
        expected: String,
        span: Span,
    },

    MissingElement {
        parent: String,
        element: String,
        span: Span,
    },

    /// `<text>` without variable, macro, term or value.
    MissingTextSource { span: Span },

    UndefinedMacro {
        name: String,
        span: Span,
        /// Closest defined macro name, if one is near enough.
        suggestion: Option<String>,
    },

    CircularMacro { chain: Vec<String>, span: Span },

    DuplicateMacro {
        name: String,
        first: Span,
        second: Span,
    },

    InvalidVersion { version: String, span: Span },

    InvalidRootElement {
        found: String,
        expected: &'static str,
        span: Span,
    },

    UnexpectedElement {
        element: String,
        context: String,
        span: Span,
    },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Xml(e) => write!(f, "XML error: {}", e),
            Error::MissingAttribute {
                element, attribute, ..
            } => write!(
                f,
                "Missing required attribute '{}' on <{}>",
                attribute, element
            ),
            Error::InvalidAttributeValue {
                element,
                attribute,
                value,
                expected,
                ..
            } => write!(
                f,
                "Invalid value '{}' for attribute '{}' on <{}>: expected {}",
                value, attribute, element, expected
            ),
            Error::MissingElement {
                parent, element, ..
            } => write!(f, "Missing required element <{}> in <{}>", element, parent),
            Error::MissingTextSource { .. } => write!(
                f,
                "Text element must have one of: variable, macro, term, or value attribute"
            ),
            Error::UndefinedMacro {
                name, suggestion, ..
            } => {
                write!(f, "Undefined macro '{}'", name)?;
                if let Some(suggestion) = suggestion {
                    write!(f, " (did you mean '{}'?)", suggestion)?;
                }
                Ok(())
            }
            Error::CircularMacro { chain, .. } => {
                write!(f, "Circular macro dependency: {}", chain.join(" -> "))
            }
            Error::DuplicateMacro { name, .. } => {
                write!(f, "Duplicate macro definition: '{}'", name)
            }
            Error::InvalidVersion { version, .. } => {
                write!(f, "Invalid CSL version: '{}'", version)
            }
            Error::InvalidRootElement {
                found, expected, ..
            } => write!(f, "Expected <{}> root element, found <{}>", expected, found),
            Error::UnexpectedElement {
                element, context, ..
            } => write!(f, "Unexpected element <{}> in {}", element, context),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Xml(e) => Some(e),
            _ => None,
        }
    }
}

impl From<citeproc_xml::Error> for Error {
    fn from(err: citeproc_xml::Error) -> Self {
        Error::Xml(err)
    }
}

impl Error {
    /// Stable error code. XML errors keep their `X-*` code.
    pub fn code(&self) -> &'static str {
        match self {
            Error::Xml(e) => e.code(),
            Error::MissingAttribute { .. } => "S-2",
            Error::InvalidAttributeValue { .. } => "S-3",
            Error::MissingElement { .. } => "S-4",
            Error::MissingTextSource { .. } => "S-5",
            Error::UndefinedMacro { .. } => "S-6",
            Error::CircularMacro { .. } => "S-7",
            Error::DuplicateMacro { .. } => "S-8",
            Error::InvalidVersion { .. } => "S-9",
            Error::InvalidRootElement { .. } => "S-10",
            Error::UnexpectedElement { .. } => "S-11",
        }
    }

    /// Byte range in the parsed document the error points at.
    pub fn span(&self) -> Option<Span> {
        match self {
            Error::Xml(e) => e.span(),
            Error::MissingAttribute { span, .. }
            | Error::InvalidAttributeValue { span, .. }
            | Error::MissingElement { span, .. }
            | Error::MissingTextSource { span }
            | Error::UndefinedMacro { span, .. }
            | Error::CircularMacro { span, .. }
            | Error::InvalidVersion { span, .. }
            | Error::InvalidRootElement { span, .. }
            | Error::UnexpectedElement { span, .. } => Some(*span),
            Error::DuplicateMacro { second, .. } => Some(*second),
        }
    }

    /// A short fix-it line for diagnostics, when there is one.
    pub fn hint(&self) -> Option<String> {
        match self {
            Error::MissingAttribute { attribute, .. } => {
                Some(format!("add {}=\"...\" to the element", attribute))
            }
            Error::InvalidAttributeValue { expected, .. } => Some(format!("expected {}", expected)),
            Error::MissingTextSource { .. } => {
                Some("add one of variable=, macro=, term= or value=".to_string())
            }
            Error::UndefinedMacro {
                suggestion: Some(s),
                ..
            } => Some(format!("did you mean '{}'?", s)),
            Error::DuplicateMacro { .. } => Some("rename or remove one definition".to_string()),
            _ => None,
        }
    }
}
