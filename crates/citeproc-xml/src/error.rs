//! Error types for XML parsing.

use crate::Span;
use std::fmt;

/// Result type alias for citeproc-xml operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while building an XML tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Syntax error reported by quick-xml.
    Syntax {
        message: String,
        /// Byte offset where the error was detected.
        position: Option<usize>,
    },

    /// Input ended while an element was still open.
    UnexpectedEof { expected: String, span: Option<Span> },

    /// End tag does not close the innermost open element.
    MismatchedEndTag {
        expected: String,
        found: String,
        span: Option<Span>,
    },

    /// Structural problem such as a stray closing tag.
    InvalidStructure { message: String, span: Option<Span> },

    /// No root element at all.
    EmptyDocument,

    /// More than one top-level element.
    MultipleRoots { span: Option<Span> },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Syntax { message, position } => {
                write!(f, "XML syntax error: {}", message)?;
                if let Some(pos) = position {
                    write!(f, " at byte {}", pos)?;
                }
                Ok(())
            }
            Error::UnexpectedEof { expected, .. } => {
                write!(f, "Unexpected end of input, expected {}", expected)
            }
            Error::MismatchedEndTag {
                expected, found, ..
            } => write!(
                f,
                "Mismatched end tag: expected </{}>, found </{}>",
                expected, found
            ),
            Error::InvalidStructure { message, .. } => {
                write!(f, "Invalid XML structure: {}", message)
            }
            Error::EmptyDocument => write!(f, "Empty XML document: no root element found"),
            Error::MultipleRoots { .. } => write!(f, "Invalid XML: multiple root elements"),
        }
    }
}

impl std::error::Error for Error {}

impl Error {
    /// Stable error code, `X-1` through `X-6`.
    pub fn code(&self) -> &'static str {
        match self {
            Error::Syntax { .. } => "X-1",
            Error::UnexpectedEof { .. } => "X-2",
            Error::MismatchedEndTag { .. } => "X-3",
            Error::InvalidStructure { .. } => "X-4",
            Error::EmptyDocument => "X-5",
            Error::MultipleRoots { .. } => "X-6",
        }
    }

    /// Byte range the error refers to, when one is known.
    pub fn span(&self) -> Option<Span> {
        match self {
            Error::Syntax { position, .. } => position.map(|p| Span::new(p, p + 1)),
            Error::UnexpectedEof { span, .. }
            | Error::MismatchedEndTag { span, .. }
            | Error::InvalidStructure { span, .. }
            | Error::MultipleRoots { span } => *span,
            Error::EmptyDocument => None,
        }
    }
}

impl From<quick_xml::Error> for Error {
    fn from(err: quick_xml::Error) -> Self {
        Error::Syntax {
            message: err.to_string(),
            position: None,
        }
    }
}

impl From<quick_xml::events::attributes::AttrError> for Error {
    fn from(err: quick_xml::events::attributes::AttrError) -> Self {
        Error::Syntax {
            message: format!("Attribute error: {}", err),
            position: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(Error::EmptyDocument.code(), "X-5");
        assert_eq!(Error::MultipleRoots { span: None }.code(), "X-6");
        assert_eq!(
            Error::MismatchedEndTag {
                expected: "a".to_string(),
                found: "b".to_string(),
                span: None,
            }
            .code(),
            "X-3"
        );
    }

    #[test]
    fn test_syntax_error_display_and_span() {
        let err = Error::Syntax {
            message: "bad".to_string(),
            position: Some(7),
        };
        insta::assert_snapshot!(err.to_string(), @"XML syntax error: bad at byte 7");
        assert_eq!(err.span(), Some(Span::new(7, 8)));
    }
}
