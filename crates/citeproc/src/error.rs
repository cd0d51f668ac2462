//! Error types for citation processing.

use thiserror::Error;

/// Result type alias for citeproc operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the [`Processor`](crate::Processor).
///
/// Construction only fails with [`Error::MalformedStyle`]. The other
/// variants are local to the call that produced them; the processor stays
/// usable afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// The style document could not be parsed or validated.
    #[error("Malformed style: {0}")]
    MalformedStyle(#[from] citeproc_csl::Error),

    /// Locale data obtained from the fetcher could not be used.
    #[error("Failed to parse locale '{lang}': {message}")]
    MalformedLocale { lang: String, message: String },

    #[error("Reference '{id}' not found")]
    ReferenceNotFound { id: String },

    /// A reference document failed structural typing.
    #[error("Malformed reference: {message}")]
    MalformedReference { message: String },
}

impl Error {
    /// Stable error code, in the same family as the `X-*`/`S-*` codes of the
    /// parse layers.
    pub fn code(&self) -> &'static str {
        match self {
            Error::MalformedStyle(_) => "C-1",
            Error::MalformedLocale { .. } => "C-2",
            Error::ReferenceNotFound { .. } => "C-3",
            Error::MalformedReference { .. } => "C-4",
        }
    }

    pub(crate) fn reference_not_found(id: impl Into<String>) -> Self {
        Error::ReferenceNotFound { id: id.into() }
    }

    pub(crate) fn malformed_locale(lang: &str, message: impl ToString) -> Self {
        Error::MalformedLocale {
            lang: lang.to_string(),
            message: message.to_string(),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::MalformedReference {
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_distinct() {
        let errors = [
            Error::MalformedStyle(citeproc_csl::Error::MissingTextSource {
                span: citeproc_csl::Span::new(0, 1),
            }),
            Error::malformed_locale("de-DE", "bad"),
            Error::reference_not_found("x"),
            Error::MalformedReference {
                message: "bad".to_string(),
            },
        ];
        let codes: Vec<_> = errors.iter().map(Error::code).collect();
        assert_eq!(codes, vec!["C-1", "C-2", "C-3", "C-4"]);
    }

    #[test]
    fn test_json_error_is_malformed_reference() {
        let err: Error = serde_json::from_str::<serde_json::Value>("{")
            .unwrap_err()
            .into();
        assert!(matches!(err, Error::MalformedReference { .. }));
    }
}
