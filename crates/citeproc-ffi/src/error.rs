use std::cell::RefCell;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

thread_local! {
    static LAST_ERROR: RefCell<Option<Error>> = const { RefCell::new(None) };
}

/// Errors reported across the C boundary.
///
/// Codes `1..=99` belong to the boundary itself. Engine errors keep their
/// own kind and map to `100` and up.
#[derive(Error, Debug)]
pub enum Error {
    #[error("NullParameter: {0}")]
    NullParameter(String),
    #[error("InvalidUtf8: {0}")]
    InvalidUtf8(String),
    #[error("InteriorNul: {0}")]
    InteriorNul(String),
    #[error("Panic: {0}")]
    Panic(String),
    #[error("Engine: {0}")]
    Engine(#[from] citeproc::Error),
}

impl Error {
    pub fn code(&self) -> i32 {
        match self {
            Error::NullParameter(_) => 1,
            Error::InvalidUtf8(_) => 2,
            Error::InteriorNul(_) => 3,
            Error::Panic(_) => 4,
            Error::Engine(err) => match err {
                citeproc::Error::MalformedStyle(_) => 100,
                citeproc::Error::MalformedLocale { .. } => 101,
                citeproc::Error::ReferenceNotFound { .. } => 102,
                citeproc::Error::MalformedReference { .. } => 103,
            },
        }
    }

    pub(crate) fn null(name: &str) -> Self {
        Error::NullParameter(name.to_string())
    }

    /// Returns the last error as String
    pub fn last_message() -> Option<String> {
        LAST_ERROR.with(|prev| prev.borrow().as_ref().map(|e| e.to_string()))
    }

    /// Code of the last error, `0` when there is none.
    pub fn last_code() -> i32 {
        LAST_ERROR.with(|prev| prev.borrow().as_ref().map_or(0, Error::code))
    }

    pub fn set_last(self) {
        tracing::debug!(code = self.code(), error = %self, "ffi call failed");
        LAST_ERROR.with(|prev| *prev.borrow_mut() = Some(self));
    }

    /// Takes the last error and clears it
    pub fn take_last() -> Option<Error> {
        LAST_ERROR.with(|prev| prev.borrow_mut().take())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_last_error_round_trip() {
        assert!(Error::take_last().is_none());
        assert_eq!(Error::last_code(), 0);

        Error::null("style").set_last();
        assert_eq!(Error::last_code(), 1);
        assert_eq!(Error::last_message().as_deref(), Some("NullParameter: style"));

        let taken = Error::take_last().unwrap();
        assert!(matches!(taken, Error::NullParameter(_)));
        assert!(Error::last_message().is_none());
    }

    #[test]
    fn test_engine_codes_start_at_100() {
        let err = Error::from(citeproc::Error::ReferenceNotFound {
            id: "x".to_string(),
        });
        assert_eq!(err.code(), 102);
        assert_eq!(err.to_string(), "Engine: Reference 'x' not found");
    }
}
