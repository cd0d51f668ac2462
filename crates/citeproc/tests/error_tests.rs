//! Tests for citeproc error types.
//!
//! These tests check the Display output and codes of each error variant as
//! produced by real processor calls.

use citeproc::{Error, InitOptions, Processor};

const STYLE: &str = r#"<style xmlns="http://purl.org/net/xbiblio/csl" class="note" version="1.0">
  <citation><layout><text variable="title"/></layout></citation>
</style>"#;

// ============================================================================
// Display implementation tests
// ============================================================================

#[test]
fn test_malformed_style_display() {
    let err = Processor::new(InitOptions::new("<style>")).err().unwrap();
    let display = err.to_string();
    assert!(display.contains("Malformed style"), "Got: {}", display);
    assert_eq!(err.code(), "C-1");
}

#[test]
fn test_undefined_macro_is_malformed_style() {
    let style = r#"<style xmlns="http://purl.org/net/xbiblio/csl" class="note" version="1.0">
  <macro name="title"><text variable="title"/></macro>
  <citation><layout><text macro="titel"/></layout></citation>
</style>"#;
    let err = Processor::new(InitOptions::new(style)).err().unwrap();
    let Error::MalformedStyle(inner) = &err else {
        panic!("expected MalformedStyle, got {:?}", err);
    };
    assert!(inner.hint().is_some_and(|h| h.contains("title")), "Got: {:?}", inner);
}

#[test]
fn test_invalid_class_is_malformed_style() {
    let style = r#"<style xmlns="http://purl.org/net/xbiblio/csl" class="footnote" version="1.0">
  <citation><layout><text variable="title"/></layout></citation>
</style>"#;
    let err = Processor::new(InitOptions::new(style)).err().unwrap();
    assert!(matches!(err, Error::MalformedStyle(_)), "Got: {:?}", err);
}

#[test]
fn test_malformed_locale_display() {
    let fetcher = |_: &str| -> Result<Option<String>, citeproc::LocaleFetchError> {
        Ok(Some("<terms/>".to_string()))
    };
    let mut p = Processor::new(InitOptions::new(STYLE).fetcher(fetcher)).unwrap();
    let err = p.resolve_locale("en-US").unwrap_err();
    let display = err.to_string();
    assert!(
        display.contains("Failed to parse locale 'en-US'"),
        "Got: {}",
        display
    );
}

#[test]
fn test_reference_not_found_display() {
    let mut p = Processor::new(InitOptions::new(STYLE)).unwrap();
    let err = p.format_one("smith2020").unwrap_err();
    let display = err.to_string();
    assert!(
        display.contains("Reference 'smith2020' not found"),
        "Got: {}",
        display
    );
}

#[test]
fn test_malformed_reference_display() {
    let mut p = Processor::new(InitOptions::new(STYLE)).unwrap();
    let err = p
        .insert_reference_json(r#"{"id":"x","author":"not a list"}"#)
        .unwrap_err();
    let display = err.to_string();
    assert!(display.contains("Malformed reference"), "Got: {}", display);
    assert_eq!(err.code(), "C-4");
}
