//! Drives the C ABI from Rust the way a C host would.

use std::ffi::{CStr, CString, c_char, c_void};

use citeproc_ffi::*;

const STYLE: &str = r#"<style xmlns="http://purl.org/net/xbiblio/csl" class="note" version="1.0">
  <citation><layout><text variable="title"/></layout></citation>
  <bibliography><layout><text variable="title" font-style="italic"/></layout></bibliography>
</style>"#;

const EN_US: &str = r#"<locale xmlns="http://purl.org/net/xbiblio/csl" version="1.0" xml:lang="en-US">
  <terms><term name="and">and</term></terms>
</locale>"#;

/// Host-side state reached through the context pointer.
#[derive(Default)]
struct Host {
    requested: Vec<String>,
    decline: bool,
    xml: &'static [u8],
}

unsafe extern "C" fn fetch_locale(context: *mut c_void, slot: *mut LocaleSlot, lang: *const c_char) {
    let host = unsafe { &mut *context.cast::<Host>() };
    let lang = unsafe { CStr::from_ptr(lang) }.to_string_lossy().into_owned();
    host.requested.push(lang);
    if !host.decline {
        unsafe { citeproc_write_locale_slot(slot, host.xml.as_ptr().cast(), host.xml.len()) };
    }
}

fn options(style: &str, host: &mut Host, format: CiteprocOutputFormat) -> CiteprocInitOptions {
    CiteprocInitOptions {
        style: style.as_ptr().cast(),
        style_len: style.len(),
        locale_fetch_context: (host as *mut Host).cast(),
        locale_fetch_callback: Some(fetch_locale),
        format,
    }
}

fn take_string(s: *mut c_char) -> String {
    assert!(!s.is_null(), "unexpected null: {:?}", last_error());
    let owned = unsafe { CStr::from_ptr(s) }.to_string_lossy().into_owned();
    unsafe { citeproc_string_free(s) };
    owned
}

fn last_error() -> Option<String> {
    let message = citeproc_last_error_message();
    if message.is_null() {
        None
    } else {
        let owned = unsafe { CStr::from_ptr(message) }.to_string_lossy().into_owned();
        unsafe { citeproc_string_free(message) };
        Some(owned)
    }
}

fn format_one(processor: *mut CiteprocProcessor, json: &str) -> *mut c_char {
    unsafe { citeproc_processor_format_one(processor, json.as_ptr().cast(), json.len()) }
}

#[test]
fn test_format_one_end_to_end() {
    let mut host = Host {
        xml: EN_US.as_bytes(),
        ..Host::default()
    };
    let opts = options(STYLE, &mut host, CiteprocOutputFormat::Html);
    let processor = unsafe { citeproc_processor_new(&opts) };
    assert!(!processor.is_null());

    let result = format_one(processor, r#"{"id":"item","type":"book","title":"the title"}"#);
    assert_eq!(take_string(result), "the title");

    unsafe { citeproc_processor_free(processor) };
    assert_eq!(host.requested, vec!["en-US", "en"]);
}

#[test]
fn test_each_tag_fetched_once_across_many_references() {
    let mut host = Host {
        xml: EN_US.as_bytes(),
        ..Host::default()
    };
    let opts = options(STYLE, &mut host, CiteprocOutputFormat::Plain);
    let processor = unsafe { citeproc_processor_new(&opts) };

    for i in 0..100 {
        let json = format!(r#"{{"id":"r{i}","type":"book","title":"Title {i}"}}"#);
        assert_eq!(take_string(format_one(processor, &json)), format!("Title {i}"));
    }

    unsafe { citeproc_processor_free(processor) };
    assert_eq!(host.requested.iter().filter(|l| *l == "en-US").count(), 1);
}

#[test]
fn test_declining_callback_uses_builtin_locale() {
    let mut host = Host {
        decline: true,
        ..Host::default()
    };
    let style = r#"<style xmlns="http://purl.org/net/xbiblio/csl" class="note" version="1.0">
  <citation><layout><text term="and"/></layout></citation>
</style>"#;
    let opts = options(style, &mut host, CiteprocOutputFormat::Plain);
    let processor = unsafe { citeproc_processor_new(&opts) };

    let result = format_one(processor, r#"{"id":"a","type":"book"}"#);
    assert_eq!(take_string(result), "and");
    unsafe { citeproc_processor_free(processor) };
}

#[test]
fn test_malformed_style_returns_null() {
    let mut host = Host::default();
    let opts = options("<style>", &mut host, CiteprocOutputFormat::Html);
    let processor = unsafe { citeproc_processor_new(&opts) };

    assert!(processor.is_null());
    assert_eq!(citeproc_last_error_code(), 100);
    assert!(last_error().is_some_and(|m| m.contains("Malformed style")));
}

#[test]
fn test_null_options_returns_null() {
    let processor = unsafe { citeproc_processor_new(std::ptr::null()) };
    assert!(processor.is_null());
    assert_eq!(citeproc_last_error_code(), 1);
}

#[test]
fn test_malformed_locale_fails_call_but_not_processor() {
    let mut host = Host {
        xml: b"<locale><terms>",
        ..Host::default()
    };
    let opts = options(STYLE, &mut host, CiteprocOutputFormat::Plain);
    let processor = unsafe { citeproc_processor_new(&opts) };
    assert!(!processor.is_null());

    let result = format_one(processor, r#"{"id":"a","type":"book","title":"A"}"#);
    assert!(result.is_null());
    assert_eq!(citeproc_last_error_code(), 101);

    // The processor survives; the reference was stored before formatting.
    let id = CString::new("a").unwrap();
    assert_eq!(
        unsafe { citeproc_processor_remove_reference(processor, id.as_ptr()) },
        1
    );
    unsafe { citeproc_processor_free(processor) };
}

#[test]
fn test_invalid_utf8_locale_is_an_error() {
    let mut host = Host {
        xml: b"<locale \xff/>",
        ..Host::default()
    };
    let opts = options(STYLE, &mut host, CiteprocOutputFormat::Plain);
    let processor = unsafe { citeproc_processor_new(&opts) };

    let result = format_one(processor, r#"{"id":"a","type":"book","title":"A"}"#);
    assert!(result.is_null());
    assert_eq!(citeproc_last_error_code(), 101);
    unsafe { citeproc_processor_free(processor) };
}

#[test]
fn test_format_id_and_remove() {
    let mut host = Host {
        xml: EN_US.as_bytes(),
        ..Host::default()
    };
    let opts = options(STYLE, &mut host, CiteprocOutputFormat::Plain);
    let processor = unsafe { citeproc_processor_new(&opts) };

    let json = r#"{"id":"doe","type":"book","title":"Stored"}"#;
    let status =
        unsafe { citeproc_processor_insert_reference(processor, json.as_ptr().cast(), json.len()) };
    assert_eq!(status, 0);

    let id = CString::new("doe").unwrap();
    let result = unsafe { citeproc_processor_format_id(processor, id.as_ptr()) };
    assert_eq!(take_string(result), "Stored");

    assert_eq!(
        unsafe { citeproc_processor_remove_reference(processor, id.as_ptr()) },
        1
    );
    assert_eq!(
        unsafe { citeproc_processor_remove_reference(processor, id.as_ptr()) },
        0
    );

    let result = unsafe { citeproc_processor_format_id(processor, id.as_ptr()) };
    assert!(result.is_null());
    assert_eq!(citeproc_last_error_code(), 102);
    assert!(last_error().is_some_and(|m| m.contains("Reference 'doe' not found")));

    unsafe { citeproc_processor_free(processor) };
}

#[test]
fn test_rejected_reference_returns_minus_one() {
    let mut host = Host::default();
    let opts = options(STYLE, &mut host, CiteprocOutputFormat::Plain);
    let processor = unsafe { citeproc_processor_new(&opts) };

    let json = r#"{"type":"book"}"#;
    let status =
        unsafe { citeproc_processor_insert_reference(processor, json.as_ptr().cast(), json.len()) };
    assert_eq!(status, -1);
    assert_eq!(citeproc_last_error_code(), 103);
    unsafe { citeproc_processor_free(processor) };
}

#[test]
fn test_bibliography() {
    let mut host = Host {
        xml: EN_US.as_bytes(),
        ..Host::default()
    };
    let opts = options(STYLE, &mut host, CiteprocOutputFormat::Html);
    let processor = unsafe { citeproc_processor_new(&opts) };
    for json in [
        r#"{"id":"a","type":"book","title":"First"}"#,
        r#"{"id":"b","type":"book","title":"Second"}"#,
    ] {
        let status = unsafe {
            citeproc_processor_insert_reference(processor, json.as_ptr().cast(), json.len())
        };
        assert_eq!(status, 0);
    }

    let bibliography =
        unsafe { citeproc_processor_format_bibliography(processor, std::ptr::null(), 0) };
    assert!(!bibliography.is_null());
    let entries = unsafe {
        let bibliography = &*bibliography;
        std::slice::from_raw_parts(bibliography.entries, bibliography.len)
    };
    let rendered: Vec<(String, String)> = entries
        .iter()
        .map(|entry| unsafe {
            (
                CStr::from_ptr(entry.id).to_string_lossy().into_owned(),
                CStr::from_ptr(entry.value).to_string_lossy().into_owned(),
            )
        })
        .collect();
    assert_eq!(
        rendered,
        vec![
            ("a".to_string(), "<i>First</i>".to_string()),
            ("b".to_string(), "<i>Second</i>".to_string()),
        ]
    );

    unsafe { citeproc_bibliography_free(bibliography) };

    let b = CString::new("b").unwrap();
    let missing = CString::new("zzz").unwrap();
    let selected = [b.as_ptr()];
    let bibliography =
        unsafe { citeproc_processor_format_bibliography(processor, selected.as_ptr(), 1) };
    assert_eq!(unsafe { (*bibliography).len }, 1);
    unsafe { citeproc_bibliography_free(bibliography) };

    let unknown = [missing.as_ptr()];
    let bibliography =
        unsafe { citeproc_processor_format_bibliography(processor, unknown.as_ptr(), 1) };
    assert!(bibliography.is_null());
    assert_eq!(citeproc_last_error_code(), 102);

    unsafe { citeproc_processor_free(processor) };
}

#[test]
fn test_null_handles_are_reported() {
    let id = CString::new("x").unwrap();
    let result = unsafe { citeproc_processor_format_id(std::ptr::null_mut(), id.as_ptr()) };
    assert!(result.is_null());
    assert_eq!(citeproc_last_error_code(), 1);
    assert!(last_error().is_some_and(|m| m.contains("processor")));

    // Freeing null is a no-op.
    unsafe {
        citeproc_processor_free(std::ptr::null_mut());
        citeproc_string_free(std::ptr::null_mut());
        citeproc_bibliography_free(std::ptr::null_mut());
    }
}
