//! C ABI for the citeproc processor.
//!
//! Every function returns a sentinel on failure (null or `-1` depending
//! on the return type) and leaves the error in a thread-local
//! slot, readable through [`citeproc_last_error_code`] and
//! [`citeproc_last_error_message`]. Panics never cross the boundary.
//!
//! Strings returned by this library are owned by the caller and must be
//! released with [`citeproc_string_free`].
//!
//! Locales are requested through a callback that receives the caller's
//! context pointer, a [`LocaleSlot`] and a null-terminated language tag.
//! The callback either fills the slot with [`citeproc_write_locale_slot`]
//! or leaves it empty to decline.

mod error;

use std::ffi::{CStr, CString, c_char, c_int, c_void};
use std::panic::{self, AssertUnwindSafe};

use citeproc::{Cite, InitOptions, LocaleFetchError, LocaleFetcher, OutputFormat, Processor};

pub use error::{Error, Result};

/// Output format selector.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CiteprocOutputFormat {
    Html = 0,
    Rtf = 1,
    Plain = 2,
}

impl From<CiteprocOutputFormat> for OutputFormat {
    fn from(format: CiteprocOutputFormat) -> Self {
        match format {
            CiteprocOutputFormat::Html => OutputFormat::Html,
            CiteprocOutputFormat::Rtf => OutputFormat::Rtf,
            CiteprocOutputFormat::Plain => OutputFormat::Plain,
        }
    }
}

/// Receives one locale document from a fetch callback.
///
/// Only ever handed out by the library for the duration of a callback.
#[derive(Debug, Default)]
pub struct LocaleSlot {
    contents: Option<std::result::Result<String, String>>,
}

/// Asks the host for the locale document of `lang`.
pub type LocaleFetchCallback =
    unsafe extern "C" fn(context: *mut c_void, slot: *mut LocaleSlot, lang: *const c_char);

/// Construction parameters.
///
/// `style` points at `style_len` bytes of UTF-8 and need not be
/// null-terminated. A null callback means only the built-in locale is used.
#[repr(C)]
pub struct CiteprocInitOptions {
    pub style: *const c_char,
    pub style_len: usize,
    pub locale_fetch_context: *mut c_void,
    pub locale_fetch_callback: Option<LocaleFetchCallback>,
    pub format: CiteprocOutputFormat,
}

/// Opaque processor handle.
pub struct CiteprocProcessor {
    inner: Processor,
}

#[repr(C)]
pub struct CiteprocBibEntry {
    pub id: *mut c_char,
    pub value: *mut c_char,
}

/// Bibliography entries in bibliography order. Release with
/// [`citeproc_bibliography_free`].
#[repr(C)]
pub struct CiteprocBibliography {
    pub entries: *mut CiteprocBibEntry,
    pub len: usize,
}

struct CallbackFetcher {
    context: *mut c_void,
    callback: LocaleFetchCallback,
}

// SAFETY: the host promises that the context stays valid for the lifetime
// of the processor and that the callback may run on whichever thread drives
// the processor. The library never calls it concurrently for one processor.
unsafe impl Send for CallbackFetcher {}
unsafe impl Sync for CallbackFetcher {}

impl LocaleFetcher for CallbackFetcher {
    fn fetch_locale(&self, lang: &str) -> std::result::Result<Option<String>, LocaleFetchError> {
        let tag = CString::new(lang).map_err(|e| LocaleFetchError(e.to_string()))?;
        let mut slot = LocaleSlot::default();
        // SAFETY: slot and tag outlive the call; the host owns the context.
        unsafe { (self.callback)(self.context, &mut slot, tag.as_ptr()) };
        match slot.contents {
            None => Ok(None),
            Some(Ok(xml)) => Ok(Some(xml)),
            Some(Err(message)) => Err(LocaleFetchError(message)),
        }
    }
}

/// Runs `f`, turning errors and panics into the sentinel `fallback`.
fn guard<T>(fallback: T, f: impl FnOnce() -> Result<T>) -> T {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(value)) => value,
        Ok(Err(err)) => {
            err.set_last();
            fallback
        }
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            Error::Panic(message).set_last();
            fallback
        }
    }
}

fn to_c_string(s: String) -> Result<*mut c_char> {
    CString::new(s)
        .map(CString::into_raw)
        .map_err(|e| Error::InteriorNul(e.to_string()))
}

/// # Safety
/// `ptr` must be null or point at `len` readable bytes.
unsafe fn str_from_parts<'a>(ptr: *const c_char, len: usize, name: &str) -> Result<&'a str> {
    if ptr.is_null() {
        return Err(Error::null(name));
    }
    // SAFETY: guaranteed by the caller.
    let bytes = unsafe { std::slice::from_raw_parts(ptr.cast::<u8>(), len) };
    std::str::from_utf8(bytes).map_err(|e| Error::InvalidUtf8(format!("{name}: {e}")))
}

/// # Safety
/// `ptr` must be null or point at a null-terminated string.
unsafe fn str_from_cstr<'a>(ptr: *const c_char, name: &str) -> Result<&'a str> {
    if ptr.is_null() {
        return Err(Error::null(name));
    }
    // SAFETY: guaranteed by the caller.
    unsafe { CStr::from_ptr(ptr) }
        .to_str()
        .map_err(|e| Error::InvalidUtf8(format!("{name}: {e}")))
}

/// # Safety
/// `processor` must be null or a live handle from [`citeproc_processor_new`].
unsafe fn processor_mut<'a>(processor: *mut CiteprocProcessor) -> Result<&'a mut Processor> {
    // SAFETY: guaranteed by the caller.
    unsafe { processor.as_mut() }
        .map(|p| &mut p.inner)
        .ok_or_else(|| Error::null("processor"))
}

/// Creates a processor, or returns null if the style does not parse.
///
/// # Safety
/// `options` must point at a valid [`CiteprocInitOptions`]. The fetch
/// context must stay valid until the processor is freed.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn citeproc_processor_new(
    options: *const CiteprocInitOptions,
) -> *mut CiteprocProcessor {
    guard(std::ptr::null_mut(), || {
        // SAFETY: guaranteed by the caller.
        let options = unsafe { options.as_ref() }.ok_or_else(|| Error::null("options"))?;
        // SAFETY: guaranteed by the caller.
        let style = unsafe { str_from_parts(options.style, options.style_len, "style") }?;

        let mut init = InitOptions::new(style).format(options.format.into());
        if let Some(callback) = options.locale_fetch_callback {
            init = init.fetcher(CallbackFetcher {
                context: options.locale_fetch_context,
                callback,
            });
        }
        let inner = Processor::new(init)?;
        Ok(Box::into_raw(Box::new(CiteprocProcessor { inner })))
    })
}

/// # Safety
/// `processor` must be null or a handle not yet freed.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn citeproc_processor_free(processor: *mut CiteprocProcessor) {
    if !processor.is_null() {
        // SAFETY: guaranteed by the caller.
        drop(unsafe { Box::from_raw(processor) });
    }
}

/// Fills `slot` with `len` bytes of locale XML. Returns 0, or -1 if the
/// slot is null or the bytes are not UTF-8; invalid bytes still mark the
/// slot so the format call fails instead of silently falling back.
///
/// # Safety
/// `slot` must be the pointer passed to the running fetch callback and
/// `xml` must point at `len` readable bytes.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn citeproc_write_locale_slot(
    slot: *mut LocaleSlot,
    xml: *const c_char,
    len: usize,
) -> c_int {
    guard(-1, || {
        // SAFETY: guaranteed by the caller.
        let slot = unsafe { slot.as_mut() }.ok_or_else(|| Error::null("slot"))?;
        // SAFETY: guaranteed by the caller.
        match unsafe { str_from_parts(xml, len, "xml") } {
            Ok(xml) => {
                slot.contents = Some(Ok(xml.to_string()));
                Ok(0)
            }
            Err(err) => {
                slot.contents = Some(Err(err.to_string()));
                Err(err)
            }
        }
    })
}

/// Adds or replaces a CSL-JSON reference. Returns 0, or -1 if the JSON
/// is rejected; the store is then unchanged.
///
/// # Safety
/// `processor` must be a live handle and `json` must point at `len`
/// readable bytes.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn citeproc_processor_insert_reference(
    processor: *mut CiteprocProcessor,
    json: *const c_char,
    len: usize,
) -> c_int {
    guard(-1, || {
        // SAFETY: guaranteed by the caller.
        let processor = unsafe { processor_mut(processor) }?;
        // SAFETY: guaranteed by the caller.
        let json = unsafe { str_from_parts(json, len, "json") }?;
        processor.insert_reference_json(json)?;
        Ok(0)
    })
}

/// Returns 1 if the reference was removed, 0 if it was absent, -1 on error.
///
/// # Safety
/// `processor` must be a live handle and `id` a null-terminated string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn citeproc_processor_remove_reference(
    processor: *mut CiteprocProcessor,
    id: *const c_char,
) -> c_int {
    guard(-1, || {
        // SAFETY: guaranteed by the caller.
        let processor = unsafe { processor_mut(processor) }?;
        // SAFETY: guaranteed by the caller.
        let id = unsafe { str_from_cstr(id, "id") }?;
        Ok(c_int::from(processor.remove_reference(id)))
    })
}

/// Inserts one CSL-JSON reference and formats a citation of it.
///
/// # Safety
/// `processor` must be a live handle and `json` must point at `len`
/// readable bytes. Free the result with [`citeproc_string_free`].
#[unsafe(no_mangle)]
pub unsafe extern "C" fn citeproc_processor_format_one(
    processor: *mut CiteprocProcessor,
    json: *const c_char,
    len: usize,
) -> *mut c_char {
    guard(std::ptr::null_mut(), || {
        // SAFETY: guaranteed by the caller.
        let processor = unsafe { processor_mut(processor) }?;
        // SAFETY: guaranteed by the caller.
        let json = unsafe { str_from_parts(json, len, "json") }?;
        let id = processor.insert_reference_json(json)?;
        let rendered = processor.format_cite(&Cite::basic(id))?;
        to_c_string(rendered.into_string())
    })
}

/// Formats a citation of a stored reference, or returns null.
///
/// # Safety
/// `processor` must be a live handle and `id` a null-terminated string.
/// Free the result with [`citeproc_string_free`].
#[unsafe(no_mangle)]
pub unsafe extern "C" fn citeproc_processor_format_id(
    processor: *mut CiteprocProcessor,
    id: *const c_char,
) -> *mut c_char {
    guard(std::ptr::null_mut(), || {
        // SAFETY: guaranteed by the caller.
        let processor = unsafe { processor_mut(processor) }?;
        // SAFETY: guaranteed by the caller.
        let id = unsafe { str_from_cstr(id, "id") }?;
        to_c_string(processor.format_one(id)?.into_string())
    })
}

/// Formats bibliography entries for `ids_len` ids, or for every stored
/// reference when `ids` is null.
///
/// # Safety
/// `processor` must be a live handle and `ids`, when not null, must point
/// at `ids_len` null-terminated strings. Free the result with
/// [`citeproc_bibliography_free`].
#[unsafe(no_mangle)]
pub unsafe extern "C" fn citeproc_processor_format_bibliography(
    processor: *mut CiteprocProcessor,
    ids: *const *const c_char,
    ids_len: usize,
) -> *mut CiteprocBibliography {
    guard(std::ptr::null_mut(), || {
        // SAFETY: guaranteed by the caller.
        let processor = unsafe { processor_mut(processor) }?;
        let ids = if ids.is_null() {
            None
        } else {
            // SAFETY: guaranteed by the caller.
            let raw = unsafe { std::slice::from_raw_parts(ids, ids_len) };
            let mut owned = Vec::with_capacity(raw.len());
            for &id in raw {
                // SAFETY: guaranteed by the caller.
                owned.push(unsafe { str_from_cstr(id, "ids") }?.to_string());
            }
            Some(owned)
        };
        let entries = processor.format_bibliography(ids.as_deref())?;

        let mut converted = Vec::with_capacity(entries.len());
        for entry in entries {
            let id = to_c_string(entry.id);
            let value = to_c_string(entry.value.into_string());
            match (id, value) {
                (Ok(id), Ok(value)) => converted.push(CiteprocBibEntry { id, value }),
                (id, value) => {
                    for s in [id.ok(), value.ok()].into_iter().flatten() {
                        // SAFETY: allocated by to_c_string just above.
                        drop(unsafe { CString::from_raw(s) });
                    }
                    free_entries(converted);
                    return Err(Error::InteriorNul("bibliography entry".to_string()));
                }
            }
        }

        let len = converted.len();
        let entries = Box::into_raw(converted.into_boxed_slice()).cast::<CiteprocBibEntry>();
        Ok(Box::into_raw(Box::new(CiteprocBibliography { entries, len })))
    })
}

fn free_entries(entries: Vec<CiteprocBibEntry>) {
    for entry in entries {
        // SAFETY: both strings came from CString::into_raw.
        unsafe {
            drop(CString::from_raw(entry.id));
            drop(CString::from_raw(entry.value));
        }
    }
}

/// # Safety
/// `bibliography` must be null or a value returned by
/// [`citeproc_processor_format_bibliography`] that has not been freed.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn citeproc_bibliography_free(bibliography: *mut CiteprocBibliography) {
    if bibliography.is_null() {
        return;
    }
    // SAFETY: guaranteed by the caller; the entries were a boxed slice.
    unsafe {
        let bibliography = Box::from_raw(bibliography);
        let slice = std::ptr::slice_from_raw_parts_mut(bibliography.entries, bibliography.len);
        free_entries(Box::from_raw(slice).into_vec());
    }
}

/// # Safety
/// `s` must be null or a string returned by this library, not yet freed.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn citeproc_string_free(s: *mut c_char) {
    if !s.is_null() {
        // SAFETY: guaranteed by the caller.
        drop(unsafe { CString::from_raw(s) });
    }
}

/// Code of the last error on this thread, 0 if none.
#[unsafe(no_mangle)]
pub extern "C" fn citeproc_last_error_code() -> c_int {
    Error::last_code()
}

/// Message of the last error on this thread, or null if none. Free the
/// result with [`citeproc_string_free`].
#[unsafe(no_mangle)]
pub extern "C" fn citeproc_last_error_message() -> *mut c_char {
    Error::last_message()
        .and_then(|message| CString::new(message).ok())
        .map_or(std::ptr::null_mut(), CString::into_raw)
}
