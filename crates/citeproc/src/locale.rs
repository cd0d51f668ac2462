//! Locale resolution.
//!
//! Locale documents come from a caller-supplied [`LocaleFetcher`] and are
//! merged with the style's inline `<locale>` overrides and the built-in
//! `en-US` locale. For a tag `ll-RR` the precedence is:
//!
//! 1. inline `ll-RR`, inline `ll`, inline locale without `xml:lang`
//! 2. fetched `ll-RR`
//! 3. fetched `ll`
//! 4. built-in `en-US`
//!
//! Earlier tiers win per term; later tiers only fill gaps. Every fetch
//! result, including a decline, is cached for the lifetime of the
//! [`LocaleResolver`], so the fetcher sees each tag at most once.

use crate::{Error, Result};
use citeproc_csl::{Locale, Style, parse_locale};
use once_cell::sync::Lazy;
use rust_embed::Embed;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

/// Tag of the built-in locale.
pub const BUILTIN_LANG: &str = "en-US";

#[derive(Embed)]
#[folder = "locales/"]
#[include = "*.xml"]
struct LocaleFiles;

/// Raw XML of a bundled locale, e.g. `builtin_locale_xml("en-US")`.
pub fn builtin_locale_xml(lang: &str) -> Option<String> {
    let file = LocaleFiles::get(&format!("locales-{}.xml", lang))?;
    String::from_utf8(file.data.into_owned()).ok()
}

static BUILTIN: Lazy<Locale> = Lazy::new(|| {
    let parsed = builtin_locale_xml(BUILTIN_LANG)
        .ok_or_else(|| "bundled locale file missing".to_string())
        .and_then(|xml| parse_locale(&xml).map_err(|e| e.to_string()));
    match parsed {
        Ok(locale) => locale,
        Err(message) => {
            tracing::warn!(error = %message, "built-in locale unavailable");
            Locale::default()
        }
    }
});

/// The parsed built-in locale.
pub fn builtin_locale() -> &'static Locale {
    &BUILTIN
}

/// Error reported by a [`LocaleFetcher`] that could not answer at all.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct LocaleFetchError(pub String);

impl From<std::io::Error> for LocaleFetchError {
    fn from(err: std::io::Error) -> Self {
        LocaleFetchError(err.to_string())
    }
}

/// Source of locale XML, asked lazily for each language tag.
///
/// `Ok(None)` declines: that tier contributes nothing and resolution moves
/// on. The call is synchronous and blocks the format call that caused it.
pub trait LocaleFetcher: Send + Sync {
    fn fetch_locale(&self, lang: &str) -> std::result::Result<Option<String>, LocaleFetchError>;
}

impl<F> LocaleFetcher for F
where
    F: Fn(&str) -> std::result::Result<Option<String>, LocaleFetchError> + Send + Sync,
{
    fn fetch_locale(&self, lang: &str) -> std::result::Result<Option<String>, LocaleFetchError> {
        self(lang)
    }
}

/// A fixed table of locale documents.
#[derive(Debug, Clone, Default)]
pub struct PredefinedLocales(HashMap<String, String>);

impl PredefinedLocales {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, lang: impl Into<String>, xml: impl Into<String>) -> Self {
        self.insert(lang, xml);
        self
    }

    pub fn insert(&mut self, lang: impl Into<String>, xml: impl Into<String>) {
        self.0.insert(lang.into(), xml.into());
    }

    /// A table holding the bundled `en-US` document.
    pub fn bundled_en_us() -> Self {
        let mut locales = Self::new();
        if let Some(xml) = builtin_locale_xml(BUILTIN_LANG) {
            locales.insert(BUILTIN_LANG, xml);
        }
        locales
    }
}

impl LocaleFetcher for PredefinedLocales {
    fn fetch_locale(&self, lang: &str) -> std::result::Result<Option<String>, LocaleFetchError> {
        Ok(self.0.get(lang).cloned())
    }
}

/// Reads `locales-{lang}.xml` from a directory, such as a checkout of the
/// CSL locales repository. A missing file declines.
#[derive(Debug, Clone)]
pub struct FilesystemLocales {
    root: PathBuf,
}

impl FilesystemLocales {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl LocaleFetcher for FilesystemLocales {
    fn fetch_locale(&self, lang: &str) -> std::result::Result<Option<String>, LocaleFetchError> {
        let path = self.root.join(format!("locales-{}.xml", lang));
        match std::fs::read_to_string(&path) {
            Ok(xml) => Ok(Some(xml)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(LocaleFetchError(format!("{}: {}", path.display(), e))),
        }
    }
}

/// Per-processor locale cache in front of a [`LocaleFetcher`].
pub struct LocaleResolver {
    fetcher: Option<Arc<dyn LocaleFetcher>>,
    /// Fetch results by tag; `None` records a decline.
    fetched: HashMap<String, Option<Arc<Locale>>>,
    merged: HashMap<String, Arc<Locale>>,
}

impl std::fmt::Debug for LocaleResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocaleResolver")
            .field("has_fetcher", &self.fetcher.is_some())
            .field("fetched", &self.fetched.keys().collect::<Vec<_>>())
            .field("merged", &self.merged.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl LocaleResolver {
    pub fn new(fetcher: Option<Arc<dyn LocaleFetcher>>) -> Self {
        Self {
            fetcher,
            fetched: HashMap::new(),
            merged: HashMap::new(),
        }
    }

    /// The merged locale for `lang`.
    ///
    /// Fails with [`Error::MalformedLocale`] if the fetcher errors or hands
    /// back a document that does not parse. Such failures are not cached.
    pub fn resolve(&mut self, lang: &str, style: &Style) -> Result<Arc<Locale>> {
        if let Some(locale) = self.merged.get(lang) {
            tracing::trace!(lang = %lang, "merged locale cache hit");
            return Ok(Arc::clone(locale));
        }

        let base = base_language(lang);
        let exact = self.fetch(lang)?;
        let language = match base {
            Some(base) => self.fetch(base)?,
            None => None,
        };

        let mut inline: Vec<&Locale> = Vec::new();
        inline.extend(style.inline_locale(Some(lang)));
        if let Some(base) = base {
            inline.extend(style.inline_locale(Some(base)));
        }
        inline.extend(style.inline_locale(None));

        let mut merged = Locale {
            lang: Some(lang.to_string()),
            ..Locale::default()
        };
        for tier in inline
            .into_iter()
            .chain(exact.as_deref())
            .chain(language.as_deref())
            .chain(std::iter::once(builtin_locale()))
        {
            merged.merge_fallback(tier);
        }
        tracing::debug!(
            lang = %lang,
            fetched_exact = exact.is_some(),
            fetched_language = language.is_some(),
            terms = merged.terms.len(),
            "merged locale"
        );

        let merged = Arc::new(merged);
        self.merged.insert(lang.to_string(), Arc::clone(&merged));
        Ok(merged)
    }

    fn fetch(&mut self, lang: &str) -> Result<Option<Arc<Locale>>> {
        if let Some(cached) = self.fetched.get(lang) {
            tracing::debug!(lang = %lang, declined = cached.is_none(), "locale fetch cache hit");
            return Ok(cached.clone());
        }

        let Some(fetcher) = &self.fetcher else {
            self.fetched.insert(lang.to_string(), None);
            return Ok(None);
        };

        tracing::debug!(lang = %lang, "fetching locale");
        let xml = fetcher.fetch_locale(lang).map_err(|e| {
            tracing::warn!(lang = %lang, error = %e, "locale fetch failed");
            Error::malformed_locale(lang, e)
        })?;

        let locale = match xml {
            None => {
                tracing::debug!(lang = %lang, "locale fetch declined");
                None
            }
            Some(xml) => {
                let locale = parse_locale(&xml).map_err(|e| {
                    tracing::warn!(lang = %lang, error = %e, "fetched locale is malformed");
                    Error::malformed_locale(lang, e)
                })?;
                Some(Arc::new(locale))
            }
        };
        self.fetched.insert(lang.to_string(), locale.clone());
        Ok(locale)
    }
}

/// `en` for `en-US`; `None` when the tag has no region.
fn base_language(lang: &str) -> Option<&str> {
    lang.split_once(['-', '_'])
        .map(|(base, _)| base)
        .filter(|base| !base.is_empty())
}
