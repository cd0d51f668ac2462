//! Locale documents: terms, localized date formats and locale options.

use crate::types::Formatting;
use citeproc_xml::Span;
use std::collections::HashMap;

/// A `<locale>` document or an inline `<locale>` of a style.
#[derive(Debug, Clone, Default)]
pub struct Locale {
    /// `xml:lang`; inline locales may omit it.
    pub lang: Option<String>,
    pub terms: HashMap<TermKey, Term>,
    pub date_formats: HashMap<DateForm, DateFormat>,
    pub options: LocaleOptions,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TermKey {
    pub name: String,
    pub form: TermForm,
}

impl TermKey {
    pub fn new(name: impl Into<String>, form: TermForm) -> Self {
        Self {
            name: name.into(),
            form,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Term {
    pub name: String,
    pub form: TermForm,
    pub single: String,
    pub multiple: Option<String>,
    /// Only meaningful for `ordinal-NN` terms.
    pub match_kind: Option<OrdinalMatch>,
}

impl Term {
    pub fn text(&self, plural: bool) -> &str {
        if plural {
            self.multiple.as_deref().unwrap_or(&self.single)
        } else {
            &self.single
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TermForm {
    #[default]
    Long,
    Short,
    Verb,
    VerbShort,
    Symbol,
}

impl TermForm {
    /// Next form to try when this one is not defined.
    pub fn fallback(self) -> Option<TermForm> {
        match self {
            TermForm::Long => None,
            TermForm::Short | TermForm::Verb => Some(TermForm::Long),
            TermForm::VerbShort => Some(TermForm::Verb),
            TermForm::Symbol => Some(TermForm::Short),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrdinalMatch {
    LastDigit,
    LastTwoDigits,
    WholeNumber,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DateForm {
    #[default]
    Text,
    Numeric,
}

#[derive(Debug, Clone)]
pub struct DateFormat {
    pub form: DateForm,
    pub parts: Vec<DatePart>,
    pub delimiter: Option<String>,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct DatePart {
    pub name: DatePartName,
    pub form: Option<DatePartForm>,
    pub formatting: Formatting,
    pub range_delimiter: Option<String>,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatePartName {
    Year,
    Month,
    Day,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatePartForm {
    Long,
    Short,
    Numeric,
    NumericLeadingZeros,
    Ordinal,
}

/// `<style-options>` of a locale. Unset fields fall through the chain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LocaleOptions {
    pub punctuation_in_quote: Option<bool>,
    pub limit_day_ordinals_to_day_1: Option<bool>,
}

impl Locale {
    /// Fill every key missing here from `fallback`.
    ///
    /// Ordinal terms are taken as a set: a locale that defines any of them
    /// does not inherit the others.
    pub fn merge_fallback(&mut self, fallback: &Locale) {
        let has_ordinals = self.terms.keys().any(|k| is_ordinal_term(&k.name));
        for (key, term) in &fallback.terms {
            if has_ordinals && is_ordinal_term(&key.name) {
                continue;
            }
            self.terms
                .entry(key.clone())
                .or_insert_with(|| term.clone());
        }
        for (form, format) in &fallback.date_formats {
            self.date_formats
                .entry(*form)
                .or_insert_with(|| format.clone());
        }
        self.options.punctuation_in_quote = self
            .options
            .punctuation_in_quote
            .or(fallback.options.punctuation_in_quote);
        self.options.limit_day_ordinals_to_day_1 = self
            .options
            .limit_day_ordinals_to_day_1
            .or(fallback.options.limit_day_ordinals_to_day_1);
    }

    /// Term by name, walking the form fallback chain.
    pub fn term(&self, name: &str, form: TermForm) -> Option<&Term> {
        let mut form = Some(form);
        while let Some(f) = form {
            if let Some(term) = self.terms.get(&TermKey::new(name, f)) {
                return Some(term);
            }
            form = f.fallback();
        }
        None
    }

    pub fn term_text(&self, name: &str, form: TermForm, plural: bool) -> Option<&str> {
        self.term(name, form).map(|t| t.text(plural))
    }

    pub fn date_format(&self, form: DateForm) -> Option<&DateFormat> {
        self.date_formats.get(&form)
    }

    pub fn punctuation_in_quote(&self) -> bool {
        self.options.punctuation_in_quote.unwrap_or(false)
    }

    pub fn limit_day_ordinals_to_day_1(&self) -> bool {
        self.options.limit_day_ordinals_to_day_1.unwrap_or(false)
    }

    /// Ordinal suffix for `n` ("st", "nd", ...).
    pub fn ordinal_suffix(&self, n: u64) -> Option<&str> {
        let two = n % 100;
        if two >= 10 {
            let name = format!("ordinal-{:02}", two);
            if let Some(term) = self.terms.get(&TermKey::new(name, TermForm::Long)) {
                let matches = match term.match_kind.unwrap_or(OrdinalMatch::LastTwoDigits) {
                    OrdinalMatch::WholeNumber => n == two,
                    _ => true,
                };
                if matches {
                    return Some(&term.single);
                }
            }
        }

        let one = n % 10;
        let name = format!("ordinal-{:02}", one);
        if let Some(term) = self.terms.get(&TermKey::new(name, TermForm::Long)) {
            let matches = match term.match_kind.unwrap_or(OrdinalMatch::LastDigit) {
                OrdinalMatch::LastDigit => true,
                OrdinalMatch::LastTwoDigits => two == one,
                OrdinalMatch::WholeNumber => n == one,
            };
            if matches {
                return Some(&term.single);
            }
        }

        self.term_text("ordinal", TermForm::Long, false)
    }

    /// Long ordinal word for 1 through 10 ("first", ...).
    pub fn long_ordinal(&self, n: u64) -> Option<&str> {
        if (1..=10).contains(&n) {
            let name = format!("long-ordinal-{:02}", n);
            return self.term_text(&name, TermForm::Long, false);
        }
        None
    }
}

fn is_ordinal_term(name: &str) -> bool {
    name == "ordinal" || name.starts_with("ordinal-")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn term(name: &str, form: TermForm, single: &str) -> Term {
        Term {
            name: name.to_string(),
            form,
            single: single.to_string(),
            multiple: None,
            match_kind: None,
        }
    }

    fn locale(terms: Vec<Term>) -> Locale {
        Locale {
            terms: terms
                .into_iter()
                .map(|t| (TermKey::new(t.name.clone(), t.form), t))
                .collect(),
            ..Locale::default()
        }
    }

    #[test]
    fn test_term_form_fallback() {
        let loc = locale(vec![
            term("editor", TermForm::Long, "editor"),
            term("editor", TermForm::Short, "ed."),
        ]);
        assert_eq!(loc.term_text("editor", TermForm::Symbol, false), Some("ed."));
        assert_eq!(
            loc.term_text("editor", TermForm::VerbShort, false),
            Some("editor")
        );
        assert_eq!(loc.term_text("translator", TermForm::Long, false), None);
    }

    #[test]
    fn test_plural_falls_back_to_single() {
        let loc = locale(vec![term("and", TermForm::Long, "and")]);
        assert_eq!(loc.term_text("and", TermForm::Long, true), Some("and"));
    }

    #[test]
    fn test_merge_fills_only_missing_keys() {
        let mut specific = locale(vec![term("editor", TermForm::Long, "Herausgeber")]);
        specific.options.punctuation_in_quote = Some(false);
        let mut root = locale(vec![
            term("editor", TermForm::Long, "editor"),
            term("translator", TermForm::Long, "translator"),
        ]);
        root.options.punctuation_in_quote = Some(true);
        root.options.limit_day_ordinals_to_day_1 = Some(true);

        specific.merge_fallback(&root);

        assert_eq!(
            specific.term_text("editor", TermForm::Long, false),
            Some("Herausgeber")
        );
        assert_eq!(
            specific.term_text("translator", TermForm::Long, false),
            Some("translator")
        );
        assert!(!specific.punctuation_in_quote());
        assert!(specific.limit_day_ordinals_to_day_1());
    }

    #[test]
    fn test_merge_keeps_ordinal_set_intact() {
        let mut specific = locale(vec![term("ordinal", TermForm::Long, ".")]);
        let root = locale(vec![
            term("ordinal", TermForm::Long, "th"),
            term("ordinal-01", TermForm::Long, "st"),
        ]);
        specific.merge_fallback(&root);
        assert_eq!(specific.ordinal_suffix(1), Some("."));
    }

    #[test]
    fn test_english_ordinals() {
        let mut eleven = term("ordinal-11", TermForm::Long, "th");
        eleven.match_kind = Some(OrdinalMatch::LastTwoDigits);
        let loc = locale(vec![
            term("ordinal", TermForm::Long, "th"),
            term("ordinal-01", TermForm::Long, "st"),
            term("ordinal-02", TermForm::Long, "nd"),
            term("ordinal-03", TermForm::Long, "rd"),
            eleven,
        ]);
        assert_eq!(loc.ordinal_suffix(1), Some("st"));
        assert_eq!(loc.ordinal_suffix(11), Some("th"));
        assert_eq!(loc.ordinal_suffix(21), Some("st"));
        assert_eq!(loc.ordinal_suffix(102), Some("nd"));
        assert_eq!(loc.ordinal_suffix(111), Some("th"));
        assert_eq!(loc.ordinal_suffix(4), Some("th"));
    }

    #[test]
    fn test_whole_number_match() {
        let mut one = term("ordinal-01", TermForm::Long, "er");
        one.match_kind = Some(OrdinalMatch::WholeNumber);
        let loc = locale(vec![term("ordinal", TermForm::Long, "e"), one]);
        assert_eq!(loc.ordinal_suffix(1), Some("er"));
        assert_eq!(loc.ordinal_suffix(21), Some("e"));
    }
}
