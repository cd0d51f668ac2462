//! `<sort>` keys and comparison.

use crate::cite::Cite;
use crate::eval::{EvalContext, Mode, NamesOverride, eval_macro};
use crate::reference::{DATE_VARIABLES, NAME_VARIABLES, Reference};
use crate::{date, names, number};
use citeproc_csl::{Layout, Locale, Sort, SortKey, SortKeyType, SortOrder, Style};
use std::cmp::Ordering;

/// Computed keys of one item, one per `<key>`. `None` is an empty key.
pub(crate) type SortKeys = Vec<Option<String>>;

pub(crate) struct Sorter<'a> {
    style: &'a Style,
    locale: &'a Locale,
    layout: &'a Layout,
    sort: &'a Sort,
}

impl<'a> Sorter<'a> {
    /// `None` when the layout has no `<sort>`.
    pub(crate) fn new(style: &'a Style, locale: &'a Locale, layout: &'a Layout) -> Option<Self> {
        let sort = layout.sort.as_ref().filter(|sort| !sort.keys.is_empty())?;
        Some(Self {
            style,
            locale,
            layout,
            sort,
        })
    }

    /// Whether the only key is `citation-number`, in which case numbers
    /// are not reassigned after sorting.
    pub(crate) fn by_citation_number_only(&self) -> bool {
        matches!(
            self.sort.keys.as_slice(),
            [SortKey { key: SortKeyType::Variable(name), .. }] if name == "citation-number"
        )
    }

    pub(crate) fn keys(
        &self,
        reference: &Reference,
        cite: &Cite,
        citation_number: Option<u32>,
    ) -> SortKeys {
        self.sort
            .keys
            .iter()
            .map(|key| {
                let mut ctx = EvalContext::new(
                    self.style,
                    self.locale,
                    reference,
                    cite,
                    Mode::Sort,
                    self.layout,
                )
                .with_citation_number(citation_number);
                ctx.names_override = Some(NamesOverride {
                    min: key.names_min,
                    use_first: key.names_use_first,
                    use_last: key.names_use_last,
                });
                let raw = match &key.key {
                    SortKeyType::Variable(name) => variable_key(&ctx, name),
                    SortKeyType::Macro(id) => Some(eval_macro(&mut ctx, *id).plain_text()),
                };
                raw.map(|k| normalize(&k)).filter(|k| !k.is_empty())
            })
            .collect()
    }

    /// Compare two items key by key. Empty keys sort last in either
    /// direction.
    pub(crate) fn compare(&self, a: &SortKeys, b: &SortKeys) -> Ordering {
        for (key, (a, b)) in self.sort.keys.iter().zip(a.iter().zip(b.iter())) {
            let ordering = match (a, b) {
                (None, None) => Ordering::Equal,
                (None, Some(_)) => Ordering::Greater,
                (Some(_), None) => Ordering::Less,
                (Some(a), Some(b)) => match key.order {
                    SortOrder::Ascending => a.cmp(b),
                    SortOrder::Descending => b.cmp(a),
                },
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    }
}

fn variable_key(ctx: &EvalContext<'_>, name: &str) -> Option<String> {
    if NAME_VARIABLES.contains(&name) {
        return names::names_sort_key(ctx, name);
    }
    if DATE_VARIABLES.contains(&name) {
        return ctx.reference.date(name).map(date::sort_key);
    }
    ctx.variable(name).map(|value| value.into_owned())
}

/// Case-insensitive, ignoring leading punctuation, with numbers padded so
/// that they compare numerically.
fn normalize(key: &str) -> String {
    let trimmed = key.trim_start_matches(|c: char| !c.is_alphanumeric());
    number::sort_key(&trimmed.to_lowercase())
}
