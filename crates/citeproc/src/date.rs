//! Date rendering.

use crate::eval::{EvalContext, GroupVars, Mode};
use crate::output::{Output, join_outputs};
use crate::reference::{DateParts, DateVariable};
use citeproc_csl::{
    DateElement, DatePart, DatePartForm, DatePartName, DatePartsFilter, Formatting, Locale,
    TermForm,
};

const DEFAULT_RANGE_DELIMITER: &str = "–";

pub(crate) fn eval_date(ctx: &mut EvalContext<'_>, el: &DateElement) -> (Output, GroupVars) {
    if ctx.is_suppressed(&el.variable) {
        return (Output::Null, GroupVars::Missing);
    }
    let Some(date) = ctx.reference.date(&el.variable) else {
        return (Output::Null, GroupVars::Missing);
    };
    ctx.mark_rendered(&el.variable);

    if ctx.mode == Mode::Sort {
        return (Output::literal(sort_key(date)), GroupVars::Important);
    }

    let (parts, delimiter) = match el.form {
        Some(form) => match ctx.locale.date_format(form) {
            Some(format) => (
                localized_parts(&format.parts, el),
                format.delimiter.clone().unwrap_or_default(),
            ),
            None => {
                tracing::warn!(variable = %el.variable, ?form, "locale has no date format");
                (Vec::new(), String::new())
            }
        },
        None => (el.parts.clone(), el.delimiter.clone().unwrap_or_default()),
    };

    let shows_year =
        date.literal.is_some() || parts.iter().any(|p| p.name == DatePartName::Year);
    let suffix = if shows_year {
        ctx.take_implicit_year_suffix()
    } else {
        None
    };
    (
        render_date(date, &parts, &delimiter, ctx.locale, suffix.as_deref()),
        GroupVars::Important,
    )
}

/// The locale's parts for a localized form, filtered by `date-parts` and
/// with the element's own `<date-part>`s overriding matching parts.
fn localized_parts(base: &[DatePart], el: &DateElement) -> Vec<DatePart> {
    base.iter()
        .filter(|part| match el.date_parts {
            DatePartsFilter::Year => part.name == DatePartName::Year,
            DatePartsFilter::YearMonth => part.name != DatePartName::Day,
            DatePartsFilter::YearMonthDay => true,
        })
        .map(|part| match el.parts.iter().find(|p| p.name == part.name) {
            Some(inline) => override_part(part, inline),
            None => part.clone(),
        })
        .collect()
}

/// Inline overrides change form and styling; affixes stay the locale's.
fn override_part(base: &DatePart, inline: &DatePart) -> DatePart {
    let mut formatting = Formatting {
        prefix: base.formatting.prefix.clone(),
        suffix: base.formatting.suffix.clone(),
        ..inline.formatting.clone()
    };
    let inline_unstyled = Formatting {
        prefix: None,
        suffix: None,
        ..inline.formatting.clone()
    }
    .is_default();
    if inline_unstyled {
        formatting = base.formatting.clone();
    }
    DatePart {
        name: base.name,
        form: inline.form.or(base.form),
        formatting,
        range_delimiter: inline
            .range_delimiter
            .clone()
            .or_else(|| base.range_delimiter.clone()),
        span: inline.span,
    }
}

/// `suffix` follows the year: the end year for a range.
fn render_date(
    date: &DateVariable,
    parts: &[DatePart],
    delimiter: &str,
    locale: &Locale,
    suffix: Option<&str>,
) -> Output {
    if let Some(literal) = &date.literal {
        return Output::literal(format!("{}{}", literal, suffix.unwrap_or("")));
    }
    let Some(start) = date.start() else {
        return Output::Null;
    };
    let Some(end) = date.end() else {
        return render_single(start, parts, delimiter, locale, suffix);
    };

    let largest = if start.year != end.year {
        DatePartName::Year
    } else if start.month != end.month || start.season != end.season {
        DatePartName::Month
    } else {
        DatePartName::Day
    };

    // Parts that exist in this date, in format order.
    let present: Vec<&DatePart> = parts
        .iter()
        .filter(|part| has_part(start, part.name) || has_part(end, part.name))
        .collect();
    let in_block = |part: &DatePart| match largest {
        DatePartName::Year => true,
        DatePartName::Month => part.name != DatePartName::Year,
        DatePartName::Day => part.name == DatePartName::Day,
    };
    let block: Vec<usize> = present
        .iter()
        .enumerate()
        .filter(|(_, part)| in_block(part))
        .map(|(i, _)| i)
        .collect();

    let range_delimiter = parts
        .iter()
        .find(|part| part.name == largest)
        .and_then(|part| part.range_delimiter.as_deref())
        .unwrap_or(DEFAULT_RANGE_DELIMITER);

    let contiguous = block.windows(2).all(|w| w[1] == w[0] + 1);
    let (Some(&first), Some(&last), true) = (block.first(), block.last(), contiguous) else {
        return Output::sequence(vec![
            render_single(start, parts, delimiter, locale, None),
            Output::literal(range_delimiter),
            render_single(end, parts, delimiter, locale, suffix),
        ]);
    };

    let block_parts: Vec<DatePart> = present[first..=last].iter().map(|p| (*p).clone()).collect();
    let mut start_parts = block_parts.clone();
    if let Some(part) = start_parts.last_mut() {
        part.formatting.suffix = None;
    }
    let mut end_parts = block_parts;
    if let Some(part) = end_parts.first_mut() {
        part.formatting.prefix = None;
    }
    let range = Output::sequence(vec![
        render_parts(start, start_parts.iter(), delimiter, locale, None),
        Output::literal(range_delimiter),
        render_parts(end, end_parts.iter(), delimiter, locale, suffix),
    ]);

    let mut outputs = Vec::new();
    outputs.extend(present[..first].iter().map(|p| render_part(start, p, locale, suffix)));
    outputs.push(range);
    outputs.extend(present[last + 1..].iter().map(|p| render_part(start, p, locale, suffix)));
    join_outputs(outputs, delimiter)
}

fn render_single(
    date: &DateParts,
    parts: &[DatePart],
    delimiter: &str,
    locale: &Locale,
    suffix: Option<&str>,
) -> Output {
    render_parts(date, parts.iter(), delimiter, locale, suffix)
}

fn render_parts<'p>(
    date: &DateParts,
    parts: impl Iterator<Item = &'p DatePart>,
    delimiter: &str,
    locale: &Locale,
    suffix: Option<&str>,
) -> Output {
    join_outputs(
        parts.map(|p| render_part(date, p, locale, suffix)).collect(),
        delimiter,
    )
}

fn has_part(date: &DateParts, name: DatePartName) -> bool {
    match name {
        DatePartName::Year => true,
        DatePartName::Month => date.month.is_some() || date.season.is_some(),
        DatePartName::Day => date.day.is_some(),
    }
}

fn render_part(date: &DateParts, part: &DatePart, locale: &Locale, suffix: Option<&str>) -> Output {
    let text = match part.name {
        DatePartName::Year => Some(format!(
            "{}{}",
            format_year(date.year, part.form),
            suffix.unwrap_or("")
        )),
        DatePartName::Month => format_month(date, part.form, locale),
        DatePartName::Day => date.day.map(|day| format_day(day, part.form, locale)),
    };
    match text {
        Some(text) => Output::formatted(part.formatting.clone(), vec![Output::literal(text)]),
        None => Output::Null,
    }
}

fn format_year(year: i32, form: Option<DatePartForm>) -> String {
    if form == Some(DatePartForm::Short) {
        return format!("{:02}", year.rem_euclid(100));
    }
    if year < 0 {
        format!("{}BC", year.unsigned_abs())
    } else if year < 1000 {
        format!("{}AD", year)
    } else {
        year.to_string()
    }
}

fn format_month(date: &DateParts, form: Option<DatePartForm>, locale: &Locale) -> Option<String> {
    let Some(month) = date.month else {
        let season = date.season?;
        let name = format!("season-{:02}", season);
        return locale
            .term_text(&name, TermForm::Long, false)
            .map(str::to_string);
    };
    let term = |form| {
        locale
            .term_text(&format!("month-{:02}", month), form, false)
            .map(str::to_string)
    };
    match form.unwrap_or(DatePartForm::Long) {
        DatePartForm::Long => term(TermForm::Long),
        DatePartForm::Short => term(TermForm::Short),
        DatePartForm::NumericLeadingZeros => Some(format!("{:02}", month)),
        DatePartForm::Numeric | DatePartForm::Ordinal => Some(month.to_string()),
    }
}

fn format_day(day: u32, form: Option<DatePartForm>, locale: &Locale) -> String {
    match form.unwrap_or(DatePartForm::Numeric) {
        DatePartForm::NumericLeadingZeros => format!("{:02}", day),
        DatePartForm::Ordinal if day == 1 || !locale.limit_day_ordinals_to_day_1() => {
            crate::number::ordinal(u64::from(day), locale)
        }
        _ => day.to_string(),
    }
}

/// Sortable form of a date: `YYYYYYMMDD` with the year offset so that BC
/// dates sort first, followed by the end of a range if any.
pub(crate) fn sort_key(date: &DateVariable) -> String {
    let key = |d: &DateParts| {
        format!(
            "{:06}{:02}{:02}",
            i64::from(d.year) + 100_000,
            d.month.or(d.season).unwrap_or(0),
            d.day.unwrap_or(0)
        )
    };
    match (date.start(), date.end()) {
        (Some(start), Some(end)) => format!("{}{}", key(start), key(end)),
        (Some(start), None) => key(start),
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::{OutputFormat, render};
    use crate::locale::builtin_locale;

    fn text_parts() -> Vec<DatePart> {
        builtin_locale()
            .date_format(citeproc_csl::DateForm::Text)
            .map(|f| f.parts.clone())
            .unwrap_or_default()
    }

    fn plain(date: &DateVariable, parts: &[DatePart]) -> String {
        let locale = builtin_locale();
        render(&render_date(date, parts, "", locale, None), OutputFormat::Plain, locale)
    }

    #[test]
    fn test_single_dates() {
        let parts = text_parts();
        assert_eq!(plain(&DateVariable::single(DateParts::ymd(2020, 6, 5)), &parts), "June 5, 2020");
        assert_eq!(plain(&DateVariable::single(DateParts::year(1999)), &parts), "1999");
    }

    #[test]
    fn test_year_suffix_follows_last_year() {
        let parts = text_parts();
        let locale = builtin_locale();
        let with_suffix = |date: &DateVariable| {
            render(
                &render_date(date, &parts, "", locale, Some("b")),
                OutputFormat::Plain,
                locale,
            )
        };
        assert_eq!(with_suffix(&DateVariable::single(DateParts::year(2020))), "2020b");
        let years = DateVariable::range(DateParts::year(2019), DateParts::year(2020));
        assert_eq!(with_suffix(&years), "2019–2020b");
        let days = DateVariable::range(DateParts::ymd(2020, 6, 5), DateParts::ymd(2020, 6, 9));
        assert_eq!(with_suffix(&days), "June 5–9, 2020b");
    }

    #[test]
    fn test_season_uses_term() {
        let date = DateVariable::single(DateParts {
            year: 2001,
            season: Some(3),
            ..DateParts::default()
        });
        assert_eq!(plain(&date, &text_parts()), "Autumn 2001");
    }

    #[test]
    fn test_literal_date() {
        assert_eq!(plain(&DateVariable::literal("ca. 1850"), &text_parts()), "ca. 1850");
    }

    #[test]
    fn test_range_collapses_shared_parts() {
        let parts = text_parts();
        let days = DateVariable::range(DateParts::ymd(2020, 6, 5), DateParts::ymd(2020, 6, 9));
        assert_eq!(plain(&days, &parts), "June 5–9, 2020");
        let months = DateVariable::range(DateParts::ymd(2020, 6, 5), DateParts::ymd(2020, 7, 1));
        assert_eq!(plain(&months, &parts), "June 5–July 1, 2020");
        let years = DateVariable::range(DateParts::year(1990), DateParts::year(1995));
        assert_eq!(plain(&years, &parts), "1990–1995");
    }

    #[test]
    fn test_year_eras_and_short_form() {
        assert_eq!(format_year(-50, None), "50BC");
        assert_eq!(format_year(i32::MIN, None), "2147483648BC");
        assert_eq!(format_year(800, None), "800AD");
        assert_eq!(format_year(2024, None), "2024");
        assert_eq!(format_year(2004, Some(DatePartForm::Short)), "04");
    }

    #[test]
    fn test_day_ordinals() {
        let locale = builtin_locale();
        assert_eq!(format_day(2, Some(DatePartForm::Ordinal), locale), "2nd");
        assert_eq!(format_day(7, Some(DatePartForm::NumericLeadingZeros), locale), "07");
    }

    #[test]
    fn test_sort_key_orders_eras() {
        let bc = sort_key(&DateVariable::single(DateParts::year(-100)));
        let ad = sort_key(&DateVariable::single(DateParts::ymd(5, 1, 1)));
        let modern = sort_key(&DateVariable::single(DateParts::year(2000)));
        assert!(bc < ad && ad < modern);
    }
}
