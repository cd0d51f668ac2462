//! Numeric variables: detection, `<number>` forms and page ranges.

use crate::eval::{EvalContext, GroupVars, Mode};
use crate::output::Output;
use citeproc_csl::{Locale, NumberElement, NumberForm, PageRangeFormat, TermForm};
use once_cell::sync::Lazy;
use regex::Regex;

/// A number token: ASCII digits with optional letter affixes ("2a", "S12").
static NUMERIC: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^\s*[A-Za-z]*[0-9]+[A-Za-z]*(?:\s*(?:[-–,&]|and)\s*[A-Za-z]*[0-9]+[A-Za-z]*)*\s*$",
    )
    .expect("numeric pattern is valid")
});

/// Splits a numeric value into tokens and the separators between them.
static TOKENS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s*([-–,&]|\band\b)\s*").expect("separator pattern is valid"));

// ASCII only; range compression slices matches by byte length.
static RANGE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"([A-Za-z]*)([0-9]+)\s*[-–]+\s*([A-Za-z]*)([0-9]+)").expect("range pattern is valid")
});

static DIGITS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[0-9]+").expect("digits pattern is valid"));

/// Whether `value` is numeric in the CSL sense: one or more number tokens
/// joined by hyphens, commas or ampersands.
pub fn is_numeric(value: &str) -> bool {
    NUMERIC.is_match(value)
}

/// Whether a numeric value refers to more than one thing ("1-3", "2, 5").
pub fn is_plural(value: &str) -> bool {
    is_numeric(value) && TOKENS.is_match(value.trim())
}

pub(crate) fn leading_number(value: &str) -> Option<u64> {
    DIGITS.find(value).and_then(|m| m.as_str().parse().ok())
}

pub(crate) fn eval_number(ctx: &mut EvalContext<'_>, el: &NumberElement) -> (Output, GroupVars) {
    let Some(value) = ctx.variable(&el.variable) else {
        return (Output::Null, GroupVars::Missing);
    };
    ctx.mark_rendered(&el.variable);

    if ctx.mode == Mode::Sort {
        return (Output::literal(sort_key(&value)), GroupVars::Important);
    }

    let text = if is_numeric(&value) {
        format_number(&value, el.form, ctx.locale)
    } else {
        value.into_owned()
    };
    (Output::literal(text), GroupVars::Important)
}

/// Render a numeric value in `form`. Separators are normalized: hyphens
/// lose surrounding space, commas get a trailing space, and ampersands are
/// spaced.
pub fn format_number(value: &str, form: NumberForm, locale: &Locale) -> String {
    let value = value.trim();
    let mut out = String::with_capacity(value.len());
    let mut last = 0;
    for sep in TOKENS.captures_iter(value) {
        let (Some(whole), Some(kind)) = (sep.get(0), sep.get(1)) else {
            continue;
        };
        out.push_str(&format_token(&value[last..whole.start()], form, locale));
        out.push_str(match kind.as_str() {
            "," => ", ",
            "&" => " & ",
            "and" => " and ",
            dash => dash,
        });
        last = whole.end();
    }
    out.push_str(&format_token(&value[last..], form, locale));
    out
}

fn format_token(token: &str, form: NumberForm, locale: &Locale) -> String {
    let Ok(n) = token.parse::<u64>() else {
        return token.to_string();
    };
    match form {
        NumberForm::Numeric => n.to_string(),
        NumberForm::Ordinal => ordinal(n, locale),
        NumberForm::LongOrdinal => locale
            .long_ordinal(n)
            .map(str::to_string)
            .unwrap_or_else(|| ordinal(n, locale)),
        NumberForm::Roman => roman(n).unwrap_or_else(|| n.to_string()),
    }
}

pub(crate) fn ordinal(n: u64, locale: &Locale) -> String {
    format!("{}{}", n, locale.ordinal_suffix(n).unwrap_or(""))
}

/// Lowercase roman numeral, for 1 through 3999.
fn roman(mut n: u64) -> Option<String> {
    const TABLE: &[(u64, &str)] = &[
        (1000, "m"),
        (900, "cm"),
        (500, "d"),
        (400, "cd"),
        (100, "c"),
        (90, "xc"),
        (50, "l"),
        (40, "xl"),
        (10, "x"),
        (9, "ix"),
        (5, "v"),
        (4, "iv"),
        (1, "i"),
    ];
    if n == 0 || n >= 4000 {
        return None;
    }
    let mut out = String::new();
    for (value, numeral) in TABLE {
        while n >= *value {
            out.push_str(numeral);
            n -= value;
        }
    }
    Some(out)
}

/// Sort key with numbers zero-padded so that they compare numerically as
/// strings.
pub(crate) fn sort_key(value: &str) -> String {
    DIGITS
        .replace_all(value, |caps: &regex::Captures<'_>| format!("{:0>20}", &caps[0]))
        .into_owned()
}

/// Reformat every `a-b` range in a page value. Without a format the digits
/// are kept and only the delimiter changes.
pub fn format_page_range(value: &str, format: Option<PageRangeFormat>, locale: &Locale) -> String {
    let delimiter = locale
        .term_text("page-range-delimiter", TermForm::Long, false)
        .unwrap_or("–");
    RANGE
        .replace_all(value, |caps: &regex::Captures<'_>| {
            let (start_prefix, start, end_prefix, end) = (&caps[1], &caps[2], &caps[3], &caps[4]);
            if start_prefix != end_prefix {
                return caps[0].to_string();
            }
            let end = match format {
                Some(format) => compress_range(start, end, format),
                None => end.to_string(),
            };
            format!("{start_prefix}{start}{delimiter}{end_prefix}{end}")
        })
        .into_owned()
}

fn compress_range(start: &str, end: &str, format: PageRangeFormat) -> String {
    let end = expand_end(start, end);
    if end.len() != start.len() {
        return end;
    }
    match format {
        PageRangeFormat::Expanded => end,
        PageRangeFormat::Minimal => minimal(start, &end, 1),
        PageRangeFormat::MinimalTwo => minimal(start, &end, 2),
        PageRangeFormat::Chicago => chicago(start, &end),
    }
}

/// "42-5" is "42-45".
fn expand_end(start: &str, end: &str) -> String {
    if end.len() < start.len() {
        format!("{}{}", &start[..start.len() - end.len()], end)
    } else {
        end.to_string()
    }
}

/// Drop the leading digits `end` shares with `start`, keeping at least
/// `keep` digits.
fn minimal(start: &str, end: &str, keep: usize) -> String {
    let shared = start
        .bytes()
        .zip(end.bytes())
        .take_while(|(a, b)| a == b)
        .count();
    let keep_from = shared.min(end.len().saturating_sub(keep));
    end[keep_from..].to_string()
}

fn chicago(start: &str, end: &str) -> String {
    let Ok(n) = start.parse::<u64>() else {
        return end.to_string();
    };
    if n < 100 || n % 100 == 0 {
        return end.to_string();
    }
    if n % 100 < 10 {
        return minimal(start, end, 1);
    }
    let compressed = minimal(start, end, 2);
    if start.len() == 4 && compressed.len() >= 3 {
        return end.to_string();
    }
    compressed
}
