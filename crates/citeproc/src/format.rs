//! Final format pass: [`Output`] to plain text, HTML or RTF.
//!
//! The tree is first flattened into a token stream in which text case and
//! strip-periods have already been applied to the text leaves and quotes
//! are still symbolic. Punctuation is then moved inside closing quotes when
//! the locale asks for it, and finally each format serializes the tokens.

use crate::output::Output;
use citeproc_csl::{
    Display, FontStyle, FontVariant, FontWeight, Formatting, Locale, TermForm, TextCase,
    TextDecoration, VerticalAlign,
};
use std::fmt;
use std::str::FromStr;

/// Output markup produced by the final pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum OutputFormat {
    #[default]
    Html,
    Rtf,
    Plain,
}

impl OutputFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            OutputFormat::Html => "html",
            OutputFormat::Rtf => "rtf",
            OutputFormat::Plain => "plain",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown output format '{0}', expected one of: plain, html, rtf")]
pub struct ParseFormatError(String);

impl FromStr for OutputFormat {
    type Err = ParseFormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "html" => Ok(OutputFormat::Html),
            "rtf" => Ok(OutputFormat::Rtf),
            "plain" | "text" | "txt" => Ok(OutputFormat::Plain),
            _ => Err(ParseFormatError(s.to_string())),
        }
    }
}

/// A rendered string together with the format that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rendered {
    pub format: OutputFormat,
    pub value: String,
}

impl Rendered {
    pub fn as_str(&self) -> &str {
        &self.value
    }

    pub fn into_string(self) -> String {
        self.value
    }

    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }
}

impl fmt::Display for Rendered {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)
    }
}

impl PartialEq<&str> for Rendered {
    fn eq(&self, other: &&str) -> bool {
        self.value == *other
    }
}

/// Render `output` in `format`, taking quote marks and the
/// punctuation-in-quote option from `locale`.
///
/// Unformatted text comes out unchanged only when it needs no escaping.
/// HTML escapes `&`, `<` and `>`. RTF escapes `\`, `{` and `}` and writes
/// every non-ASCII character as `\uN?` (one per UTF-16 unit).
pub fn render(output: &Output, format: OutputFormat, locale: &Locale) -> String {
    let mut flattener = Flattener::default();
    flattener.flatten(output);
    let mut tokens = flattener.tokens;

    if locale.punctuation_in_quote() {
        move_punctuation_into_quotes(&mut tokens);
    }
    collapse_duplicate_periods(&mut tokens);

    let quotes = QuoteMarks::from_locale(locale);
    let mut out = String::new();
    for token in &tokens {
        match format {
            OutputFormat::Plain => write_plain(token, &quotes, &mut out),
            OutputFormat::Html => write_html(token, &quotes, &mut out),
            OutputFormat::Rtf => write_rtf(token, &quotes, &mut out),
        }
    }
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Markup {
    Italic,
    Oblique,
    NormalStyle,
    Bold,
    Light,
    NormalWeight,
    SmallCaps,
    NormalVariant,
    Underline,
    NoDecoration,
    Sup,
    Sub,
    Baseline,
    Display(Display),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Text(String),
    Open(Markup),
    Close(Markup),
    OpenQuote { inner: bool },
    CloseQuote { inner: bool },
}

#[derive(Default)]
struct Flattener {
    tokens: Vec<Token>,
    /// Active text case and whether its first word is still ahead.
    case_stack: Vec<(TextCase, bool)>,
    strip_periods: usize,
    quote_depth: usize,
}

impl Flattener {
    fn flatten(&mut self, output: &Output) {
        match output {
            Output::Null => {}
            Output::Literal(text) => self.push_leaf(text),
            Output::Formatted {
                formatting,
                children,
            } => self.flatten_formatted(formatting, children),
        }
    }

    fn flatten_formatted(&mut self, formatting: &Formatting, children: &[Output]) {
        if let Some(display) = formatting.display {
            self.tokens.push(Token::Open(Markup::Display(display)));
        }
        if let Some(prefix) = formatting.prefix.as_deref().filter(|p| !p.is_empty()) {
            self.tokens.push(Token::Text(prefix.to_string()));
        }

        let markups = markups(formatting);
        for markup in &markups {
            self.tokens.push(Token::Open(*markup));
        }
        let inner = self.quote_depth % 2 == 1;
        if formatting.quotes {
            self.tokens.push(Token::OpenQuote { inner });
            self.quote_depth += 1;
        }
        if let Some(case) = formatting.text_case {
            self.case_stack.push((case, true));
        }
        if formatting.strip_periods {
            self.strip_periods += 1;
        }

        for child in children {
            self.flatten(child);
        }

        if formatting.strip_periods {
            self.strip_periods -= 1;
        }
        if formatting.text_case.is_some() {
            self.case_stack.pop();
        }
        if formatting.quotes {
            self.quote_depth -= 1;
            self.tokens.push(Token::CloseQuote { inner });
        }
        for markup in markups.iter().rev() {
            self.tokens.push(Token::Close(*markup));
        }

        if let Some(suffix) = formatting.suffix.as_deref().filter(|s| !s.is_empty()) {
            self.tokens.push(Token::Text(suffix.to_string()));
        }
        if let Some(display) = formatting.display {
            self.tokens.push(Token::Close(Markup::Display(display)));
        }
    }

    fn push_leaf(&mut self, text: &str) {
        let mut text = if self.strip_periods > 0 {
            text.replace('.', "")
        } else {
            text.to_string()
        };
        if let Some((case, at_start)) = self.case_stack.last_mut()
            && !text.is_empty()
        {
            text = apply_text_case(&text, *case, *at_start);
            *at_start = false;
        }
        if !text.is_empty() {
            self.tokens.push(Token::Text(text));
        }
    }
}

fn markups(formatting: &Formatting) -> Vec<Markup> {
    let mut markups = Vec::new();
    match formatting.font_style {
        Some(FontStyle::Italic) => markups.push(Markup::Italic),
        Some(FontStyle::Oblique) => markups.push(Markup::Oblique),
        Some(FontStyle::Normal) => markups.push(Markup::NormalStyle),
        None => {}
    }
    match formatting.font_weight {
        Some(FontWeight::Bold) => markups.push(Markup::Bold),
        Some(FontWeight::Light) => markups.push(Markup::Light),
        Some(FontWeight::Normal) => markups.push(Markup::NormalWeight),
        None => {}
    }
    match formatting.font_variant {
        Some(FontVariant::SmallCaps) => markups.push(Markup::SmallCaps),
        Some(FontVariant::Normal) => markups.push(Markup::NormalVariant),
        None => {}
    }
    match formatting.text_decoration {
        Some(TextDecoration::Underline) => markups.push(Markup::Underline),
        Some(TextDecoration::None) => markups.push(Markup::NoDecoration),
        None => {}
    }
    match formatting.vertical_align {
        Some(VerticalAlign::Sup) => markups.push(Markup::Sup),
        Some(VerticalAlign::Sub) => markups.push(Markup::Sub),
        Some(VerticalAlign::Baseline) => markups.push(Markup::Baseline),
        None => {}
    }
    markups
}

/// Move a `.` or `,` that directly follows a closing quote inside it.
fn move_punctuation_into_quotes(tokens: &mut Vec<Token>) {
    let mut i = 0;
    while i < tokens.len() {
        if !matches!(tokens[i], Token::CloseQuote { .. }) {
            i += 1;
            continue;
        }

        let next_text = (i + 1..tokens.len())
            .find(|&j| !matches!(tokens[j], Token::Close(_) | Token::CloseQuote { .. }));
        let Some(j) = next_text else {
            break;
        };
        let Token::Text(text) = &mut tokens[j] else {
            i += 1;
            continue;
        };
        let Some(punct) = text.chars().next().filter(|c| *c == '.' || *c == ',') else {
            i += 1;
            continue;
        };
        text.remove(0);
        if text.is_empty() {
            tokens.remove(j);
        }

        let quoted_ends_in_punct = tokens[..i].iter().rev().find_map(|t| match t {
            Token::Text(t) => Some(t.ends_with(['.', '!', '?'])),
            _ => None,
        });
        if quoted_ends_in_punct == Some(true) && punct == '.' {
            i += 1;
        } else {
            tokens.insert(i, Token::Text(punct.to_string()));
            i += 2;
        }
    }
}

/// Drop a period that directly follows text already ending in one, as
/// when "ibid." meets a "." suffix.
fn collapse_duplicate_periods(tokens: &mut Vec<Token>) {
    let mut last = None;
    for token in tokens.iter_mut() {
        match token {
            Token::Text(text) => {
                if last == Some('.') && text.starts_with('.') {
                    text.remove(0);
                }
                if let Some(c) = text.chars().last() {
                    last = Some(c);
                }
            }
            Token::OpenQuote { .. } | Token::CloseQuote { .. } => last = None,
            Token::Open(_) | Token::Close(_) => {}
        }
    }
    tokens.retain(|t| !matches!(t, Token::Text(text) if text.is_empty()));
}

struct QuoteMarks {
    open: String,
    close: String,
    open_inner: String,
    close_inner: String,
}

impl QuoteMarks {
    fn from_locale(locale: &Locale) -> Self {
        let term = |name: &str, default: &str| {
            locale
                .term_text(name, TermForm::Long, false)
                .unwrap_or(default)
                .to_string()
        };
        Self {
            open: term("open-quote", "\u{201c}"),
            close: term("close-quote", "\u{201d}"),
            open_inner: term("open-inner-quote", "\u{2018}"),
            close_inner: term("close-inner-quote", "\u{2019}"),
        }
    }

    fn get(&self, open: bool, inner: bool) -> &str {
        match (open, inner) {
            (true, false) => &self.open,
            (false, false) => &self.close,
            (true, true) => &self.open_inner,
            (false, true) => &self.close_inner,
        }
    }
}

fn write_plain(token: &Token, quotes: &QuoteMarks, out: &mut String) {
    match token {
        Token::Text(text) => out.push_str(text),
        Token::OpenQuote { inner } => out.push_str(quotes.get(true, *inner)),
        Token::CloseQuote { inner } => out.push_str(quotes.get(false, *inner)),
        Token::Open(_) | Token::Close(_) => {}
    }
}

fn write_html(token: &Token, quotes: &QuoteMarks, out: &mut String) {
    match token {
        Token::Text(text) => escape_html(text, out),
        Token::OpenQuote { inner } => escape_html(quotes.get(true, *inner), out),
        Token::CloseQuote { inner } => escape_html(quotes.get(false, *inner), out),
        Token::Open(markup) => out.push_str(match markup {
            Markup::Italic => "<i>",
            Markup::Oblique => "<span style=\"font-style:oblique;\">",
            Markup::NormalStyle => "<span style=\"font-style:normal;\">",
            Markup::Bold => "<b>",
            Markup::Light => "<span style=\"font-weight:lighter;\">",
            Markup::NormalWeight => "<span style=\"font-weight:normal;\">",
            Markup::SmallCaps => "<span style=\"font-variant:small-caps;\">",
            Markup::NormalVariant => "<span style=\"font-variant:normal;\">",
            Markup::Underline => "<span style=\"text-decoration:underline;\">",
            Markup::NoDecoration => "<span style=\"text-decoration:none;\">",
            Markup::Sup => "<sup>",
            Markup::Sub => "<sub>",
            Markup::Baseline => "<span style=\"baseline\">",
            Markup::Display(Display::Block) => "<div class=\"csl-block\">",
            Markup::Display(Display::LeftMargin) => "<div class=\"csl-left-margin\">",
            Markup::Display(Display::RightInline) => "<div class=\"csl-right-inline\">",
            Markup::Display(Display::Indent) => "<div class=\"csl-indent\">",
        }),
        Token::Close(markup) => out.push_str(match markup {
            Markup::Italic => "</i>",
            Markup::Bold => "</b>",
            Markup::Sup => "</sup>",
            Markup::Sub => "</sub>",
            Markup::Display(_) => "</div>",
            _ => "</span>",
        }),
    }
}

fn escape_html(text: &str, out: &mut String) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
}

fn write_rtf(token: &Token, quotes: &QuoteMarks, out: &mut String) {
    match token {
        Token::Text(text) => escape_rtf(text, out),
        Token::OpenQuote { inner } => escape_rtf(quotes.get(true, *inner), out),
        Token::CloseQuote { inner } => escape_rtf(quotes.get(false, *inner), out),
        Token::Open(markup) => out.push_str(match markup {
            Markup::Italic | Markup::Oblique => "{\\i ",
            Markup::NormalStyle => "{\\i0 ",
            Markup::Bold => "{\\b ",
            Markup::Light | Markup::NormalWeight => "{\\b0 ",
            Markup::SmallCaps => "{\\scaps ",
            Markup::NormalVariant => "{\\scaps0 ",
            Markup::Underline => "{\\ul ",
            Markup::NoDecoration => "{\\ul0 ",
            Markup::Sup => "{\\super ",
            Markup::Sub => "{\\sub ",
            Markup::Baseline => "{\\nosupersub ",
            Markup::Display(_) => "",
        }),
        Token::Close(Markup::Display(_)) => {}
        Token::Close(_) => out.push('}'),
    }
}

fn escape_rtf(text: &str, out: &mut String) {
    let mut units = [0u16; 2];
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '{' => out.push_str("\\{"),
            '}' => out.push_str("\\}"),
            c if c.is_ascii() => out.push(c),
            c => {
                for unit in c.encode_utf16(&mut units) {
                    out.push_str(&format!("\\u{}?", *unit as i16));
                }
            }
        }
    }
}

const STOP_WORDS: &[&str] = &[
    "a", "an", "and", "as", "at", "but", "by", "down", "for", "from", "in", "into", "nor", "of",
    "on", "onto", "or", "over", "so", "the", "till", "to", "up", "via", "with", "yet",
];

fn apply_text_case(text: &str, case: TextCase, at_start: bool) -> String {
    match case {
        TextCase::Lowercase => text.to_lowercase(),
        TextCase::Uppercase => text.to_uppercase(),
        TextCase::CapitalizeFirst if at_start => capitalize_first(text),
        TextCase::CapitalizeFirst => text.to_string(),
        TextCase::CapitalizeAll => map_words(text, |word, _| capitalize_first(word)),
        TextCase::Sentence => sentence_case(text, at_start),
        TextCase::Title => title_case(text, at_start),
    }
}

/// Apply `f` to each whitespace-separated word, keeping the whitespace.
fn map_words(text: &str, mut f: impl FnMut(&str, usize) -> String) -> String {
    let mut out = String::with_capacity(text.len());
    let mut index = 0;
    let mut rest = text;
    while !rest.is_empty() {
        let ws_len = rest.len() - rest.trim_start().len();
        out.push_str(&rest[..ws_len]);
        rest = &rest[ws_len..];
        let word_len = rest.find(char::is_whitespace).unwrap_or(rest.len());
        if word_len > 0 {
            out.push_str(&f(&rest[..word_len], index));
            index += 1;
        }
        rest = &rest[word_len..];
    }
    out
}

fn capitalize_first(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        None => String::new(),
        Some(first) => first.to_uppercase().chain(chars).collect(),
    }
}

/// Upper-case words lose their case; the first word is capitalized.
fn sentence_case(text: &str, at_start: bool) -> String {
    let shouting = text.chars().any(char::is_alphabetic)
        && !text.chars().any(char::is_lowercase);
    let base = if shouting {
        text.to_lowercase()
    } else {
        text.to_string()
    };
    if at_start {
        capitalize_first(&base)
    } else {
        base
    }
}

/// English title case: capitalize lower-case words except stop words that
/// are not first.
fn title_case(text: &str, at_start: bool) -> String {
    map_words(text, |word, index| {
        let first = at_start && index == 0;
        if word.chars().any(char::is_uppercase) {
            word.to_string()
        } else if !first && STOP_WORDS.contains(&word) {
            word.to_string()
        } else {
            capitalize_first(word)
        }
    })
}
